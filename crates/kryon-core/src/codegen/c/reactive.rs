//! Reactive signal lowering for the C backend.
//!
//! Every reactive variable gets a deterministic, scope-qualified signal
//! identifier used consistently across three emissions: declaration,
//! initialization, and cleanup. Bindings substitute the bare variable name
//! in rendered expression text with the signal identifier, guarded by
//! identifier-boundary checks.

use crate::codegen::emit::CodeWriter;
use crate::kir::manifest::{ReactiveType, ReactiveValue, ReactiveVariable, COMPONENT_SCOPE};
use crate::kir::{BinOp, Expression, ReactiveTable};

use super::expr::{escape_c_string, render_number};

/// Scope-qualified base name: the component-global scope leaves the name
/// unchanged; any other scope appends the sanitized scope (every
/// non-alphanumeric character becomes `_`).
///
/// Pure and deterministic: equal `(name, scope)` pairs always yield equal
/// output.
pub fn generate_scoped_var_name(name: &str, scope: &str) -> String {
    if scope == COMPONENT_SCOPE {
        return name.to_string();
    }
    let sanitized: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{name}_{sanitized}")
}

/// Signal identifier for a `(name, scope)` pair.
pub fn signal_name_for(name: &str, scope: &str) -> String {
    format!("{}_signal", generate_scoped_var_name(name, scope))
}

/// Signal identifier for a declared variable.
pub fn signal_name(var: &ReactiveVariable) -> String {
    signal_name_for(&var.name, &var.scope)
}

/// Replace every identifier-boundary occurrence of `name` in `text` with
/// `replacement`. `value` inside `valueCount` is untouched; this is not a
/// substring match.
pub fn substitute_identifier(text: &str, name: &str, replacement: &str) -> String {
    if name.is_empty() {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while let Some(pos) = text[i..].find(name) {
        let start = i + pos;
        let end = start + name.len();

        let boundary_before = start == 0 || !is_ident_char(bytes[start - 1]);
        let boundary_after = end >= bytes.len() || !is_ident_char(bytes[end]);

        out.push_str(&text[i..start]);
        if boundary_before && boundary_after {
            out.push_str(replacement);
        } else {
            out.push_str(name);
        }
        i = end;
    }
    out.push_str(&text[i..]);
    out
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Substitute every registered reactive variable in rendered expression
/// text with its signal identifier, respecting the current scope.
pub fn substitute_signals(text: &str, reactive: &ReactiveTable, scope: Option<&str>) -> String {
    let mut result = text.to_string();
    for var in reactive.iter() {
        if let Some(resolved) = reactive.resolve(&var.name, scope) {
            // Only the scope-resolved variable substitutes this name.
            if resolved.scope == var.scope {
                result = substitute_identifier(&result, &var.name, &signal_name(var));
            }
        }
    }
    result
}

// ============================================================================
// Declaration / initialization / cleanup triad
// ============================================================================

pub fn write_signal_declarations(w: &mut CodeWriter, reactive: &ReactiveTable) {
    if reactive.is_empty() {
        return;
    }
    w.writeln("// Reactive signals");
    for var in reactive.iter() {
        w.writeln(&format!("KryonSignal* {} = NULL;", signal_name(var)));
    }
    w.blank_line();
}

pub fn write_signal_initialization(w: &mut CodeWriter, reactive: &ReactiveTable) {
    if reactive.is_empty() {
        return;
    }
    w.writeln("// Initialize reactive signals");
    for var in reactive.iter() {
        let ctor = match (var.ty, &var.initial) {
            (ReactiveType::String, ReactiveValue::String(s)) => {
                format!("kryon_signal_create_string({})", escape_c_string(s))
            }
            (ReactiveType::String, _) => "kryon_signal_create_string(\"\")".to_string(),
            (ReactiveType::Bool, ReactiveValue::Bool(b)) => {
                format!("kryon_signal_create_bool({b})")
            }
            (ReactiveType::Bool, _) => "kryon_signal_create_bool(false)".to_string(),
            (ReactiveType::Float, ReactiveValue::Number(n)) => {
                format!("kryon_signal_create_float({})", n.as_f64())
            }
            (ReactiveType::Float, _) => "kryon_signal_create_float(0.0)".to_string(),
            (ReactiveType::Int, ReactiveValue::Number(n)) => {
                format!("kryon_signal_create_int({})", render_number(*n))
            }
            (ReactiveType::Int, _) => "kryon_signal_create_int(0)".to_string(),
        };
        w.writeln(&format!("{} = {};", signal_name(var), ctor));
    }
    w.blank_line();
}

pub fn write_signal_cleanup(w: &mut CodeWriter, reactive: &ReactiveTable) {
    if reactive.is_empty() {
        return;
    }
    w.writeln("// Cleanup reactive signals");
    for var in reactive.iter() {
        w.writeln(&format!("kryon_signal_destroy({});", signal_name(var)));
    }
}

// ============================================================================
// Binding constructs
// ============================================================================

/// A `"prefix" + var` / `var + "suffix"` template recognized as a
/// formatted binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedBinding {
    pub variable: String,
    /// printf-style format with one `%s` where the variable goes.
    pub format: String,
}

/// Detect the restricted string-template shape that lowers to a dedicated
/// formatted-binding construct instead of generic concatenation. The shape
/// is common enough (list-item labels) to warrant the more efficient
/// target-side primitive.
pub fn formatted_binding(expr: &Expression) -> Option<FormattedBinding> {
    let Expression::Binary {
        op: BinOp::Add,
        lhs,
        rhs,
    } = expr
    else {
        return None;
    };

    match (lhs.as_ref(), rhs.as_ref()) {
        (Expression::String(prefix), Expression::Var(var)) => Some(FormattedBinding {
            variable: var.clone(),
            format: format!("{}%s", escape_percent(prefix)),
        }),
        (Expression::Var(var), Expression::String(suffix)) => Some(FormattedBinding {
            variable: var.clone(),
            format: format!("%s{}", escape_percent(suffix)),
        }),
        _ => None,
    }
}

fn escape_percent(s: &str) -> String {
    s.replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::Number;

    fn var(name: &str, scope: &str) -> ReactiveVariable {
        ReactiveVariable {
            name: name.to_string(),
            scope: scope.to_string(),
            ty: ReactiveType::Int,
            initial: ReactiveValue::Number(Number::Int(0)),
        }
    }

    #[test]
    fn test_scoped_name_component_scope_unchanged() {
        assert_eq!(generate_scoped_var_name("count", COMPONENT_SCOPE), "count");
        assert_eq!(signal_name_for("count", COMPONENT_SCOPE), "count_signal");
    }

    #[test]
    fn test_scoped_name_sanitizes_scope() {
        assert_eq!(
            generate_scoped_var_name("count", "Counter-0"),
            "count_Counter_0"
        );
        assert_eq!(
            signal_name_for("count", "Counter.0"),
            "count_Counter_0_signal"
        );
    }

    #[test]
    fn test_scoped_name_is_deterministic() {
        let a = generate_scoped_var_name("value", "Panel/3");
        let b = generate_scoped_var_name("value", "Panel/3");
        assert_eq!(a, b);
    }

    #[test]
    fn test_substitution_respects_identifier_boundaries() {
        let result = substitute_identifier("(value + valueCount)", "value", "value_signal");
        assert_eq!(result, "(value_signal + valueCount)");
    }

    #[test]
    fn test_substitution_replaces_all_free_occurrences() {
        let result = substitute_identifier("value * value", "value", "v_signal");
        assert_eq!(result, "v_signal * v_signal");
    }

    #[test]
    fn test_substitution_skips_prefixed_occurrence() {
        let result = substitute_identifier("my_value + value", "value", "S");
        assert_eq!(result, "my_value + S");
    }

    #[test]
    fn test_substitute_signals_with_scope() {
        let mut reactive = ReactiveTable::new();
        reactive.register(var("count", COMPONENT_SCOPE));
        reactive.register(var("label", "Card_1"));

        let global = substitute_signals("(count + 1)", &reactive, None);
        assert_eq!(global, "(count_signal + 1)");

        let scoped = substitute_signals("label", &reactive, Some("Card_1"));
        assert_eq!(scoped, "label_Card_1_signal");
    }

    #[test]
    fn test_signal_triad_emission() {
        let mut reactive = ReactiveTable::new();
        reactive.register(ReactiveVariable {
            name: "title".to_string(),
            scope: COMPONENT_SCOPE.to_string(),
            ty: ReactiveType::String,
            initial: ReactiveValue::String("Habits".to_string()),
        });
        reactive.register(var("count", COMPONENT_SCOPE));

        let mut w = CodeWriter::new();
        write_signal_declarations(&mut w, &reactive);
        write_signal_initialization(&mut w, &reactive);
        write_signal_cleanup(&mut w, &reactive);
        let output = w.finish();

        assert!(output.contains("KryonSignal* title_signal = NULL;"));
        assert!(output.contains("title_signal = kryon_signal_create_string(\"Habits\");"));
        assert!(output.contains("count_signal = kryon_signal_create_int(0);"));
        assert!(output.contains("kryon_signal_destroy(title_signal);"));
        assert!(output.contains("kryon_signal_destroy(count_signal);"));
    }

    #[test]
    fn test_formatted_binding_prefix() {
        let expr = Expression::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expression::String("Total: ".to_string())),
            rhs: Box::new(Expression::var("count")),
        };
        let fmt = formatted_binding(&expr).unwrap();
        assert_eq!(fmt.variable, "count");
        assert_eq!(fmt.format, "Total: %s");
    }

    #[test]
    fn test_formatted_binding_suffix() {
        let expr = Expression::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expression::var("name")),
            rhs: Box::new(Expression::String(" done".to_string())),
        };
        let fmt = formatted_binding(&expr).unwrap();
        assert_eq!(fmt.variable, "name");
        assert_eq!(fmt.format, "%s done");
    }

    #[test]
    fn test_general_concat_is_not_formatted_binding() {
        let expr = Expression::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expression::var("a")),
            rhs: Box::new(Expression::var("b")),
        };
        assert!(formatted_binding(&expr).is_none());
    }
}
