//! C expression and statement lowering.
//!
//! Pure structural recursion over the KIR sum types. Unsupported
//! expression shapes degrade to a visible placeholder comment (they are
//! usually nested inside otherwise-valid statements); unsupported
//! statement shapes are a hard error naming the operator and the output
//! file so the lowerer can be extended.

use crate::codegen::emit::CodeWriter;
use crate::codegen::CodegenError;
use crate::kir::{
    AssignTarget, BinOp, Expression, Number, ReactiveTable, Statement, UnaryOp,
};

use super::reactive::signal_name_for;

/// Identifiers that are conceptually static modules, not instances: member
/// access on them always uses `.`, never the pointer arrow.
pub const VALUE_MODULES: &[&str] = &["Storage", "DateTime", "Math", "UUID"];

/// Lowering state for one C output file.
pub struct CLowering<'ctx> {
    pub reactive: &'ctx ReactiveTable,
    /// Owning component instance, for reactive-name qualification.
    pub current_scope: Option<String>,
    /// Loop variable of the innermost `for-each`, if any.
    pub loop_item: Option<String>,
    /// Path of the file being generated, for error reporting.
    pub output_path: String,
    locals: Vec<String>,
    globals: Vec<String>,
}

impl<'ctx> CLowering<'ctx> {
    pub fn new(reactive: &'ctx ReactiveTable, output_path: impl Into<String>) -> Self {
        Self {
            reactive,
            current_scope: None,
            loop_item: None,
            output_path: output_path.into(),
            locals: Vec::new(),
            globals: Vec::new(),
        }
    }

    // ========== Variable tracking ==========

    pub fn reset_locals(&mut self) {
        self.locals.clear();
    }

    pub fn add_local(&mut self, name: &str) {
        if !self.is_local(name) {
            self.locals.push(name.to_string());
        }
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l == name)
            || self.loop_item.as_deref() == Some(name)
    }

    pub fn add_global(&mut self, name: &str) {
        if !self.globals.iter().any(|g| g == name) {
            self.globals.push(name.to_string());
        }
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g == name)
    }

    fn resolve_reactive(&self, name: &str) -> Option<&crate::kir::ReactiveVariable> {
        if self.is_local(name) {
            return None;
        }
        self.reactive.resolve(name, self.current_scope.as_deref())
    }

    // ========== Expressions ==========

    /// Render an expression as C source text.
    pub fn expr_to_c(&self, expr: &Expression) -> String {
        match expr {
            Expression::String(s) => escape_c_string(s),
            Expression::Number(n) => render_number(*n),
            Expression::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Expression::Null => "NULL".to_string(),

            Expression::Var(name) => name.clone(),

            Expression::Member { object, property } => self.member_to_c(object, property),

            Expression::Index { object, index } => {
                format!("{}[{}]", self.expr_to_c(object), self.expr_to_c(index))
            }

            Expression::Unary { op, operand } => {
                let prefix = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                format!("({}{})", prefix, self.expr_to_c(operand))
            }

            Expression::Binary { op, lhs, rhs } => {
                format!(
                    "({} {} {})",
                    self.expr_to_c(lhs),
                    c_operator(*op),
                    self.expr_to_c(rhs)
                )
            }

            Expression::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr_to_c(a)).collect();
                format!("{}({})", function, args.join(", "))
            }

            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                // C has no methods: receiver.method(args) -> receiver_method(args).
                let recv = self.expr_to_c(receiver);
                let args: Vec<String> = args.iter().map(|a| self.expr_to_c(a)).collect();
                format!("{}_{}({})", recv, method, args.join(", "))
            }

            Expression::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| self.expr_to_c(e)).collect();
                format!("{{{}}}", elements.join(", "))
            }

            Expression::Ternary {
                condition,
                then_expr,
                else_expr,
            } => format!(
                "({} ? {} : {})",
                self.expr_to_c(condition),
                self.expr_to_c(then_expr),
                self.expr_to_c(else_expr)
            ),

            // Visible placeholder, never a silent drop.
            Expression::Unsupported(op) => format!("/* UNSUPPORTED: {op} */"),
        }
    }

    fn member_to_c(&self, object: &Expression, property: &str) -> String {
        let obj = self.expr_to_c(object);

        // array.length reads the companion count variable.
        if property == "length" {
            if let Expression::Var(_) = object {
                return format!("{obj}_count");
            }
        }

        // Simple variables are heap-allocated aggregates in this runtime,
        // so they take the pointer arrow; value modules and nested member
        // accesses use `.`.
        let use_arrow = match object {
            Expression::Var(name) => !VALUE_MODULES.contains(&name.as_str()),
            _ => false,
        };

        format!("{}{}{}", obj, if use_arrow { "->" } else { "." }, property)
    }

    // ========== Statements ==========

    /// Lower a statement into the writer.
    pub fn stmt_to_c(&mut self, w: &mut CodeWriter, stmt: &Statement) -> Result<(), CodegenError> {
        match stmt {
            Statement::VarDecl { name, ty, init } => {
                let c_type = match ty.as_deref() {
                    Some(declared) => c_type_for(declared),
                    None => init.as_ref().map_or("void*", |e| self.infer_type(e)),
                };
                w.write(&format!("{c_type} {name}"));
                if let Some(init) = init {
                    w.write(&format!(" = {}", self.expr_to_c(init)));
                }
                w.writeln(";");
                self.add_local(name);
                Ok(())
            }

            Statement::Assign { target, value } => self.assign_to_c(w, target, value),

            Statement::Return(value) => {
                match value {
                    Some(expr) => w.writeln(&format!("return {};", self.expr_to_c(expr))),
                    None => w.writeln("return;"),
                }
                Ok(())
            }

            Statement::Expr(expr) => {
                w.writeln(&format!("{};", self.expr_to_c(expr)));
                Ok(())
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                w.writeln(&format!("if ({}) {{", self.expr_to_c(condition)));
                w.indent();
                for stmt in then_branch {
                    self.stmt_to_c(w, stmt)?;
                }
                w.dedent();
                if !else_branch.is_empty() {
                    w.writeln("} else {");
                    w.indent();
                    for stmt in else_branch {
                        self.stmt_to_c(w, stmt)?;
                    }
                    w.dedent();
                }
                w.writeln("}");
                Ok(())
            }

            Statement::While { condition, body } => {
                w.writeln(&format!("while ({}) {{", self.expr_to_c(condition)));
                w.indent();
                for stmt in body {
                    self.stmt_to_c(w, stmt)?;
                }
                w.dedent();
                w.writeln("}");
                Ok(())
            }

            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = init.as_ref().map_or(String::new(), |e| self.expr_to_c(e));
                let condition = condition
                    .as_ref()
                    .map_or("true".to_string(), |e| self.expr_to_c(e));
                let update = update.as_ref().map_or(String::new(), |e| self.expr_to_c(e));
                w.writeln(&format!("for ({init}; {condition}; {update}) {{"));
                w.indent();
                for stmt in body {
                    self.stmt_to_c(w, stmt)?;
                }
                w.dedent();
                w.writeln("}");
                Ok(())
            }

            Statement::ForEach { item, source, body } => self.for_each_to_c(w, item, source, body),

            Statement::Break => {
                w.writeln("break;");
                Ok(())
            }

            Statement::Continue => {
                w.writeln("continue;");
                Ok(())
            }

            Statement::Block(stmts) => {
                w.writeln("{");
                w.indent();
                for stmt in stmts {
                    self.stmt_to_c(w, stmt)?;
                }
                w.dedent();
                w.writeln("}");
                Ok(())
            }

            Statement::Unsupported(op) => Err(CodegenError::UnsupportedStatement {
                op: op.clone(),
                output_path: self.output_path.clone(),
            }),
        }
    }

    fn assign_to_c(
        &mut self,
        w: &mut CodeWriter,
        target: &AssignTarget,
        value: &Expression,
    ) -> Result<(), CodegenError> {
        let value_c = self.expr_to_c(value);

        match target {
            AssignTarget::Name(name) => {
                // Writes to a reactive variable go through the signal setter.
                if let Some(var) = self.resolve_reactive(name) {
                    let signal = signal_name_for(&var.name, &var.scope);
                    w.writeln(&format!("kryon_signal_set({signal}, {value_c});"));
                    return Ok(());
                }

                if name.contains('.') {
                    // Member path encoded as a plain string target.
                    let (obj, prop) = name.split_once('.').unwrap();
                    w.writeln(&format!("{obj}->{prop} = {value_c};"));
                    return Ok(());
                }

                if self.is_global(name) || self.is_local(name) {
                    w.writeln(&format!("{name} = {value_c};"));
                } else {
                    // First write declares the variable with an inferred type.
                    let inferred = self.infer_type(value);
                    w.writeln(&format!("{inferred} {name} = {value_c};"));
                    self.add_local(name);
                }
                Ok(())
            }
            AssignTarget::Lvalue(lvalue) => {
                w.writeln(&format!("{} = {value_c};", self.expr_to_c(lvalue)));
                Ok(())
            }
        }
    }

    fn for_each_to_c(
        &mut self,
        w: &mut CodeWriter,
        item: &str,
        source: &Expression,
        body: &[Statement],
    ) -> Result<(), CodegenError> {
        if let Some((start, end)) = source.as_range_call() {
            // Range constructor lowers to a classic counting loop.
            let start = self.expr_to_c(start);
            let end = self.expr_to_c(end);
            w.writeln(&format!(
                "for (int {item} = {start}; {item} < {end}; {item}++) {{"
            ));
        } else {
            // Index-based iteration over the companion count variable.
            let source_c = self.expr_to_c(source);
            w.writeln(&format!(
                "for (int _{item}_idx = 0; _{item}_idx < {source_c}_count; _{item}_idx++) {{"
            ));
            // The per-iteration item binds to source[index]. Element type is
            // inferred from the item name (habit -> Habit*).
            let (base_type, ptr_type) = element_type_for_item(item);
            w.indented(|w| {
                w.writeln(&format!(
                    "{ptr_type} {item} = &(({base_type}*){source_c})[_{item}_idx];"
                ));
            });
        }

        let previous_item = self.loop_item.replace(item.to_string());
        w.indent();
        for stmt in body {
            self.stmt_to_c(w, stmt)?;
        }
        w.dedent();
        self.loop_item = previous_item;

        w.writeln("}");
        Ok(())
    }

    /// Infer the C type of an expression, for declarations without a
    /// declared type.
    pub fn infer_type(&self, expr: &Expression) -> &'static str {
        match expr {
            Expression::String(_) => "const char*",
            Expression::Number(Number::Int(_)) => "int",
            Expression::Number(Number::Float(_)) => "double",
            Expression::Bool(_) => "bool",
            Expression::MethodCall {
                receiver, method, ..
            } => {
                if let Expression::Var(name) = receiver.as_ref() {
                    if name == "Storage" {
                        return "void*";
                    }
                    if name == "DateTime" && (method == "today" || method == "now") {
                        return "KryonDate*";
                    }
                }
                "void*"
            }
            _ => "void*",
        }
    }
}

// ============================================================================
// Rendering helpers
// ============================================================================

/// Escape a string for a C string literal (quote and backslash at minimum).
pub fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a numeric literal, preserving the integer/float distinction.
pub fn render_number(n: Number) -> String {
    match n {
        Number::Int(v) => v.to_string(),
        Number::Float(v) => {
            let text = format!("{v}");
            // A float that renders integral still needs a decimal point.
            if text.contains('.') || text.contains('e') {
                text
            } else {
                format!("{text}.0")
            }
        }
    }
}

/// The C spelling of a binary operator.
pub fn c_operator(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

/// Map a KIR type name to its C spelling.
pub fn c_type_for(kir_type: &str) -> &'static str {
    match kir_type {
        "string" => "const char*",
        "int" | "number" => "int",
        "float" | "double" => "double",
        "bool" => "bool",
        _ => "void*",
    }
}

/// Infer a for-each element type from the item name (`habit` -> `Habit`).
fn element_type_for_item(item: &str) -> (String, String) {
    let mut chars = item.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            let base = format!("{}{}", first.to_ascii_uppercase(), chars.as_str());
            let ptr = format!("{base}*");
            (base, ptr)
        }
        _ => ("void".to_string(), "void*".to_string()),
    }
}
