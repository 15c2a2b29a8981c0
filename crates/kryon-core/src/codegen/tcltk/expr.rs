//! Tcl expression and statement lowering.
//!
//! Tcl spells things differently from C: variable reads are `$`-prefixed,
//! arithmetic lives inside `expr {...}`, lists are accessed with `lindex`
//! and `llength`, and records are dicts. The recursion mirrors the C
//! lowerer; only the spellings differ.

use crate::codegen::emit::CodeWriter;
use crate::codegen::CodegenError;
use crate::kir::{AssignTarget, BinOp, Expression, Number, ReactiveTable, Statement, UnaryOp};

/// Lowering state for one Tcl output file.
pub struct TclLowering<'ctx> {
    pub reactive: &'ctx ReactiveTable,
    pub current_scope: Option<String>,
    pub output_path: String,
}

impl<'ctx> TclLowering<'ctx> {
    pub fn new(reactive: &'ctx ReactiveTable, output_path: impl Into<String>) -> Self {
        Self {
            reactive,
            current_scope: None,
            output_path: output_path.into(),
        }
    }

    /// Render an expression for use inside `expr {...}`.
    pub fn expr_to_tcl(&self, expr: &Expression) -> String {
        match expr {
            Expression::String(s) => escape_tcl_string(s),
            Expression::Number(n) => match *n {
                Number::Int(v) => v.to_string(),
                Number::Float(v) => format!("{v}"),
            },
            Expression::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Expression::Null => "{}".to_string(),

            Expression::Var(name) => format!("${name}"),

            Expression::Member { object, property } => {
                if property == "length" {
                    return format!("[llength {}]", self.expr_to_tcl(object));
                }
                format!("[dict get {} {property}]", self.expr_to_tcl(object))
            }

            Expression::Index { object, index } => format!(
                "[lindex {} {}]",
                self.expr_to_tcl(object),
                self.expr_to_tcl(index)
            ),

            Expression::Unary { op, operand } => {
                let prefix = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                format!("({prefix}{})", self.expr_to_tcl(operand))
            }

            Expression::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                self.expr_to_tcl(lhs),
                tcl_operator(*op),
                self.expr_to_tcl(rhs)
            ),

            Expression::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr_to_tcl(a)).collect();
                format!("[{function} {}]", args.join(" "))
            }

            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                // Namespaced command: Storage.load -> Storage::load.
                let recv = match receiver.as_ref() {
                    Expression::Var(name) => name.clone(),
                    other => self.expr_to_tcl(other),
                };
                let args: Vec<String> = args.iter().map(|a| self.expr_to_tcl(a)).collect();
                format!("[{recv}::{method} {}]", args.join(" "))
            }

            Expression::Array(elements) => {
                let elements: Vec<String> =
                    elements.iter().map(|e| self.expr_to_tcl(e)).collect();
                format!("[list {}]", elements.join(" "))
            }

            Expression::Ternary {
                condition,
                then_expr,
                else_expr,
            } => format!(
                "({} ? {} : {})",
                self.expr_to_tcl(condition),
                self.expr_to_tcl(then_expr),
                self.expr_to_tcl(else_expr)
            ),

            Expression::Unsupported(op) => format!("{{# UNSUPPORTED: {op}}}"),
        }
    }

    /// Render an expression as a value (wrapped in `expr` when needed).
    pub fn value_to_tcl(&self, expr: &Expression) -> String {
        match expr {
            Expression::String(s) => escape_tcl_string(s),
            Expression::Number(_) | Expression::Bool(_) => self.expr_to_tcl(expr),
            Expression::Var(name) => format!("${name}"),
            Expression::Array(_)
            | Expression::Call { .. }
            | Expression::MethodCall { .. }
            | Expression::Index { .. }
            | Expression::Member { .. } => self.expr_to_tcl(expr),
            _ => format!("[expr {{{}}}]", self.expr_to_tcl(expr)),
        }
    }

    /// Lower a statement into the writer.
    pub fn stmt_to_tcl(
        &mut self,
        w: &mut CodeWriter,
        stmt: &Statement,
    ) -> Result<(), CodegenError> {
        match stmt {
            Statement::VarDecl { name, init, .. } => {
                let value = init
                    .as_ref()
                    .map_or("{}".to_string(), |e| self.value_to_tcl(e));
                w.writeln(&format!("set {name} {value}"));
                Ok(())
            }

            Statement::Assign { target, value } => {
                let value = self.value_to_tcl(value);
                match target {
                    AssignTarget::Name(name) => {
                        // Writes to reactive variables are plain `set`s; the
                        // variable traces installed at startup propagate the
                        // change to bound widgets.
                        w.writeln(&format!("set {name} {value}"));
                    }
                    AssignTarget::Lvalue(Expression::Member { object, property }) => {
                        let obj = match object.as_ref() {
                            Expression::Var(name) => name.clone(),
                            other => self.expr_to_tcl(other),
                        };
                        w.writeln(&format!("dict set {obj} {property} {value}"));
                    }
                    AssignTarget::Lvalue(other) => {
                        w.writeln(&format!("set {} {value}", self.expr_to_tcl(other)));
                    }
                }
                Ok(())
            }

            Statement::Return(value) => {
                match value {
                    Some(expr) => w.writeln(&format!("return {}", self.value_to_tcl(expr))),
                    None => w.writeln("return"),
                }
                Ok(())
            }

            Statement::Expr(expr) => {
                match expr {
                    Expression::Call { function, args } => {
                        let args: Vec<String> =
                            args.iter().map(|a| self.value_to_tcl(a)).collect();
                        let sep = if args.is_empty() { "" } else { " " };
                        w.writeln(&format!("{function}{sep}{}", args.join(" ")));
                    }
                    other => w.writeln(&self.expr_to_tcl(other)),
                }
                Ok(())
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                w.writeln(&format!("if {{{}}} {{", self.expr_to_tcl(condition)));
                w.indent();
                for stmt in then_branch {
                    self.stmt_to_tcl(w, stmt)?;
                }
                w.dedent();
                if !else_branch.is_empty() {
                    w.writeln("} else {");
                    w.indent();
                    for stmt in else_branch {
                        self.stmt_to_tcl(w, stmt)?;
                    }
                    w.dedent();
                }
                w.writeln("}");
                Ok(())
            }

            Statement::While { condition, body } => {
                w.writeln(&format!("while {{{}}} {{", self.expr_to_tcl(condition)));
                w.indent();
                for stmt in body {
                    self.stmt_to_tcl(w, stmt)?;
                }
                w.dedent();
                w.writeln("}");
                Ok(())
            }

            Statement::For { .. } => {
                // Three-clause C loops have no direct Tcl counterpart in
                // this dialect; the front end lowers them to while loops.
                Err(CodegenError::UnsupportedStatement {
                    op: "for".to_string(),
                    output_path: self.output_path.clone(),
                })
            }

            Statement::ForEach { item, source, body } => {
                if let Some((start, end)) = source.as_range_call() {
                    w.writeln(&format!(
                        "for {{set {item} {}}} {{${item} < {}}} {{incr {item}}} {{",
                        self.expr_to_tcl(start),
                        self.expr_to_tcl(end)
                    ));
                } else {
                    w.writeln(&format!(
                        "foreach {item} {} {{",
                        self.value_to_tcl(source)
                    ));
                }
                w.indent();
                for stmt in body {
                    self.stmt_to_tcl(w, stmt)?;
                }
                w.dedent();
                w.writeln("}");
                Ok(())
            }

            Statement::Break => {
                w.writeln("break");
                Ok(())
            }

            Statement::Continue => {
                w.writeln("continue");
                Ok(())
            }

            Statement::Block(stmts) => {
                for stmt in stmts {
                    self.stmt_to_tcl(w, stmt)?;
                }
                Ok(())
            }

            Statement::Unsupported(op) => Err(CodegenError::UnsupportedStatement {
                op: op.clone(),
                output_path: self.output_path.clone(),
            }),
        }
    }
}

/// The Tcl `expr` spelling of a binary operator.
pub fn tcl_operator(op: BinOp) -> &'static str {
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

/// Escape a string for a Tcl double-quoted word.
pub fn escape_tcl_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '[' => out.push_str("\\["),
            ']' => out.push_str("\\]"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowering(reactive: &ReactiveTable) -> TclLowering<'_> {
        TclLowering::new(reactive, "out.tcl")
    }

    #[test]
    fn test_binary_uses_dollar_reads() {
        let reactive = ReactiveTable::new();
        let l = lowering(&reactive);
        let expr = Expression::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expression::var("a")),
            rhs: Box::new(Expression::var("b")),
        };
        assert_eq!(l.expr_to_tcl(&expr), "($a + $b)");
    }

    #[test]
    fn test_value_wraps_computation_in_expr() {
        let reactive = ReactiveTable::new();
        let l = lowering(&reactive);
        let expr = Expression::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expression::var("count")),
            rhs: Box::new(Expression::int(1)),
        };
        assert_eq!(l.value_to_tcl(&expr), "[expr {($count + 1)}]");
    }

    #[test]
    fn test_length_uses_llength() {
        let reactive = ReactiveTable::new();
        let l = lowering(&reactive);
        let expr = Expression::Member {
            object: Box::new(Expression::var("habits")),
            property: "length".to_string(),
        };
        assert_eq!(l.expr_to_tcl(&expr), "[llength $habits]");
    }

    #[test]
    fn test_string_escaping_covers_tcl_specials() {
        assert_eq!(escape_tcl_string("a$b [c]"), "\"a\\$b \\[c\\]\"");
    }

    #[test]
    fn test_assign_emits_set() {
        let reactive = ReactiveTable::new();
        let mut l = lowering(&reactive);
        let mut w = CodeWriter::new();
        l.stmt_to_tcl(
            &mut w,
            &Statement::Assign {
                target: AssignTarget::Name("count".to_string()),
                value: Expression::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expression::var("count")),
                    rhs: Box::new(Expression::int(1)),
                },
            },
        )
        .unwrap();
        assert_eq!(w.finish(), "set count [expr {($count + 1)}]\n");
    }

    #[test]
    fn test_foreach_over_list() {
        let reactive = ReactiveTable::new();
        let mut l = lowering(&reactive);
        let mut w = CodeWriter::new();
        l.stmt_to_tcl(
            &mut w,
            &Statement::ForEach {
                item: "habit".to_string(),
                source: Expression::var("habits"),
                body: vec![Statement::Expr(Expression::Call {
                    function: "puts".to_string(),
                    args: vec![Expression::var("habit")],
                })],
            },
        )
        .unwrap();

        let output = w.finish();
        assert!(output.contains("foreach habit $habits {"));
        assert!(output.contains("puts $habit"));
    }

    #[test]
    fn test_unsupported_statement_names_op_and_path() {
        let reactive = ReactiveTable::new();
        let mut l = lowering(&reactive);
        let mut w = CodeWriter::new();
        let err = l
            .stmt_to_tcl(&mut w, &Statement::Unsupported("asm".to_string()))
            .unwrap_err();
        match err {
            CodegenError::UnsupportedStatement { op, output_path } => {
                assert_eq!(op, "asm");
                assert_eq!(output_path, "out.tcl");
            }
            other => panic!("expected UnsupportedStatement, got {other}"),
        }
    }
}
