//! Universal-handler pattern compiler.
//!
//! A fixed, closed set of handler shapes compiles to bytecode; the checks
//! run in priority order and the first match wins:
//!
//! 1. `var.value OP= literal` (OP in `+ - * /`) — increment/decrement/
//!    scale/divide
//! 2. `var.value = literal` — assign
//! 3. `var = !var` — toggle
//! 4. a single recognized host call with one string-literal argument
//!
//! Anything else fails closed: the compiler returns
//! [`CompileOutcome::NotUniversal`] and the caller falls back to full
//! source-level transpilation for that handler. A handler is never
//! partially compiled.
//!
//! Function ids are a pure function of `(state_id, operation)`:
//! `state_id * 100 + operation_offset`, so repeated builds of identical
//! handlers produce byte-identical bytecode. Host calls use the registry's
//! id namespace starting at [`super::HOST_FUNCTION_ID_BASE`].

use serde::Serialize;

use crate::kir::{
    AssignTarget, BinOp, Expression, LogicFunction, Number, ReactiveTable, Statement, UnaryOp,
};

use super::registry::MetadataRegistry;
use super::{BytecodeFunction, Instruction, Opcode};

/// Recognized state mutation, with its deterministic id offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Increment,
    Decrement,
    Scale,
    Divide,
    Assign,
    Toggle,
    CallHost,
}

impl Operation {
    /// Offset added to `state_id * 100` when forming the function id.
    /// Host calls have no state; their id comes from the host namespace.
    pub fn id_offset(self) -> u32 {
        match self {
            Operation::Increment => 1,
            Operation::Decrement => 2,
            Operation::Scale => 3,
            Operation::Divide => 4,
            Operation::Assign => 5,
            Operation::Toggle => 6,
            Operation::CallHost => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Increment => "increment",
            Operation::Decrement => "decrement",
            Operation::Scale => "scale",
            Operation::Divide => "divide",
            Operation::Assign => "assign",
            Operation::Toggle => "toggle",
            Operation::CallHost => "call_host",
        }
    }
}

/// Operand of a recognized pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PatternOperand {
    /// No operand (toggle).
    Empty,
    Int(i64),
    Str(String),
}

/// The result of classifying a handler body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniversalPattern {
    /// State variable name; empty for host calls.
    pub state_name: String,
    pub operation: Operation,
    pub operand: PatternOperand,
}

/// Outcome of attempting to compile a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    Compiled(BytecodeFunction),
    /// Not one of the recognized shapes; fall back to transpilation. Not an
    /// error: this is a normal, expected control path.
    NotUniversal,
}

impl CompileOutcome {
    pub fn is_compiled(&self) -> bool {
        matches!(self, CompileOutcome::Compiled(_))
    }
}

/// Classify a handler body against the recognized shapes.
///
/// Returns `None` when the body does not match any shape exactly. The
/// caller still needs the state to be registered before the pattern can be
/// compiled (see [`compile_handler`]).
pub fn analyze_handler(func: &LogicFunction) -> Option<UniversalPattern> {
    // Multiple statements always fall back to transpilation.
    let [stmt] = func.statements.as_slice() else {
        return None;
    };

    match stmt {
        Statement::Assign { target, value } => {
            let state_name = assign_target_state(target)?;
            analyze_assign(state_name, value)
        }
        Statement::Expr(Expression::Call { function, args }) => {
            let [Expression::String(arg)] = args.as_slice() else {
                return None;
            };
            // For host calls the state_name field carries the function name.
            Some(UniversalPattern {
                state_name: function.clone(),
                operation: Operation::CallHost,
                operand: PatternOperand::Str(arg.clone()),
            })
        }
        _ => None,
    }
}

/// Compile a handler, or report that it is not universal.
///
/// The state name must resolve in the reactive table and host calls must
/// name a registered host function — otherwise the result is
/// `NotUniversal` (fail closed, never partially compile).
pub fn compile_handler(
    func: &LogicFunction,
    reactive: &ReactiveTable,
    registry: &MetadataRegistry,
) -> CompileOutcome {
    let Some(pattern) = analyze_handler(func) else {
        return CompileOutcome::NotUniversal;
    };

    if pattern.operation == Operation::CallHost {
        // For host calls the pattern's state_name carries the function name.
        let Some(host_id) = registry.host_function_id(&pattern.state_name) else {
            return CompileOutcome::NotUniversal;
        };
        let PatternOperand::Str(arg) = &pattern.operand else {
            return CompileOutcome::NotUniversal;
        };
        tracing::debug!(handler = %func.name, host = %pattern.state_name, "compiled host-call handler");
        return CompileOutcome::Compiled(BytecodeFunction {
            id: host_id,
            name: func.name.clone(),
            instructions: vec![
                Instruction::push_string(arg.clone()),
                Instruction::call_host(host_id),
                Instruction::plain(Opcode::Halt),
            ],
        });
    }

    let Some(state_id) = reactive.resolve_state_id(&pattern.state_name, None) else {
        // Unregistered state name fails closed.
        return CompileOutcome::NotUniversal;
    };

    let id = state_id * 100 + pattern.operation.id_offset();
    let instructions = match (&pattern.operation, &pattern.operand) {
        (Operation::Assign, PatternOperand::Int(v)) => vec![
            Instruction::push_int(*v),
            Instruction::set_state(state_id),
            Instruction::plain(Opcode::Halt),
        ],
        (Operation::Assign, PatternOperand::Str(s)) => vec![
            Instruction::push_string(s.clone()),
            Instruction::set_state(state_id),
            Instruction::plain(Opcode::Halt),
        ],
        (Operation::Toggle, PatternOperand::Empty) => vec![
            // Booleans are 0/1-encoded ints: !b == 1 - b.
            Instruction::push_int(1),
            Instruction::get_state(state_id),
            Instruction::plain(Opcode::Sub),
            Instruction::set_state(state_id),
            Instruction::plain(Opcode::Halt),
        ],
        (op, PatternOperand::Int(v)) => {
            let arith = match op {
                Operation::Increment => Opcode::Add,
                Operation::Decrement => Opcode::Sub,
                Operation::Scale => Opcode::Mul,
                Operation::Divide => Opcode::Div,
                _ => return CompileOutcome::NotUniversal,
            };
            vec![
                Instruction::get_state(state_id),
                Instruction::push_int(*v),
                Instruction::plain(arith),
                Instruction::set_state(state_id),
                Instruction::plain(Opcode::Halt),
            ]
        }
        _ => return CompileOutcome::NotUniversal,
    };

    tracing::debug!(
        handler = %func.name,
        operation = pattern.operation.name(),
        function_id = id,
        "compiled universal handler"
    );
    CompileOutcome::Compiled(BytecodeFunction {
        id,
        name: func.name.clone(),
        instructions,
    })
}

/// Extract the state variable name from an assignment target. Accepts a
/// bare name or the `var.value` lvalue form.
fn assign_target_state(target: &AssignTarget) -> Option<&str> {
    match target {
        AssignTarget::Name(name) => Some(name),
        AssignTarget::Lvalue(Expression::Member { object, property }) if property == "value" => {
            match object.as_ref() {
                Expression::Var(name) => Some(name),
                _ => None,
            }
        }
        AssignTarget::Lvalue(_) => None,
    }
}

/// True if the expression reads the named state (`var` or `var.value`).
fn reads_state(expr: &Expression, state_name: &str) -> bool {
    match expr {
        Expression::Var(name) => name == state_name,
        Expression::Member { object, property } if property == "value" => {
            matches!(object.as_ref(), Expression::Var(name) if name == state_name)
        }
        _ => false,
    }
}

fn analyze_assign(state_name: &str, value: &Expression) -> Option<UniversalPattern> {
    // Priority 1: var OP= literal, with the state read on the left.
    if let Expression::Binary { op, lhs, rhs } = value {
        if reads_state(lhs, state_name) {
            let operation = match op {
                BinOp::Add => Operation::Increment,
                BinOp::Sub => Operation::Decrement,
                BinOp::Mul => Operation::Scale,
                BinOp::Div => Operation::Divide,
                _ => return None,
            };
            // Only integral literals compile; everything else falls back.
            if let Expression::Number(Number::Int(v)) = rhs.as_ref() {
                return Some(UniversalPattern {
                    state_name: state_name.to_string(),
                    operation,
                    operand: PatternOperand::Int(*v),
                });
            }
        }
        return None;
    }

    // Priority 2: var = literal.
    match value {
        Expression::Number(Number::Int(v)) => {
            return Some(UniversalPattern {
                state_name: state_name.to_string(),
                operation: Operation::Assign,
                operand: PatternOperand::Int(*v),
            });
        }
        Expression::Bool(b) => {
            return Some(UniversalPattern {
                state_name: state_name.to_string(),
                operation: Operation::Assign,
                operand: PatternOperand::Int(i64::from(*b)),
            });
        }
        Expression::String(s) => {
            return Some(UniversalPattern {
                state_name: state_name.to_string(),
                operation: Operation::Assign,
                operand: PatternOperand::Str(s.clone()),
            });
        }
        _ => {}
    }

    // Priority 3: var = !var.
    if let Expression::Unary {
        op: UnaryOp::Not,
        operand,
    } = value
    {
        if reads_state(operand, state_name) {
            return Some(UniversalPattern {
                state_name: state_name.to_string(),
                operation: Operation::Toggle,
                operand: PatternOperand::Empty,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::manifest::{ReactiveType, ReactiveValue, ReactiveVariable, COMPONENT_SCOPE};
    use crate::kir::LogicFunction;

    fn reactive_with(names: &[&str]) -> ReactiveTable {
        let mut table = ReactiveTable::new();
        for name in names {
            table.register(ReactiveVariable {
                name: name.to_string(),
                scope: COMPONENT_SCOPE.to_string(),
                ty: ReactiveType::Int,
                initial: ReactiveValue::Number(Number::Int(0)),
            });
        }
        table
    }

    fn handler(name: &str, stmt: Statement) -> LogicFunction {
        let mut func = LogicFunction::new(name);
        func.statements.push(stmt);
        func
    }

    fn member_value(var: &str) -> Expression {
        Expression::Member {
            object: Box::new(Expression::var(var)),
            property: "value".to_string(),
        }
    }

    fn increment_stmt(var: &str, by: i64) -> Statement {
        Statement::Assign {
            target: AssignTarget::Lvalue(member_value(var)),
            value: Expression::Binary {
                op: BinOp::Add,
                lhs: Box::new(member_value(var)),
                rhs: Box::new(Expression::int(by)),
            },
        }
    }

    #[test]
    fn test_increment_instruction_sequence_and_id() {
        // counter pre-registered at state id 3.
        let reactive = reactive_with(&["a", "b", "c", "counter"]);
        let registry = MetadataRegistry::with_known_hosts();
        let func = handler("handler_counter", increment_stmt("counter", 1));

        let CompileOutcome::Compiled(compiled) = compile_handler(&func, &reactive, &registry)
        else {
            panic!("expected universal compile");
        };

        assert_eq!(compiled.id, 301);
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::get_state(3),
                Instruction::push_int(1),
                Instruction::plain(Opcode::Add),
                Instruction::set_state(3),
                Instruction::plain(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn test_toggle_classification() {
        let func = handler(
            "toggle_flag",
            Statement::Assign {
                target: AssignTarget::Name("flag".to_string()),
                value: Expression::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(Expression::var("flag")),
                },
            },
        );

        let pattern = analyze_handler(&func).unwrap();
        assert_eq!(pattern.operation, Operation::Toggle);
        assert_eq!(pattern.operand, PatternOperand::Empty);
    }

    #[test]
    fn test_toggle_compiles_as_one_minus_state() {
        let reactive = reactive_with(&["flag"]);
        let registry = MetadataRegistry::with_known_hosts();
        let func = handler(
            "toggle_flag",
            Statement::Assign {
                target: AssignTarget::Name("flag".to_string()),
                value: Expression::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(Expression::var("flag")),
                },
            },
        );

        let CompileOutcome::Compiled(compiled) = compile_handler(&func, &reactive, &registry)
        else {
            panic!("expected universal compile");
        };

        assert_eq!(compiled.id, 6);
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::push_int(1),
                Instruction::get_state(0),
                Instruction::plain(Opcode::Sub),
                Instruction::set_state(0),
                Instruction::plain(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let reactive = reactive_with(&["counter"]);
        let registry = MetadataRegistry::with_known_hosts();
        let func = handler("inc", increment_stmt("counter", 2));

        let first = compile_handler(&func, &reactive, &registry);
        let second = compile_handler(&func, &reactive, &registry);
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiple_statements_fall_back() {
        let mut func = LogicFunction::new("complex");
        func.statements.push(increment_stmt("counter", 1));
        func.statements.push(increment_stmt("counter", 1));

        let reactive = reactive_with(&["counter"]);
        let registry = MetadataRegistry::with_known_hosts();
        assert_eq!(
            compile_handler(&func, &reactive, &registry),
            CompileOutcome::NotUniversal
        );
    }

    #[test]
    fn test_non_literal_operand_falls_back() {
        let func = handler(
            "inc_by_step",
            Statement::Assign {
                target: AssignTarget::Name("counter".to_string()),
                value: Expression::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expression::var("counter")),
                    rhs: Box::new(Expression::var("step")),
                },
            },
        );

        let reactive = reactive_with(&["counter", "step"]);
        let registry = MetadataRegistry::with_known_hosts();
        assert_eq!(
            compile_handler(&func, &reactive, &registry),
            CompileOutcome::NotUniversal
        );
    }

    #[test]
    fn test_unregistered_state_falls_back() {
        let func = handler("inc", increment_stmt("missing", 1));
        let reactive = reactive_with(&["counter"]);
        let registry = MetadataRegistry::with_known_hosts();
        assert_eq!(
            compile_handler(&func, &reactive, &registry),
            CompileOutcome::NotUniversal
        );
    }

    #[test]
    fn test_host_call_compiles_with_host_id() {
        let func = handler(
            "log_click",
            Statement::Expr(Expression::Call {
                function: "log".to_string(),
                args: vec![Expression::String("clicked".to_string())],
            }),
        );

        let reactive = ReactiveTable::new();
        let registry = MetadataRegistry::with_known_hosts();
        let CompileOutcome::Compiled(compiled) = compile_handler(&func, &reactive, &registry)
        else {
            panic!("expected host-call compile");
        };

        let log_id = registry.host_function_id("log").unwrap();
        assert_eq!(compiled.id, log_id);
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::push_string("clicked"),
                Instruction::call_host(log_id),
                Instruction::plain(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn test_unknown_host_call_falls_back() {
        let func = handler(
            "boom",
            Statement::Expr(Expression::Call {
                function: "launch_missiles".to_string(),
                args: vec![Expression::String("now".to_string())],
            }),
        );

        let reactive = ReactiveTable::new();
        let registry = MetadataRegistry::with_known_hosts();
        assert_eq!(
            compile_handler(&func, &reactive, &registry),
            CompileOutcome::NotUniversal
        );
    }

    #[test]
    fn test_literal_assign_before_toggle_priority() {
        // `flag = true` is both an assignment and superficially
        // toggle-adjacent; the literal-assign rule wins by check order.
        let func = handler(
            "set_flag",
            Statement::Assign {
                target: AssignTarget::Name("flag".to_string()),
                value: Expression::Bool(true),
            },
        );

        let pattern = analyze_handler(&func).unwrap();
        assert_eq!(pattern.operation, Operation::Assign);
        assert_eq!(pattern.operand, PatternOperand::Int(1));
    }
}
