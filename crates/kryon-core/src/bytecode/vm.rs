//! Stack machine for compiled handlers.
//!
//! Executes [`Instruction`] sequences against a state table. There is no
//! branch or loop opcode; every program is a straight line ending in HALT,
//! so execution always terminates.

use std::collections::HashMap;

use thiserror::Error;

use super::{Instruction, InstructionArg, Opcode};

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(f64::from(*b as u8)),
            Value::Str(_) => None,
        }
    }
}

/// Execution error. Any error halts the VM.
#[derive(Error, Debug, PartialEq)]
pub enum VmError {
    #[error("stack underflow at {opcode}")]
    StackUnderflow { opcode: &'static str },

    #[error("{opcode} requires numeric operands, got {found}")]
    TypeMismatch {
        opcode: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{opcode} is missing its argument")]
    MissingArgument { opcode: &'static str },
}

/// Host function callback: receives the VM so it can pop its arguments.
pub type HostCallback = Box<dyn FnMut(&mut Vm)>;

/// The handler VM.
#[derive(Default)]
pub struct Vm {
    stack: Vec<Value>,
    state: HashMap<u32, Value>,
    host_functions: HashMap<u32, HostCallback>,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== State ==========

    pub fn set_state(&mut self, state_id: u32, value: Value) {
        self.state.insert(state_id, value);
    }

    /// Read a state slot; unknown slots read as integer zero.
    pub fn get_state(&self, state_id: u32) -> Value {
        self.state.get(&state_id).cloned().unwrap_or(Value::Int(0))
    }

    // ========== Stack ==========

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // ========== Host functions ==========

    pub fn register_host_function(&mut self, id: u32, callback: HostCallback) {
        self.host_functions.entry(id).or_insert(callback);
    }

    // ========== Execution ==========

    /// Execute a full instruction sequence. HALT stops execution; running
    /// off the end behaves like HALT.
    pub fn execute(&mut self, instructions: &[Instruction]) -> Result<(), VmError> {
        for instruction in instructions {
            if !self.step(instruction)? {
                break;
            }
        }
        Ok(())
    }

    /// Execute one instruction. Returns false when the VM halted.
    fn step(&mut self, instruction: &Instruction) -> Result<bool, VmError> {
        let opcode = instruction.opcode;
        match opcode {
            Opcode::PushInt => {
                let InstructionArg::Int(v) = instruction.arg else {
                    return Err(VmError::MissingArgument {
                        opcode: opcode.name(),
                    });
                };
                self.push(Value::Int(v));
            }
            Opcode::PushString => {
                let InstructionArg::Str(ref s) = instruction.arg else {
                    return Err(VmError::MissingArgument {
                        opcode: opcode.name(),
                    });
                };
                self.push(Value::Str(s.clone()));
            }
            Opcode::GetState => {
                let state_id = self.id_arg(instruction)?;
                let value = self.get_state(state_id);
                self.push(value);
            }
            Opcode::SetState => {
                let state_id = self.id_arg(instruction)?;
                let value = self.pop_or(opcode)?;
                self.state.insert(state_id, value);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                self.arithmetic(opcode)?;
            }
            Opcode::CallHost => {
                let func_id = self.id_arg(instruction)?;
                if let Some(mut callback) = self.host_functions.remove(&func_id) {
                    callback(self);
                    self.host_functions.insert(func_id, callback);
                } else {
                    // Missing host functions degrade gracefully.
                    tracing::warn!(func_id, "host function not available, continuing");
                }
            }
            Opcode::Halt => return Ok(false),
        }
        Ok(true)
    }

    fn arithmetic(&mut self, opcode: Opcode) -> Result<(), VmError> {
        let b = self.pop_or(opcode)?;
        let a = self.pop_or(opcode)?;

        // Integer arithmetic when both sides are ints, float otherwise.
        if let (Value::Int(a), Value::Int(b)) = (&a, &b) {
            let result = match opcode {
                Opcode::Add => a.wrapping_add(*b),
                Opcode::Sub => a.wrapping_sub(*b),
                Opcode::Mul => a.wrapping_mul(*b),
                Opcode::Div => {
                    if *b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            self.push(Value::Int(result));
            return Ok(());
        }

        let (Some(a), Some(b)) = (a.as_number(), b.as_number()) else {
            let found = if a.as_number().is_none() {
                a.type_name()
            } else {
                b.type_name()
            };
            return Err(VmError::TypeMismatch {
                opcode: opcode.name(),
                found,
            });
        };
        let result = match opcode {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => {
                if b == 0.0 {
                    return Err(VmError::DivisionByZero);
                }
                a / b
            }
            _ => unreachable!(),
        };
        self.push(Value::Float(result));
        Ok(())
    }

    fn pop_or(&mut self, opcode: Opcode) -> Result<Value, VmError> {
        self.pop().ok_or(VmError::StackUnderflow {
            opcode: opcode.name(),
        })
    }

    fn id_arg(&self, instruction: &Instruction) -> Result<u32, VmError> {
        match instruction.arg {
            InstructionArg::Id(id) => Ok(id),
            _ => Err(VmError::MissingArgument {
                opcode: instruction.opcode.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_increment_sequence_updates_state() {
        let mut vm = Vm::new();
        vm.set_state(3, Value::Int(41));

        vm.execute(&[
            Instruction::get_state(3),
            Instruction::push_int(1),
            Instruction::plain(Opcode::Add),
            Instruction::set_state(3),
            Instruction::plain(Opcode::Halt),
        ])
        .unwrap();

        assert_eq!(vm.get_state(3), Value::Int(42));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn test_toggle_twice_round_trips() {
        let toggle = [
            Instruction::push_int(1),
            Instruction::get_state(0),
            Instruction::plain(Opcode::Sub),
            Instruction::set_state(0),
            Instruction::plain(Opcode::Halt),
        ];

        let mut vm = Vm::new();
        vm.set_state(0, Value::Int(0));

        vm.execute(&toggle).unwrap();
        assert_eq!(vm.get_state(0), Value::Int(1));

        vm.execute(&toggle).unwrap();
        assert_eq!(vm.get_state(0), Value::Int(0));
    }

    #[test]
    fn test_unknown_state_reads_zero() {
        let mut vm = Vm::new();
        vm.execute(&[
            Instruction::get_state(99),
            Instruction::push_int(5),
            Instruction::plain(Opcode::Mul),
            Instruction::set_state(99),
        ])
        .unwrap();
        assert_eq!(vm.get_state(99), Value::Int(0));
    }

    #[test]
    fn test_division_by_zero_errors() {
        let mut vm = Vm::new();
        let err = vm
            .execute(&[
                Instruction::push_int(1),
                Instruction::push_int(0),
                Instruction::plain(Opcode::Div),
            ])
            .unwrap_err();
        assert_eq!(err, VmError::DivisionByZero);
    }

    #[test]
    fn test_string_arithmetic_is_type_error() {
        let mut vm = Vm::new();
        let err = vm
            .execute(&[
                Instruction::push_string("a"),
                Instruction::push_int(1),
                Instruction::plain(Opcode::Add),
            ])
            .unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { .. }));
    }

    #[test]
    fn test_halt_stops_execution() {
        let mut vm = Vm::new();
        vm.execute(&[
            Instruction::push_int(7),
            Instruction::set_state(0),
            Instruction::plain(Opcode::Halt),
            // Never executed.
            Instruction::push_int(99),
            Instruction::set_state(0),
        ])
        .unwrap();
        assert_eq!(vm.get_state(0), Value::Int(7));
    }

    #[test]
    fn test_host_call_pops_argument() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);

        let mut vm = Vm::new();
        vm.register_host_function(
            10_000,
            Box::new(move |vm| {
                if let Some(Value::Str(message)) = vm.pop() {
                    seen_clone.borrow_mut().push(message);
                }
            }),
        );

        vm.execute(&[
            Instruction::push_string("clicked"),
            Instruction::call_host(10_000),
            Instruction::plain(Opcode::Halt),
        ])
        .unwrap();

        assert_eq!(seen.borrow().as_slice(), ["clicked".to_string()]);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn test_missing_host_function_continues() {
        let mut vm = Vm::new();
        // No host function registered; execution still reaches SET_STATE.
        vm.execute(&[
            Instruction::push_string("ignored"),
            Instruction::call_host(10_001),
            Instruction::plain(Opcode::Halt),
        ])
        .unwrap();
    }
}
