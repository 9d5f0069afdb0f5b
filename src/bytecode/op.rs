use serde::{Deserialize, Serialize};

use crate::lang::node::BinaryOp;
use crate::lang::value::Value;

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

/// Operand of `Op::Push`.
///
/// Only these can be written into a program image; callables are created
/// at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Number(f64),
    Name(String),
    /// Absolute instruction index of a function body.
    Address(usize),
}

impl Constant {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Constant::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Number(n) => Value::Number(*n),
            Constant::Name(s) => Value::Name(s.clone()),
            Constant::Address(a) => Value::Address(*a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // literals
    /// ( -- c )
    Push(Constant),

    // names
    /// ( x -- ) bind in the current frame's scope.
    Store(String),
    /// ( -- x ) resolve through the scope chain.
    Load(String),

    // arithmetic & comparison
    /// ( right left -- result ), left is popped first.
    Binary(BinaryOp),

    // ==========================================================================
    // Jump instructions for flat control flow
    // ==========================================================================
    /// Unconditional relative jump. Offset is added to the jump's own index.
    /// Jump(1) is a no-op, Jump(0) loops forever.
    Jump(i32),

    /// Pop, jump if the value is exactly 0. Otherwise continue.
    JumpIfFalse(i32),

    /// Pop, jump if the value is exactly 1. Otherwise continue.
    JumpIfTrue(i32),

    // calls
    /// ( argN .. arg1 callee -- result ), operand = argument count.
    CallBuiltin(usize),
    /// ( argN .. arg1 callee -- result ), operand = argument count.
    CallUser(usize),

    /// ( paramN .. param1 entry name -- ), operand = parameter count.
    DeclareFunction(usize),

    /// ( x -- ) ends the current frame, yielding x.
    Return,

    /// ( x -- )
    PopTop,
}

impl Op {
    /// Relative offset carried by a jump instruction.
    pub fn jump_offset(&self) -> Option<i32> {
        match self {
            Op::Jump(offset) | Op::JumpIfFalse(offset) | Op::JumpIfTrue(offset) => Some(*offset),
            _ => None,
        }
    }

    /// Replaces the offset of a jump instruction in place.
    ///
    /// Returns `false` if `self` is not a jump.
    pub fn set_jump_offset(&mut self, new_offset: i32) -> bool {
        match self {
            Op::Jump(offset) | Op::JumpIfFalse(offset) | Op::JumpIfTrue(offset) => {
                *offset = new_offset;
                true
            }
            _ => false,
        }
    }

    /// Absolute target of a jump located at `ip`.
    pub fn jump_target(&self, ip: usize) -> Option<i64> {
        self.jump_offset().map(|offset| ip as i64 + offset as i64)
    }

    /// Returns (pops, pushes) for an op.
    ///
    /// Every instruction has a static effect; `Return` is reported as
    /// popping its result even though it also ends the frame.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Op::Push(_) | Op::Load(_) => (0, 1),
            Op::Store(_) => (1, 0),
            Op::Binary(_) => (2, 1),
            Op::Jump(_) => (0, 0),
            Op::JumpIfFalse(_) | Op::JumpIfTrue(_) => (1, 0),
            Op::CallBuiltin(argc) | Op::CallUser(argc) => (argc + 1, 1),
            Op::DeclareFunction(params) => (params + 2, 0),
            Op::Return => (1, 0),
            Op::PopTop => (1, 0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Push(_) => "PUSH",
            Op::Store(_) => "STORE",
            Op::Load(_) => "LOAD",
            Op::Binary(BinaryOp::Add) => "ADD",
            Op::Binary(BinaryOp::Sub) => "SUB",
            Op::Binary(BinaryOp::Mul) => "MUL",
            Op::Binary(BinaryOp::Div) => "DIV",
            Op::Binary(BinaryOp::Gt) => "GT",
            Op::Binary(BinaryOp::Ge) => "GE",
            Op::Binary(BinaryOp::Lt) => "LT",
            Op::Binary(BinaryOp::Le) => "LE",
            Op::Binary(BinaryOp::Eq) => "EQ",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_FALSE",
            Op::JumpIfTrue(_) => "JUMP_TRUE",
            Op::CallBuiltin(_) => "CALL_BUILTIN",
            Op::CallUser(_) => "CALL_USER",
            Op::DeclareFunction(_) => "DECLARE_FUNC",
            Op::Return => "RETURN",
            Op::PopTop => "POP_TOP",
        }
    }
}
