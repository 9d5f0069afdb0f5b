//! # Quill language model
//!
//! Syntax tree produced by the parser and consumed by the bytecode
//! compiler, plus the runtime value type shared by the optimizer and VM.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`.
//! - For binary operators the *left* operand is the top of the stack.

pub mod node;
pub mod program;
pub mod value;
