use thiserror::Error;

/// Malformed-input errors detected while lowering a syntax tree.
///
/// Compilation aborts on the first one; no partial bytecode is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// `x = ...` where `x` was never declared with `var`, as a parameter or
    /// as a function.
    #[error("compile error: assignment to undeclared name '{name}'\n  hint: declare it first with `var {name} = ...;`")]
    UndeclaredAssignment { name: String },

    /// A jump distance that does not fit the instruction operand.
    #[error("compile error: jump offset {distance} out of range")]
    JumpOutOfRange { distance: i64 },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn undeclared_assignment(name: &str) -> Self {
        CompileError::UndeclaredAssignment {
            name: name.to_string(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
