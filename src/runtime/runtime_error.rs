use thiserror::Error;

use crate::bytecode::stack_check::StackCheckError;

/// What went wrong while executing bytecode.
///
/// None of these occur on well-formed compiler output except the resource
/// limits and the type/arity errors a dynamically typed program can
/// trigger; all of them abort execution.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("undefined name '{0}'")]
    UndefinedName(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("'{function}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("jump out of bounds: offset={offset}, target={target}")]
    JumpOutOfBounds { offset: i32, target: i64 },

    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepthExceeded(usize),

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("stack size limit exceeded ({0})")]
    StackLimitExceeded(usize),

    #[error(transparent)]
    Verify(#[from] StackCheckError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("runtime error: {kind}{}{}", format_location(.location), format_call_stack(.call_stack))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    /// Address and name of the instruction that failed.
    pub location: Option<(usize, &'static str)>,
    /// Functions unwound through, innermost first.
    pub call_stack: Vec<String>,
}

fn format_location(location: &Option<(usize, &'static str)>) -> String {
    match location {
        Some((ip, op)) => format!(" at {:04} {}", ip, op),
        None => String::new(),
    }
}

const SHOWN_FRAMES: usize = 8;

fn format_call_stack(call_stack: &[String]) -> String {
    let mut out = String::new();
    if !call_stack.is_empty() {
        out.push_str("\n  call stack:");
        for (i, frame) in call_stack.iter().take(SHOWN_FRAMES).enumerate() {
            out.push_str(&format!("\n    {}: {}", i, frame));
        }
        if call_stack.len() > SHOWN_FRAMES {
            out.push_str(&format!(
                "\n    ... {} more frame(s)",
                call_stack.len() - SHOWN_FRAMES
            ));
        }
    }
    out
}

impl RuntimeError {
    pub fn new(kind: ErrorKind) -> Self {
        RuntimeError {
            kind,
            location: None,
            call_stack: Vec::new(),
        }
    }

    /// Records the failing instruction unless a deeper frame already did.
    pub fn at(mut self, ip: usize, op: &'static str) -> Self {
        if self.location.is_none() {
            self.location = Some((ip, op));
        }
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::new(ErrorKind::Io(err))
    }
}

pub fn type_error(expected: &'static str, got: &'static str) -> RuntimeError {
    RuntimeError::new(ErrorKind::TypeError { expected, got })
}

pub fn undefined_name(name: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::UndefinedName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location_and_frames() {
        let err = undefined_name("y")
            .at(7, "LOAD")
            .at(2, "CALL_USER")
            .with_context("inner")
            .with_context("outer");

        let text = err.to_string();
        assert!(text.starts_with("runtime error: undefined name 'y' at 0007 LOAD"));
        assert!(text.contains("0: inner"));
        assert!(text.contains("1: outer"));
    }

    #[test]
    fn test_deep_call_stack_is_truncated() {
        let mut err = RuntimeError::new(ErrorKind::CallDepthExceeded(20));
        for _ in 0..20 {
            err = err.with_context("f");
        }
        let text = err.to_string();
        assert!(text.contains("7: f"));
        assert!(!text.contains("8: f"));
        assert!(text.contains("... 12 more frame(s)"));
    }

    #[test]
    fn test_plain_error_has_no_suffix() {
        let err = RuntimeError::new(ErrorKind::StackUnderflow);
        assert_eq!(err.to_string(), "runtime error: stack underflow");
    }
}
