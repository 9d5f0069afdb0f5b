use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::scope::Scope;

/// Runtime value in the Quill language.
///
/// Values are the only data that can exist on the operand stack. Numbers are
/// the only values user code can write down; everything else is produced by
/// the host or by the compiler's declaration sequence.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit floating-point number.
    Number(f64),

    /// A name pushed as a constant ahead of `DeclareFunction`.
    Name(String),

    /// Absolute function entry address pushed ahead of `DeclareFunction`.
    Address(usize),

    /// Host function bound in the global scope.
    Builtin(Builtin),

    /// Function declared by the program.
    Function(Rc<UserFunction>),

    /// Result of a built-in that produces nothing.
    Unit,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Name(_) => "name",
            Value::Address(_) => "address",
            Value::Builtin(_) => "builtin",
            Value::Function(_) => "function",
            Value::Unit => "unit",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Name(a), Value::Name(b)) => a == b,
            (Value::Address(a), Value::Address(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Unit, Value::Unit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Format a value the way `print` shows it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Name(s) => write!(f, "{}", s),
            Value::Address(a) => write!(f, "@{:04}", a),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Unit => write!(f, "unit"),
        }
    }
}

/// Integral values print without a fractional part, infinities spelled out.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{}", n)
    }
}

/// Descriptor created by `DeclareFunction`.
///
/// `scope` is the scope that was current when the declaration executed; a
/// call's frame scope uses it as parent, so lookups are lexical rather than
/// following the caller.
pub struct UserFunction {
    pub name: String,
    pub entry: usize,
    pub params: Vec<String>,
    pub scope: Rc<Scope>,
}

impl fmt::Debug for UserFunction {
    // The captured scope usually contains this very function.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

pub type BuiltinFn = fn(&[Value], &mut dyn Write) -> Result<Value, RuntimeError>;

/// Host-provided function.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({}/{})", self.name, self.arity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(-3.0).to_string(), "-3");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_equality_is_by_variant() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(1.0), Value::Address(1));
        assert_ne!(Value::Name("a".into()), Value::Unit);
        assert_eq!(Value::Unit, Value::Unit);
    }
}
