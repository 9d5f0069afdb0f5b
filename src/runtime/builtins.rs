use std::io::Write;

use crate::lang::value::{Builtin, Value};
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::scope::Scope;

pub const PRINT: Builtin = Builtin {
    name: "print",
    arity: 1,
    func: print,
};

/// Every host function, in the order they are bound.
pub const ALL: &[Builtin] = &[PRINT];

/// Bind all built-ins into `scope`.
pub fn install(scope: &Scope) {
    for builtin in ALL {
        scope.set(builtin.name, Value::Builtin(*builtin));
    }
}

fn print(args: &[Value], out: &mut dyn Write) -> Result<Value, RuntimeError> {
    for arg in args {
        writeln!(out, "{}", arg)?;
    }
    Ok(Value::Unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_writes_line() {
        let mut out = Vec::new();
        let result = (PRINT.func)(&[Value::Number(42.0)], &mut out).unwrap();
        assert_eq!(result, Value::Unit);
        assert_eq!(String::from_utf8(out).unwrap(), "42\n");
    }

    #[test]
    fn test_install_binds_print() {
        let scope = Scope::global();
        install(&scope);
        assert_eq!(scope.get("print"), Some(Value::Builtin(PRINT)));
    }
}
