use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operator of the surface language.
///
/// Every operator pops two numbers and pushes one. Comparisons push exactly
/// `1` or `0`, never a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // ───────────────────────────── Arithmetic ───────────────────────────
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (IEEE-754: dividing by zero yields an infinity or NaN)
    Div,

    // ───────────────────────────── Comparison ───────────────────────────
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 9] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Eq,
    ];

    /// Resolves an operator symbol as written in source.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            "==" => BinaryOp::Eq,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
        }
    }

    /// Binding priority used by the parser's precedence climbing.
    pub fn priority(self) -> i32 {
        match self {
            BinaryOp::Mul | BinaryOp::Div => 20,
            BinaryOp::Add | BinaryOp::Sub => 10,
            _ => 0,
        }
    }

    /// Evaluates the operator on two numbers.
    ///
    /// Shared by the VM and the constant folder so both agree bit-for-bit.
    pub fn apply(self, left: f64, right: f64) -> f64 {
        fn flag(b: bool) -> f64 {
            if b { 1.0 } else { 0.0 }
        }

        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
            BinaryOp::Gt => flag(left > right),
            BinaryOp::Ge => flag(left >= right),
            BinaryOp::Lt => flag(left < right),
            BinaryOp::Le => flag(left <= right),
            BinaryOp::Eq => flag(left == right),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Expression node.
///
/// Every expression, once compiled, leaves exactly one value on the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal: `42`, `1.5`.
    Literal(f64),

    /// Variable or function reference.
    Identifier(String),

    /// `left op right`
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// `callee(arg, ...)`
    Call { callee: String, args: Vec<Expr> },

    /// `( inner )`
    Paren(Box<Expr>),

    /// `target = value`, evaluates to the assigned value.
    Assign { target: String, value: Box<Expr> },
}

impl Expr {
    pub fn literal(value: f64) -> Self {
        Expr::Literal(value)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Expr::Assign {
            target: target.into(),
            value: Box::new(value),
        }
    }
}

/// `var name = init`
///
/// Kept as its own type because a `for` initializer must be exactly this.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub init: Expr,
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var name = init;`
    VarDecl(VarDecl),

    /// `expr;` (the value is discarded)
    Expr(Expr),

    /// `if cond { .. } elseif cond { .. } else { .. }`
    ///
    /// `elseif` arrives as a single nested `If` in `else_branch`.
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },

    /// `function name(params) { body }`
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },

    /// `return expr;`
    Return(Expr),

    /// `for (var i = e; cond; step) { body }`
    For {
        init: VarDecl,
        cond: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn var(name: impl Into<String>, init: Expr) -> Self {
        Stmt::VarDecl(VarDecl {
            name: name.into(),
            init,
        })
    }
}
