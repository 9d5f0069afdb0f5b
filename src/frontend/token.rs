use std::fmt;

use crate::lang::node::BinaryOp;
use crate::lang::value::format_number;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),

    // Keywords
    Var,
    If,
    ElseIf,
    Else,
    Function,
    Return,
    For,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    // Comparison
    Gt,
    GtEq,
    Lt,
    LtEq,
    EqEq,

    // Punctuation
    Assign,    // =
    Semicolon, // ;
    Comma,     // ,
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }

    // Identifier (variable or function name)
    Ident(String),

    // Special
    Comment(String),
    Eof,
}

impl Token {
    pub fn keyword(word: &str) -> Option<Token> {
        Some(match word {
            "var" => Token::Var,
            "if" => Token::If,
            "elseif" => Token::ElseIf,
            "else" => Token::Else,
            "function" => Token::Function,
            "return" => Token::Return,
            "for" => Token::For,
            _ => return None,
        })
    }

    /// Source text of a fixed token; `None` for literals, names and comments.
    pub fn text(&self) -> Option<&'static str> {
        Some(match self {
            Token::Var => "var",
            Token::If => "if",
            Token::ElseIf => "elseif",
            Token::Else => "else",
            Token::Function => "function",
            Token::Return => "return",
            Token::For => "for",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::EqEq => "==",
            Token::Assign => "=",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Number(_) | Token::Ident(_) | Token::Comment(_) | Token::Eof => return None,
        })
    }

    /// The binary operator this token stands for, if any.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            Token::Plus
            | Token::Minus
            | Token::Star
            | Token::Slash
            | Token::Gt
            | Token::GtEq
            | Token::Lt
            | Token::LtEq
            | Token::EqEq => self.text().and_then(BinaryOp::from_symbol),
            _ => None,
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Var
                | Token::If
                | Token::ElseIf
                | Token::Else
                | Token::Function
                | Token::Return
                | Token::For
        )
    }

    /// How the token is named in parser errors.
    pub fn describe(&self) -> String {
        match self {
            Token::Eof => "end of input".to_string(),
            Token::Comment(_) => "comment".to_string(),
            other => format!("'{}'", other),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => f.write_str(&format_number(*n)),
            Token::Ident(name) => f.write_str(name),
            Token::Comment(text) => write!(f, "// {}", text),
            Token::Eof => f.write_str("<eof>"),
            fixed => f.write_str(fixed.text().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operator_token_maps_to_binary_op() {
        let tokens = [
            Token::Plus,
            Token::Minus,
            Token::Star,
            Token::Slash,
            Token::Gt,
            Token::GtEq,
            Token::Lt,
            Token::LtEq,
            Token::EqEq,
        ];
        let ops: Vec<BinaryOp> = tokens.iter().filter_map(Token::binary_op).collect();
        assert_eq!(ops, BinaryOp::ALL.to_vec());
    }

    #[test]
    fn test_assign_is_not_an_operator() {
        assert_eq!(Token::Assign.binary_op(), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(Token::Semicolon.describe(), "';'");
        assert_eq!(Token::Ident("x".into()).describe(), "'x'");
        assert_eq!(Token::Eof.describe(), "end of input");
    }
}
