use thiserror::Error;

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;
use crate::lang::node::{Expr, Stmt, VarDecl};
use crate::lang::program::Program;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    #[error("parse error: expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },

    #[error("parse error: cannot assign to {0}")]
    InvalidAssignmentTarget(String),
}

static EOF: Token = Token::Eof;

/// Recursive-descent parser for Quill.
///
/// Binary expressions use precedence climbing over
/// [`BinaryOp::priority`](crate::lang::node::BinaryOp::priority); every
/// operator is left-associative. Assignment is recognised only when an
/// expression's first operand is directly followed by `=`, and is
/// right-associative.
///
/// `if`, `function` and `for` statements end with their closing brace; every
/// other statement ends with `;`.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    /// Creates a new parser from lexer output. Comments are dropped here.
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect();
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn error(&self, expected: &str) -> ParserError {
        ParserError::Unexpected {
            expected: expected.to_string(),
            found: self.peek().describe(),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParserError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&token.describe()))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParserError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// Parses a complete program, stopping at `Token::Eof`.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();
        while !self.check(&Token::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Program::new(statements))
    }

    // Statements

    fn parse_statement(&mut self) -> Result<Stmt, ParserError> {
        let statement = match self.peek() {
            Token::If => return self.parse_if(),
            Token::Function => return self.parse_function(),
            Token::For => return self.parse_for(),
            Token::Var => Stmt::VarDecl(self.parse_var_decl()?),
            Token::Return => {
                self.advance();
                Stmt::Return(self.parse_expression()?)
            }
            _ => Stmt::Expr(self.parse_expression()?),
        };

        self.expect(Token::Semicolon)?;
        Ok(statement)
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParserError> {
        self.expect(Token::Var)?;
        let name = self.expect_ident()?;
        self.expect(Token::Assign)?;
        let init = self.parse_expression()?;
        Ok(VarDecl { name, init })
    }

    /// `{ statement* }`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParserError> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.error("'}'"));
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    /// `if` and `elseif` share this; an `elseif` chain nests in `else_branch`.
    fn parse_if(&mut self) -> Result<Stmt, ParserError> {
        match self.peek() {
            Token::If | Token::ElseIf => {
                self.advance();
            }
            _ => return Err(self.error("'if'")),
        }

        let cond = self.parse_expression()?;
        let then_branch = self.parse_block()?;

        let else_branch = match self.peek() {
            Token::ElseIf => vec![self.parse_if()?],
            Token::Else => {
                self.advance();
                self.parse_block()?
            }
            _ => Vec::new(),
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_function(&mut self) -> Result<Stmt, ParserError> {
        self.expect(Token::Function)?;
        let name = self.expect_ident()?;

        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen)?;

        let body = self.parse_block()?;
        Ok(Stmt::Function { name, params, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParserError> {
        self.expect(Token::For)?;
        self.expect(Token::LParen)?;

        let init = self.parse_var_decl()?;
        self.expect(Token::Semicolon)?;

        let cond = self.parse_expression()?;
        self.expect(Token::Semicolon)?;

        let step = self.parse_expression()?;
        // tolerated: for (var i = 0; i < n; i = i + 1;)
        if self.check(&Token::Semicolon) {
            self.advance();
        }
        self.expect(Token::RParen)?;

        let body = self.parse_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expr, ParserError> {
        let left = self.parse_operand()?;

        if self.check(&Token::Assign) {
            return match left {
                Expr::Identifier(target) => {
                    self.advance();
                    let value = self.parse_expression()?;
                    Ok(Expr::assign(target, value))
                }
                other => Err(ParserError::InvalidAssignmentTarget(describe_expr(&other))),
            };
        }

        self.parse_binary(left, -1)
    }

    /// Folds operators binding tighter than `min_priority` onto `left`.
    fn parse_binary(&mut self, mut left: Expr, min_priority: i32) -> Result<Expr, ParserError> {
        while let Some(op) = self.peek().binary_op() {
            let priority = op.priority();
            if priority <= min_priority {
                break;
            }
            self.advance();

            let operand = self.parse_operand()?;
            let right = self.parse_binary(operand, priority)?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    /// Literal, parenthesized expression, identifier or call.
    fn parse_operand(&mut self) -> Result<Expr, ParserError> {
        match self.peek() {
            Token::Number(n) => {
                let n = *n;
                self.advance();
                Ok(Expr::literal(n))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Token::Ident(_) if self.peek_next() == &Token::LParen => self.parse_call(),
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Identifier(name))
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ParserError> {
        let callee = self.expect_ident()?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Token::RParen)?;

        Ok(Expr::call(callee, args))
    }
}

fn describe_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(_) => "a number",
        Expr::Identifier(_) => "a name",
        Expr::Binary { .. } => "a binary expression",
        Expr::Call { .. } => "a call",
        Expr::Paren(_) => "a parenthesized expression",
        Expr::Assign { .. } => "an assignment",
    }
    .to_string()
}
