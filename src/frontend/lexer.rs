use thiserror::Error;

use crate::frontend::token::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexerError {
    #[error("lexer error: unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("lexer error: invalid number '{0}'")]
    InvalidNumber(String),
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if matches!(ch, ' ' | '\t' | '\r' | '\n') {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// `// ...` up to the end of the line.
    fn read_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        let mut comment = String::new();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            comment.push(ch);
            self.advance();
        }
        Token::Comment(comment.trim().to_string())
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let mut digits = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                // Only a decimal point if a digit follows
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    has_dot = true;
                    digits.push('.');
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let value: f64 = digits
            .parse()
            .map_err(|_| LexerError::InvalidNumber(digits.clone()))?;
        Ok(Token::Number(value))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::keyword(&ident).unwrap_or(Token::Ident(ident))
    }

    fn read_punctuation(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();

        let (token, width) = match (ch, next) {
            ('>', Some('=')) => (Token::GtEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('>', _) => (Token::Gt, 1),
            ('<', _) => (Token::Lt, 1),
            ('=', _) => (Token::Assign, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            (';', _) => (Token::Semicolon, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            _ => return None,
        };

        for _ in 0..width {
            self.advance();
        }
        Some(token)
    }

    /// Tokens in source order, comments included, ending with `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('/') if self.peek() == Some('/') => self.read_comment(),
                Some(ch) if ch.is_ascii_digit() => self.read_number()?,
                Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(),
                Some(ch) => self
                    .read_punctuation()
                    .ok_or(LexerError::UnexpectedChar(ch))?,
            };

            tokens.push(Spanned { token, span });
        }

        Ok(tokens)
    }

    pub fn tokenize_clean(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let tokens = self.tokenize()?;
        Ok(tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize_clean()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::Eof))
            .collect()
    }

    fn ident(name: &str) -> Token {
        Token::Ident(name.to_string())
    }

    #[test]
    fn test_var_declaration() {
        assert_eq!(
            tokens("var x = 2 + 3;"),
            vec![
                Token::Var,
                ident("x"),
                Token::Assign,
                Token::Number(2.0),
                Token::Plus,
                Token::Number(3.0),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            tokens("a >= b <= c == d > e < f"),
            vec![
                ident("a"),
                Token::GtEq,
                ident("b"),
                Token::LtEq,
                ident("c"),
                Token::EqEq,
                ident("d"),
                Token::Gt,
                ident("e"),
                Token::Lt,
                ident("f"),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens("var if elseif else function return for"),
            vec![
                Token::Var,
                Token::If,
                Token::ElseIf,
                Token::Else,
                Token::Function,
                Token::Return,
                Token::For,
            ]
        );
        // keyword prefixes stay identifiers
        assert_eq!(tokens("variable iffy"), vec![ident("variable"), ident("iffy")]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 1.5 007"),
            vec![Token::Number(42.0), Token::Number(1.5), Token::Number(7.0)]
        );
        // a trailing dot is not part of the number
        let mut lexer = Lexer::new("1.");
        assert_eq!(lexer.tokenize(), Err(LexerError::UnexpectedChar('.')));
    }

    #[test]
    fn test_identifiers_with_digits_and_underscores() {
        assert_eq!(tokens("_tmp x1 fib_2"), vec![ident("_tmp"), ident("x1"), ident("fib_2")]);
    }

    #[test]
    fn test_comments() {
        let mut lexer = Lexer::new("x; // trailing note\ny;");
        let raw: Vec<Token> = lexer.tokenize().unwrap().into_iter().map(|s| s.token).collect();
        assert_eq!(
            raw,
            vec![
                ident("x"),
                Token::Semicolon,
                Token::Comment("trailing note".to_string()),
                ident("y"),
                Token::Semicolon,
                Token::Eof,
            ]
        );
        assert_eq!(tokens("// only a comment"), vec![]);
    }

    #[test]
    fn test_division_is_not_a_comment() {
        assert_eq!(
            tokens("a / b"),
            vec![ident("a"), Token::Slash, ident("b")]
        );
    }

    #[test]
    fn test_unexpected_char() {
        let mut lexer = Lexer::new("x % 2");
        assert_eq!(lexer.tokenize(), Err(LexerError::UnexpectedChar('%')));

        let mut lexer = Lexer::new("a != b");
        assert_eq!(lexer.tokenize(), Err(LexerError::UnexpectedChar('!')));
    }

    #[test]
    fn test_spans() {
        let mut lexer = Lexer::new("var x\n  = 1;");
        let spanned = lexer.tokenize().unwrap();
        assert_eq!(spanned[0].span, Span { line: 1, col: 1 });
        assert_eq!(spanned[1].span, Span { line: 1, col: 5 });
        assert_eq!(spanned[2].span, Span { line: 2, col: 3 });
        assert_eq!(spanned.last().map(|s| &s.token), Some(&Token::Eof));
    }
}
