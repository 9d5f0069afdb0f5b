use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints source text instead of Debug
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.render_one(&mut out, s);
        }
        out
    }

    fn render_one(&self, out: &mut String, s: &Spanned) {
        let line = s.span.line;
        let col = s.span.col;

        let kind = self.kind(&s.token);
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let text = if self.show_debug_repr {
            format!("{:?}", s.token)
        } else {
            s.token.to_string()
        };

        out.push_str(&format!(
            "[{:02}:{:02}] {}{:<8} {}{}\n",
            line, col, colr, kind, text, reset
        ));
    }

    fn kind(&self, t: &Token) -> &'static str {
        match t {
            Token::Comment(_) => "COMMENT",
            Token::Eof => "EOF",
            Token::Number(_) => "NUMBER",
            Token::Ident(_) => "IDENT",
            Token::LParen | Token::RParen => "PAREN",
            Token::LBrace | Token::RBrace => "BRACE",
            Token::Assign => "ASSIGN",
            Token::Semicolon | Token::Comma => "PUNCT",
            t if t.is_keyword() => "KEYWORD",
            t if t.binary_op().is_some_and(|op| op.priority() == 0) => "CMP",
            _ => "OP",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        match t {
            Token::Comment(_) | Token::Eof => Self::DIM,
            Token::Number(_) => Self::CYN,
            Token::Ident(_) => Self::YEL,
            t if t.is_keyword() => Self::BLU,
            t if t.binary_op().is_some() => Self::MAG,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn render(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        TokenDumper::new().no_color().pretty().render(&tokens)
    }

    #[test]
    fn test_one_line_per_token_with_position() {
        let out = render("var x = 1;");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[01:01] KEYWORD  var");
        assert_eq!(lines[1], "[01:05] IDENT    x");
        assert_eq!(lines[3], "[01:09] NUMBER   1");
        assert_eq!(lines[5], "[01:11] EOF      <eof>");
    }

    #[test]
    fn test_operator_kinds() {
        let out = render("a <= b * c");
        assert!(out.contains("CMP      <="));
        assert!(out.contains("OP       *"));
    }

    #[test]
    fn test_debug_form_by_default() {
        let tokens = Lexer::new("x = 2;").tokenize().unwrap();
        let out = TokenDumper::new().no_color().render(&tokens);
        assert!(out.starts_with("[01:01] IDENT    Ident(\"x\")\n"));
        assert!(out.contains("NUMBER   Number(2.0)"));
    }

    #[test]
    fn test_no_escape_codes_without_color() {
        assert!(!render("// note\nx;").contains('\x1b'));
    }
}
