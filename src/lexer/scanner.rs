use super::token::{Token, TokenKind};
use crate::error::{Error, Result};

/// Scanner for requirement expressions
pub struct Scanner {
    /// Source code as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Column where the current token starts
    start_column: usize,
}

impl Scanner {
    /// Creates a new scanner from source code
    pub fn new(source: &str) -> Self {
        Scanner {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_column: 1,
        }
    }

    /// Scans all tokens from source code and returns them as a vector
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            '/' => {
                if self.match_char('/') {
                    self.skip_line_comment();
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }

            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            ',' => self.add_token(TokenKind::Comma),

            '+' => self.add_token(TokenKind::Plus),
            '-' => self.add_token(TokenKind::Minus),
            '*' => self.add_token(TokenKind::Star),
            '%' => self.add_token(TokenKind::Percent),
            '^' => self.add_token(TokenKind::Caret),
            '~' => self.add_token(TokenKind::Tilde),
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenKind::And);
                } else {
                    self.add_token(TokenKind::Ampersand);
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenKind::Or);
                } else {
                    return Err(self.error("Expected '||'"));
                }
            }

            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Eq);
                } else {
                    self.add_token(TokenKind::Assign);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::NotEq);
                } else {
                    self.add_token(TokenKind::Not);
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LtEq);
                } else {
                    self.add_token(TokenKind::Lt);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GtEq);
                } else {
                    self.add_token(TokenKind::Gt);
                }
            }

            '"' => self.scan_string()?,

            '0' if matches!(self.peek(), 'x' | 'X') && self.peek_next().is_ascii_hexdigit() => {
                self.scan_hex()?
            }
            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_alphabetic() || c == '_' => self.scan_identifier(),

            _ => return Err(self.error(format!("Unexpected character '{}'", c))),
        }

        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::SyntaxError {
            line: self.line,
            col: self.start_column,
            message: message.into(),
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<()> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\\' {
                self.advance();
                let escaped = self.advance();
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    _ => {
                        return Err(self.error(format!("Invalid escape sequence \\{}", escaped)));
                    }
                }
            } else {
                if self.peek() == '\n' {
                    self.line += 1;
                    self.column = 0;
                }
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string"));
        }

        self.advance(); // Closing "

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn scan_hex(&mut self) -> Result<()> {
        self.advance(); // x
        while self.peek().is_ascii_hexdigit() {
            self.advance();
        }

        let text: String = self.source[self.start + 2..self.current].iter().collect();
        let value = i64::from_str_radix(&text, 16)
            .map_err(|_| self.error(format!("Invalid hex literal: 0x{}", text)))?;
        self.add_token(TokenKind::Integer(value));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance(); // consume .
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("Invalid float: {}", text)))?;
            self.add_token(TokenKind::Float(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("Invalid integer: {}", text)))?;
            self.add_token(TokenKind::Integer(value));
        }

        Ok(())
    }

    fn scan_identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(text),
        };
        self.add_token(kind);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            false
        } else {
            self.current += 1;
            self.column += 1;
            true
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, self.line, self.start_column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            kinds("byte(0x1234) >= 10"),
            vec![
                TokenKind::Identifier("byte".to_string()),
                TokenKind::LeftParen,
                TokenKind::Integer(0x1234),
                TokenKind::RightParen,
                TokenKind::GtEq,
                TokenKind::Integer(10),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_logical_and_bitwise() {
        assert_eq!(
            kinds("a & 3 && !b || c"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Ampersand,
                TokenKind::Integer(3),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Identifier("b".to_string()),
                TokenKind::Or,
                TokenKind::Identifier("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_named_argument_and_float() {
        assert_eq!(
            kinds("measured(x, when=1.5)")[4..7],
            [
                TokenKind::Identifier("when".to_string()),
                TokenKind::Assign,
                TokenKind::Float(1.5),
            ]
        );
    }

    #[test]
    fn test_comment() {
        let tokens = kinds("// header\nbyte(1) // trailing");
        assert_eq!(tokens[0], TokenKind::Identifier("byte".to_string()));
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn test_positions() {
        let tokens = Scanner::new("a ==\n  b").scan_tokens().unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (1, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Scanner::new("a == $").scan_tokens().unwrap_err();
        assert_eq!(
            err,
            Error::SyntaxError {
                line: 1,
                col: 6,
                message: "Unexpected character '$'".to_string()
            }
        );
    }
}
