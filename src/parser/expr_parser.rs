use crate::error::{Error, Result};
use crate::expr::{
    Argument, Compare, ComparisonOp, Conditional, Expression, FunctionCall, LogicalOp, MathOp,
    Mathematic,
};
use crate::lexer::{Token, TokenKind};

/// Precedence-climbing parser for requirement expressions
///
/// Lowest to highest: `||`, `&&`, comparisons, `+ -`, `* / % & ^`, unary
/// `- ! ~`. Comparisons do not chain.
pub struct ExprParser {
    tokens: Vec<Token>,
    current: usize,
}

impl ExprParser {
    /// Creates a new parser over scanned tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        ExprParser { tokens, current: 0 }
    }

    /// Parses the tokens into a single expression
    pub fn parse(&mut self) -> Result<Expression> {
        let expr = self.parse_or()?;
        if !self.is_at_end() {
            return Err(self.syntax_error(format!(
                "Unexpected '{}' after expression",
                self.peek().kind
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut operands = vec![self.parse_and()?];
        while self.match_kind(&TokenKind::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(Conditional::flattened(LogicalOp::Or, operands))
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut operands = vec![self.parse_comparison()?];
        while self.match_kind(&TokenKind::And) {
            operands.push(self.parse_comparison()?);
        }
        Ok(Conditional::flattened(LogicalOp::And, operands))
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let left = self.parse_additive()?;

        let Some(op) = comparison_op(&self.peek().kind) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;

        if comparison_op(&self.peek().kind).is_some() {
            return Err(self.syntax_error("Comparisons cannot be chained"));
        }

        Ok(Expression::Compare(Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }))
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => MathOp::Add,
                TokenKind::Minus => MathOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = math(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => MathOp::Multiply,
                TokenKind::Slash => MathOp::Divide,
                TokenKind::Percent => MathOp::Modulus,
                TokenKind::Ampersand => MathOp::BitwiseAnd,
                TokenKind::Caret => MathOp::BitwiseXor,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = math(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                Ok(match self.parse_unary()? {
                    Expression::Integer(n) => Expression::Integer(-n),
                    Expression::Float(f) => Expression::Float(-f),
                    other => math(Expression::Integer(0), MathOp::Subtract, other),
                })
            }
            TokenKind::Not => {
                self.advance();
                Ok(Expression::Not(Box::new(self.parse_unary()?)))
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::Call(FunctionCall {
                    name: "invert".to_string(),
                    args: vec![Argument {
                        name: None,
                        value: operand,
                    }],
                }))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::Integer(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::Float(f))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expression::String(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_kind(&TokenKind::LeftParen) {
                    let args = self.parse_arguments()?;
                    Ok(Expression::Call(FunctionCall { name, args }))
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_or()?;
                self.consume(TokenKind::RightParen, "')' to close the group")?;
                Ok(expr)
            }
            TokenKind::Eof => Err(Error::UnexpectedEof),
            other => Err(self.syntax_error(format!("Unexpected '{}' in expression", other))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>> {
        let mut args = Vec::new();
        if self.match_kind(&TokenKind::RightParen) {
            return Ok(args);
        }

        loop {
            let name = match (&self.peek().kind, self.peek_next_kind()) {
                (TokenKind::Identifier(name), Some(TokenKind::Assign)) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_or()?;
            args.push(Argument { name, value });

            if self.match_kind(&TokenKind::Comma) {
                continue;
            }
            self.consume(TokenKind::RightParen, "',' or ')' in argument list")?;
            return Ok(args);
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.current + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current.saturating_sub(1)].clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else if self.is_at_end() {
            Err(Error::UnexpectedEof)
        } else {
            Err(Error::UnexpectedToken {
                expected: expected.to_string(),
                got: self.peek().kind.to_string(),
            })
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        Error::SyntaxError {
            line: token.line,
            col: token.column,
            message: message.into(),
        }
    }
}

fn comparison_op(kind: &TokenKind) -> Option<ComparisonOp> {
    match kind {
        TokenKind::Eq => Some(ComparisonOp::Eq),
        TokenKind::NotEq => Some(ComparisonOp::Ne),
        TokenKind::Lt => Some(ComparisonOp::Lt),
        TokenKind::LtEq => Some(ComparisonOp::Le),
        TokenKind::Gt => Some(ComparisonOp::Gt),
        TokenKind::GtEq => Some(ComparisonOp::Ge),
        _ => None,
    }
}

fn math(left: Expression, op: MathOp, right: Expression) -> Expression {
    Expression::Mathematic(Mathematic {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}
