//! Formula parser
//!
//! A recursive descent parser for worksheet formulas with proper operator
//! precedence.

use crate::ast::{BinaryOperator, Expr, Rounding, RoundingMode, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::Function;
use rust_decimal::Decimal;
use worksheets_core::Value;

/// Parse a formula string into an AST
///
/// # Example
/// ```rust
/// use worksheets_formula::parse_formula;
///
/// let ast = parse_formula("a + b").unwrap();
/// let ast = parse_formula("return total / count round half 2").unwrap();
/// let ast = parse_formula("if(owner.age >= 18, \"adult\", \"minor\")").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<Expr> {
    let mut parser = FormulaParser::new(formula.trim());

    let expr = if parser.at_keyword("external") {
        parser.consume();
        Expr::External
    } else if parser.at_keyword("return") {
        parser.consume();
        Expr::Return(Box::new(parser.parse_expression()?))
    } else {
        parser.parse_expression()?
    };

    // trailing input is an error
    if !matches!(parser.current_token(), Token::Eof) {
        return Err(FormulaError::Parse(format!(
            "Unexpected input after expression: {:?}",
            parser.current_token()
        )));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(Decimal),
    String(String),

    // Identifiers and keywords
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Dot,
    EqualEqual,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    AndAnd,
    OrOr,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // Unrecognised character
    Invalid(char),

    // End of input
    Eof,
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current_token: Option<Token>,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> Self {
        let mut parser = Self {
            input,
            pos: 0,
            current_token: None,
        };
        parser.advance_token();
        parser
    }

    fn advance_token(&mut self) {
        self.skip_whitespace();
        self.current_token = Some(self.scan_token());
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Token::Eof,
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return token;
        }

        // One- or two-character operators
        match c {
            '=' => return self.scan_pair('=', Token::EqualEqual, Token::Invalid('=')),
            '!' => return self.scan_pair('=', Token::NotEqual, Token::Bang),
            '<' => return self.scan_pair('=', Token::LessEqual, Token::LessThan),
            '>' => return self.scan_pair('=', Token::GreaterEqual, Token::GreaterThan),
            '&' => return self.scan_pair('&', Token::AndAnd, Token::Invalid('&')),
            '|' => return self.scan_pair('|', Token::OrOr, Token::Invalid('|')),
            _ => {}
        }

        // String literal
        if c == '"' {
            return self.scan_string();
        }

        // Number
        if c.is_ascii_digit() {
            return self.scan_number();
        }

        // Identifier or keyword
        if c.is_ascii_alphabetic() || c == '_' {
            let start = self.pos;
            while self
                .peek_char()
                .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
            {
                self.advance();
            }
            return Token::Identifier(self.input[start..self.pos].to_string());
        }

        // Unknown character
        self.advance();
        Token::Invalid(c)
    }

    /// Scan `c` optionally followed by `second`
    fn scan_pair(&mut self, second: char, pair: Token, single: Token) -> Token {
        self.advance();
        if self.peek_char() == Some(second) {
            self.advance();
            return pair;
        }
        single
    }

    fn scan_string(&mut self) -> Token {
        self.advance();

        let mut s = String::new();
        while let Some(c) = self.peek_char() {
            match c {
                '"' => {
                    self.advance();
                    return Token::String(s);
                }
                '\\' => {
                    self.advance();
                    match self.peek_char() {
                        Some('n') => s.push('\n'),
                        Some('r') => s.push('\r'),
                        Some('t') => s.push('\t'),
                        Some(other) => s.push(other),
                        None => break,
                    }
                    self.advance();
                }
                c => {
                    s.push(c);
                    self.advance();
                }
            }
        }

        Token::Invalid('"')
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part, kept exactly so the literal's scale survives
        if self.peek_char() == Some('.')
            && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        match Decimal::from_str_exact(&self.input[start..self.pos]) {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Invalid('0'),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn current_token(&self) -> &Token {
        self.current_token.as_ref().unwrap_or(&Token::Eof)
    }

    fn consume(&mut self) -> Token {
        let token = self.current_token.take().unwrap_or(Token::Eof);
        self.advance_token();
        token
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.current_token() == expected {
            self.consume();
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "Expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.current_token(), Token::Identifier(word) if word == keyword)
    }

    // Lowest to highest:
    // 1. Logical or: ||
    // 2. Logical and: &&
    // 3. Comparison: ==, !=, <, <=, >, >=
    // 4. Rounding suffix: round <mode> <scale>
    // 5. Addition/Subtraction: +, -
    // 6. Multiplication/Division: *, /
    // 7. Unary: -, !
    // 8. Primary: literals, selectors, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_and()?;

        while matches!(self.current_token(), Token::OrOr) {
            self.consume();
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOperator::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_comparison()?;

        while matches!(self.current_token(), Token::AndAnd) {
            self.consume();
            let right = self.parse_comparison()?;
            left = Expr::binary(BinaryOperator::And, left, right);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_rounded()?;

        loop {
            let op = match self.current_token() {
                Token::EqualEqual => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume();
            let right = self.parse_rounded()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Arithmetic, optionally followed by `round <mode> <scale>`, which
    /// applies to the outermost arithmetic operation
    fn parse_rounded(&mut self) -> FormulaResult<Expr> {
        let expr = self.parse_additive()?;

        if !self.at_keyword("round") {
            return Ok(expr);
        }
        self.consume();

        let mode = match self.consume() {
            Token::Identifier(name) => RoundingMode::from_name(&name)
                .ok_or_else(|| FormulaError::Parse(format!("Unknown rounding mode '{}'", name)))?,
            other => {
                return Err(FormulaError::Parse(format!(
                    "Expected rounding mode, got {:?}",
                    other
                )))
            }
        };

        let scale = match self.consume() {
            Token::Number(n) if n.scale() == 0 => u32::try_from(n.mantissa())
                .map_err(|_| FormulaError::Parse(format!("Rounding scale {} out of range", n)))?,
            other => {
                return Err(FormulaError::Parse(format!(
                    "Expected rounding scale, got {:?}",
                    other
                )))
            }
        };

        match expr {
            Expr::Binary {
                op, left, right, ..
            } if op.is_arithmetic() => Ok(Expr::Binary {
                op,
                left,
                right,
                rounding: Some(Rounding::new(mode, scale)),
            }),
            _ => Err(FormulaError::Parse(
                "'round' must follow an arithmetic operation".into(),
            )),
        }
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.consume();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.current_token() {
            Token::Minus => UnaryOperator::Negate,
            Token::Bang => UnaryOperator::Not,
            _ => return self.parse_primary(),
        };

        self.consume();
        let operand = self.parse_unary()?;
        Ok(Expr::unary(op, operand))
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.consume();
                Ok(Expr::Literal(Value::Number(n)))
            }

            Token::String(s) => {
                self.consume();
                Ok(Expr::Literal(Value::Text(s)))
            }

            Token::LeftParen => {
                self.consume();
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::Identifier(name) => {
                self.consume();
                match name.as_str() {
                    "true" => return Ok(Expr::Literal(Value::Bool(true))),
                    "false" => return Ok(Expr::Literal(Value::Bool(false))),
                    "undefined" => return Ok(Expr::Literal(Value::Undefined)),
                    _ => {}
                }

                if matches!(self.current_token(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    self.parse_selector(name)
                }
            }

            _ => Err(FormulaError::Parse(format!(
                "Unexpected token: {:?}",
                self.current_token()
            ))),
        }
    }

    fn parse_selector(&mut self, first: String) -> FormulaResult<Expr> {
        let mut path = vec![first];

        while matches!(self.current_token(), Token::Dot) {
            self.consume();
            match self.consume() {
                Token::Identifier(name) => path.push(name),
                other => {
                    return Err(FormulaError::Parse(format!(
                        "Expected field name after '.', got {:?}",
                        other
                    )))
                }
            }
        }

        Ok(Expr::Selector(path))
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<Expr> {
        let function =
            Function::from_name(&name).ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;

        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();

        // Parse arguments
        if !matches!(self.current_token(), Token::RightParen) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token(), Token::Comma) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        if args.len() != function.arity() {
            return Err(FormulaError::Parse(format!(
                "{} expects {} argument(s), got {}",
                function,
                function.arity(),
                args.len()
            )));
        }

        Ok(Expr::Call { function, args })
    }
}
