//! Definition source parser
//!
//! ```text
//! worksheet order {
//!   1:price number(2)
//!   2:qty   number(0) constrained_by { qty >= 0 }
//!   3:total number(2) computed_by { return price * qty round half 2 }
//!   4:tags  []text
//!   5:buyer person
//! }
//! ```
//!
//! `//` starts a comment running to the end of the line.

use crate::definition::{Definition, Field};
use crate::error::{DefinitionError, DefinitionResult};
use worksheets_core::FieldType;
use worksheets_formula::{parse_formula, Expr};

/// Parse every `worksheet` block in `source`.
///
/// The returned definitions are not yet registered.
pub fn parse_definitions(source: &str) -> DefinitionResult<Vec<Definition>> {
    let mut parser = SourceParser::new(source);
    let mut definitions = Vec::new();

    loop {
        parser.skip_trivia();
        if parser.at_end() {
            break;
        }
        definitions.push(parser.parse_definition()?);
    }

    Ok(definitions)
}

struct SourceParser<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> SourceParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn error<S: Into<String>>(&self, message: S) -> DefinitionError {
        DefinitionError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.rest().starts_with("//") => {
                    while let Some(ch) = self.bump() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_trivia();
        if self.rest().starts_with(token) {
            for _ in token.chars() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> DefinitionResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", token)))
        }
    }

    /// Consume `word` if the next identifier is exactly it
    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_trivia();
        let rest = self.rest();
        let matches = rest.starts_with(word)
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(is_ident_char);
        if matches {
            self.pos += word.len();
        }
        matches
    }

    fn ident(&mut self) -> DefinitionResult<&'a str> {
        self.skip_trivia();
        let rest = self.rest();
        match rest.chars().next() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => return Err(self.error("expected identifier")),
        }
        let len = rest
            .find(|ch: char| !is_ident_char(ch))
            .unwrap_or(rest.len());
        self.pos += len;
        Ok(&rest[..len])
    }

    fn integer(&mut self) -> DefinitionResult<i32> {
        self.skip_trivia();
        let rest = self.rest();
        let sign = usize::from(rest.starts_with('-'));
        let digits = rest[sign..]
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(rest.len() - sign);
        if digits == 0 {
            return Err(self.error("expected integer"));
        }
        let text = &rest[..sign + digits];
        let value = text
            .parse()
            .map_err(|_| self.error(format!("integer out of range: {}", text)))?;
        self.pos += text.len();
        Ok(value)
    }

    fn parse_definition(&mut self) -> DefinitionResult<Definition> {
        if !self.eat_word("worksheet") {
            return Err(self.error("expected 'worksheet'"));
        }
        let name = self.ident()?;
        self.expect("{")?;

        let mut definition = Definition::new(name);
        loop {
            if self.eat("}") {
                break;
            }
            if self.at_end() {
                return Err(self.error(format!("unterminated worksheet '{}'", name)));
            }
            definition.add_field(self.parse_field()?)?;
        }
        Ok(definition)
    }

    fn parse_field(&mut self) -> DefinitionResult<Field> {
        let index = self.integer()?;
        self.expect(":")?;
        let name = self.ident()?;
        let field_type = self.parse_type()?;

        let mut field = Field::new(index, name, field_type);
        loop {
            if self.eat_word("computed_by") {
                field = field.computed_by(self.parse_block(name)?);
            } else if self.eat_word("constrained_by") {
                field = field.constrained_by(self.parse_block(name)?);
            } else {
                break;
            }
        }
        Ok(field)
    }

    fn parse_type(&mut self) -> DefinitionResult<FieldType> {
        if self.eat("[]") {
            return Ok(FieldType::slice_of(self.parse_type()?));
        }
        match self.ident()? {
            "text" => Ok(FieldType::Text),
            "bool" => Ok(FieldType::Bool),
            "number" => {
                self.expect("(")?;
                let scale = self.integer()?;
                self.expect(")")?;
                let scale =
                    u32::try_from(scale).map_err(|_| self.error("negative number scale"))?;
                FieldType::number(scale).map_err(|err| self.error(err.to_string()))
            }
            other => Ok(FieldType::Ref(other.to_string())),
        }
    }

    /// `{ <formula> }`, skipping braces inside string literals
    fn parse_block(&mut self, field: &str) -> DefinitionResult<Expr> {
        self.expect("{")?;
        let line = self.line;
        let start = self.pos;
        let mut in_string = false;

        loop {
            let end = self.pos;
            match self.bump() {
                None => return Err(self.error(format!("unterminated formula for '{}'", field))),
                Some('\\') if in_string => {
                    self.bump();
                }
                Some('"') => in_string = !in_string,
                Some('}') if !in_string => {
                    let body = &self.source[start..end];
                    return parse_formula(body.trim()).map_err(|err| DefinitionError::Parse {
                        line,
                        message: format!("formula for '{}': {}", field, err),
                    });
                }
                Some(_) => {}
            }
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
