//! Expression compiler for tag contents
//!
//! Turns the text inside `{{ ... }}`, `if` conditions and `for` collections
//! into an [`Expression`] tree. Bare identifiers become explicit variable
//! loads; `true`, `false` and `null` are literals and `and`, `or`, `xor`
//! and `not` are operators (all matched case-insensitively). Control
//! keywords are rejected so a stray `{{ end }}` inside an expression can
//! never be read as a variable.
//!
//! Precedence, loosest first: `or`/`||`, `xor`, `and`/`&&`, `not`,
//! comparison, `+ -`, `* / %`, unary `! -`, postfix `.name` and `[index]`.

use super::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::error::{Error, Result};

/// Words that may never be used as variable names
const CONTROL_KEYWORDS: &[&str] = &["end", "if", "for", "in", "else", "elseif", "include"];

/// Maximum depth of the expression tree: parentheses, brackets, unary
/// operators, chained binary operators and `.`/`[]` steps all count
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Number(n) => n.to_string(),
            Tok::Str(s) => format!("'{}'", s),
            Tok::Ident(i) => i.clone(),
            Tok::Symbol(s) => s.to_string(),
        }
    }
}

/// Longest symbols first so `===` wins over `==`
const SYMBOLS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "(",
    ")", "[", "]", ",", ".",
];

/// Compile an expression
pub fn parse_expression(source: &str) -> Result<Expression> {
    parse_expression_at(source, 1, 1)
}

/// Compile an expression whose text starts at `line`/`column` in a template
pub(crate) fn parse_expression_at(source: &str, line: usize, column: usize) -> Result<Expression> {
    let tokens = tokenize(source, line, column)?;
    let mut parser = ExpressionParser {
        tokens,
        position: 0,
        depth: 0,
        line,
        column,
        end_offset: source.chars().count(),
    };

    if parser.tokens.is_empty() {
        return Err(Error::syntax(line, column, "expected an expression"));
    }

    let expr = parser.parse_or()?;
    if let Some((tok, offset)) = parser.tokens.get(parser.position) {
        return Err(Error::syntax(
            line,
            column + offset,
            format!("unexpected '{}' in expression", tok.describe()),
        ));
    }
    Ok(expr)
}

fn tokenize(source: &str, line: usize, column: usize) -> Result<Vec<(Tok, usize)>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let start = i;

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() {
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = text.parse::<f64>().map_err(|_| {
                Error::syntax(line, column + start, format!("invalid number '{}'", text))
            })?;
            tokens.push((Tok::Number(number), start));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Tok::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        if ch == '\'' || ch == '"' {
            let mut value = String::new();
            i += 1;
            let mut closed = false;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        value.push(match chars[i + 1] {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    }
                    c if c == ch => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    c => {
                        value.push(c);
                        i += 1;
                    }
                }
            }
            if !closed {
                return Err(Error::syntax(
                    line,
                    column + start,
                    "unterminated string literal",
                ));
            }
            tokens.push((Tok::Str(value), start));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(symbol) => {
                tokens.push((Tok::Symbol(*symbol), start));
                i += symbol.len();
            }
            None => {
                return Err(Error::syntax(
                    line,
                    column + start,
                    format!("unexpected character '{}'", ch),
                ))
            }
        }
    }

    Ok(tokens)
}

struct ExpressionParser {
    tokens: Vec<(Tok, usize)>,
    position: usize,
    depth: usize,
    line: usize,
    column: usize,
    end_offset: usize,
}

impl ExpressionParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.position).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.position).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.position += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let offset = self
            .tokens
            .get(self.position)
            .map(|(_, o)| *o)
            .unwrap_or(self.end_offset);
        Error::syntax(self.line, self.column + offset, message)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Tok::Symbol(s)) if *s == symbol)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(i)) if i.eq_ignore_ascii_case(word))
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.is_symbol(symbol) {
            self.position += 1;
            Ok(())
        } else {
            let found = self
                .peek()
                .map(Tok::describe)
                .unwrap_or_else(|| "end of expression".to_string());
            Err(self.error(format!("expected '{}', found '{}'", symbol, found)))
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Undo the `enter` calls made while folding a left-associative chain
    fn leave_chain(&mut self, links: usize) {
        self.depth -= links;
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_xor()?;
        let mut links = 0;
        while self.is_word("or") || self.is_symbol("||") {
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_xor()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_xor(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        let mut links = 0;
        while self.is_word("xor") {
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_and()?;
            left = Expression::binary(left, BinaryOperator::Xor, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_not()?;
        let mut links = 0;
        while self.is_word("and") || self.is_symbol("&&") {
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_not()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.is_word("not") {
            self.position += 1;
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expression::unary(UnaryOperator::Not, operand));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let mut left = self.parse_additive()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Tok::Symbol("==")) => BinaryOperator::Equal,
                Some(Tok::Symbol("!=")) => BinaryOperator::NotEqual,
                Some(Tok::Symbol("===")) => BinaryOperator::Identical,
                Some(Tok::Symbol("!==")) => BinaryOperator::NotIdentical,
                Some(Tok::Symbol("<")) => BinaryOperator::LessThan,
                Some(Tok::Symbol("<=")) => BinaryOperator::LessThanOrEqual,
                Some(Tok::Symbol(">")) => BinaryOperator::GreaterThan,
                Some(Tok::Symbol(">=")) => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_additive()?;
            left = Expression::binary(left, op, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Tok::Symbol("+")) => BinaryOperator::Add,
                Some(Tok::Symbol("-")) => BinaryOperator::Subtract,
                _ => break,
            };
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_multiplicative()?;
            left = Expression::binary(left, op, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Tok::Symbol("*")) => BinaryOperator::Multiply,
                Some(Tok::Symbol("/")) => BinaryOperator::Divide,
                Some(Tok::Symbol("%")) => BinaryOperator::Modulo,
                _ => break,
            };
            self.position += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_unary()?;
            left = Expression::binary(left, op, right);
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let op = match self.peek() {
            Some(Tok::Symbol("!")) => UnaryOperator::Not,
            Some(Tok::Symbol("-")) => UnaryOperator::Minus,
            _ => return self.parse_postfix(),
        };
        self.position += 1;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();

        // Fold negative literals
        if let (UnaryOperator::Minus, Expression::Number(n)) = (op, &operand) {
            return Ok(Expression::Number(-n));
        }
        Ok(Expression::unary(op, operand))
    }

    fn parse_postfix(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary()?;
        let mut links = 0;
        loop {
            if self.is_symbol(".") {
                self.position += 1;
                self.enter()?;
                links += 1;
                let property = match self.peek() {
                    Some(Tok::Ident(property)) => property.clone(),
                    _ => return Err(self.error("expected a property name after '.'")),
                };
                self.position += 1;
                expr = Expression::PropertyAccess {
                    object: Box::new(expr),
                    property,
                };
            } else if self.is_symbol("[") {
                self.position += 1;
                self.enter()?;
                links += 1;
                let index = self.parse_or()?;
                self.expect_symbol("]")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                self.leave_chain(links);
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let tok = match self.advance() {
            Some(tok) => tok,
            None => return Err(self.error("unexpected end of expression")),
        };

        match tok {
            Tok::Number(n) => Ok(Expression::Number(n)),
            Tok::Str(s) => Ok(Expression::String(s)),
            Tok::Symbol("(") => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Tok::Symbol("[") => {
                self.enter()?;
                let items = self.parse_list("]")?;
                self.leave();
                Ok(Expression::Array(items))
            }
            Tok::Ident(name) => self.parse_identifier(name),
            Tok::Symbol(symbol) => {
                self.position -= 1;
                Err(self.error(format!("unexpected '{}' in expression", symbol)))
            }
        }
    }

    fn parse_identifier(&mut self, name: String) -> Result<Expression> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "true" => return Ok(Expression::Boolean(true)),
            "false" => return Ok(Expression::Boolean(false)),
            "null" => return Ok(Expression::Null),
            "and" | "or" | "xor" | "not" => {
                self.position -= 1;
                return Err(self.error(format!("unexpected operator '{}'", name)));
            }
            _ => {}
        }

        if self.is_symbol("(") {
            self.position += 1;
            self.enter()?;
            let args = self.parse_list(")")?;
            self.leave();
            let name = if lower == "empty" || lower == "isset" {
                lower
            } else {
                name
            };
            return Ok(Expression::FunctionCall { name, args });
        }

        if lower == "empty" || lower == "isset" {
            self.position -= 1;
            return Err(self.error(format!("'{}' must be called with parentheses", name)));
        }

        if CONTROL_KEYWORDS.contains(&lower.as_str()) {
            self.position -= 1;
            return Err(self.error(format!("reserved word '{}' cannot be used here", name)));
        }

        Ok(Expression::Variable(name))
    }

    /// Comma separated expressions up to `close`
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expression>> {
        let mut items = Vec::new();
        if self.is_symbol(close) {
            self.position += 1;
            return Ok(items);
        }

        loop {
            items.push(self.parse_or()?);
            if self.is_symbol(",") {
                self.position += 1;
                continue;
            }
            self.expect_symbol(close)?;
            return Ok(items);
        }
    }
}
