use super::ast::{Expression, Node, Template};
use super::expression::parse_expression_at;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{Error, Result};
use crate::security::NameValidator;

/// Maximum nesting of `if` and `for` blocks
const MAX_BLOCK_DEPTH: usize = 128;

/// Translate template text into its AST
pub fn parse_template(input: &str) -> Result<Template> {
    Parser::new(input)?.parse()
}

/// Recursive-descent parser for shorthand templates
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    current_token: Token,
    depth: usize,
}

impl Parser {
    /// Create a new parser from input string
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        let current_token = tokens
            .first()
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, 1, 1));

        Ok(Self {
            tokens,
            position: 0,
            current_token,
            depth: 0,
        })
    }

    /// Advance to the next token
    fn advance(&mut self) {
        self.position += 1;
        if self.position < self.tokens.len() {
            self.current_token = self.tokens[self.position].clone();
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token.kind, TokenKind::Eof)
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::syntax(self.current_token.line, self.current_token.column, what)
    }

    /// Parse the entire template
    pub fn parse(&mut self) -> Result<Template> {
        let nodes = self.parse_nodes()?;

        match self.current_token.kind {
            TokenKind::Eof => Ok(Template::new(nodes)),
            TokenKind::End => Err(self.unexpected("'end' without an open block")),
            TokenKind::Else => Err(self.unexpected("'else' without a matching 'if'")),
            TokenKind::ElseIf(_) => Err(self.unexpected("'else if' without a matching 'if'")),
            _ => Err(self.unexpected("unexpected token")),
        }
    }

    /// Parse nodes until a block delimiter or the end of input
    fn parse_nodes(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();

        while !self.is_at_end() {
            match self.current_token.kind {
                TokenKind::Else | TokenKind::ElseIf(_) | TokenKind::End => break,
                _ => nodes.push(self.parse_node()?),
            }
        }

        Ok(nodes)
    }

    fn parse_node(&mut self) -> Result<Node> {
        let Token { kind, line, column } = self.current_token.clone();

        match kind {
            TokenKind::Text(text) => {
                self.advance();
                Ok(Node::Text(text))
            }
            TokenKind::Output(source) => {
                self.advance();
                Ok(Node::Output(parse_expression_at(&source, line, column)?))
            }
            TokenKind::If(condition) => self.parse_conditional(&condition, line, column),
            TokenKind::For(item_name, collection) => {
                self.parse_loop(item_name, &collection, line, column)
            }
            TokenKind::Include(clause) => {
                self.advance();
                parse_include(&clause, line, column)
            }
            _ => Err(self.unexpected("unexpected block delimiter")),
        }
    }

    fn enter_block(&mut self, line: usize, column: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_BLOCK_DEPTH {
            return Err(Error::syntax(line, column, "blocks nested too deeply"));
        }
        Ok(())
    }

    /// Parse an if / else if / else chain
    fn parse_conditional(&mut self, condition: &str, line: usize, column: usize) -> Result<Node> {
        self.enter_block(line, column)?;
        let condition = parse_expression_at(condition, line, column)?;
        self.advance(); // Skip {{ if ... }}

        let then_branch = self.parse_nodes()?;
        let mut else_if_branches = Vec::new();
        let mut else_branch: Option<Vec<Node>> = None;

        loop {
            let token = self.current_token.clone();
            match token.kind {
                TokenKind::ElseIf(source) => {
                    if else_branch.is_some() {
                        return Err(self.unexpected("'else if' after 'else'"));
                    }
                    let else_if_condition = parse_expression_at(&source, token.line, token.column)?;
                    self.advance();
                    let body = self.parse_nodes()?;
                    else_if_branches.push((else_if_condition, body));
                }
                TokenKind::Else => {
                    if else_branch.is_some() {
                        return Err(self.unexpected("duplicate 'else' in 'if' block"));
                    }
                    self.advance();
                    else_branch = Some(self.parse_nodes()?);
                }
                TokenKind::End => {
                    self.advance();
                    break;
                }
                _ => return Err(Error::syntax(line, column, "unclosed 'if' block")),
            }
        }

        self.depth -= 1;
        Ok(Node::Conditional {
            condition,
            then_branch,
            else_if_branches,
            else_branch,
        })
    }

    /// Parse a loop block
    fn parse_loop(
        &mut self,
        item_name: String,
        collection: &str,
        line: usize,
        column: usize,
    ) -> Result<Node> {
        self.enter_block(line, column)?;
        let collection = parse_expression_at(collection, line, column)?;
        self.advance(); // Skip {{ for ... }}

        let body = self.parse_nodes()?;
        match self.current_token.kind {
            TokenKind::End => self.advance(),
            TokenKind::Else | TokenKind::ElseIf(_) => {
                return Err(self.unexpected("'else' inside a 'for' block"))
            }
            _ => return Err(Error::syntax(line, column, "unclosed 'for' block")),
        }

        self.depth -= 1;
        Ok(Node::Loop {
            item_name,
            collection,
            body,
        })
    }
}

/// Parse `NAME` or `NAME with { key: value, ... }`
fn parse_include(clause: &str, line: usize, column: usize) -> Result<Node> {
    let (raw_name, rest) = match clause.find(char::is_whitespace) {
        Some(index) => (&clause[..index], clause[index..].trim()),
        None => (clause, ""),
    };
    let name = strip_quotes(raw_name).unwrap_or(raw_name);
    NameValidator::validate_template_name(name)?;

    if rest.is_empty() {
        return Ok(Node::Include {
            name: name.to_string(),
            variables: Vec::new(),
        });
    }

    let params = rest
        .strip_prefix("with")
        .map(str::trim)
        .filter(|p| p.starts_with('{') && p.ends_with('}') && p.len() >= 2)
        .ok_or_else(|| {
            Error::syntax(
                line,
                column,
                format!("expected 'with {{ ... }}' after include '{}'", name),
            )
        })?;

    let variables = parse_include_params(&params[1..params.len() - 1], line, column)?;
    Ok(Node::Include {
        name: name.to_string(),
        variables,
    })
}

/// Flat `key: value` pairs; quoted values are literals, others expressions
fn parse_include_params(
    params: &str,
    line: usize,
    column: usize,
) -> Result<Vec<(String, Expression)>> {
    let mut variables = Vec::new();

    for pair in split_outside_quotes(params, line, column)? {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once(':') else {
            if !pair.is_empty() {
                log::debug!("Ignoring include parameter without ':' : {}", pair);
            }
            continue;
        };

        let key = key.trim();
        NameValidator::validate_variable_name(key)?;

        let value = value.trim();
        let expr = match strip_quotes(value) {
            Some(literal) => Expression::String(literal.to_string()),
            None => parse_expression_at(value, line, column)?,
        };
        variables.push((key.to_string(), expr));
    }

    Ok(variables)
}

/// Split on commas that are not inside quotes; nested braces are rejected
fn split_outside_quotes(input: &str, line: usize, column: usize) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ',' => parts.push(std::mem::take(&mut current)),
                '{' | '}' => {
                    return Err(Error::syntax(
                        line,
                        column,
                        "include parameters cannot contain nested braces",
                    ))
                }
                _ => current.push(ch),
            },
        }
    }

    parts.push(current);
    Ok(parts)
}

fn strip_quotes(value: &str) -> Option<&str> {
    let first = value.chars().next()?;
    if (first == '\'' || first == '"') && value.len() >= 2 && value.ends_with(first) {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}
