use crate::error::{Error, Result};
use std::fmt;

/// Token types for shorthand template syntax
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Text(String),

    // Interpolation
    Output(String), // {{ expression }}

    // Control flow
    If(String),     // {{ if condition }}
    ElseIf(String), // {{ else if condition }} or {{ elseif condition }}
    Else,           // {{ else }}
    End,            // {{ end }}

    // Loops
    For(String, String), // {{ for item in collection }}

    // Partials
    Include(String), // {{ include name with { ... } }}

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}:{}", self.kind, self.line, self.column)
    }
}

/// Lexer for shorthand templates
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
            line: 1,
            column: 1,
        }
    }

    /// Advance to the next character
    fn advance(&mut self) {
        if self.current_char == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn is_tag_start(&self) -> bool {
        self.current_char == Some('{') && self.peek() == Some('{')
    }

    /// Read plain text until we hit a tag
    fn read_text(&mut self) -> String {
        let mut result = String::new();

        while let Some(ch) = self.current_char {
            if self.is_tag_start() {
                break;
            }

            result.push(ch);
            self.advance();
        }

        result
    }

    /// Read tag content up to the closing `}}`
    ///
    /// Braces belonging to an include's `with { ... }` clause and anything
    /// inside quotes are skipped, so `{ a: 'x' }}}` closes on the last pair.
    fn read_tag_content(&mut self, line: usize, column: usize) -> Result<String> {
        let mut result = String::new();
        let mut brace_depth = 0usize;
        let mut quote: Option<char> = None;

        while let Some(ch) = self.current_char {
            match quote {
                Some(q) => {
                    if ch == '\\' {
                        result.push(ch);
                        self.advance();
                        if let Some(escaped) = self.current_char {
                            result.push(escaped);
                            self.advance();
                        }
                        continue;
                    }
                    if ch == q {
                        quote = None;
                    }
                }
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '{' => brace_depth += 1,
                    '}' if brace_depth > 0 => brace_depth -= 1,
                    '}' if self.peek() == Some('}') => {
                        self.advance();
                        self.advance();
                        return Ok(result);
                    }
                    _ => {}
                },
            }

            result.push(ch);
            self.advance();
        }

        Err(Error::syntax(line, column, "unterminated '{{' tag"))
    }

    /// Parse a tag {{ ... }}
    fn parse_tag(&mut self) -> Result<Token> {
        let line = self.line;
        let column = self.column;

        // Skip {{
        self.advance();
        self.advance();

        let content = self.read_tag_content(line, column)?;
        let kind = classify_tag(&content, line, column)?;
        Ok(Token::new(kind, line, column))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        if self.current_char.is_none() {
            return Ok(Token::new(TokenKind::Eof, self.line, self.column));
        }

        if self.is_tag_start() {
            return self.parse_tag();
        }

        let line = self.line;
        let column = self.column;
        let text = self.read_text();
        Ok(Token::new(TokenKind::Text(text), line, column))
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

/// Split a leading keyword (letters, digits, underscore) from the rest
fn split_keyword(content: &str) -> (&str, &str) {
    let end = content
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    (&content[..end], content[end..].trim())
}

/// Control tags are recognised before anything is treated as output
fn classify_tag(content: &str, line: usize, column: usize) -> Result<TokenKind> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::syntax(line, column, "empty tag"));
    }

    let require = |rest: &str, what: &str| -> Result<String> {
        if rest.is_empty() {
            Err(Error::syntax(line, column, format!("'{}' requires a condition", what)))
        } else {
            Ok(rest.to_string())
        }
    };

    let (keyword, rest) = split_keyword(trimmed);
    match keyword {
        "if" => Ok(TokenKind::If(require(rest, "if")?)),
        "elseif" => Ok(TokenKind::ElseIf(require(rest, "else if")?)),
        "else" => {
            if rest.is_empty() {
                return Ok(TokenKind::Else);
            }
            match split_keyword(rest) {
                ("if", condition) => Ok(TokenKind::ElseIf(require(condition, "else if")?)),
                _ => Err(Error::syntax(
                    line,
                    column,
                    format!("unexpected '{}' after 'else'", rest),
                )),
            }
        }
        "end" => {
            if rest.is_empty() {
                Ok(TokenKind::End)
            } else {
                Err(Error::syntax(
                    line,
                    column,
                    format!("unexpected '{}' after 'end'", rest),
                ))
            }
        }
        "for" => parse_for_header(rest, line, column),
        "include" => {
            if rest.is_empty() {
                Err(Error::syntax(line, column, "'include' requires a template name"))
            } else {
                Ok(TokenKind::Include(rest.to_string()))
            }
        }
        _ => Ok(TokenKind::Output(trimmed.to_string())),
    }
}

/// `ITEM in COLLECTION`
fn parse_for_header(rest: &str, line: usize, column: usize) -> Result<TokenKind> {
    let malformed = || {
        Error::syntax(
            line,
            column,
            format!("malformed for loop '{}', expected 'for item in collection'", rest),
        )
    };

    let (item, after_item) = split_keyword(rest);
    if item.is_empty() || item.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(malformed());
    }

    let (in_keyword, collection) = split_keyword(after_item);
    if in_keyword != "in" || collection.is_empty() {
        return Err(malformed());
    }

    Ok(TokenKind::For(item.to_string(), collection.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_text() {
        let tokens = kinds("Hello World");

        assert_eq!(tokens.len(), 2);
        match &tokens[0] {
            TokenKind::Text(t) => assert_eq!(t, "Hello World"),
            _ => panic!("Expected text token"),
        }
    }

    #[test]
    fn test_output_tag() {
        let tokens = kinds("Hello, {{ name }}!");

        assert_eq!(tokens.len(), 4);
        match &tokens[1] {
            TokenKind::Output(v) => assert_eq!(v, "name"),
            _ => panic!("Expected output token"),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let tokens = kinds("{{ if a }}A{{ else if b }}B{{ elseif c }}C{{ else }}D{{ end }}");

        assert_eq!(tokens[0], TokenKind::If("a".to_string()));
        assert_eq!(tokens[2], TokenKind::ElseIf("b".to_string()));
        assert_eq!(tokens[4], TokenKind::ElseIf("c".to_string()));
        assert_eq!(tokens[6], TokenKind::Else);
        assert_eq!(tokens[8], TokenKind::End);
    }

    #[test]
    fn test_keyword_prefix_is_output() {
        let tokens = kinds("{{ iffy }}{{ end_date }}{{ format }}");

        assert_eq!(tokens[0], TokenKind::Output("iffy".to_string()));
        assert_eq!(tokens[1], TokenKind::Output("end_date".to_string()));
        assert_eq!(tokens[2], TokenKind::Output("format".to_string()));
    }

    #[test]
    fn test_for_header() {
        let tokens = kinds("{{ for item in user.items }}x{{ end }}");
        assert_eq!(
            tokens[0],
            TokenKind::For("item".to_string(), "user.items".to_string())
        );

        let err = Lexer::new("{{ for item of items }}").tokenize().unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_include_with_nested_braces() {
        let tokens = kinds("<div>{{ include card with { title: 'A }} B', n: 2 }}}</div>");

        assert_eq!(tokens.len(), 4);
        assert_eq!(
            tokens[1],
            TokenKind::Include("card with { title: 'A }} B', n: 2 }".to_string())
        );
        assert_eq!(tokens[2], TokenKind::Text("</div>".to_string()));
    }

    #[test]
    fn test_positions_track_lines() {
        let tokens = Lexer::new("line one\n  {{ value }}").tokenize().unwrap();

        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn test_unterminated_and_empty_tags() {
        let err = Lexer::new("ok\n{{ name").tokenize().unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 2, column: 1, .. }));

        let err = Lexer::new("{{   }}").tokenize().unwrap_err();
        match err {
            Error::Syntax { message, .. } => assert_eq!(message, "empty tag"),
            _ => panic!("Expected syntax error"),
        }
    }

    #[test]
    fn test_single_braces_are_text() {
        let tokens = kinds("function() { return 1; }");
        assert_eq!(
            tokens[0],
            TokenKind::Text("function() { return 1; }".to_string())
        );
    }
}
