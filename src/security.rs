//! Escaping and name validation for template output and references
//!
//! Every interpolated value goes through [`HtmlEscaper::escape`]. Template
//! names coming from `include` tags and variable names coming from `with`
//! clauses are checked against strict allow-lists before they reach the
//! filesystem or the bindings map.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Template names: letters, digits, underscore, dot and hyphen
static TEMPLATE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.\-]+$").expect("NameValidator: Invalid template name regex")
});

/// Identifiers: leading letter or underscore, then letters, digits, underscores
static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("NameValidator: Invalid identifier regex")
});

/// HTML escaping utility to prevent XSS attacks
pub struct HtmlEscaper;

impl HtmlEscaper {
    /// Escape HTML special characters, quotes included
    pub fn escape(input: &str) -> String {
        let mut output = String::with_capacity(input.len());
        for ch in input.chars() {
            match ch {
                '&' => output.push_str("&amp;"),
                '<' => output.push_str("&lt;"),
                '>' => output.push_str("&gt;"),
                '"' => output.push_str("&quot;"),
                '\'' => output.push_str("&#039;"),
                _ => output.push(ch),
            }
        }
        output
    }
}

/// Allow-list checks for names that cross a trust boundary
pub struct NameValidator;

impl NameValidator {
    pub fn is_valid_template_name(name: &str) -> bool {
        TEMPLATE_NAME_PATTERN.is_match(name)
    }

    pub fn is_valid_identifier(name: &str) -> bool {
        IDENTIFIER_PATTERN.is_match(name)
    }

    /// Reject template names that could escape the template directory
    pub fn validate_template_name(name: &str) -> Result<()> {
        if Self::is_valid_template_name(name) {
            Ok(())
        } else {
            Err(Error::InvalidTemplateReference(name.to_string()))
        }
    }

    pub fn validate_variable_name(name: &str) -> Result<()> {
        if Self::is_valid_identifier(name) {
            Ok(())
        } else {
            Err(Error::InvalidVariableName(name.to_string()))
        }
    }
}
