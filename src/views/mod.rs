//! Template translation and rendering
//!
//! Template text goes through three stages:
//! - `lexer`: splits text into literal runs and `{{ ... }}` tags
//! - `parser`: builds a [`Template`] tree with nested blocks
//! - `renderer`: evaluates the tree against bound values
//!
//! [`Engine`] ties these together with template lookup, caching and the
//! error-template fallback.

pub mod ast;
pub mod bindings;
pub mod engine;
pub mod expression;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod renderer;
pub mod source;

pub use ast::{BinaryOperator, Expression, Node, Template, UnaryOperator};
pub use bindings::{Binding, Bindings, Resource};
pub use engine::{fallback_message, Engine, DEFAULT_ERROR_TEMPLATE, DEFAULT_MAX_INCLUDE_DEPTH};
pub use expression::parse_expression;
pub use functions::{FunctionRegistry, TemplateFunction};
pub use parser::parse_template;
pub use renderer::{IncludeHandler, RenderContext, Renderer};
pub use source::{FileSource, MemorySource, TemplateSource};

/// Translate and render a template string against a JSON object
///
/// Includes are not available here since there is no template source.
pub fn render_str(template: &str, data: &serde_json::Value) -> crate::error::Result<String> {
    let template = parse_template(template)?;
    let bindings = Bindings::from_json(data.clone()).unwrap_or_default();
    Renderer::new(RenderContext::from_bindings(&bindings)).render(&template)
}
