//! Context wrappers for errors
//!
//! Template compile failures are wrapped with the name of the template being
//! compiled; the innermost error stays reachable.

use super::Error;
use std::fmt;

/// `anyhow`-style context for `Result<T, Error>`
pub trait ErrorContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T, Error>;

    /// Like `context`, but the message is only built on failure
    fn with_context<M: Into<String>>(self, message: impl FnOnce() -> M) -> Result<T, Error>;
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn context(self, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.with_context(message))
    }

    fn with_context<M: Into<String>>(self, message: impl FnOnce() -> M) -> Result<T, Error> {
        self.map_err(|e| e.with_context(message()))
    }
}

/// Flattened view of nested `Error::WithContext` layers
pub struct ErrorChain<'a> {
    error: &'a Error,
    links: Vec<String>,
}

impl<'a> ErrorChain<'a> {
    pub fn new(error: &'a Error) -> Self {
        let mut links = Vec::new();
        let mut current = error;
        while let Error::WithContext { message, source } = current {
            links.push(message.clone());
            current = &**source;
        }
        links.push(current.to_string());
        Self { error, links }
    }

    /// Messages from the outermost context down to the root cause
    pub fn chain(&self) -> &[String] {
        &self.links
    }

    pub fn root_cause(&self) -> &Error {
        self.error.root_cause()
    }

    /// Single-line form, `outer -> inner -> cause`
    pub fn format_for_log(&self) -> String {
        self.links.join(" -> ")
    }
}

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_for_log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn test_error_context_chaining() {
        let result: Result<()> = Err(Error::InvalidTemplateReference("../etc".to_string()));
        let err = result
            .context("compiling include in 'page'")
            .with_context(|| "rendering 'page'")
            .unwrap_err();

        let chain = ErrorChain::new(&err);
        assert_eq!(chain.chain().len(), 3);
        assert_eq!(chain.chain()[0], "rendering 'page'");
        assert_eq!(
            chain.format_for_log(),
            "rendering 'page' -> compiling include in 'page' -> Invalid template name: ../etc"
        );
        assert!(matches!(
            chain.root_cause(),
            Error::InvalidTemplateReference(_)
        ));
    }

    #[test]
    fn test_chain_without_context() {
        let err = Error::CacheMisconfigured;
        let chain = ErrorChain::new(&err);

        assert_eq!(chain.chain().len(), 1);
        assert_eq!(
            chain.to_string(),
            "Cache directory must be set when caching is enabled"
        );
    }
}
