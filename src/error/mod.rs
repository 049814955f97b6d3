use std::path::PathBuf;
use thiserror::Error;

pub mod context;

pub type Result<T> = std::result::Result<T, Error>;

pub use context::{ErrorChain, ErrorContext};

/// Main error type for the template engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Template not found: '{name}' at path: '{path}'")]
    TemplateNotFound { name: String, path: String },

    #[error("Cache directory must be set when caching is enabled")]
    CacheMisconfigured,

    #[error("Invalid template name: {0}")]
    InvalidTemplateReference(String),

    #[error("Invalid variable name in include: {0}")]
    InvalidVariableName(String),

    #[error("Cache storage unavailable at '{}': {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Error with context chain
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn template_not_found(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any context wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the error was raised while translating template text
    pub fn is_translation_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::Syntax { .. } | Error::InvalidTemplateReference(_) | Error::InvalidVariableName(_)
        )
    }

    /// Stable error code, useful for logs and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::TemplateNotFound { .. } => "E_TEMPLATE_NOT_FOUND",
            Error::CacheMisconfigured => "E_CACHE_MISCONFIGURED",
            Error::InvalidTemplateReference(_) => "E_INVALID_TEMPLATE_REFERENCE",
            Error::InvalidVariableName(_) => "E_INVALID_VARIABLE_NAME",
            Error::StorageUnavailable { .. } => "E_STORAGE_UNAVAILABLE",
            Error::RenderFailed(_) => "E_RENDER_FAILED",
            Error::Syntax { .. } => "E_SYNTAX",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Json(_) => "E_JSON",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}
