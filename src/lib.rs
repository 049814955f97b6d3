//! Shorthand - a small template engine with `{{ }}` syntax
//!
//! Shorthand provides:
//! - Interpolation with HTML escaping: `{{ user.name }}`
//! - Conditionals: `{{ if a }}...{{ else if b }}...{{ else }}...{{ end }}`
//! - Loops: `{{ for item in items }}...{{ end }}`
//! - Partials: `{{ include card with { title: 'Hi', user: user } }}`
//! - Rendered-output caching keyed by template name and bindings
//!
//! ```no_run
//! use shorthand::Engine;
//!
//! let mut engine = Engine::new();
//! engine.set_template_directory("views");
//! engine.set("title", "Home");
//! let html = engine.render("page");
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod cache;
pub mod config;
pub mod error;
pub mod security;
pub mod views;

// Command-line rendering
#[cfg(feature = "cli")]
pub mod cli;

pub use cache::{CacheStore, FileStore, MemoryStore, RenderCache};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use views::{Bindings, Engine, MemorySource, TemplateSource};
