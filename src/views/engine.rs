use super::ast::Template;
use super::bindings::{Binding, Bindings};
use super::functions::FunctionRegistry;
use super::parser::parse_template;
use super::renderer::{IncludeHandler, RenderContext, Renderer};
use super::source::{FileSource, TemplateSource, DEFAULT_EXTENSION, DEFAULT_TEMPLATE_DIRECTORY};
use crate::cache::{CacheStore, RenderCache};
use crate::config::EngineConfig;
use crate::error::{Error, ErrorChain, ErrorContext, Result};
use crate::security::HtmlEscaper;
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

/// Template rendered when something goes wrong
pub const DEFAULT_ERROR_TEMPLATE: &str = "error";

/// Deepest chain of nested includes before rendering is aborted
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Binding that carries the failure message into the error template
pub const ERROR_MESSAGE_BINDING: &str = "errorMessage";

/// Template engine: bindings, template resolution, caching and error
/// fallback around the translator and renderer
pub struct Engine {
    bindings: Bindings,
    source: Box<dyn TemplateSource>,
    template_directory: PathBuf,
    extension: String,
    error_template: String,
    cache: RenderCache,
    functions: FunctionRegistry,
    max_include_depth: usize,
    include_depth: usize,
    /// Set while the error template is rendering
    in_error_path: bool,
    /// Set when the include limit was hit, until the outermost render
    /// turns the failure into error output
    unwinding: bool,
}

impl Engine {
    /// Engine reading `views/<name>.html`, caching disabled
    pub fn new() -> Self {
        Self {
            bindings: Bindings::new(),
            source: Box::new(FileSource::default()),
            template_directory: PathBuf::from(DEFAULT_TEMPLATE_DIRECTORY),
            extension: DEFAULT_EXTENSION.to_string(),
            error_template: DEFAULT_ERROR_TEMPLATE.to_string(),
            cache: RenderCache::new(),
            functions: FunctionRegistry::with_builtins(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            include_depth: 0,
            in_error_path: false,
            unwinding: false,
        }
    }

    /// Build an engine from configuration, validating the cache setup
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut engine = Self::new();
        engine.template_directory = config.template_directory.clone();
        engine.extension = config.extension.clone();
        engine.rebuild_file_source();
        engine.set_error_template(config.error_template.clone());
        engine.set_max_include_depth(config.max_include_depth);

        engine.set_cache_time(config.cache.ttl);
        if let Some(directory) = &config.cache.directory {
            engine.set_cache_directory(directory)?;
        }
        engine.enable_caching(config.cache.enabled);
        engine.validate_setup()?;

        Ok(engine)
    }

    // Bindings

    /// Bind a serializable value
    pub fn set<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        self.bindings.set(key, value);
    }

    pub fn set_multiple<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        for (key, value) in values {
            self.bindings.set(key, value);
        }
    }

    /// Bind an opaque value; templates only see its type name
    pub fn set_resource<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.bindings.set_resource(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.bindings.get_value(key)
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    /// Remove every binding
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    // Templates

    pub fn set_template_directory(&mut self, directory: impl Into<PathBuf>) {
        self.template_directory = directory.into();
        self.rebuild_file_source();
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = extension.into();
        self.rebuild_file_source();
    }

    pub fn template_directory(&self) -> &Path {
        &self.template_directory
    }

    /// Replace the template source, e.g. with a `MemorySource`
    pub fn set_source(&mut self, source: impl TemplateSource + 'static) {
        self.source = Box::new(source);
    }

    fn rebuild_file_source(&mut self) {
        self.source = Box::new(FileSource::new(
            self.template_directory.clone(),
            self.extension.clone(),
        ));
    }

    pub fn set_error_template(&mut self, name: impl Into<String>) {
        self.error_template = name.into();
    }

    pub fn error_template(&self) -> &str {
        &self.error_template
    }

    pub fn set_max_include_depth(&mut self, depth: usize) {
        self.max_include_depth = depth.max(1);
    }

    /// Make a function callable from templates
    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.register(name, function);
    }

    // Caching

    pub fn enable_caching(&mut self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Cache entry lifetime in seconds
    pub fn set_cache_time(&mut self, seconds: u64) {
        self.cache.set_ttl(seconds);
    }

    pub fn set_cache_directory(&mut self, directory: impl AsRef<Path>) -> Result<()> {
        self.cache.configure_location(directory)
    }

    pub fn set_cache_store(&mut self, store: impl CacheStore + 'static) {
        self.cache.set_store(store);
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    pub fn validate_setup(&self) -> Result<()> {
        self.cache.validate_setup()
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut RenderCache {
        &mut self.cache
    }

    // Rendering

    /// Render a template; failures produce error output instead of an error
    pub fn render(&mut self, name: &str) -> String {
        match self.try_render(name) {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    "Rendering '{}' failed [{}]: {}",
                    name,
                    e.error_code(),
                    ErrorChain::new(&e)
                );
                self.render_error(&e)
            }
        }
    }

    /// Render a partial with extra bindings layered over the current ones
    ///
    /// The current bindings are restored afterwards whatever happens.
    pub fn include(&mut self, name: &str, variables: Bindings) -> String {
        match self.include_inner(name, variables) {
            Ok(output) => output,
            Err(e) => {
                warn!("Including '{}' failed: {}", name, ErrorChain::new(&e));
                self.render_error(&e)
            }
        }
    }

    /// Render a template, returning failures to the caller
    pub fn try_render(&mut self, name: &str) -> Result<String> {
        let result = self.run_pipeline(name);
        if self.include_depth == 0 {
            self.unwinding = false;
        }
        result
    }

    fn run_pipeline(&mut self, name: &str) -> Result<String> {
        let location = self.source.locate(name);
        if !self.source.exists(&location) {
            return Err(Error::template_not_found(name, location));
        }

        let key = self.cache_key(name);
        if let Some(key) = &key {
            if let Some(output) = self.cache.get(key) {
                debug!("Cache hit for '{}'", name);
                return Ok(output);
            }
            debug!("Cache miss for '{}'", name);
        }

        let template = self.load(name, &location)?;
        let output = self.execute(&template)?;

        if let Some(key) = &key {
            if let Err(e) = self.cache.put(key, &output) {
                warn!("Failed to cache output of '{}': {}", name, e);
            }
        }

        Ok(output)
    }

    /// Translate a template without rendering it
    pub fn compile(&self, name: &str) -> Result<Template> {
        let location = self.source.locate(name);
        if !self.source.exists(&location) {
            return Err(Error::template_not_found(name, location));
        }
        self.load(name, &location)
    }

    fn load(&self, name: &str, location: &str) -> Result<Template> {
        let text = self.source.read(location)?;
        let template =
            parse_template(&text).with_context(|| format!("Failed to compile '{}'", name))?;
        debug!("Compiled template '{}' from {}", name, location);
        Ok(template)
    }

    /// Cache key for this render, or `None` when the cache must be bypassed
    fn cache_key(&self, name: &str) -> Option<String> {
        if !self.cache.is_enabled() {
            return None;
        }

        if let Err(e) = self.cache.validate_setup() {
            warn!("{}; rendering '{}' without cache", e, name);
            return None;
        }

        let fingerprint = self.cache.fingerprint(name, &self.bindings);
        if !fingerprint.exact {
            debug!("Skipping cache for '{}': bindings hold resources", name);
            return None;
        }
        Some(fingerprint.key)
    }

    fn execute(&mut self, template: &Template) -> Result<String> {
        let context =
            RenderContext::from_bindings(&self.bindings).with_functions(self.functions.clone());
        Renderer::new(context)
            .with_include_handler(self)
            .render(template)
    }

    fn include_inner(&mut self, name: &str, variables: Bindings) -> Result<String> {
        if self.include_depth >= self.max_include_depth {
            self.unwinding = true;
            return Err(Error::render_failed(format!(
                "include depth limit of {} exceeded while including '{}'",
                self.max_include_depth, name
            )));
        }

        let snapshot = self.bindings.clone();
        self.bindings.merge(variables);
        self.include_depth += 1;

        let result = self.run_pipeline(name);

        self.include_depth -= 1;
        self.bindings = snapshot;

        match result {
            Ok(output) => Ok(output),
            Err(e) if self.unwinding => Err(e),
            Err(e) => {
                warn!("Partial '{}' failed: {}", name, ErrorChain::new(&e));
                Ok(self.render_error(&e))
            }
        }
    }

    /// Render the error template, or the plain fallback when that is not
    /// possible
    fn render_error(&mut self, failure: &Error) -> String {
        self.unwinding = false;
        let message = failure.to_string();

        if self.in_error_path {
            return fallback_message(&message);
        }

        let location = self.source.locate(&self.error_template);
        if !self.source.exists(&location) {
            return fallback_message(&message);
        }

        let name = self.error_template.clone();
        let saved_bindings = std::mem::take(&mut self.bindings);
        let saved_depth = std::mem::replace(&mut self.include_depth, 0);
        self.bindings.set(ERROR_MESSAGE_BINDING, &message);
        self.in_error_path = true;

        let result = self.run_pipeline(&name);

        self.in_error_path = false;
        self.unwinding = false;
        self.include_depth = saved_depth;
        self.bindings = saved_bindings;

        match result {
            Ok(output) if !output.is_empty() => output,
            Ok(_) => fallback_message(&message),
            Err(e) => {
                error!("Error template '{}' failed: {}", name, ErrorChain::new(&e));
                fallback_message(&message)
            }
        }
    }
}

impl IncludeHandler for Engine {
    fn render_include(&mut self, name: &str, variables: Bindings) -> Result<String> {
        self.include_inner(name, variables)
    }
}

/// Plain-text output used when no error template can be rendered
pub fn fallback_message(message: &str) -> String {
    format!("An error occurred: {}", HtmlEscaper::escape(message))
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("template_directory", &self.template_directory)
            .field("extension", &self.extension)
            .field("error_template", &self.error_template)
            .field("bindings", &self.bindings.len())
            .field("cache", &self.cache)
            .field("max_include_depth", &self.max_include_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::views::source::MemorySource;
    use serde_json::json;

    fn engine_with(templates: &[(&str, &str)]) -> Engine {
        let mut source = MemorySource::new();
        for (name, text) in templates {
            source.insert(*name, *text);
        }
        let mut engine = Engine::new();
        engine.set_source(source);
        engine
    }

    #[test]
    fn test_render_simple() {
        let mut engine = engine_with(&[("hello", "Hello, {{ name }}!")]);
        engine.set("name", "<b>X</b>");
        assert_eq!(engine.render("hello"), "Hello, &lt;b&gt;X&lt;/b&gt;!");
    }

    #[test]
    fn test_missing_template_fallback() {
        let mut engine = engine_with(&[]);
        assert_eq!(
            engine.render("nope"),
            "An error occurred: Template not found: &#039;nope&#039; at path: &#039;nope&#039;"
        );
    }

    #[test]
    fn test_missing_template_uses_error_template() {
        let mut engine = engine_with(&[("error", "<h1>Oops</h1><p>{{ errorMessage }}</p>")]);
        engine.set("name", "kept");

        let output = engine.render("nope");
        assert_eq!(
            output,
            "<h1>Oops</h1><p>Template not found: &#039;nope&#039; at path: &#039;nope&#039;</p>"
        );
        assert_eq!(engine.get_value("name"), Some(&json!("kept")));
        assert!(engine.get_value(ERROR_MESSAGE_BINDING).is_none());
    }

    #[test]
    fn test_failing_error_template_falls_back() {
        let mut engine = engine_with(&[("error", "{{ if }}"), ("bad", "{{ 1 / 0 }}")]);
        assert_eq!(
            engine.render("bad"),
            "An error occurred: Render failed: division by zero"
        );
    }

    #[test]
    fn test_error_template_that_errors_itself_does_not_recurse() {
        let mut engine = engine_with(&[("error", "E[{{ include missing }}]")]);
        let output = engine.render("nope");
        assert!(output.starts_with("E[An error occurred: Template not found"));
    }

    #[test]
    fn test_include_restores_bindings() {
        let mut engine = engine_with(&[
            ("page", "{{ title }}|{{ include card with { title: 'Card' } }}|{{ title }}"),
            ("card", "[{{ title }}/{{ user }}]"),
        ]);
        engine.set("title", "Page");
        engine.set("user", "ann");

        assert_eq!(engine.render("page"), "Page|[Card/ann]|Page");
        assert_eq!(engine.get_value("title"), Some(&json!("Page")));

        let mut extra = Bindings::new();
        extra.set("title", "Direct");
        assert_eq!(engine.include("card", extra), "[Direct/ann]");
        assert_eq!(engine.get_value("title"), Some(&json!("Page")));
    }

    #[test]
    fn test_failing_partial_renders_inline_error() {
        let mut engine = engine_with(&[("page", "before {{ include ghost }} after")]);
        assert_eq!(
            engine.render("page"),
            "before An error occurred: Template not found: &#039;ghost&#039; at path: &#039;ghost&#039; after"
        );
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let mut engine = engine_with(&[("loop", "x{{ include loop }}{{ include loop }}")]);
        engine.set_max_include_depth(4);

        let output = engine.render("loop");
        assert_eq!(
            output,
            "An error occurred: Render failed: include depth limit of 4 exceeded while including &#039;loop&#039;"
        );
        assert_eq!(engine.include_depth, 0);
        assert!(!engine.unwinding);
    }

    #[test]
    fn test_caching_round_trip_with_memory_store() {
        let store = MemoryStore::new();
        let mut engine = engine_with(&[("t", "v={{ v }}")]);
        engine.set_cache_store(store.clone());
        engine.enable_caching(true);
        engine.set("v", 1);

        assert_eq!(engine.render("t"), "v=1");
        assert_eq!(store.len(), 1);
        assert_eq!(engine.render("t"), "v=1");
        assert_eq!(engine.cache().stats().hits, 1);

        engine.set("v", 2);
        assert_eq!(engine.render("t"), "v=2");
        assert_eq!(store.len(), 2);

        engine.clear_cache().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_cache_enabled_without_location_renders_uncached() {
        let mut engine = engine_with(&[("t", "ok")]);
        engine.enable_caching(true);

        assert!(matches!(
            engine.validate_setup(),
            Err(Error::CacheMisconfigured)
        ));
        assert_eq!(engine.render("t"), "ok");
    }

    #[test]
    fn test_resources_bypass_cache() {
        struct Pool;

        let store = MemoryStore::new();
        let mut engine = engine_with(&[("t", "{{ db.type }}")]);
        engine.set_cache_store(store.clone());
        engine.enable_caching(true);
        engine.set_resource("db", Pool);

        assert!(engine.render("t").ends_with("Pool"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_registered_function() {
        let mut engine = engine_with(&[("t", "{{ greet(name) }}")]);
        engine.register_function("greet", |args| {
            let name = args.first().and_then(Value::as_str).unwrap_or("nobody");
            Ok(Value::String(format!("Hi {}", name)))
        });
        engine.set("name", "Ann");
        assert_eq!(engine.render("t"), "Hi Ann");
    }

    #[test]
    fn test_syntax_error_message_has_context() {
        let mut engine = engine_with(&[("t", "{{ for x }}")]);
        let err = engine.try_render("t").unwrap_err();
        assert!(err.is_translation_error());
        assert!(err.to_string().starts_with("Failed to compile 't': Syntax error at line 1"));
    }

    #[test]
    fn test_huge_operator_chain_renders_error_output() {
        let sum = vec!["1"; 10_000].join("+");
        let template = format!("{{{{ {} }}}}", sum);
        let mut engine = engine_with(&[("t", template.as_str())]);

        let output = engine.render("t");
        assert!(output.starts_with("An error occurred: Failed to compile &#039;t&#039;"));
        assert!(output.ends_with("expression nested too deeply"));
    }

    #[test]
    fn test_depth_limit_from_try_render_does_not_affect_next_render() {
        let mut engine = engine_with(&[
            ("loop", "{{ include loop }}"),
            ("page", "before {{ include ghost }} after"),
        ]);
        engine.set_max_include_depth(2);

        let err = engine.try_render("loop").unwrap_err();
        assert!(err.to_string().contains("include depth limit of 2"));
        assert!(!engine.unwinding);

        assert_eq!(
            engine.render("page"),
            "before An error occurred: Template not found: &#039;ghost&#039; at path: &#039;ghost&#039; after"
        );
    }
}
