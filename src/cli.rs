//! Command-line rendering of templates
//!
//! Renders one template from a views directory to stdout or a file:
//!
//! ```text
//! shorthand page --views ./views --set title=Home --vars data.json
//! shorthand page --check
//! ```

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::views::{Bindings, Engine};
use clap::Parser;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shorthand")]
#[command(about = "Render {{ }} templates with optional output caching")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct CliArgs {
    /// Template name, without extension
    pub template: String,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Views directory
    #[arg(long, value_name = "DIR")]
    pub views: Option<PathBuf>,

    /// Template file extension
    #[arg(short, long)]
    pub extension: Option<String>,

    /// Bind a value, e.g. `--set title=Home` or `--set count=3`
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// JSON file holding an object of bindings
    #[arg(long, value_name = "FILE")]
    pub vars: Option<PathBuf>,

    /// Enable caching in this directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in seconds
    #[arg(long, value_name = "SECONDS")]
    pub cache_ttl: Option<u64>,

    /// Template rendered on failure
    #[arg(long, value_name = "NAME")]
    pub error_template: Option<String>,

    /// Only translate the template and report syntax errors
    #[arg(long)]
    pub check: bool,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Configuration file settings with command-line overrides applied
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(views) = &self.views {
            config.template_directory = views.clone();
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if let Some(error_template) = &self.error_template {
            config.error_template = error_template.clone();
        }
        if let Some(directory) = &self.cache_dir {
            config.cache.enabled = true;
            config.cache.directory = Some(directory.clone());
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache.ttl = ttl;
        }

        Ok(config)
    }

    /// `--vars` file first, then `--set` pairs on top
    pub fn bindings(&self) -> Result<Bindings> {
        let mut bindings = match &self.vars {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                let value: Value = serde_json::from_str(&text)?;
                Bindings::from_json(value).ok_or_else(|| {
                    Error::config(format!("{} must hold a JSON object", path.display()))
                })?
            }
            None => Bindings::new(),
        };

        for assignment in &self.set {
            let (key, value) = parse_assignment(assignment)?;
            bindings.set(key, value);
        }

        Ok(bindings)
    }
}

/// Split `key=value`; the value is read as JSON when it parses, else as text
pub fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| Error::config(format!("expected KEY=VALUE, got '{}'", assignment)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("missing key in '{}'", assignment)));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Run the command, returning the rendered output (empty for `--check`)
pub fn run(args: &CliArgs) -> Result<String> {
    let config = args.engine_config()?;
    let mut engine = Engine::from_config(&config)?;

    if args.check {
        let template = engine.compile(&args.template)?;
        log::info!(
            "'{}' is valid ({} top-level nodes, includes: {:?})",
            args.template,
            template.nodes.len(),
            template.include_names()
        );
        return Ok(String::new());
    }

    for (key, binding) in args.bindings()?.iter() {
        engine.bindings_mut().insert(key.clone(), binding.clone());
    }

    let output = engine.render(&args.template);

    if let Some(path) = &args.output {
        fs::write(path, &output)?;
        log::info!("Wrote {} bytes to {}", output.len(), path.display());
    }

    let stats = engine.cache().stats();
    if stats.lookups() > 0 {
        log::debug!("Cache: {} hits, {} misses", stats.hits, stats.misses);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("shorthand").chain(list.iter().copied()))
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("count=3").unwrap(),
            ("count".to_string(), json!(3))
        );
        assert_eq!(
            parse_assignment("title=Hello world").unwrap(),
            ("title".to_string(), json!("Hello world"))
        );
        assert_eq!(
            parse_assignment("tags=[\"a\",\"b\"]").unwrap(),
            ("tags".to_string(), json!(["a", "b"]))
        );
        assert_eq!(
            parse_assignment("empty=").unwrap(),
            ("empty".to_string(), json!(""))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = args(&["page", "--views", "/srv/views", "--cache-dir", "/tmp/c", "--cache-ttl", "5"]);
        let config = cli.engine_config().unwrap();

        assert_eq!(config.template_directory, PathBuf::from("/srv/views"));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl, 5);
        assert_eq!(config.extension, "html");
    }

    #[test]
    fn test_run_renders_with_vars_and_sets() {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("views");
        fs::create_dir(&views).unwrap();
        fs::write(views.join("page.html"), "{{ title }}: {{ count + 1 }}").unwrap();
        let vars = dir.path().join("vars.json");
        fs::write(&vars, r#"{"title": "From file", "count": 1}"#).unwrap();

        let views_arg = views.to_string_lossy().to_string();
        let vars_arg = vars.to_string_lossy().to_string();
        let cli = args(&["page", "--views", &views_arg, "--vars", &vars_arg, "--set", "count=41"]);

        assert_eq!(run(&cli).unwrap(), "From file: 42");
    }

    #[test]
    fn test_check_reports_syntax_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.html"), "{{ if a }}x{{ end }}").unwrap();
        fs::write(dir.path().join("bad.html"), "{{ if a }}x").unwrap();
        let views_arg = dir.path().to_string_lossy().to_string();

        assert_eq!(run(&args(&["ok", "--views", &views_arg, "--check"])).unwrap(), "");
        let err = run(&args(&["bad", "--views", &views_arg, "--check"])).unwrap_err();
        assert!(err.is_translation_error());
    }
}
