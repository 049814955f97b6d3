//! Template sources
//!
//! A [`TemplateSource`] maps template names to locations and reads their
//! text. The engine asks for the location first so that a missing template
//! can be reported with the exact path that was tried.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory for file-based templates
pub const DEFAULT_TEMPLATE_DIRECTORY: &str = "views";

/// Default template file extension
pub const DEFAULT_EXTENSION: &str = "html";

/// Resolves template names to text
pub trait TemplateSource: Send + Sync {
    /// Location a template name resolves to
    fn locate(&self, name: &str) -> String;

    fn exists(&self, location: &str) -> bool;

    fn read(&self, location: &str) -> Result<String>;
}

/// Templates stored as `<directory>/<name>.<extension>`
#[derive(Debug, Clone)]
pub struct FileSource {
    directory: PathBuf,
    extension: String,
}

impl FileSource {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: normalize_extension(extension.into()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = normalize_extension(extension.into());
    }
}

fn normalize_extension(extension: String) -> String {
    extension.trim_start_matches('.').to_string()
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_DIRECTORY, DEFAULT_EXTENSION)
    }
}

impl TemplateSource for FileSource {
    fn locate(&self, name: &str) -> String {
        let file_name = if self.extension.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, self.extension)
        };
        self.directory.join(file_name).to_string_lossy().into_owned()
    }

    fn exists(&self, location: &str) -> bool {
        Path::new(location).is_file()
    }

    fn read(&self, location: &str) -> Result<String> {
        Ok(fs::read_to_string(location)?)
    }
}

/// Templates held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    pub fn with_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.templates.remove(name)
    }
}

impl TemplateSource for MemorySource {
    fn locate(&self, name: &str) -> String {
        name.to_string()
    }

    fn exists(&self, location: &str) -> bool {
        self.templates.contains_key(location)
    }

    fn read(&self, location: &str) -> Result<String> {
        self.templates
            .get(location)
            .cloned()
            .ok_or_else(|| Error::template_not_found(location, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_source_locate_and_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("home.html"), "Hi {{ name }}").unwrap();

        let source = FileSource::new(dir.path(), ".html");
        assert_eq!(source.extension(), "html");

        let location = source.locate("home");
        assert!(location.ends_with("home.html"));
        assert!(source.exists(&location));
        assert_eq!(source.read(&location).unwrap(), "Hi {{ name }}");

        let missing = source.locate("missing");
        assert!(!source.exists(&missing));
        assert!(matches!(source.read(&missing), Err(Error::Io(_))));
    }

    #[test]
    fn test_file_source_defaults() {
        let source = FileSource::default();
        assert_eq!(source.directory(), Path::new("views"));
        assert_eq!(
            PathBuf::from(source.locate("page")),
            Path::new("views").join("page.html")
        );
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with_template("card", "<div>{{ title }}</div>");

        assert!(source.exists(&source.locate("card")));
        assert!(!source.exists("other"));
        assert_eq!(source.read("card").unwrap(), "<div>{{ title }}</div>");
        assert!(matches!(
            source.read("other"),
            Err(Error::TemplateNotFound { .. })
        ));
    }
}
