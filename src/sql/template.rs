//! SQL template files.
//!
//! Templates live as `<name>.sql` files under one root directory and use
//! `{{ name }}` placeholders. Files are read on every render; nothing is
//! cached.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::db::Value;
use crate::error::{DataError, Result};

/// Extension appended to template names that lack it.
pub const TEMPLATE_EXTENSION: &str = ".sql";

/// Keyword bindings used to render a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    /// Creates an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, replacing any previous value for `name`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a binding in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder pattern is valid")
    })
}

fn identifier() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    })
}

/// Renders template text by substituting every `{{ name }}` placeholder.
///
/// Values render in their display form (`NULL` for null). A placeholder
/// with no binding, a non-identifier inside braces, or an unterminated
/// `{{` is a [`DataError::Template`].
///
/// An unbound placeholder is always an error; it never renders as empty
/// text.
pub fn render(text: &str, bindings: &Bindings) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for captures in placeholder().captures_iter(text) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let literal = &text[last..whole.start()];
        check_literal(literal)?;
        output.push_str(literal);

        let name = inner.as_str().trim();
        if !identifier().is_match(name) {
            return Err(DataError::template(format!(
                "invalid placeholder '{}'",
                whole.as_str()
            )));
        }
        let value = bindings
            .get(name)
            .ok_or_else(|| DataError::template(format!("unbound variable '{name}'")))?;
        output.push_str(&value.to_display_string());
        last = whole.end();
    }

    let tail = &text[last..];
    check_literal(tail)?;
    output.push_str(tail);
    Ok(output)
}

fn check_literal(literal: &str) -> Result<()> {
    if literal.contains("{{") {
        return Err(DataError::template("unterminated '{{' placeholder"));
    }
    Ok(())
}

/// Loads and renders templates from a root directory.
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    root: PathBuf,
}

impl TemplateLoader {
    /// Creates a loader rooted at `root`.
    ///
    /// A relative root is resolved against the current working directory
    /// once, here. A missing directory is only reported; it becomes an error
    /// when a template is requested.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        debug!("SQL template directory: {}", root.display());
        if !root.is_dir() {
            warn!(
                "SQL template directory '{}' does not exist; create it before loading query files",
                root.display()
            );
        }
        Self { root }
    }

    /// Returns the resolved template root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a query name to its file path without reading it.
    pub fn resolve(&self, query_name: &str) -> Result<PathBuf> {
        if !self.root.is_dir() {
            return Err(DataError::precondition(format!(
                "SQL template directory '{}' not found",
                self.root.display()
            )));
        }

        let file_name = if query_name.ends_with(TEMPLATE_EXTENSION) {
            query_name.to_string()
        } else {
            format!("{query_name}{TEMPLATE_EXTENSION}")
        };

        let relative = Path::new(&file_name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(DataError::validation(format!(
                "query name '{query_name}' must stay inside the template directory"
            )));
        }

        let path = self.root.join(relative);
        if !path.is_file() {
            return Err(DataError::not_found(format!(
                "query file '{}' not found in '{}'",
                file_name,
                self.root.display()
            )));
        }
        Ok(path)
    }

    /// Reads the named template and renders it with `bindings`.
    pub fn load(&self, query_name: &str, bindings: &Bindings) -> Result<String> {
        let path = self.resolve(query_name)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            DataError::not_found(format!("failed to read '{}': {e}", path.display()))
        })?;
        render(&text, bindings)
    }
}
