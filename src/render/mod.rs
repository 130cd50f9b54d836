//! Template rendering for card files.
//!
//! Local card files are Jinja templates (rendered with minijinja) whose
//! output must be a JSON card document. Every render builds a fresh
//! environment:
//!
//! - templates and includes resolve against the repository root first, then
//!   the include folder
//! - `json` filter escapes a fragment for use inside a JSON string literal
//! - `is_mbs`, `mbs_url`, `mbs_file` and `mbs_file_abs` are always defined
//! - undefined variables are errors unless guarded with `default(...)` or
//!   `is defined`
//! - nothing is auto-escaped
//!
//! Include arguments use a `with` block, which scopes them to that include:
//!
//! ```jinja
//! {% with limit=5 %}{% include "top_customers.sql" %}{% endwith %}
//! ```

use std::path::{Path, PathBuf};

use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, context};
use tracing::debug;

use crate::config::repo_relative;

/// Default include folder, relative to the repository root.
pub const DEFAULT_INCLUDE_FOLDER: &str = "include";

/// Template rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The file to render does not live under the repository root.
    #[error("{file}: not inside the repository at {root}")]
    OutsideRepository { file: String, root: String },

    /// Syntax error, undefined variable, missing include, filter failure.
    #[error("{file}: {message}")]
    Template {
        /// Repo-relative path of the rendered file.
        file: String,
        /// Line of the failing template, when known.
        line: Option<usize>,
        message: String,
    },
}

/// Result type for rendering.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// `json` filter: escape a value as the body of a JSON string.
///
/// The value is serialized as a JSON string and the surrounding quotes are
/// dropped, so the result can sit between the quotes already present in the
/// template:
///
/// ```jinja
/// "query": "{% filter json %}{% include "report.sql" %}{% endfilter %}"
/// ```
#[allow(clippy::needless_pass_by_value)] // MiniJinja filter signature uses owned `Value`.
fn json_escape(value: Value) -> Result<Value, Error> {
    if value.is_undefined() {
        return Err(Error::new(
            ErrorKind::UndefinedError,
            "json filter applied to an undefined value",
        ));
    }
    let text = value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_owned);
    let quoted = serde_json::to_string(&text).map_err(|err| {
        Error::new(ErrorKind::InvalidOperation, "cannot serialize to JSON").with_source(err)
    })?;
    // `quoted` always starts and ends with an ASCII `"`.
    Ok(Value::from_safe_string(quoted[1..quoted.len() - 1].to_string()))
}

/// Join a template name onto a search directory, refusing anything that
/// could escape it.
fn safe_join(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut path = dir.to_path_buf();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || Path::new(s).is_absolute() => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

fn load_template(search_path: &[PathBuf], name: &str) -> Result<Option<String>, Error> {
    for dir in search_path {
        let Some(path) = safe_join(dir, name) else {
            return Ok(None);
        };
        if path.is_file() {
            return std::fs::read_to_string(&path).map(Some).map_err(|err| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("could not read template {}", path.display()),
                )
                .with_source(err)
            });
        }
    }
    Ok(None)
}

/// Renders card templates for one repository.
#[derive(Debug, Clone)]
pub struct Renderer {
    root: PathBuf,
    include_dir: PathBuf,
    url: Option<String>,
}

impl Renderer {
    /// Create a renderer for the repository at `root`.
    ///
    /// A relative `include_folder` is resolved against `root`.
    #[must_use]
    pub fn new(root: &Path, include_folder: &Path) -> Self {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let include_dir = root.join(include_folder);
        Self {
            root,
            include_dir,
            url: None,
        }
    }

    /// Expose the remote base URL to templates as `mbs_url`.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn include_dir(&self) -> &Path {
        &self.include_dir
    }

    /// Repo-relative, `/`-separated template name for `path`.
    ///
    /// Relative paths are taken relative to the repository root.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::OutsideRepository`] if `path` is not below the root.
    pub fn template_name(&self, path: &Path) -> RenderResult<String> {
        let outside = || RenderError::OutsideRepository {
            file: path.display().to_string(),
            root: self.root.display().to_string(),
        };

        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        repo_relative(&self.root, &abs).ok_or_else(outside)
    }

    /// Render the template at `path` (repo-relative or absolute).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] on syntax errors, undefined
    /// variables, missing includes or filter failures.
    pub fn render(&self, path: &Path) -> RenderResult<String> {
        let name = self.template_name(path)?;
        let abs = self.root.join(&name);
        let env = self.environment();

        let template_error = |err: Error| {
            debug!("{}", err.display_debug_info());
            RenderError::Template {
                file: name.clone(),
                line: err.line(),
                message: err.to_string(),
            }
        };

        let template = env.get_template(&name).map_err(template_error)?;
        template
            .render(context! {
                is_mbs => true,
                mbs_url => self.url.as_deref(),
                mbs_file => &name,
                mbs_file_abs => abs.to_string_lossy(),
            })
            .map_err(template_error)
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("json", json_escape);

        let search_path = vec![self.root.clone(), self.include_dir.clone()];
        env.set_loader(move |name| load_template(&search_path, name));
        env
    }
}
