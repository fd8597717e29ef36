//! HTML template rendering.
//!
//! # Data Flow
//! ```text
//! render(names, data)
//!     → cache.rs (lock; reuse or compile dir/<name>.html for every name)
//!     → render the last name (layouts earlier in the list are reachable
//!       through `extends` / `include`)
//! ```
//!
//! # Design Decisions
//! - One lock for the whole cache; compilation is a process-wide
//!   serialization point, acceptable because it is rare
//! - Development mode recompiles on every call so edits show immediately
//! - HTML autoescaping is always on

pub mod cache;

use std::path::PathBuf;

pub use cache::TemplateCache;

/// Errors from loading or rendering templates.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no template names given")]
    NoTemplates,

    #[error("invalid template name `{0}`")]
    InvalidName(String),

    #[error("cannot read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template failed: {0}")]
    Template(#[from] minijinja::Error),
}

/// Variable delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Delimiters {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.left == "{{" && self.right == "}}"
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new("{{", "}}")
    }
}

/// Renders an ordered list of template sources with data.
pub trait Renderer: Send + Sync {
    fn render(&self, names: &[&str], data: &serde_json::Value) -> Result<Vec<u8>, RenderError>;

    /// Render with a non-default variable delimiter pair.
    fn render_with(
        &self,
        names: &[&str],
        data: &serde_json::Value,
        delimiters: &Delimiters,
    ) -> Result<Vec<u8>, RenderError>;
}
