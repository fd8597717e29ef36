//! Compiled-template cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment};

use crate::observability::metrics;
use crate::templates::{Delimiters, RenderError, Renderer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    names: Vec<String>,
    delimiters: Delimiters,
}

/// Template sources under one directory, compiled once per name list.
pub struct TemplateCache {
    dir: PathBuf,
    delimiters: Delimiters,
    development: bool,
    entries: Mutex<HashMap<CacheKey, Arc<Environment<'static>>>>,
}

impl TemplateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delimiters: Delimiters::default(),
            development: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Recompile on every render.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn environment(
        &self,
        names: &[&str],
        delimiters: &Delimiters,
    ) -> Result<Arc<Environment<'static>>, RenderError> {
        let key = CacheKey {
            names: names.iter().map(|n| n.to_string()).collect(),
            delimiters: delimiters.clone(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.development {
            if let Some(env) = entries.get(&key) {
                metrics::record_template_compile(true);
                return Ok(Arc::clone(env));
            }
        }

        let env = Arc::new(self.compile(names, delimiters)?);
        metrics::record_template_compile(false);
        tracing::debug!(names = ?names, "Compiled templates");
        entries.insert(key, Arc::clone(&env));
        Ok(env)
    }

    fn compile(&self, names: &[&str], delimiters: &Delimiters) -> Result<Environment<'static>, RenderError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        if !delimiters.is_default() {
            let syntax = SyntaxConfig::builder()
                .variable_delimiters(delimiters.left.clone(), delimiters.right.clone())
                .build()?;
            env.set_syntax(syntax);
        }

        for name in names {
            let path = self.source_path(name)?;
            let source = fs::read_to_string(&path).map_err(|source| RenderError::Io {
                path: path.clone(),
                source,
            })?;
            env.add_template_owned(name.to_string(), source)?;
        }
        Ok(env)
    }

    /// `dir/<name>.html`, refusing names that escape the directory.
    fn source_path(&self, name: &str) -> Result<PathBuf, RenderError> {
        let mut path = self.dir.clone();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(RenderError::InvalidName(name.to_string())),
            }
        }
        if path == self.dir {
            return Err(RenderError::InvalidName(name.to_string()));
        }
        path.set_extension("html");
        Ok(path)
    }
}

impl Renderer for TemplateCache {
    fn render(&self, names: &[&str], data: &serde_json::Value) -> Result<Vec<u8>, RenderError> {
        let delimiters = self.delimiters.clone();
        self.render_with(names, data, &delimiters)
    }

    fn render_with(
        &self,
        names: &[&str],
        data: &serde_json::Value,
        delimiters: &Delimiters,
    ) -> Result<Vec<u8>, RenderError> {
        let entry = names.last().ok_or(RenderError::NoTemplates)?;
        let env = self.environment(names, delimiters)?;
        let rendered = env.get_template(entry)?.render(data)?;
        Ok(rendered.into_bytes())
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("dir", &self.dir)
            .field("delimiters", &self.delimiters)
            .field("development", &self.development)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, source: &str) {
        let path = dir.path().join(format!("{}.html", name));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, source).unwrap();
    }

    #[test]
    fn test_renders_last_name_through_layout() {
        let dir = TempDir::new().unwrap();
        write(&dir, "base", "<main>{% block body %}{% endblock %}</main>");
        write(&dir, "pages/hello", "{% extends \"base\" %}{% block body %}Hi {{ name }}{% endblock %}");

        let cache = TemplateCache::new(dir.path());
        let out = cache.render(&["base", "pages/hello"], &json!({"name": "<ana>"})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<main>Hi &lt;ana&gt;</main>");
    }

    #[test]
    fn test_cache_reuses_until_development() {
        let dir = TempDir::new().unwrap();
        write(&dir, "page", "v1");
        let cache = TemplateCache::new(dir.path());
        assert_eq!(cache.render(&["page"], &json!({})).unwrap(), b"v1");

        write(&dir, "page", "v2");
        assert_eq!(cache.render(&["page"], &json!({})).unwrap(), b"v1");
        assert_eq!(cache.len(), 1);

        let dev = TemplateCache::new(dir.path()).development(true);
        assert_eq!(dev.render(&["page"], &json!({})).unwrap(), b"v2");
        write(&dir, "page", "v3");
        assert_eq!(dev.render(&["page"], &json!({})).unwrap(), b"v3");
    }

    #[test]
    fn test_custom_delimiters() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ng", "{{ angular }} [[ name ]]");
        let cache = TemplateCache::new(dir.path());

        let out = cache
            .render_with(&["ng"], &json!({"name": "x"}), &Delimiters::new("[[", "]]"))
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{{ angular }} x");
    }

    #[test]
    fn test_errors() {
        let dir = TempDir::new().unwrap();
        let cache = TemplateCache::new(dir.path());
        assert!(matches!(cache.render(&[], &json!({})), Err(RenderError::NoTemplates)));
        assert!(matches!(cache.render(&["missing"], &json!({})), Err(RenderError::Io { .. })));
        assert!(matches!(
            cache.render(&["../secret"], &json!({})),
            Err(RenderError::InvalidName(_))
        ));
        assert!(cache.is_empty());
    }
}
