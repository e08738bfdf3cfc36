//! Component resolution.
//!
//! `as Name import "<path>"` hands the path to a [`ComponentResolver`], which
//! returns the component's source text. The parser never touches the
//! filesystem itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default component file extension.
pub const COMPONENT_EXTENSION: &str = "zare";

/// A located and loaded component.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComponent {
    /// Where the component was found; imports inside it resolve against this.
    pub path: PathBuf,
    pub source: String,
}

/// Component lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Component `{import}` not found")]
    NotFound { import: String },

    #[error("`{import}` needs an alias directory to resolve against")]
    NoAliasDir { import: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Trait for loading imported components.
pub trait ComponentResolver {
    /// Load the component `import` referenced from `from_file`.
    fn resolve(&self, from_file: &Path, import: &str) -> Result<ResolvedComponent, ResolveError>;
}

impl<R: ComponentResolver + ?Sized> ComponentResolver for &R {
    fn resolve(&self, from_file: &Path, import: &str) -> Result<ResolvedComponent, ResolveError> {
        (**self).resolve(from_file, import)
    }
}

/// Resolver that loads components from the filesystem.
///
/// - Paths are relative to the importing file's directory
/// - A `:` prefix resolves against the alias directory instead
/// - The component extension is appended when missing
#[derive(Debug, Clone)]
pub struct FileSystemResolver {
    alias_dir: Option<PathBuf>,
    extension: String,
}

impl Default for FileSystemResolver {
    fn default() -> Self {
        Self {
            alias_dir: None,
            extension: COMPONENT_EXTENSION.to_string(),
        }
    }
}

impl FileSystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.alias_dir = Some(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Where `import` referenced from `from_file` lives on disk.
    pub fn component_path(&self, from_file: &Path, import: &str) -> Result<PathBuf, ResolveError> {
        let (base, relative) = match import.strip_prefix(':') {
            Some(rest) => {
                let dir = self.alias_dir.as_deref().ok_or_else(|| ResolveError::NoAliasDir {
                    import: import.to_string(),
                })?;
                (dir, rest)
            }
            None => (from_file.parent().unwrap_or(Path::new(".")), import),
        };
        Ok(with_extension(&base.join(relative), &self.extension))
    }
}

impl ComponentResolver for FileSystemResolver {
    fn resolve(&self, from_file: &Path, import: &str) -> Result<ResolvedComponent, ResolveError> {
        let path = self.component_path(from_file, import)?;
        let source = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ResolveError::NotFound {
                    import: import.to_string(),
                }
            } else {
                ResolveError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        tracing::debug!(import, path = %path.display(), "resolved component");
        Ok(ResolvedComponent { path, source })
    }
}

/// Resolver that loads components from an in-memory map.
///
/// Keys are normalized the same way imports are: a leading `./` or `:` is
/// dropped and the extension appended when missing, so `"./card"`, `":card"`
/// and `"card.zare"` all name the same component.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    components: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the resolver.
    pub fn add(&mut self, name: &str, source: impl Into<String>) -> &mut Self {
        self.components.insert(memory_key(name), source.into());
        self
    }

    /// Create a resolver with the given components.
    pub fn with_components<'a>(
        components: impl IntoIterator<Item = (&'a str, impl Into<String>)>,
    ) -> Self {
        let mut resolver = Self::new();
        for (name, source) in components {
            resolver.add(name, source);
        }
        resolver
    }
}

impl ComponentResolver for MemoryResolver {
    fn resolve(&self, _from_file: &Path, import: &str) -> Result<ResolvedComponent, ResolveError> {
        let key = memory_key(import);
        match self.components.get(&key) {
            Some(source) => Ok(ResolvedComponent {
                path: PathBuf::from(key),
                source: source.clone(),
            }),
            None => Err(ResolveError::NotFound {
                import: import.to_string(),
            }),
        }
    }
}

fn memory_key(name: &str) -> String {
    let name = name.trim_start_matches(':');
    let name = name.strip_prefix("./").unwrap_or(name);
    with_extension(Path::new(name), COMPONENT_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

/// Append `.extension` unless the path already ends with it.
fn with_extension(path: &Path, extension: &str) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(extension) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Path resolution
    // =========================================================================

    #[test]
    fn test_relative_to_importing_file() {
        let resolver = FileSystemResolver::new();
        let path = resolver
            .component_path(Path::new("/views/pages/index.zare"), "../components/card")
            .unwrap();
        assert_eq!(path, PathBuf::from("/views/pages/../components/card.zare"));
    }

    #[test]
    fn test_existing_extension_kept() {
        let resolver = FileSystemResolver::new();
        let path = resolver
            .component_path(Path::new("/views/index.zare"), "./card.zare")
            .unwrap();
        assert_eq!(path, PathBuf::from("/views/./card.zare"));
    }

    #[test]
    fn test_dotted_name_gets_extension() {
        let resolver = FileSystemResolver::new();
        let path = resolver
            .component_path(Path::new("/views/index.zare"), "./card.v2")
            .unwrap();
        assert_eq!(path, PathBuf::from("/views/./card.v2.zare"));
    }

    #[test]
    fn test_alias_prefix() {
        let resolver = FileSystemResolver::new().with_alias_dir("/project/node_modules");
        let path = resolver
            .component_path(Path::new("/views/index.zare"), ":ui/button")
            .unwrap();
        assert_eq!(path, PathBuf::from("/project/node_modules/ui/button.zare"));
    }

    #[test]
    fn test_alias_without_dir() {
        let resolver = FileSystemResolver::new();
        let err = resolver
            .component_path(Path::new("/views/index.zare"), ":ui/button")
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoAliasDir { .. }));
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn test_filesystem_resolver_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("card.zare"), "serve (<div>card</div>)").unwrap();
        let page = dir.path().join("index.zare");

        let resolved = FileSystemResolver::new().resolve(&page, "./card").unwrap();
        assert_eq!(resolved.source, "serve (<div>card</div>)");
        assert_eq!(resolved.path, dir.path().join("./card.zare"));
    }

    #[test]
    fn test_filesystem_resolver_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSystemResolver::new()
            .resolve(&dir.path().join("index.zare"), "./nope")
            .unwrap_err();
        assert_eq!(err.to_string(), "Component `./nope` not found");
    }

    #[test]
    fn test_memory_resolver_normalizes_names() {
        let resolver = MemoryResolver::with_components([("card", "<b>card</b>")]);
        for import in ["card", "./card", ":card", "card.zare"] {
            let resolved = resolver.resolve(Path::new("index.zare"), import).unwrap();
            assert_eq!(resolved.source, "<b>card</b>");
            assert_eq!(resolved.path, PathBuf::from("card.zare"));
        }
        assert!(resolver.resolve(Path::new("index.zare"), "./other").is_err());
    }
}
