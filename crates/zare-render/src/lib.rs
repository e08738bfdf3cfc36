//! Zare Renderer
//!
//! Ties the pipeline together: lex the template, run the parser against a
//! session with a component resolver, then substitute the top-level
//! parameters into the result.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//!
//! let params = json!({ "name": "<Ada>" }).as_object().cloned().unwrap();
//! let html = zare_render::render("serve (<p>@(name)</p>)", &params, "page.zare").unwrap();
//! assert_eq!(html, "<p>&lt;Ada&gt;</p>");
//! ```

mod escape;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use zare_lexer::Scanner;
use zare_parser::{
    ComponentResolver, FileSystemResolver, Parser, Session, DEFAULT_MAX_DEPTH,
};

pub use escape::{escape_html, sanitize_parameters, RAW_PARAMETERS_KEY};
pub use zare_parser::{MemoryResolver, Params, ParseError};

/// Render failure.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// HTML-escape string parameters; the raw bag stays available as `_`.
    pub escape_parameters: bool,
    /// Maximum nesting of components, slots, branches and loops.
    pub max_depth: usize,
    /// Directory `:`-prefixed imports resolve against.
    pub alias_dir: Option<PathBuf>,
    pub component_extension: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            escape_parameters: true,
            max_depth: DEFAULT_MAX_DEPTH,
            alias_dir: None,
            component_extension: zare_parser::resolver::COMPONENT_EXTENSION.to_string(),
        }
    }
}

/// Renders templates with a fixed set of options and a component resolver.
pub struct Renderer {
    options: RenderOptions,
    resolver: Box<dyn ComponentResolver>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl Renderer {
    /// A renderer that loads components from the filesystem.
    pub fn new(options: RenderOptions) -> Self {
        let mut resolver =
            FileSystemResolver::new().with_extension(options.component_extension.as_str());
        if let Some(dir) = &options.alias_dir {
            resolver = resolver.with_alias_dir(dir);
        }
        Self {
            options,
            resolver: Box::new(resolver),
        }
    }

    /// Replace the component resolver.
    pub fn with_resolver(mut self, resolver: impl ComponentResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render `source`, read from `path`, with `parameters`.
    pub fn render(
        &self,
        source: &str,
        parameters: &Params,
        path: impl AsRef<Path>,
    ) -> Result<String, RenderError> {
        let path = path.as_ref().to_string_lossy();
        let parameters = if self.options.escape_parameters {
            sanitize_parameters(parameters)
        } else {
            parameters.clone()
        };

        let tokens = Scanner::tokenize(source, &path).map_err(ParseError::from)?;
        let mut session =
            Session::new(self.resolver.as_ref()).with_max_depth(self.options.max_depth);
        let html = Parser::new(&mut session, tokens, parameters, &path).render()?;

        tracing::debug!(path = %path, bytes = html.len(), "rendered template");
        Ok(html)
    }

    /// Read the template at `path` and render it.
    pub fn render_file(
        &self,
        path: impl AsRef<Path>,
        parameters: &Params,
    ) -> Result<String, RenderError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.render(&source, parameters, path)
    }
}

/// Render with default options and the filesystem resolver.
pub fn render(
    source: &str,
    parameters: &Params,
    path: impl AsRef<Path>,
) -> Result<String, RenderError> {
    Renderer::default().render(source, parameters, path)
}
