//! State shared by every parser of one render.
//!
//! A `Session` owns the four scope arenas, the component definitions created
//! by `as X import`, the resolver used to load them and the render-depth
//! counter. Parsers refer to their frames by `ScopeId` and borrow the session
//! mutably while they run, so a nested parser can define into a frame its
//! creator also sees.

use std::rc::Rc;

use zare_lexer::Token;

use crate::function::Function;
use crate::resolver::ComponentResolver;
use crate::scope::{ScopeArena, ScopeId};

/// Maximum nesting of components, slots, branches and loops.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Index of a component definition in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

/// The frames a parser defines into and looks names up from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSet {
    pub components: ScopeId,
    pub links: ScopeId,
    pub scripts: ScopeId,
    pub functions: ScopeId,
}

/// An imported component. The token stream is kept so every invocation
/// re-parses it with the caller's parameters; the scopes persist across
/// invocations.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub name: String,
    pub tokens: Rc<[Token]>,
    pub file_path: String,
    pub scopes: ScopeSet,
}

pub struct Session<'r> {
    resolver: &'r dyn ComponentResolver,
    pub(crate) components: ScopeArena<ComponentId>,
    pub(crate) links: ScopeArena<String>,
    pub(crate) scripts: ScopeArena<String>,
    pub(crate) functions: ScopeArena<Rc<Function>>,
    definitions: Vec<ComponentDef>,
    depth: usize,
    max_depth: usize,
}

impl<'r> Session<'r> {
    pub fn new(resolver: &'r dyn ComponentResolver) -> Self {
        Self {
            resolver,
            components: ScopeArena::new(),
            links: ScopeArena::new(),
            scripts: ScopeArena::new(),
            functions: ScopeArena::new(),
            definitions: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn resolver(&self) -> &'r dyn ComponentResolver {
        self.resolver
    }

    pub fn component(&self, id: ComponentId) -> Option<&ComponentDef> {
        self.definitions.get(id.0)
    }

    /// Fresh, unchained frames for a top-level parser.
    pub(crate) fn root_scopes(&mut self) -> ScopeSet {
        ScopeSet {
            components: self.components.alloc(None),
            links: self.links.alloc(None),
            scripts: self.scripts.alloc(None),
            functions: self.functions.alloc(None),
        }
    }

    /// Frames for a component imported by a parser using `importer`: link
    /// and script frames chain to the importer's, the others start empty.
    pub(crate) fn component_scopes(&mut self, importer: ScopeSet) -> ScopeSet {
        ScopeSet {
            components: self.components.alloc(None),
            links: self.links.alloc(Some(importer.links)),
            scripts: self.scripts.alloc(Some(importer.scripts)),
            functions: self.functions.alloc(None),
        }
    }

    /// Frames for a branch or loop body: components and functions chain to
    /// the enclosing parser's, links and scripts are shared.
    pub(crate) fn block_scopes(&mut self, outer: ScopeSet) -> ScopeSet {
        ScopeSet {
            components: self.components.alloc(Some(outer.components)),
            links: outer.links,
            scripts: outer.scripts,
            functions: self.functions.alloc(Some(outer.functions)),
        }
    }

    pub(crate) fn define_component(&mut self, def: ComponentDef) -> ComponentId {
        self.definitions.push(def);
        ComponentId(self.definitions.len() - 1)
    }

    pub(crate) fn function(&self, scope: ScopeId, name: &str) -> Option<Rc<Function>> {
        self.functions.lookup(scope, name).cloned()
    }

    /// Enter one render level. `false` when that would exceed `max_depth`.
    pub(crate) fn enter(&mut self) -> bool {
        if self.depth >= self.max_depth {
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
