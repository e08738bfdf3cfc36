//! Chained symbol tables.
//!
//! Frames live in a `ScopeArena` and refer to their parent by index, so a
//! child parser can chain to its creator's scope without borrowing it.

/// Index of a frame in a `ScopeArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct Frame<T> {
    bindings: Vec<(String, T)>,
    parent: Option<ScopeId>,
}

/// Arena of scope frames for one namespace.
#[derive(Debug)]
pub struct ScopeArena<T> {
    frames: Vec<Frame<T>>,
}

impl<T> Default for ScopeArena<T> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<T> ScopeArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty frame chained to `parent`.
    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.frames.push(Frame {
            bindings: Vec::new(),
            parent,
        });
        ScopeId(self.frames.len() - 1)
    }

    /// Bind `name` in `scope` itself. Rebinding keeps the original position.
    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, value: T) {
        let name = name.into();
        let frame = &mut self.frames[scope.0];
        match frame.bindings.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => frame.bindings.push((name, value)),
        }
    }

    /// Look `name` up in `scope`, then its ancestors.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&T> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(value) = self.lookup_local(id, name) {
                return Some(value);
            }
            current = self.frames[id.0].parent;
        }
        None
    }

    /// Look `name` up in `scope` only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&T> {
        self.frames[scope.0]
            .bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.frames[scope.0].parent
    }

    /// The outermost ancestor of `scope`.
    pub fn root(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Bindings of `scope` itself, in definition order.
    pub fn entries(&self, scope: ScopeId) -> impl Iterator<Item = (&str, &T)> {
        self.frames[scope.0]
            .bindings
            .iter()
            .map(|(n, v)| (n.as_str(), v))
    }
}
