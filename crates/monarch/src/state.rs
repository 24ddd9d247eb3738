//! State stacks, lexical line states and their interning cache.
//!
//! A [`StateStack`] is an immutable, reference-counted chain of state names
//! whose bottom element is the grammar's start state. A [`LexicalState`] pairs
//! a stack with an optional [`EmbeddedContext`] and is what a host keeps per
//! line. Both are cheap to clone and compare structurally, short-circuiting on
//! pointer identity.
//!
//! The [`StateCache`] interns shallow stacks and line states so that two lines
//! ending in the same context share one object. Deep stacks and line states
//! inside an embedded language are allocated fresh every time.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::trace;

/// Stacks deeper than this are never interned.
pub const CACHE_STACK_DEPTH: usize = 5;

#[derive(Debug)]
struct StackElement {
    parent: Option<StateStack>,
    state: SmolStr,
    depth: usize,
}

/// An immutable stack of state names.
#[derive(Clone)]
pub struct StateStack(Arc<StackElement>);

impl StateStack {
    fn new(parent: Option<StateStack>, state: &str) -> Self {
        let depth = parent.as_ref().map_or(1, |parent| parent.depth() + 1);
        Self(Arc::new(StackElement {
            parent,
            state: SmolStr::new(state),
            depth,
        }))
    }

    /// The state on top of the stack.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.0.state
    }

    /// The number of states on the stack, at least one.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// The stack below the top state, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&StateStack> {
        self.0.parent.as_ref()
    }

    /// Returns `true` if only the start state is left.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Drops the top state. Returns `None` when the stack is already at its root.
    #[must_use]
    pub fn pop(&self) -> Option<StateStack> {
        self.0.parent.clone()
    }

    /// Drops every state but the bottom one.
    #[must_use]
    pub fn pop_to_root(&self) -> StateStack {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.clone()
    }

    /// The state names from the top of the stack down to the root.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(Some(self), |stack| stack.parent()).map(StateStack::state)
    }

    /// Returns `true` if both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The interning key: state names from the root up to the top.
    fn key(&self) -> Vec<SmolStr> {
        let mut key: Vec<SmolStr> = std::iter::successors(Some(self), |stack| stack.parent())
            .map(|stack| stack.0.state.clone())
            .collect();
        key.reverse();
        key
    }
}

impl PartialEq for StateStack {
    fn eq(&self, other: &Self) -> bool {
        let (mut left, mut right) = (self, other);
        loop {
            if left.ptr_eq(right) {
                return true;
            }
            if left.depth() != right.depth() || left.0.state != right.0.state {
                return false;
            }
            match (left.parent(), right.parent()) {
                (Some(l), Some(r)) => (left, right) = (l, r),
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl Eq for StateStack {}

impl Hash for StateStack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth().hash(state);
        for name in self.states() {
            name.hash(state);
        }
    }
}

impl fmt::Debug for StateStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<&str> = self.states().collect();
        states.reverse();
        f.debug_tuple("StateStack").field(&states).finish()
    }
}

/// The state of an embedded language active at the end of a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddedContext {
    /// The embedded language's id.
    pub language_id: SmolStr,

    /// The embedded tokenizer's own state, or `None` if the language is unknown.
    pub state: Option<LexicalState>,
}

#[derive(Debug)]
struct LineState {
    stack: StateStack,
    embedded: Option<EmbeddedContext>,
}

/// The opaque state carried from the end of one line to the start of the next.
#[derive(Clone)]
pub struct LexicalState(Arc<LineState>);

impl LexicalState {
    /// The host grammar's state stack.
    #[must_use]
    pub fn stack(&self) -> &StateStack {
        &self.0.stack
    }

    /// The embedded language active at this point, if any.
    #[must_use]
    pub fn embedded(&self) -> Option<&EmbeddedContext> {
        self.0.embedded.as_ref()
    }

    /// Returns `true` if both handles point at the same snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for LexicalState {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.stack == other.0.stack && self.0.embedded == other.0.embedded)
    }
}

impl Eq for LexicalState {}

impl Hash for LexicalState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.stack.hash(state);
        self.0.embedded.hash(state);
    }
}

impl fmt::Debug for LexicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalState")
            .field("stack", &self.0.stack)
            .field("embedded", &self.0.embedded)
            .finish()
    }
}

/// Interning tables for stacks and line states, owned by one tokenizer.
#[derive(Debug, Default)]
pub struct StateCache {
    stacks: FxHashMap<Vec<SmolStr>, StateStack>,
    line_states: FxHashMap<Vec<SmolStr>, LexicalState>,
}

impl StateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-element stack holding `state`.
    pub fn root(&mut self, state: &str) -> StateStack {
        self.create(None, state)
    }

    /// Pushes `state` on top of `parent`.
    pub fn push(&mut self, parent: &StateStack, state: &str) -> StateStack {
        self.create(Some(parent), state)
    }

    /// Replaces the top of `stack` with `state`.
    pub fn switch_to(&mut self, stack: &StateStack, state: &str) -> StateStack {
        if stack.state() == state {
            return stack.clone();
        }
        self.create(stack.parent(), state)
    }

    fn create(&mut self, parent: Option<&StateStack>, state: &str) -> StateStack {
        if parent.is_some_and(|parent| parent.depth() >= CACHE_STACK_DEPTH) {
            return StateStack::new(parent.cloned(), state);
        }

        let mut key = parent.map(StateStack::key).unwrap_or_default();
        key.push(SmolStr::new(state));
        if let Some(stack) = self.stacks.get(&key) {
            return stack.clone();
        }

        trace!(state, depth = key.len(), "state stack cache miss");
        let stack = StateStack::new(parent.cloned(), state);
        self.stacks.insert(key, stack.clone());
        stack
    }

    /// Wraps `stack` and `embedded` into a line state.
    ///
    /// Line states are interned only when no embedded language is active and
    /// the stack is shallow enough to be interned itself.
    pub fn line_state(
        &mut self,
        stack: StateStack,
        embedded: Option<EmbeddedContext>,
    ) -> LexicalState {
        if embedded.is_some() || stack.depth() >= CACHE_STACK_DEPTH {
            return LexicalState(Arc::new(LineState { stack, embedded }));
        }

        let key = stack.key();
        if let Some(state) = self.line_states.get(&key) {
            return state.clone();
        }

        trace!(depth = key.len(), "line state cache miss");
        let state = LexicalState(Arc::new(LineState {
            stack,
            embedded: None,
        }));
        self.line_states.insert(key, state.clone());
        state
    }

    /// The number of interned stacks.
    #[must_use]
    pub fn cached_stacks(&self) -> usize {
        self.stacks.len()
    }

    /// The number of interned line states.
    #[must_use]
    pub fn cached_line_states(&self) -> usize {
        self.line_states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(cache: &mut StateCache, states: &[&str]) -> StateStack {
        let mut stack = cache.root(states[0]);
        for state in &states[1..] {
            stack = cache.push(&stack, state);
        }
        stack
    }

    #[test]
    fn test_shallow_stacks_are_shared() {
        let mut cache = StateCache::new();
        let a = chain(&mut cache, &["root", "string", "escape"]);
        let b = chain(&mut cache, &["root", "string", "escape"]);
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_eq!(cache.cached_stacks(), 3);
        assert_eq!(a.states().collect::<Vec<_>>(), ["escape", "string", "root"]);
    }

    #[test]
    fn test_deep_stacks_are_equal_but_not_shared() {
        let mut cache = StateCache::new();
        let names = ["root", "a", "b", "c", "d", "e", "f"];
        let a = chain(&mut cache, &names);
        let b = chain(&mut cache, &names);
        assert_eq!(a.depth(), 7);
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        // The shared prefix is still interned.
        let shared_a = a.parent().and_then(StateStack::parent).unwrap();
        let shared_b = b.parent().and_then(StateStack::parent).unwrap();
        assert!(shared_a.ptr_eq(shared_b));
        assert!(!a.parent().unwrap().ptr_eq(b.parent().unwrap()));
        assert_eq!(cache.cached_stacks(), CACHE_STACK_DEPTH);
    }

    #[test]
    fn test_stacks_from_separate_caches_compare_structurally() {
        let a = chain(&mut StateCache::new(), &["root", "string"]);
        let b = chain(&mut StateCache::new(), &["root", "string"]);
        let c = chain(&mut StateCache::new(), &["root", "comment"]);
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_pop_switch_and_pop_to_root() {
        let mut cache = StateCache::new();
        let stack = chain(&mut cache, &["root", "string", "escape"]);
        let popped = stack.pop().unwrap();
        assert_eq!(popped.state(), "string");
        assert!(stack.pop_to_root().is_root());
        assert_eq!(stack.pop_to_root().state(), "root");
        assert!(cache.root("root").pop().is_none());

        let switched = cache.switch_to(&stack, "unicode");
        assert_eq!(switched.states().collect::<Vec<_>>(), ["unicode", "string", "root"]);
        assert!(cache.switch_to(&stack, "escape").ptr_eq(&stack));
    }

    #[test]
    fn test_line_states_are_interned_without_embedding() {
        let mut cache = StateCache::new();
        let stack = chain(&mut cache, &["root", "string"]);
        let a = cache.line_state(stack.clone(), None);
        let b = cache.line_state(stack.clone(), None);
        assert!(a.ptr_eq(&b));
        assert_eq!(cache.cached_line_states(), 1);

        let embedded = EmbeddedContext {
            language_id: "js".into(),
            state: None,
        };
        let c = cache.line_state(stack.clone(), Some(embedded.clone()));
        let d = cache.line_state(stack, Some(embedded));
        assert!(!c.ptr_eq(&d));
        assert_eq!(c, d);
        assert_ne!(a, c);
        assert_eq!(cache.cached_line_states(), 1);
    }
}
