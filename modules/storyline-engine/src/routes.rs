//! First-match route table from path patterns to handler targets.

use storyline_store::{MutationEvent, PathParams, PathPattern, PatternError};

/// An event together with the route it resolved to and its bound captures.
#[derive(Debug)]
pub struct RoutedEvent<'a, T> {
    pub event: &'a MutationEvent,
    pub params: PathParams,
    pub route: &'a T,
}

impl<'a, T> RoutedEvent<'a, T> {
    /// A captured segment. Patterns and targets are registered together, so a
    /// missing name is a wiring bug reported as `None`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

/// Ordered `(pattern, target)` pairs. Matching is exact-arity and the first
/// matching entry wins.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    routes: Vec<(PathPattern, T)>,
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Builder-style registration from a pattern string.
    pub fn route(mut self, pattern: &str, target: T) -> Result<Self, PatternError> {
        self.routes.push((PathPattern::parse(pattern)?, target));
        Ok(self)
    }

    pub fn push(&mut self, pattern: PathPattern, target: T) {
        self.routes.push((pattern, target));
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PathPattern> {
        self.routes.iter().map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn resolve<'a>(&'a self, event: &'a MutationEvent) -> Option<RoutedEvent<'a, T>> {
        self.routes.iter().find_map(|(pattern, target)| {
            pattern.matches(&event.path).map(|params| RoutedEvent {
                event,
                params,
                route: target,
            })
        })
    }
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
