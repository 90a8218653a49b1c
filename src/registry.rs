use std::collections::HashMap;

use crate::ast::Prototype;

/// The most recent prototype seen for each function name, kept for the whole
/// session. Later declarations replace earlier ones; nothing is ever removed.
#[derive(Debug, Default, Clone)]
pub struct PrototypeRegistry {
    prototypes: HashMap<String, Prototype>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// store `prototype` under its own name, returning whatever it replaced
    pub fn put(&mut self, prototype: Prototype) -> Option<Prototype> {
        self.prototypes.insert(prototype.name.clone(), prototype)
    }

    pub fn get(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.get(name).map(Prototype::arity)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// prototypes ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &Prototype> {
        let mut prototypes: Vec<&Prototype> = self.prototypes.values().collect();
        prototypes.sort_by(|a, b| a.name.cmp(&b.name));
        prototypes.into_iter()
    }
}
