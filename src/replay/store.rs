//! Persistence seam for calculator states.

use crate::domain::{Decimal, SubjectId};
use std::collections::HashMap;

/// Identifies one calculator state: the subject it belongs to and the calculator kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub subject: SubjectId,
    pub kind: &'static str,
}

impl StateKey {
    pub fn new(subject: SubjectId, kind: &'static str) -> Self {
        Self { subject, kind }
    }
}

/// Storage for opaque flat state vectors, one per [`StateKey`].
///
/// Implementations only persist and return what they were given.
pub trait StateStore {
    fn load(&self, key: &StateKey) -> Option<Vec<Decimal>>;

    fn save(&mut self, key: StateKey, values: Vec<Decimal>);
}

/// In-process store backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: HashMap<StateKey, Vec<Decimal>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &StateKey) -> Option<Vec<Decimal>> {
        self.states.get(key).cloned()
    }

    fn save(&mut self, key: StateKey, values: Vec<Decimal>) {
        self.states.insert(key, values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let mut store = MemoryStateStore::new();
        let key = StateKey::new(SubjectId::new("p1".to_string()), "pnl");
        assert_eq!(store.load(&key), None);

        store.save(key.clone(), vec![Decimal::one()]);
        assert_eq!(store.load(&key), Some(vec![Decimal::one()]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_kinds_are_separate() {
        let mut store = MemoryStateStore::new();
        let subject = SubjectId::new("p1".to_string());
        store.save(StateKey::new(subject.clone(), "pnl"), vec![Decimal::one()]);
        assert_eq!(store.load(&StateKey::new(subject, "apr")), None);
    }
}
