use std::collections::HashMap;
use std::hash::Hash;
use stepwise_types::{EntityTag, InvariantError};

/// Maps host entity identities to dense tags, handed out from 1 in
/// first-seen order. Tags are never revoked or reused.
pub struct IdentityRegistry<K> {
    tags: HashMap<K, EntityTag>,
    next_tag: EntityTag,
}

impl<K: Eq + Hash> IdentityRegistry<K> {
    pub fn new() -> Self {
        Self {
            tags: HashMap::new(),
            next_tag: EntityTag::FIRST,
        }
    }

    pub fn resolve(&mut self, key: K) -> Result<EntityTag, InvariantError> {
        if let Some(tag) = self.tags.get(&key) {
            return Ok(*tag);
        }
        let tag = self.next_tag;
        self.next_tag = tag.next()?;
        self.tags.insert(key, tag);
        Ok(tag)
    }

    pub fn get(&self, key: &K) -> Option<EntityTag> {
        self.tags.get(key).copied()
    }

    /// The tag the next unseen entity will receive.
    pub fn next_tag(&self) -> EntityTag {
        self.next_tag
    }

    /// Number of distinct entities observed so far.
    pub fn len(&self) -> u64 {
        self.next_tag.get() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Default for IdentityRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_resolves_to_same_tag() {
        let mut registry = IdentityRegistry::new();
        let first = registry.resolve("main").expect("tag");
        let again = registry.resolve("main").expect("tag");
        assert_eq!(first, again);
        assert_eq!(first.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_keys_get_dense_tags_in_first_seen_order() {
        let mut registry = IdentityRegistry::new();
        let keys = [30u64, 10, 20, 10, 30, 40];
        let tags: Vec<u64> = keys
            .iter()
            .map(|key| registry.resolve(*key).expect("tag").get())
            .collect();
        assert_eq!(tags, vec![1, 2, 3, 2, 1, 4]);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.next_tag().get(), 5);
        assert_eq!(registry.get(&20).map(EntityTag::get), Some(3));
        assert_eq!(registry.get(&99), None);
    }

    #[test]
    fn empty_registry_counts_zero_entities() {
        let registry: IdentityRegistry<u64> = IdentityRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.next_tag(), EntityTag::FIRST);
    }
}
