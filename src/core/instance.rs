//! Instance tracking - Every LogicalName ever started, running or not

use std::collections::HashSet;

use super::catalog::ServerKind;

/// Remembrance ledger of LogicalNames.
///
/// A name stays here after its process exits so the status view can show it as
/// known-but-stopped. Only an explicit remove forgets it.
#[derive(Debug, Clone, Default)]
pub struct InstanceTracker {
    names: HashSet<String>,
}

impl InstanceTracker {
    /// Remember a name; returns false if it was already known
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Forget a name; returns whether it was known
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn all(&self) -> &HashSet<String> {
        &self.names
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Instance numbers tracked for `kind`, unsorted
    pub fn instances_of(&self, kind: &ServerKind) -> Vec<u32> {
        self.names
            .iter()
            .filter_map(|name| parse_instance(kind, name))
            .collect()
    }
}

/// Parse `<kind>_<n>` into `n`; anything else (including other kinds that share a
/// prefix, like `SKYBLOCK_DUNGEON_HUB_0` vs `SKYBLOCK_DUNGEON`) yields `None`
pub fn parse_instance(kind: &ServerKind, name: &str) -> Option<u32> {
    name.strip_prefix(kind.name)?
        .strip_prefix('_')?
        .parse::<u32>()
        .ok()
}
