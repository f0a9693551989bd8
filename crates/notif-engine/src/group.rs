// Group Index: derived map from group key to member identifiers, used for
// batch group cancellation. Holds references only, never entry ownership.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// Maps group keys to sets of notification identifiers.
///
/// Purely derived from the registry; membership is added on grouped
/// schedules and removed opportunistically when entries go away. Empty
/// groups are pruned eagerly. The index has its own lock, which is never
/// held across platform or file-system calls.
#[derive(Default)]
pub struct GroupIndex {
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, group: &str, identifier: &str) {
        self.groups
            .lock()
            .entry(group.to_string())
            .or_default()
            .insert(identifier.to_string());
    }

    /// Remove an identifier from every group it appears in.
    ///
    /// O(groups) worst case, acceptable since group counts stay small.
    /// Removing an absent identifier is a no-op.
    pub fn remove_member(&self, identifier: &str) {
        let mut groups = self.groups.lock();
        groups.retain(|_, members| {
            members.remove(identifier);
            !members.is_empty()
        });
    }

    /// Drop an entire group, returning its members.
    pub fn remove_group(&self, group: &str) -> Vec<String> {
        self.groups
            .lock()
            .remove(group)
            .map(|members| members.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn members_of(&self, group: &str) -> Vec<String> {
        self.groups
            .lock()
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_of(&self, group: &str) -> usize {
        self.groups.lock().get(group).map_or(0, HashSet::len)
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn clear(&self) {
        self.groups.lock().clear();
    }
}
