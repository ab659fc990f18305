// SPDX-License-Identifier: MPL-2.0

use crate::mirror::StorageTier;
use std::collections::HashMap;
use std::sync::Mutex;

/// Session-scoped mirror tier: a plain in-process map.
///
/// The native analog of tab-scoped storage. Cheap to hit, gone on
/// restart, and discarded wholesale when the sync timestamp goes stale.
#[derive(Default)]
pub struct SessionTier {
    map: Mutex<HashMap<String, String>>,
}

impl SessionTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything in the tier (stale-session invalidation).
    pub fn clear(&self) {
        self.map.lock().expect("session lock poisoned").clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().expect("session lock poisoned").is_empty()
    }
}

impl StorageTier for SessionTier {
    fn get(&self, key: &str) -> Option<String> {
        self.map
            .lock()
            .expect("session lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map
            .lock()
            .expect("session lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map.lock().expect("session lock poisoned").remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_empties_tier() {
        let tier = SessionTier::new();
        tier.set("a", "1");
        tier.set("b", "2");
        assert!(!tier.is_empty());

        tier.clear();
        assert!(tier.is_empty());
        assert_eq!(tier.get("a"), None);
    }
}
