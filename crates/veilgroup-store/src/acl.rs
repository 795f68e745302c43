//! The access-control list.
//!
//! A set of `(handle, principal)` grants. Grants are monotonic: there is no
//! revoke, and granting twice is a no-op.

use std::collections::HashSet;

use veilgroup_core::{Handle, Principal};

/// In-memory access-control list.
#[derive(Debug, Clone, Default)]
pub struct AccessControlList {
    grants: HashSet<(Handle, Principal)>,
}

impl AccessControlList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `principal` decrypt permission on `handle`.
    ///
    /// Returns `true` if the grant is new.
    pub fn grant(&mut self, handle: Handle, principal: Principal) -> bool {
        self.grants.insert((handle, principal))
    }

    /// Drop a grant made earlier in a transaction that is being unwound.
    pub(crate) fn rollback_grant(&mut self, handle: &Handle, principal: &Principal) {
        self.grants.remove(&(*handle, *principal));
    }

    /// Whether `principal` holds a grant on `handle`.
    pub fn is_granted(&self, handle: &Handle, principal: &Principal) -> bool {
        self.grants.contains(&(*handle, *principal))
    }

    /// Number of grants held.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether no grant has been made.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_grant_is_idempotent() {
        let mut acl = AccessControlList::new();
        let handle = Handle::from_bytes([1; 32]);
        let alice = Principal::from_bytes([2; 32]);

        assert!(!acl.is_granted(&handle, &alice));
        assert!(acl.grant(handle, alice));
        assert!(!acl.grant(handle, alice));
        assert!(acl.is_granted(&handle, &alice));
        assert_eq!(acl.len(), 1);
    }

    #[test]
    fn test_grants_are_per_pair() {
        let mut acl = AccessControlList::new();
        let h1 = Handle::from_bytes([1; 32]);
        let h2 = Handle::from_bytes([2; 32]);
        let alice = Principal::from_bytes([3; 32]);
        let bob = Principal::from_bytes([4; 32]);

        acl.grant(h1, alice);

        assert!(!acl.is_granted(&h2, &alice));
        assert!(!acl.is_granted(&h1, &bob));
    }

    proptest! {
        #[test]
        fn prop_len_counts_distinct_pairs(
            pairs in prop::collection::vec((0u8..8, 0u8..8), 0..64),
        ) {
            let mut acl = AccessControlList::new();
            let mut fresh = 0;
            for (h, p) in &pairs {
                if acl.grant(Handle::from_bytes([*h; 32]), Principal::from_bytes([*p; 32])) {
                    fresh += 1;
                }
            }

            let distinct: HashSet<_> = pairs.iter().collect();
            prop_assert_eq!(acl.len(), distinct.len());
            prop_assert_eq!(fresh, distinct.len());
            for (h, p) in &pairs {
                prop_assert!(
                    acl.is_granted(&Handle::from_bytes([*h; 32]), &Principal::from_bytes([*p; 32]))
                );
            }
        }
    }
}
