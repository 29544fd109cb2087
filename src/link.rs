//! Per-user link rows mapping each method to its active credential.

use crate::credential::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The per-user record of which instance (if any) is the active
/// authenticator for each method.
///
/// One nullable slot per method carried by the current schema. Slots are
/// added and removed by schema transformations; credential operations only
/// set and clear the pointers inside them. The row is created lazily on a
/// user's first registration and destroyed only with the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialLink {
    pub(crate) uid: Uuid,
    pub(crate) pointers: BTreeMap<Method, Option<Uuid>>,
}

impl CredentialLink {
    pub(crate) fn new(uid: Uuid, methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            uid,
            pointers: methods.into_iter().map(|method| (method, None)).collect(),
        }
    }

    #[must_use]
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    /// The active instance for `method`, if the schema carries a slot for it
    /// and the slot is set.
    #[must_use]
    pub fn pointer(&self, method: Method) -> Option<Uuid> {
        self.pointers.get(&method).copied().flatten()
    }

    /// Methods with a slot in this row, in schema order.
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.pointers.keys().copied()
    }

    /// True when more than one method pointer is set.
    #[must_use]
    pub fn has_multiple_credentials(&self) -> bool {
        self.pointers.values().filter(|slot| slot.is_some()).count() > 1
    }

    /// True when every slot is null; the owning user is then deletable.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.pointers.values().all(Option::is_none)
    }

    pub(crate) fn set_pointer(&mut self, method: Method, cid: Uuid) {
        self.pointers.insert(method, Some(cid));
    }

    pub(crate) fn clear_pointer(&mut self, method: Method) {
        if let Some(slot) = self.pointers.get_mut(&method) {
            *slot = None;
        }
    }

    pub(crate) fn add_slot(&mut self, method: Method) {
        self.pointers.entry(method).or_insert(None);
    }

    pub(crate) fn remove_slot(&mut self, method: Method) {
        self.pointers.remove(&method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_is_null_until_set() {
        let uid = Uuid::new_v4();
        let mut row = CredentialLink::new(uid, [Method::EmailPassword, Method::GithubOauth]);
        assert!(row.is_clear());
        assert_eq!(row.pointer(Method::EmailPassword), None);

        let cid = Uuid::new_v4();
        row.set_pointer(Method::EmailPassword, cid);
        assert_eq!(row.pointer(Method::EmailPassword), Some(cid));
        assert!(!row.is_clear());

        row.clear_pointer(Method::EmailPassword);
        assert!(row.is_clear());
    }

    #[test]
    fn pointer_for_missing_slot_is_null() {
        let row = CredentialLink::new(Uuid::new_v4(), [Method::EmailPassword]);
        assert_eq!(row.pointer(Method::GithubOauth), None);
    }

    #[test]
    fn counts_multiple_credentials() {
        let mut row = CredentialLink::new(Uuid::new_v4(), Method::ALL);
        assert!(!row.has_multiple_credentials());
        row.set_pointer(Method::EmailPassword, Uuid::new_v4());
        assert!(!row.has_multiple_credentials());
        row.set_pointer(Method::UsernamePassword, Uuid::new_v4());
        assert!(row.has_multiple_credentials());
    }

    #[test]
    fn slots_follow_schema_changes() {
        let mut row = CredentialLink::new(Uuid::new_v4(), [Method::EmailPassword]);
        row.add_slot(Method::GithubOauth);
        assert_eq!(row.methods().count(), 2);

        // Adding an existing slot must not wipe its pointer.
        let cid = Uuid::new_v4();
        row.set_pointer(Method::GithubOauth, cid);
        row.add_slot(Method::GithubOauth);
        assert_eq!(row.pointer(Method::GithubOauth), Some(cid));

        row.remove_slot(Method::GithubOauth);
        assert_eq!(row.methods().count(), 1);
    }
}
