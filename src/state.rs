//! The in-memory dataset: arenas, uniqueness indexes, and invariant checks.

use crate::credential::{CredentialInstance, Method};
use crate::link::CredentialLink;
use crate::user::User;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// The full data model state operated on by the store and by schema
/// transformations.
///
/// Credential instances live in one arena keyed by `cid`; per-method
/// uniqueness (one instance per owner, one owner per identifier) is enforced
/// through the `(method, _)` indexes instead of duplicated per-method
/// tables. The `version` marker belongs to the evolution engine.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub(crate) users: HashMap<Uuid, User>,
    pub(crate) instances: HashMap<Uuid, CredentialInstance>,
    pub(crate) by_owner: HashMap<(Method, Uuid), Uuid>,
    pub(crate) by_identifier: HashMap<(Method, String), Uuid>,
    pub(crate) links: HashMap<Uuid, CredentialLink>,
    pub(crate) methods: BTreeSet<Method>,
    pub(crate) version: usize,
}

impl DataSet {
    /// True when the current schema carries `method`.
    #[must_use]
    pub fn is_active(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Number of instances held by `method`'s store.
    #[must_use]
    pub fn instance_count(&self, method: Method) -> usize {
        self.instances
            .values()
            .filter(|instance| instance.method == method)
            .count()
    }

    /// Number of link rows whose pointer for `method` is set.
    #[must_use]
    pub fn live_pointers(&self, method: Method) -> usize {
        self.links
            .values()
            .filter(|row| row.pointer(method).is_some())
            .count()
    }

    /// Mutable access to every credential instance, for transformations
    /// that backfill fields across the arena.
    pub fn instances_mut(&mut self) -> impl Iterator<Item = &mut CredentialInstance> {
        self.instances.values_mut()
    }

    /// Adds `method` to the schema and a null slot to every existing link
    /// row. Existing rows need no modification beyond the new slot.
    /// Returns false when the method was already active.
    pub fn activate_method(&mut self, method: Method) -> bool {
        if !self.methods.insert(method) {
            return false;
        }
        for row in self.links.values_mut() {
            row.add_slot(method);
        }
        true
    }

    /// Drops `method` from the schema: removes its slot from every link row
    /// and its instances from the arena. Owning users are untouched.
    /// Callers are responsible for the live-pointer policy check.
    pub(crate) fn deactivate_method(&mut self, method: Method) {
        self.methods.remove(&method);
        for row in self.links.values_mut() {
            row.remove_slot(method);
        }
        let dropped: Vec<Uuid> = self
            .instances
            .values()
            .filter(|instance| instance.method == method)
            .map(|instance| instance.cid)
            .collect();
        for cid in dropped {
            self.remove_instance(cid);
        }
    }

    /// Inserts an instance into the arena and both uniqueness indexes.
    /// Callers must have already checked for collisions.
    pub(crate) fn insert_instance(&mut self, instance: CredentialInstance) {
        self.by_owner
            .insert((instance.method, instance.uid), instance.cid);
        self.by_identifier
            .insert((instance.method, instance.identifier.clone()), instance.cid);
        self.instances.insert(instance.cid, instance);
    }

    /// Removes an instance from the arena and both indexes. Pointer cleanup
    /// is the caller's responsibility within the same critical section.
    pub(crate) fn remove_instance(&mut self, cid: Uuid) -> Option<CredentialInstance> {
        let instance = self.instances.remove(&cid)?;
        self.by_owner.remove(&(instance.method, instance.uid));
        self.by_identifier
            .remove(&(instance.method, instance.identifier.clone()));
        Some(instance)
    }

    /// Ensures a link row exists for `uid`, slotted for the active schema.
    pub(crate) fn link_row_mut(&mut self, uid: Uuid) -> &mut CredentialLink {
        let methods: Vec<Method> = self.methods.iter().copied().collect();
        self.links
            .entry(uid)
            .or_insert_with(|| CredentialLink::new(uid, methods))
    }

    /// Checks invariants 1-4 across the whole dataset. Mutating operations
    /// assert this at their commit boundary in debug builds; tests use it to
    /// observe that no intermediate state ever escapes the write lock.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        // Indexes and arena agree, and uniqueness holds both ways.
        for instance in self.instances.values() {
            if self.by_owner.get(&(instance.method, instance.uid)) != Some(&instance.cid) {
                return false;
            }
            if self
                .by_identifier
                .get(&(instance.method, instance.identifier.clone()))
                != Some(&instance.cid)
            {
                return false;
            }
            // Instances never outlive their owning user.
            if !self.users.contains_key(&instance.uid) {
                return false;
            }
        }
        if self.by_owner.len() != self.instances.len()
            || self.by_identifier.len() != self.instances.len()
        {
            return false;
        }

        for row in self.links.values() {
            if !self.users.contains_key(&row.uid) {
                return false;
            }
            // Rows carry exactly the active schema's slots.
            if row.methods().count() != self.methods.len()
                || row.methods().any(|method| !self.methods.contains(&method))
            {
                return false;
            }
            // Non-null pointers reference a live instance of the matching
            // method, owned by the row's user.
            for method in row.methods() {
                if let Some(cid) = row.pointer(method) {
                    match self.instances.get(&cid) {
                        Some(instance)
                            if instance.method == method && instance.uid == row.uid => {}
                        _ => return false,
                    }
                }
            }
        }
        true
    }
}
