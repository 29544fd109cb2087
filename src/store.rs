//! The store façade: user registry, per-method credential stores, and the
//! link table behind one serializable write lock.

use crate::credential::{CredentialInstance, Method};
use crate::error::{Error, Result};
use crate::link::CredentialLink;
use crate::state::DataSet;
use crate::user::User;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Handle to the identity-and-credential dataset.
///
/// Clones are cheap and share the same state. Every mutating operation
/// validates its preconditions in full before touching state and runs under
/// a single write guard, so a failed call leaves no partial change and
/// concurrent mutations serialize: two racing `register` calls for the same
/// identifier resolve to exactly one success. The guard is never held across
/// an await point.
#[derive(Clone)]
pub struct AuthStore {
    state: Arc<RwLock<DataSet>>,
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStore {
    /// A store whose schema carries every known method.
    #[must_use]
    pub fn new() -> Self {
        Self::with_methods(Method::ALL)
    }

    /// A store whose schema starts with the given methods; the rest can be
    /// added later through the evolution engine.
    #[must_use]
    pub fn with_methods(methods: impl IntoIterator<Item = Method>) -> Self {
        let state = DataSet {
            methods: methods.into_iter().collect(),
            ..DataSet::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub(crate) fn state(&self) -> &Arc<RwLock<DataSet>> {
        &self.state
    }

    // --- user registry -----------------------------------------------------

    /// Creates a user with opaque profile metadata and returns its uid.
    pub async fn create_user(&self, metadata: Option<Value>) -> Uuid {
        let user = User::new(metadata);
        let uid = user.uid();
        let mut state = self.state.write().await;
        state.users.insert(uid, user);
        info!(%uid, "created user");
        uid
    }

    /// Looks up a user by uid.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown uid.
    pub async fn user(&self, uid: Uuid) -> Result<User> {
        let state = self.state.read().await;
        state
            .users
            .get(&uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown user {uid}")))
    }

    /// True only if every method pointer for `uid` is null (or the user has
    /// never registered a method). The registry consults this before
    /// destroying a user.
    pub async fn can_delete_user(&self, uid: Uuid) -> bool {
        let state = self.state.read().await;
        state.links.get(&uid).is_none_or(CredentialLink::is_clear)
    }

    /// Deletes a user after full credential teardown.
    ///
    /// Remaining unlinked instances and the link row are torn down together
    /// with the user in one critical section, so nothing is orphaned.
    ///
    /// # Errors
    /// Returns `ReferentialIntegrityViolation` while any method pointer is
    /// still set, `NotFound` for an unknown uid.
    pub async fn delete_user(&self, uid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&uid) {
            return Err(Error::NotFound(format!("unknown user {uid}")));
        }
        if let Some(row) = state.links.get(&uid) {
            if !row.is_clear() {
                return Err(Error::ReferentialIntegrityViolation);
            }
        }
        let owned: Vec<Uuid> = state
            .instances
            .values()
            .filter(|instance| instance.uid == uid)
            .map(CredentialInstance::cid)
            .collect();
        for cid in owned {
            state.remove_instance(cid);
        }
        state.links.remove(&uid);
        state.users.remove(&uid);
        debug_assert!(state.invariants_hold());
        info!(%uid, "deleted user");
        Ok(())
    }

    // --- credential method stores -------------------------------------------

    /// Registers a `method` credential for `uid` and returns the new cid.
    ///
    /// The instance starts unverified and enabled with all timestamps set to
    /// now. The user's link row is created (lazily, with null slots) but the
    /// new instance is **not** linked; callers decide when it becomes the
    /// active authenticator.
    ///
    /// # Errors
    /// `DuplicateIdentity` when the identifier is taken within the method,
    /// `AlreadyRegistered` when the user already has an instance for it,
    /// `MethodNotActive` when the schema does not carry the method,
    /// `NotFound` for an unknown user.
    pub async fn register(
        &self,
        uid: Uuid,
        method: Method,
        identifier: &str,
        secret: SecretString,
    ) -> Result<Uuid> {
        let mut state = self.state.write().await;
        let cid = Self::register_locked(&mut state, uid, method, identifier, secret)?;
        debug_assert!(state.invariants_hold());
        info!(%uid, %cid, %method, "registered credential");
        Ok(cid)
    }

    /// Overwrites the secret material and bumps `last_update`. The
    /// verification state is untouched.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn update_secret(&self, cid: Uuid, new_secret: SecretString) -> Result<()> {
        let mut state = self.state.write().await;
        let instance = Self::instance_mut(&mut state, cid)?;
        instance.secret = new_secret;
        instance.last_update = Utc::now();
        debug!(%cid, "updated secret material");
        Ok(())
    }

    /// Marks the instance verified. Idempotent; set by an external
    /// verification collaborator and never moved back by normal operation.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn mark_verified(&self, cid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let instance = Self::instance_mut(&mut state, cid)?;
        if !instance.verified {
            instance.verified = true;
            instance.last_update = Utc::now();
            debug!(%cid, "marked credential verified");
        }
        Ok(())
    }

    /// Toggles the administrative disabled flag. Idempotent. Disabled
    /// instances stay linkable for introspection; authentication
    /// collaborators must reject them.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn set_disabled(&self, cid: Uuid, disabled: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let instance = Self::instance_mut(&mut state, cid)?;
        if instance.disabled != disabled {
            instance.disabled = disabled;
            instance.last_update = Utc::now();
            info!(%cid, disabled, "toggled credential");
        }
        Ok(())
    }

    /// Records a successful authentication against the instance.
    ///
    /// # Errors
    /// Returns `Disabled` for a disabled instance, `NotFound` for an unknown
    /// cid. Authentication collaborators must call this before honoring the
    /// credential, so disabled instances are rejected here.
    pub async fn touch_authentication(&self, cid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let instance = Self::instance_mut(&mut state, cid)?;
        if instance.disabled {
            return Err(Error::Disabled);
        }
        instance.last_authentication = Utc::now();
        Ok(())
    }

    /// Deletes the instance and clears any link pointer to it, both inside
    /// the same critical section so no dangling reference is observable.
    /// The owning user is never touched.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn delete_credential(&self, cid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(instance) = state.remove_instance(cid) else {
            return Err(Error::NotFound(format!("unknown credential {cid}")));
        };
        if let Some(row) = state.links.get_mut(&instance.uid) {
            if row.pointer(instance.method) == Some(cid) {
                row.clear_pointer(instance.method);
            }
        }
        debug_assert!(state.invariants_hold());
        info!(uid = %instance.uid, %cid, method = %instance.method, "deleted credential");
        Ok(())
    }

    /// Looks up an instance by cid.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn credential(&self, cid: Uuid) -> Result<CredentialInstance> {
        let state = self.state.read().await;
        state
            .instances
            .get(&cid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown credential {cid}")))
    }

    /// Looks up the instance `uid` holds for `method`, linked or not.
    ///
    /// # Errors
    /// Returns `NotFound` when the user has no instance for the method.
    pub async fn credential_for(&self, uid: Uuid, method: Method) -> Result<CredentialInstance> {
        let state = self.state.read().await;
        state
            .by_owner
            .get(&(method, uid))
            .and_then(|cid| state.instances.get(cid))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user has no {method} credential")))
    }

    /// Resolves a method-natural identifier (username, email, provider id)
    /// to its instance.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown identifier.
    pub async fn find_by_identifier(
        &self,
        method: Method,
        identifier: &str,
    ) -> Result<CredentialInstance> {
        let state = self.state.read().await;
        state
            .by_identifier
            .get(&(method, identifier.to_string()))
            .and_then(|cid| state.instances.get(cid))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no {method} credential for {identifier:?}")))
    }

    /// The user owning an instance.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown cid.
    pub async fn owner(&self, cid: Uuid) -> Result<User> {
        let state = self.state.read().await;
        let instance = state
            .instances
            .get(&cid)
            .ok_or_else(|| Error::NotFound(format!("unknown credential {cid}")))?;
        state
            .users
            .get(&instance.uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown user {}", instance.uid)))
    }

    // --- credential link table ----------------------------------------------

    /// Points `uid`'s slot for `method` at `cid`, creating the link row if
    /// absent. Overwrites any previous pointer without deleting the previous
    /// instance; callers decide whether to also delete it.
    ///
    /// # Errors
    /// `ReferenceNotFound` when the cid does not exist or belongs to another
    /// user, `MethodMismatch` when the cid lives in a different method's
    /// store, `MethodNotActive` / `NotFound` for an inactive method or
    /// unknown user.
    pub async fn link(&self, uid: Uuid, method: Method, cid: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        Self::link_locked(&mut state, uid, method, cid)?;
        debug_assert!(state.invariants_hold());
        info!(%uid, %cid, %method, "linked credential");
        Ok(())
    }

    /// Nulls `uid`'s pointer for `method`. Pure metadata change: the
    /// instance itself is never deleted. A missing row or already-null
    /// pointer is a no-op.
    pub async fn unlink(&self, uid: Uuid, method: Method) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(row) = state.links.get_mut(&uid) {
            row.clear_pointer(method);
        }
        debug!(%uid, %method, "unlinked credential");
        Ok(())
    }

    /// Transactional composite: clears the pointer for `method` and deletes
    /// the previously-pointed instance as one atomic unit. Readers can never
    /// observe the pointer gone while the instance remains, or vice versa.
    ///
    /// # Errors
    /// Returns `NotFound` when no pointer is set for the method.
    pub async fn revoke(&self, uid: Uuid, method: Method) -> Result<()> {
        let mut state = self.state.write().await;
        let cid = state
            .links
            .get(&uid)
            .and_then(|row| row.pointer(method))
            .ok_or_else(|| Error::NotFound(format!("no active {method} credential for user")))?;
        if let Some(row) = state.links.get_mut(&uid) {
            row.clear_pointer(method);
        }
        state.remove_instance(cid);
        debug_assert!(state.invariants_hold());
        info!(%uid, %cid, %method, "revoked credential");
        Ok(())
    }

    /// The currently active instance for `(uid, method)`, if any. Disabled
    /// instances remain linkable, so authentication collaborators must
    /// re-check the disabled flag on the resolved instance.
    ///
    /// # Errors
    /// Returns `MethodNotActive` when the schema does not carry the method.
    pub async fn active_credential(&self, uid: Uuid, method: Method) -> Result<Option<Uuid>> {
        let state = self.state.read().await;
        if !state.is_active(method) {
            return Err(Error::MethodNotActive(method));
        }
        Ok(state.links.get(&uid).and_then(|row| row.pointer(method)))
    }

    /// True when the user has more than one linked credential.
    pub async fn has_multiple_credentials(&self, uid: Uuid) -> bool {
        let state = self.state.read().await;
        state
            .links
            .get(&uid)
            .is_some_and(CredentialLink::has_multiple_credentials)
    }

    /// The user's link row, if one was ever created.
    pub async fn link_row(&self, uid: Uuid) -> Option<CredentialLink> {
        let state = self.state.read().await;
        state.links.get(&uid).cloned()
    }

    /// Atomic composite of [`register`](Self::register) and
    /// [`link`](Self::link): the new instance becomes the active
    /// authenticator in the same critical section, or nothing happens.
    ///
    /// # Errors
    /// Any error either sub-operation can return; no partial state survives.
    pub async fn register_and_link(
        &self,
        uid: Uuid,
        method: Method,
        identifier: &str,
        secret: SecretString,
    ) -> Result<Uuid> {
        let mut state = self.state.write().await;
        let cid = Self::register_locked(&mut state, uid, method, identifier, secret)?;
        // register_locked validated user, method, and uniqueness; the link
        // below cannot fail, so the composite commits as one unit.
        Self::link_locked(&mut state, uid, method, cid)?;
        debug_assert!(state.invariants_hold());
        info!(%uid, %cid, %method, "registered and linked credential");
        Ok(cid)
    }

    /// Whole-dataset invariant check; a single read guard gives a true
    /// snapshot, so concurrent mutations can never be caught halfway.
    pub async fn invariants_hold(&self) -> bool {
        self.state.read().await.invariants_hold()
    }

    // --- locked helpers ------------------------------------------------------

    fn register_locked(
        state: &mut DataSet,
        uid: Uuid,
        method: Method,
        identifier: &str,
        secret: SecretString,
    ) -> Result<Uuid> {
        if !state.is_active(method) {
            return Err(Error::MethodNotActive(method));
        }
        if !state.users.contains_key(&uid) {
            return Err(Error::NotFound(format!("unknown user {uid}")));
        }
        // Ownership wins over identifier collision: re-registering the same
        // method with one's own identifier is "already registered", not a
        // duplicate identity.
        if state.by_owner.contains_key(&(method, uid)) {
            return Err(Error::AlreadyRegistered(method));
        }
        if state
            .by_identifier
            .contains_key(&(method, identifier.to_string()))
        {
            return Err(Error::DuplicateIdentity(identifier.to_string()));
        }
        let instance = CredentialInstance::new(uid, method, identifier.to_string(), secret);
        let cid = instance.cid();
        state.insert_instance(instance);
        state.link_row_mut(uid);
        Ok(cid)
    }

    fn link_locked(state: &mut DataSet, uid: Uuid, method: Method, cid: Uuid) -> Result<()> {
        if !state.is_active(method) {
            return Err(Error::MethodNotActive(method));
        }
        if !state.users.contains_key(&uid) {
            return Err(Error::NotFound(format!("unknown user {uid}")));
        }
        let instance = state.instances.get(&cid).ok_or(Error::ReferenceNotFound)?;
        if instance.method != method {
            return Err(Error::MethodMismatch {
                expected: method,
                actual: instance.method,
            });
        }
        // A pointer may only target a credential owned by the same user.
        if instance.uid != uid {
            return Err(Error::ReferenceNotFound);
        }
        state.link_row_mut(uid).set_pointer(method, cid);
        Ok(())
    }

    fn instance_mut(state: &mut DataSet, cid: Uuid) -> Result<&mut CredentialInstance> {
        state
            .instances
            .get_mut(&cid)
            .ok_or_else(|| Error::NotFound(format!("unknown credential {cid}")))
    }
}
