//! Ordered, reversible schema transformations.
//!
//! Structural change is modeled as a versioned list of
//! `{precondition, forward, reverse}` triples applied through a
//! current-version marker, not as ad hoc scripts. The engine exposes exactly
//! two addressing modes: apply the next forward step, or revert the last
//! applied one. Replaying past either end is an Ok no-op.

use crate::credential::Method;
use crate::error::{Error, Result};
use crate::state::DataSet;
use crate::store::AuthStore;
use tracing::{info, warn};

type StepFn = Box<dyn Fn(&mut DataSet) -> Result<()> + Send + Sync>;
type PredicateFn = Box<dyn Fn(&DataSet) -> Result<()> + Send + Sync>;

/// What a method-removal transformation does with link rows that still
/// point at an instance of the removed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovePolicy {
    /// Refuse to apply while any pointer for the method is set.
    Restrict,
    /// Clear the pointers (the method's instances drop with its store).
    Cascade,
}

/// One reversible structural change over the full dataset.
///
/// Applying forward then reverse must reproduce invariant-equivalent state
/// for every row the change does not touch. Preconditions carry all fallible
/// checks; forward steps are expected to succeed once their precondition
/// passed, and the engine additionally stages every step on a scratch copy
/// so a failing step commits nothing.
pub struct Transformation {
    name: String,
    precondition: PredicateFn,
    forward: StepFn,
    reverse: StepFn,
}

impl Transformation {
    /// A custom transformation from explicit closures, for shapes the
    /// built-ins do not cover (field backfills and the like).
    pub fn new(
        name: impl Into<String>,
        precondition: impl Fn(&DataSet) -> Result<()> + Send + Sync + 'static,
        forward: impl Fn(&mut DataSet) -> Result<()> + Send + Sync + 'static,
        reverse: impl Fn(&mut DataSet) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            precondition: Box::new(precondition),
            forward: Box::new(forward),
            reverse: Box::new(reverse),
        }
    }

    /// Introduces `method`: its store starts empty and every existing link
    /// row gains a null slot, so no pre-existing row changes beyond shape.
    /// The reverse removes the method again under `RemovePolicy::Restrict`.
    #[must_use]
    pub fn add_method(method: Method) -> Self {
        Self::new(
            format!("add_method({method})"),
            move |state| {
                if state.is_active(method) {
                    return Err(Error::TransformationPrecondition(format!(
                        "method {method} is already active"
                    )));
                }
                Ok(())
            },
            move |state| {
                state.activate_method(method);
                Ok(())
            },
            move |state| remove_method_step(state, method, RemovePolicy::Restrict),
        )
    }

    /// Removes `method` and drops its store. Under `Restrict` the step fails
    /// while any link row still points at one of its instances; under
    /// `Cascade` those pointers are cleared first. The reverse re-adds the
    /// method with an empty store.
    #[must_use]
    pub fn remove_method(method: Method, policy: RemovePolicy) -> Self {
        Self::new(
            format!("remove_method({method})"),
            move |state| {
                if !state.is_active(method) {
                    return Err(Error::TransformationPrecondition(format!(
                        "method {method} is not active"
                    )));
                }
                if policy == RemovePolicy::Restrict && state.live_pointers(method) > 0 {
                    return Err(Error::TransformationPrecondition(format!(
                        "{} link rows still point at {method} instances",
                        state.live_pointers(method)
                    )));
                }
                Ok(())
            },
            move |state| remove_method_step(state, method, policy),
            move |state| {
                state.activate_method(method);
                Ok(())
            },
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn remove_method_step(state: &mut DataSet, method: Method, policy: RemovePolicy) -> Result<()> {
    let live = state.live_pointers(method);
    if live > 0 {
        match policy {
            RemovePolicy::Restrict => {
                return Err(Error::TransformationPrecondition(format!(
                    "{live} link rows still point at {method} instances"
                )));
            }
            RemovePolicy::Cascade => {
                warn!(%method, live, "cascade-clearing pointers for removed method");
            }
        }
    }
    // deactivate_method clears the slots (and with them any cascaded
    // pointers) and drops the store's instances; users are untouched.
    state.deactivate_method(method);
    Ok(())
}

/// Applies an ordered list of transformations against a store.
///
/// The dataset carries the current-version marker, so the engine itself is
/// stateless and cheap to rebuild. Transformations apply strictly in
/// sequence: step `n` can only run once steps `0..n` have committed.
pub struct Evolution {
    transformations: Vec<Transformation>,
}

impl Evolution {
    #[must_use]
    pub fn new(transformations: Vec<Transformation>) -> Self {
        Self { transformations }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// The number of transformations committed against the store.
    pub async fn version(&self, store: &AuthStore) -> usize {
        store.state().read().await.version
    }

    /// Applies the next pending forward transformation. Returns `Ok(false)`
    /// when everything is already applied (idempotent replay).
    ///
    /// The write guard doubles as the schema-wide barrier: no credential
    /// operation can interleave with the commit. The step runs on a scratch
    /// copy of the dataset that replaces the live one only on success.
    ///
    /// # Errors
    /// Whatever the transformation's precondition or forward step returns;
    /// on error the store is untouched.
    pub async fn apply_next_forward(&self, store: &AuthStore) -> Result<bool> {
        let mut state = store.state().write().await;
        let index = state.version;
        let Some(transformation) = self.transformations.get(index) else {
            return Ok(false);
        };
        (transformation.precondition)(&state)?;

        let mut staged = state.clone();
        (transformation.forward)(&mut staged)?;
        staged.version = index + 1;
        debug_assert!(staged.invariants_hold());
        *state = staged;
        info!(
            transformation = transformation.name(),
            version = index + 1,
            "applied forward transformation"
        );
        Ok(true)
    }

    /// Reverts the most recently applied transformation. Returns `Ok(false)`
    /// at version zero.
    ///
    /// # Errors
    /// Whatever the reverse step returns, or `TransformationPrecondition`
    /// when the store's version marker is beyond this engine's list; on
    /// error the store is untouched.
    pub async fn revert_last_reverse(&self, store: &AuthStore) -> Result<bool> {
        let mut state = store.state().write().await;
        let Some(index) = state.version.checked_sub(1) else {
            return Ok(false);
        };
        let transformation = self.transformations.get(index).ok_or_else(|| {
            Error::TransformationPrecondition(format!(
                "store is at version {} but the engine only knows {} transformations",
                state.version,
                self.transformations.len()
            ))
        })?;

        let mut staged = state.clone();
        (transformation.reverse)(&mut staged)?;
        staged.version = index;
        debug_assert!(staged.invariants_hold());
        *state = staged;
        info!(
            transformation = transformation.name(),
            version = index,
            "reverted transformation"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_past_the_ends_is_a_noop() -> anyhow::Result<()> {
        let store = AuthStore::with_methods([Method::EmailPassword]);
        let engine = Evolution::new(vec![Transformation::add_method(Method::GithubOauth)]);

        assert_eq!(engine.version(&store).await, 0);
        assert!(!engine.revert_last_reverse(&store).await?);

        assert!(engine.apply_next_forward(&store).await?);
        assert_eq!(engine.version(&store).await, 1);
        assert!(!engine.apply_next_forward(&store).await?);
        assert_eq!(engine.version(&store).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_version_marker_is_rejected() {
        let store = AuthStore::with_methods([Method::EmailPassword]);
        let engine = Evolution::new(vec![Transformation::add_method(Method::GithubOauth)]);
        engine.apply_next_forward(&store).await.unwrap();

        let foreign = Evolution::new(vec![]);
        assert!(foreign.is_empty());
        let err = foreign.revert_last_reverse(&store).await.unwrap_err();
        assert!(matches!(err, Error::TransformationPrecondition(_)));
    }

    #[tokio::test]
    async fn failing_step_commits_nothing() {
        let store = AuthStore::with_methods([Method::EmailPassword]);
        let engine = Evolution::new(vec![Transformation::new(
            "poisoned",
            |_| Ok(()),
            |state| {
                state.activate_method(Method::GithubOauth);
                Err(Error::TransformationPrecondition("boom".to_string()))
            },
            |_| Ok(()),
        )]);

        let err = engine.apply_next_forward(&store).await.unwrap_err();
        assert!(matches!(err, Error::TransformationPrecondition(_)));
        assert_eq!(engine.version(&store).await, 0);
        assert!(store.state().read().await.is_active(Method::EmailPassword));
        assert!(!store.state().read().await.is_active(Method::GithubOauth));
    }
}
