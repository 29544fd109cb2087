use crate::credential::Method;
use thiserror::Error;

/// Failure taxonomy shared by the registry, method stores, link table, and
/// evolution engine. Every invariant violation aborts the whole operation
/// with no partial state change.
#[derive(Debug, Error)]
pub enum Error {
    /// The method-natural identifier (username, email, provider id) is
    /// already claimed by another instance in the same method store.
    #[error("identifier {0:?} is already in use")]
    DuplicateIdentity(String),

    /// The user already has an instance for this method; callers must
    /// update the existing instance instead of registering again.
    #[error("user already has a {0} credential")]
    AlreadyRegistered(Method),

    /// A link was requested against an instance id that does not exist in
    /// the matching store, or that belongs to a different user.
    #[error("link target does not exist in the matching store")]
    ReferenceNotFound,

    /// The instance id belongs to a different method's store.
    #[error("credential belongs to the {actual} store, not {expected}")]
    MethodMismatch { expected: Method, actual: Method },

    #[error("{0}")]
    NotFound(String),

    /// The operation requires an enabled instance.
    #[error("credential is disabled")]
    Disabled,

    /// User deletion attempted while a credential is still linked.
    #[error("user is still referenced by linked credentials")]
    ReferentialIntegrityViolation,

    /// A schema transformation refused to apply.
    #[error("transformation precondition failed: {0}")]
    TransformationPrecondition(String),

    /// The named method is not part of the current schema.
    #[error("method {0} is not part of the current schema")]
    MethodNotActive(Method),
}

pub type Result<T> = std::result::Result<T, Error>;
