//! Identity-and-credential-linking core.
//!
//! One user identity can be authenticated through zero or more
//! independently-managed credential methods (username/password,
//! email/password, OAuth provider). This crate tracks which instance of each
//! method is the active authenticator for a user and guards the invariants
//! that keep the linking model safe:
//!
//! - at most one live credential instance per method per user,
//! - link pointers never dangle: deleting an instance clears them,
//! - a user cannot be deleted while credentials still reference it,
//! - deleting a credential never cascades into the user record,
//! - schema evolution (adding or removing a method) preserves all of the
//!   above for pre-existing rows, and every transformation is reversible.
//!
//! Password hashing, OAuth handshakes, and session issuance are external
//! collaborators. Secret material passes through as an opaque
//! [`secrecy::SecretString`]; the store holds and swaps the blob, nothing
//! more.
//!
//! ```
//! use credlink::{AuthStore, Method};
//! use secrecy::SecretString;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = AuthStore::new();
//! let alice = store.create_user(None).await;
//! let cid = store
//!     .register(alice, Method::EmailPassword, "a@x.com", SecretString::from("opaque".to_string()))
//!     .await?;
//! store.link(alice, Method::EmailPassword, cid).await?;
//! assert_eq!(store.active_credential(alice, Method::EmailPassword).await?, Some(cid));
//! # Ok::<(), credlink::Error>(())
//! # }).unwrap();
//! ```

pub mod credential;
pub mod error;
pub mod evolution;
pub mod link;
pub mod state;
pub mod store;
pub mod user;

pub use credential::{CredentialInstance, Method};
pub use error::{Error, Result};
pub use evolution::{Evolution, RemovePolicy, Transformation};
pub use link::CredentialLink;
pub use state::DataSet;
pub use store::AuthStore;
pub use user::User;
