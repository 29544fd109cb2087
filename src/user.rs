//! Canonical identity records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A canonical user identity.
///
/// The registry never references the link table or the method stores; they
/// reference it. Profile metadata is an opaque JSON document owned by
/// whatever registration flow created the user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub(crate) uid: Uuid,
    pub(crate) metadata: Option<Value>,
    pub(crate) created: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(metadata: Option<Value>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            metadata,
            created: Utc::now(),
        }
    }

    #[must_use]
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}
