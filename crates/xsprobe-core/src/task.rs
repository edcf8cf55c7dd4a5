//! Verification task types.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// An inbound verification request: a content fragment addressed to a
/// user, as submitted by the rest of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Identifier of the user the fragment was sent to
    pub receiver_id: String,
    /// The raw, unsanitized fragment
    pub content: String,
}

/// The unit of work handed to the engine pool.
///
/// Immutable once created; owned by the queue until dequeued and
/// consumed exactly once by the pool. `sender` is the identity the
/// render is performed as (the designated verifier); `receiver` is the
/// resolved addressee of the original fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTask {
    pub sender: Identity,
    pub receiver: Identity,
    pub content: String,
}

impl RenderTask {
    /// Create a task.
    #[must_use]
    pub fn new(sender: Identity, receiver: Identity, content: impl Into<String>) -> Self {
        Self {
            sender,
            receiver,
            content: content.into(),
        }
    }
}
