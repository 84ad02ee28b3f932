//! Upvote toggle state machine.
//!
//! A toggle call always flips the caller's vote on the target; there is no
//! idempotent "set" operation. The uniqueness constraint on the voter rows
//! is the sole arbiter of "already voted", and the voter-row mutation and
//! counter mutation commit together, so concurrent toggles can never
//! double-count or leave the counter out of step with an observable row set.

use crate::storage::{Storage, StorageError, VoteTarget};

/// Resulting vote state after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    Added,
    Removed,
}

/// Outcome of a successful toggle.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ToggleOutcome {
    pub state: VoteState,
    pub count: u32,
}

#[derive(Debug)]
pub enum VoteError {
    /// The target rating or comment does not exist.
    NotFound,
    /// The caller owns the target; self-votes are rejected with no state
    /// change.
    SelfVote,
    Storage(StorageError),
}

impl std::fmt::Display for VoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteError::NotFound => write!(f, "vote target not found"),
            VoteError::SelfVote => write!(f, "cannot vote on your own post"),
            VoteError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for VoteError {}

impl From<StorageError> for VoteError {
    fn from(e: StorageError) -> Self {
        VoteError::Storage(e)
    }
}

/// Flip `actor`'s vote on `target`.
pub fn toggle(
    storage: &Storage,
    actor: i64,
    target: VoteTarget,
) -> Result<ToggleOutcome, VoteError> {
    let owner = match target {
        VoteTarget::Rating(id) => storage.get_rating(id)?.map(|r| r.user_id),
        VoteTarget::Comment(id) => storage.get_comment(id)?.map(|c| c.user_id),
    };
    let owner = owner.ok_or(VoteError::NotFound)?;
    if owner == actor {
        return Err(VoteError::SelfVote);
    }

    let (added, count) = storage.toggle_upvote(actor, target)?;
    Ok(ToggleOutcome {
        state: if added {
            VoteState::Added
        } else {
            VoteState::Removed
        },
        count,
    })
}
