use serde::{Deserialize, Serialize};

use crate::model::ids::GuestSessionId;
use crate::model::progress::ProgressState;

/// Progress accumulated before the learner signs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestProgress {
    pub session_id: GuestSessionId,
    pub state: ProgressState,
}

impl GuestProgress {
    /// Starts a new guest session with empty progress.
    #[must_use]
    pub fn start() -> Self {
        Self {
            session_id: GuestSessionId::generate(),
            state: ProgressState::new(),
        }
    }

    #[must_use]
    pub fn with_state(session_id: GuestSessionId, state: ProgressState) -> Self {
        Self { session_id, state }
    }
}
