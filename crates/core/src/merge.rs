//! Folding a guest's progress into the server record on sign-in.
//!
//! The merge is additive: guest XP is summed on top of server XP and every
//! set is unioned. Summation is only correct for a genuine guest → account
//! transition, so the server state remembers which guest sessions it has
//! absorbed and a replay of the same session adds no XP.

use crate::model::{GuestProgress, ProgressState};
use crate::streak::StreakTracker;

/// What a merge did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub state: ProgressState,
    pub xp_added: u64,
    /// The guest session had already been merged into this record.
    pub replayed: bool,
}

/// Merge guest progress into the server-held state.
///
/// - XP: `server + guest`, unless this guest session was already merged
/// - answered questions, completed sections and campaigns: set union
/// - last activity: the later of the two
/// - streak: the older side's run is carried to the later day through
///   `streaks` (kept on the same day, extended on the next, reset after a
///   gap) and the longer of that and the newer side's run wins
#[must_use]
pub fn merge_guest_into(
    server: &ProgressState,
    guest: &GuestProgress,
    streaks: &StreakTracker,
) -> MergeOutcome {
    let mut merged = server.clone();
    merged.union_with(&guest.state);

    let replayed = !merged.record_guest_session(guest.session_id);
    let xp_added = if replayed {
        0
    } else {
        guest.state.total_xp()
    };
    merged.set_total_xp(server.total_xp().saturating_add(xp_added));

    let (streak, last_activity_at) = match (server.last_activity_at(), guest.state.last_activity_at()) {
        (Some(s), Some(g)) => {
            let (older, newer, at) = if s <= g {
                (server, &guest.state, g)
            } else {
                (&guest.state, server, s)
            };
            let carried = streaks.update(older.streak(), older.last_activity_at(), at);
            (newer.streak().max(carried), Some(at))
        }
        (Some(s), None) => (server.streak(), Some(s)),
        (None, Some(g)) => (guest.state.streak(), Some(g)),
        (None, None) => (server.streak().max(guest.state.streak()), None),
    };
    merged.set_streak(streak, last_activity_at);

    MergeOutcome {
        state: merged,
        xp_added,
        replayed,
    }
}
