//! Session lifecycle states.

/// Lifecycle of one `SecureSession`.
///
/// Progression is strictly forward: `Idle` → `Negotiating` → `Established`.
/// `Closed` is terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Session was just created.
    Idle,
    /// Key agreement is in progress; no data exchange possible yet.
    Negotiating,
    /// Session is secured; data can be exchanged.
    Established,
    /// Session was closed; every operation fails.
    Closed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Negotiating => "negotiating",
            Self::Established => "established",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
