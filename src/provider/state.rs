use std::fmt;
use std::sync::Mutex;

use tracing::debug;

/// Where a provider instance stands with its host skapp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    AwaitingSession,
    AwaitingConsent,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::AwaitingSession => "awaiting-session",
            ConnectionState::AwaitingConsent => "awaiting-consent",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one provider instance. Transitions are never held across an await
#[derive(Debug, Default)]
pub struct StateCell {
    state: Mutex<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        self.state.lock().map(|state| *state).unwrap_or(ConnectionState::Failed)
    }

    /// Moves to `next` and returns the state left behind
    pub fn transition(&self, next: ConnectionState) -> ConnectionState {
        let Ok(mut state) = self.state.lock() else {
            return ConnectionState::Failed;
        };
        let previous = std::mem::replace(&mut *state, next);
        if previous != next {
            debug!(from = %previous, to = %next, "provider state changed");
        }
        previous
    }
}
