use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::media::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationPhase {
    New,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl fmt::Display for NegotiationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationPhase::New => write!(f, "New"),
            NegotiationPhase::Negotiating => write!(f, "Negotiating"),
            NegotiationPhase::Connected => write!(f, "Connected"),
            NegotiationPhase::Failed => write!(f, "Failed"),
            NegotiationPhase::Closed => write!(f, "Closed"),
        }
    }
}

/// Latest states the engine reported for one media session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: NegotiationPhase,
    pub signaling_state: String,
    pub ice_state: String,
    pub connection_state: String,
    pub last_error: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: NegotiationPhase::New,
            signaling_state: "stable".to_string(),
            ice_state: "new".to_string(),
            connection_state: "new".to_string(),
            last_error: None,
        }
    }
}

#[derive(Clone)]
pub struct SessionMonitor {
    status: Arc<watch::Sender<SessionStatus>>,
    receiver: watch::Receiver<SessionStatus>,
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMonitor {
    pub fn new() -> Self {
        let (status, receiver) = watch::channel(SessionStatus::default());
        Self {
            status: Arc::new(status),
            receiver,
        }
    }

    pub fn record(&self, event: &SessionEvent) {
        self.status.send_modify(|status| match event {
            SessionEvent::SignalingState(state) => {
                status.signaling_state = state.clone();
                if status.phase == NegotiationPhase::New && state != "stable" {
                    status.phase = NegotiationPhase::Negotiating;
                }
            }
            SessionEvent::IceConnectionState(state) => {
                status.ice_state = state.clone();
                if state == "checking" && status.phase == NegotiationPhase::New {
                    status.phase = NegotiationPhase::Negotiating;
                }
            }
            SessionEvent::ConnectionState(state) => {
                status.connection_state = state.clone();
                status.phase = match state.as_str() {
                    "connecting" => NegotiationPhase::Negotiating,
                    "connected" => NegotiationPhase::Connected,
                    "failed" => NegotiationPhase::Failed,
                    "closed" => NegotiationPhase::Closed,
                    _ => status.phase,
                };
            }
        });
    }

    pub fn set_phase(&self, phase: NegotiationPhase) {
        self.status.send_modify(|status| {
            status.phase = phase;
        });
    }

    pub fn set_error(&self, error: String) {
        self.status.send_modify(|status| {
            status.last_error = Some(error);
            status.phase = NegotiationPhase::Failed;
        });
    }

    pub fn snapshot(&self) -> SessionStatus {
        self.receiver.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_drives_phase() {
        let monitor = SessionMonitor::new();
        assert_eq!(monitor.snapshot().phase, NegotiationPhase::New);

        monitor.record(&SessionEvent::ConnectionState("connecting".to_string()));
        assert_eq!(monitor.snapshot().phase, NegotiationPhase::Negotiating);

        monitor.record(&SessionEvent::ConnectionState("connected".to_string()));
        let status = monitor.snapshot();
        assert_eq!(status.phase, NegotiationPhase::Connected);
        assert_eq!(status.connection_state, "connected");
    }

    #[test]
    fn test_signaling_and_ice_are_recorded() {
        let monitor = SessionMonitor::new();

        monitor.record(&SessionEvent::SignalingState("have-remote-offer".to_string()));
        monitor.record(&SessionEvent::IceConnectionState("checking".to_string()));

        let status = monitor.snapshot();
        assert_eq!(status.signaling_state, "have-remote-offer");
        assert_eq!(status.ice_state, "checking");
        assert_eq!(status.phase, NegotiationPhase::Negotiating);
    }

    #[test]
    fn test_error_marks_failed() {
        let monitor = SessionMonitor::new();
        monitor.set_error("create_answer failed".to_string());

        let status = monitor.snapshot();
        assert_eq!(status.phase, NegotiationPhase::Failed);
        assert_eq!(status.last_error.as_deref(), Some("create_answer failed"));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = SessionMonitor::new();
        let mut receiver = monitor.subscribe();

        monitor.set_phase(NegotiationPhase::Closed);

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().phase, NegotiationPhase::Closed);
    }
}
