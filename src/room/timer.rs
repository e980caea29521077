//! Empty-room destroy timer.
//!
//! `DestroyTimer` only tracks state; the owning [`Room`](super::Room) keeps it
//! under the membership lock and spawns the sleeping task. A fire is accepted
//! only if the timer is still armed with the same generation, so a join that
//! disarms under the lock always beats a late wake-up.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Destroyed,
}

/// Handed to the sleeping task when the timer is armed.
#[derive(Debug, Clone)]
pub struct ArmTicket {
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
pub struct DestroyTimer {
    state: TimerState,
    generation: u64,
    token: Option<CancellationToken>,
}

impl Default for DestroyTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DestroyTimer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            generation: 0,
            token: None,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == TimerState::Destroyed
    }

    /// `Idle -> Armed`. Returns `None` when already armed or destroyed.
    pub fn arm(&mut self) -> Option<ArmTicket> {
        if self.state != TimerState::Idle {
            return None;
        }

        self.generation += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.state = TimerState::Armed;

        Some(ArmTicket {
            generation: self.generation,
            token,
        })
    }

    /// `Armed -> Idle`. Idempotent; never blocks.
    pub fn disarm(&mut self) -> bool {
        if self.state != TimerState::Armed {
            return false;
        }

        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.state = TimerState::Idle;
        true
    }

    /// `Armed -> Destroyed` for the matching generation only.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.state != TimerState::Armed || self.generation != generation {
            return false;
        }

        self.token = None;
        self.state = TimerState::Destroyed;
        true
    }

    /// `Idle | Armed -> Destroyed`. Returns `false` if already destroyed.
    pub fn destroy(&mut self) -> bool {
        if self.state == TimerState::Destroyed {
            return false;
        }

        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.state = TimerState::Destroyed;
        true
    }
}
