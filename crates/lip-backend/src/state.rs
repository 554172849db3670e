use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a ledger source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Unprepared,
    Preparing,
    Ready,
    Closed,
}

impl SourceState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Unprepared => 0,
            Self::Preparing => 1,
            Self::Ready => 2,
            Self::Closed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unprepared,
            1 => Self::Preparing,
            2 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unprepared => "unprepared",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Lock-free holder of a [`SourceState`], readable while a call that holds
/// the source's state lock is in flight.
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: SourceState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn get(&self) -> SourceState {
        SourceState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: SourceState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Move from `from` to `to`; on failure returns the actual state.
    pub fn transition(&self, from: SourceState, to: SourceState) -> Result<(), SourceState> {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SourceState::from_u8)
    }

    /// Move to `to` unless the source has been closed meanwhile.
    pub fn set_unless_closed(&self, to: SourceState) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (cur != SourceState::Closed.to_u8()).then_some(to.to_u8())
            });
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(SourceState::Unprepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_is_conditional() {
        let state = AtomicState::default();
        assert!(state
            .transition(SourceState::Unprepared, SourceState::Preparing)
            .is_ok());
        assert_eq!(
            state.transition(SourceState::Unprepared, SourceState::Preparing),
            Err(SourceState::Preparing)
        );
        assert_eq!(state.get(), SourceState::Preparing);
    }

    #[test]
    fn closed_is_sticky_for_set_unless_closed() {
        let state = AtomicState::new(SourceState::Closed);
        state.set_unless_closed(SourceState::Ready);
        assert_eq!(state.get(), SourceState::Closed);
        let state = AtomicState::new(SourceState::Preparing);
        state.set_unless_closed(SourceState::Ready);
        assert_eq!(state.get(), SourceState::Ready);
    }
}
