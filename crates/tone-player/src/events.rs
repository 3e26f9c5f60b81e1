//! Engine notifications for whatever presentation layer is listening.
//!
//! The engine never calls back into the UI; it publishes [`EngineEvent`]s on a
//! bounded channel and the consumer decides when to redraw.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// How the most recent metronome session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// `stop()` was honoured at a beat boundary.
    Stopped,
    /// The output line failed mid-session.
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Started,
    /// A beat was handed to the device. `index` starts at 1.
    Beat { index: u64, accented: bool },
    Stopped,
    /// The session aborted because the output line failed.
    Interrupted { error: String },
    AlarmStarted,
    AlarmFinished,
    AlarmFailed { error: String },
}

/// Lossy sender: events are dropped when the channel is full or unobserved.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: Sender<EngineEvent>,
}

impl EventSender {
    pub(crate) fn channel(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "event channel full; dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (events, rx) = EventSender::channel(2);
        events.emit(EngineEvent::Started);
        events.emit(EngineEvent::Beat { index: 1, accented: false });
        events.emit(EngineEvent::Stopped);
        assert_eq!(rx.try_recv(), Ok(EngineEvent::Started));
        assert_eq!(rx.try_recv(), Ok(EngineEvent::Beat { index: 1, accented: false }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_without_receiver_is_harmless() {
        let (events, rx) = EventSender::channel(1);
        drop(rx);
        events.emit(EngineEvent::AlarmStarted);
    }
}
