// src/io/types.rs
//
// Session notifications and the sink interface they are delivered through.

use std::sync::mpsc as std_mpsc;

use serde::Serialize;
use tokio::sync::mpsc;

use super::Frame;

// ============================================================================
// Session Events
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Notification produced by a TransportSession
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A frame was read off the link (always `Direction::Inbound`)
    FrameReceived { frame: Frame },
    ConnectionStatusChanged { connected: bool, description: String },
    ErrorRaised { description: String },
}

impl SessionEvent {
    pub(crate) fn status(connected: bool, description: impl Into<String>) -> Self {
        SessionEvent::ConnectionStatusChanged {
            connected,
            description: description.into(),
        }
    }

    pub(crate) fn error(description: impl Into<String>) -> Self {
        SessionEvent::ErrorRaised {
            description: description.into(),
        }
    }
}

// ============================================================================
// Event Sink
// ============================================================================

/// Consumer of session notifications.
///
/// `emit` is called from the session's worker thread for frames and read
/// errors, and from whichever thread calls `connect`, `disconnect` or `send`
/// for the events those produce. Events of one session arrive in production
/// order. Implementations should hand the event off quickly (push onto a
/// channel, post to a UI thread) rather than do blocking work in `emit`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Delivers into a tokio channel; the receiver may live on any runtime.
impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.send(event);
    }
}

impl EventSink for std_mpsc::Sender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.send(event);
    }
}

/// Sink backed by a closure
pub struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn emit(&self, event: SessionEvent) {
        (self.0)(event)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::status(true, "connected to COM3");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connection_status_changed");
        assert_eq!(json["connected"], true);
        assert_eq!(json["description"], "connected to COM3");
    }

    #[test]
    fn test_tokio_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(SessionEvent::error("boom"));
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::error("boom"));
    }

    #[test]
    fn test_callback_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sink = CallbackSink(move |_event: SessionEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        sink.emit(SessionEvent::error("a"));
        sink.emit(SessionEvent::error("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
