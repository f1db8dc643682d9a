//! Ordered registry of client sessions with event fan-out.

use std::sync::Arc;

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tracing::{error, warn};
use wavegate_core::events::ControllerEvent;

use super::session::ClientSession;
use crate::metrics::{EVENTS_FORWARDED_TOTAL, LOGS_FORWARDED_TOTAL};
use crate::protocol::codec;
use crate::protocol::messages::OutgoingMessage;

/// Sessions in connection order.
///
/// Fan-out walks the sessions in registry order. Domain event delivery and
/// `startListening` serialize on the delivery gate, see [`Self::gated`].
pub struct SessionRegistry {
    sessions: RwLock<Vec<Arc<ClientSession>>>,
    delivery_gate: Mutex<()>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            delivery_gate: Mutex::new(()),
        }
    }

    /// Append a session.
    pub fn add(&self, session: Arc<ClientSession>) {
        self.sessions.write().push(session);
    }

    /// Keep only sessions for which `keep` returns true. Returns the removed ones.
    pub fn retain(&self, mut keep: impl FnMut(&Arc<ClientSession>) -> bool) -> Vec<Arc<ClientSession>> {
        let mut sessions = self.sessions.write();
        let (kept, removed): (Vec<_>, Vec<_>) = sessions.drain(..).partition(|s| keep(s));
        *sessions = kept;
        removed
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Vec<Arc<ClientSession>> {
        std::mem::take(&mut *self.sessions.write())
    }

    /// Copy of the current session list.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().clone()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Sessions with `receive_logs` set.
    pub fn log_listener_count(&self) -> usize {
        self.sessions.read().iter().filter(|s| s.receives_logs()).count()
    }

    /// Sessions with `receive_events` set.
    pub fn event_listener_count(&self) -> usize {
        self.sessions.read().iter().filter(|s| s.receives_events()).count()
    }

    /// Run `f` while holding the delivery gate.
    ///
    /// Domain events are delivered under the same gate, so `f` observes no
    /// delivery in progress.
    pub fn gated<R>(&self, f: impl FnOnce() -> R) -> R {
        let _gate = self.delivery_gate.lock();
        f()
    }

    /// Deliver a domain event to every session whose subscription covers
    /// its sequence number. Returns the number of sessions reached.
    pub fn forward_event(&self, event: &ControllerEvent) -> usize {
        let Some(payload) = encode_event(event) else {
            return 0;
        };
        let delivered = self.gated(|| {
            self.deliver(&payload, |session| session.wants_event(event.seq))
        });
        counter!(EVENTS_FORWARDED_TOTAL).increment(delivered as u64);
        delivered
    }

    /// Deliver a gateway-originated event to every event listener.
    pub fn broadcast_to_listeners(&self, event: &ControllerEvent) -> usize {
        let Some(payload) = encode_event(event) else {
            return 0;
        };
        self.gated(|| self.deliver(&payload, ClientSession::receives_events))
    }

    /// Deliver an encoded log event to every log listener.
    pub fn forward_log(&self, payload: &Arc<str>) -> usize {
        let delivered = self.deliver(payload, ClientSession::receives_logs);
        counter!(LOGS_FORWARDED_TOTAL).increment(delivered as u64);
        delivered
    }

    fn deliver(&self, payload: &Arc<str>, eligible: impl Fn(&ClientSession) -> bool) -> usize {
        let mut delivered = 0;
        for session in self.snapshot() {
            if !eligible(session.as_ref()) {
                continue;
            }
            if session.send_frame(payload.clone(), false) {
                delivered += 1;
            } else {
                warn!(client_id = %session.id(), "failed to deliver frame to client");
            }
        }
        delivered
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_event(event: &ControllerEvent) -> Option<Arc<str>> {
    match codec::encode(&OutgoingMessage::Event { event: json!(event) }) {
        Ok(payload) => Some(payload),
        Err(err) => {
            error!(event = %event.event, error = %err, "failed to encode event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::session::OutboundFrame;
    use std::sync::Weak;
    use tokio::sync::mpsc;
    use wavegate_core::events::EventSource;

    fn make_session(capacity: usize) -> (Arc<ClientSession>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(ClientSession::new(tx, 0, Weak::new())), rx)
    }

    fn event(seq: u64) -> ControllerEvent {
        let mut event = ControllerEvent::new(EventSource::Node, "wake up").with("nodeId", 2);
        event.seq = seq;
        event
    }

    fn text(rx: &mut mpsc::Receiver<OutboundFrame>) -> serde_json::Value {
        match rx.try_recv().unwrap() {
            OutboundFrame::Text { payload, .. } => serde_json::from_str(&payload).unwrap(),
            OutboundFrame::Ping => panic!("unexpected ping"),
        }
    }

    #[test]
    fn add_and_len() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        let (a, _ra) = make_session(4);
        let (b, _rb) = make_session(4);
        registry.add(a);
        registry.add(b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn retain_preserves_order_and_returns_removed() {
        let registry = SessionRegistry::new();
        let (a, _ra) = make_session(4);
        let (b, _rb) = make_session(4);
        let (c, _rc) = make_session(4);
        b.terminate();
        registry.add(a.clone());
        registry.add(b.clone());
        registry.add(c.clone());

        let removed = registry.retain(|s| s.is_connected());

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), b.id());
        let ids: Vec<String> = registry.snapshot().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec![a.id().to_string(), c.id().to_string()]);
    }

    #[test]
    fn drain_empties() {
        let registry = SessionRegistry::new();
        let (a, _ra) = make_session(4);
        registry.add(a);
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn forward_event_only_to_listeners_after_their_snapshot() {
        let registry = SessionRegistry::new();
        let (early, mut early_rx) = make_session(4);
        let (late, mut late_rx) = make_session(4);
        let (idle, mut idle_rx) = make_session(4);
        early.mark_listening(0);
        late.mark_listening(5);
        registry.add(early);
        registry.add(late);
        registry.add(idle);

        assert_eq!(registry.forward_event(&event(5)), 1);
        assert_eq!(registry.forward_event(&event(6)), 2);

        assert_eq!(text(&mut early_rx)["event"]["nodeId"], 2);
        assert_eq!(text(&mut early_rx)["type"], "event");
        assert_eq!(text(&mut late_rx)["type"], "event");
        assert!(late_rx.try_recv().is_err());
        assert!(idle_rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_does_not_block_others() {
        let registry = SessionRegistry::new();
        let (slow, _slow_rx) = make_session(1);
        let (fast, mut fast_rx) = make_session(8);
        slow.mark_listening(0);
        fast.mark_listening(0);
        registry.add(slow.clone());
        registry.add(fast);

        for seq in 1..=3 {
            let _ = registry.forward_event(&event(seq));
        }

        assert_eq!(slow.dropped_frames(), 2);
        for _ in 0..3 {
            assert_eq!(text(&mut fast_rx)["type"], "event");
        }
    }

    #[test]
    fn forward_log_only_to_log_listeners() {
        let registry = SessionRegistry::new();
        let (logs, mut logs_rx) = make_session(4);
        let (quiet, mut quiet_rx) = make_session(4);
        logs.set_receive_logs(true);
        registry.add(logs);
        registry.add(quiet);

        assert_eq!(registry.log_listener_count(), 1);
        assert_eq!(registry.forward_log(&Arc::from("{\"type\":\"event\"}")), 1);
        assert!(logs_rx.try_recv().is_ok());
        assert!(quiet_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_ignores_sequence() {
        let registry = SessionRegistry::new();
        let (a, mut rx) = make_session(4);
        a.mark_listening(100);
        registry.add(a);

        let sent = registry.broadcast_to_listeners(&ControllerEvent::new(EventSource::Driver, "log config updated"));
        assert_eq!(sent, 1);
        assert_eq!(text(&mut rx)["event"]["event"], "log config updated");
        assert_eq!(registry.event_listener_count(), 1);
    }
}
