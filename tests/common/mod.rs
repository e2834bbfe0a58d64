//! Common test infrastructure shared across integration tests.
//!
//! Provides an in-memory broadcast bus connecting several sessions, a
//! harness `Config` and a delivery pump so tests can script whole
//! multi-device exchanges without a real transport.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use turnwire::{Broadcast, Config, SendError, SessionBuilder, Topic, TurnSession};

/// Session parameterization for the test harness.
#[derive(Debug)]
pub struct HarnessConfig;

impl Config for HarnessConfig {
    type Id = &'static str;
}

/// One broadcast in flight on the bus.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: &'static str,
    pub topic: Topic,
    pub payload: String,
}

/// An in-memory broadcast medium shared by all endpoints in a test.
///
/// Sends are queued rather than delivered immediately; tests control when
/// (and whether) messages reach the other devices via [`deliver_all`].
#[derive(Clone, Default)]
pub struct Bus {
    queue: Rc<RefCell<VecDeque<Envelope>>>,
}

impl Bus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbound endpoint labeled with the sending device's id.
    #[must_use]
    pub fn endpoint(&self, from: &'static str) -> Endpoint {
        Endpoint {
            from,
            queue: Rc::clone(&self.queue),
        }
    }

    /// Takes every queued message off the bus, oldest first.
    #[allow(dead_code)]
    pub fn drain(&self) -> Vec<Envelope> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Drops all queued messages without delivering them, simulating loss.
    #[allow(dead_code)]
    pub fn drop_all(&self) {
        self.queue.borrow_mut().clear();
    }

    #[allow(dead_code)]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// A device's outbound half of the [`Bus`].
pub struct Endpoint {
    from: &'static str,
    queue: Rc<RefCell<VecDeque<Envelope>>>,
}

impl Broadcast for Endpoint {
    fn send(&mut self, topic: Topic, payload: &str) -> Result<(), SendError> {
        self.queue.borrow_mut().push_back(Envelope {
            from: self.from,
            topic,
            payload: payload.to_owned(),
        });
        Ok(())
    }
}

/// Builds a session for `self_id` attached to the bus, with every other
/// pool member registered as an active peer.
#[allow(dead_code)]
#[must_use]
pub fn session_on_bus(
    bus: &Bus,
    self_id: &'static str,
    peers: &[&'static str],
) -> TurnSession<HarnessConfig> {
    let mut builder = SessionBuilder::<HarnessConfig>::new(self_id);
    for &peer in peers {
        if peer != self_id {
            builder = builder.add_participant(peer, true);
        }
    }
    builder.start(Box::new(bus.endpoint(self_id)))
}

/// Delivers queued bus traffic to every session except the sender, then
/// repeats until the bus is idle (replies can trigger further replies).
///
/// Unknown topics or garbled payloads panic: the harness only ever carries
/// messages the sessions themselves produced.
#[allow(dead_code)]
pub fn deliver_all(bus: &Bus, sessions: &mut [TurnSession<HarnessConfig>]) {
    loop {
        let pending: Vec<Envelope> = bus.queue.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return;
        }
        for envelope in pending {
            for session in sessions.iter_mut() {
                if *session.self_id() != envelope.from {
                    session
                        .handle_wire_message(envelope.topic.as_str(), &envelope.payload)
                        .unwrap();
                }
            }
        }
    }
}
