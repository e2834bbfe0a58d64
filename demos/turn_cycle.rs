//! Runs three in-memory devices through a full turn cycle.
//!
//! ```text
//! cargo run --example turn_cycle
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use turnwire::{
    Broadcast, Config, SendError, SessionBuilder, SessionEvent, Topic, TurnSession,
};

struct DemoConfig;

impl Config for DemoConfig {
    type Id = &'static str;
}

/// An in-memory broadcast medium shared between all demo devices.
#[derive(Clone, Default)]
struct Bus {
    queue: Rc<RefCell<VecDeque<(&'static str, Topic, String)>>>,
}

struct Endpoint {
    from: &'static str,
    bus: Bus,
}

impl Broadcast for Endpoint {
    fn send(&mut self, topic: Topic, payload: &str) -> Result<(), SendError> {
        self.bus
            .queue
            .borrow_mut()
            .push_back((self.from, topic, payload.to_owned()));
        Ok(())
    }
}

fn deliver(bus: &Bus, sessions: &mut [TurnSession<DemoConfig>]) {
    loop {
        let pending: Vec<_> = bus.queue.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return;
        }
        for (from, topic, payload) in pending {
            for session in sessions.iter_mut() {
                if *session.self_id() != from {
                    if let Err(err) = session.handle_wire_message(topic.as_str(), &payload) {
                        eprintln!("delivery to {} failed: {}", session.self_id(), err);
                    }
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // configure logging: output turnwire logs to standard out
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .finish(),
    )?;

    let devices = ["alice", "bob", "carol"];
    let bus = Bus::default();
    let mut sessions: Vec<TurnSession<DemoConfig>> = devices
        .iter()
        .map(|&id| {
            let mut builder = SessionBuilder::<DemoConfig>::new(id);
            for &peer in &devices {
                if peer != id {
                    builder = builder.add_participant(peer, true);
                }
            }
            builder.start(Box::new(Endpoint {
                from: id,
                bus: bus.clone(),
            }))
        })
        .collect();
    deliver(&bus, &mut sessions);

    // Tap around the circle twice.
    for _ in 0..(devices.len() * 2) {
        let holder = sessions
            .iter()
            .position(|s| s.is_my_turn())
            .ok_or("no device holds the turn")?;
        println!("tap on {}", sessions[holder].self_id());
        sessions[holder].handle_event(SessionEvent::Tap);
        deliver(&bus, &mut sessions);

        for session in &mut sessions {
            let id = *session.self_id();
            for command in session.display_commands() {
                println!("  [{}] {} <- {:?}", id, command.target(), command);
            }
        }
    }

    for session in &sessions {
        println!("{} final stats: {}", session.self_id(), session.stats());
    }
    Ok(())
}
