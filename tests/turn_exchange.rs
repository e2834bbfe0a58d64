// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use common::{deliver_all, session_on_bus, Bus, HarnessConfig};
use turnwire::{DisplayCommand, SessionBuilder, SessionEvent, Topic, TurnIndex};

const POOL: [&str; 3] = ["alice", "bob", "carol"];

fn three_on_a_bus(bus: &Bus) -> Vec<turnwire::TurnSession<HarnessConfig>> {
    POOL.iter()
        .map(|&id| session_on_bus(bus, id, &POOL))
        .collect()
}

#[test]
fn all_devices_agree_on_the_active_order() {
    let bus = Bus::new();
    // Roster handed out in a different order on every device.
    let alice = SessionBuilder::<HarnessConfig>::new("alice")
        .add_participant("carol", true)
        .add_participant("bob", true)
        .start(Box::new(bus.endpoint("alice")));
    let bob = SessionBuilder::<HarnessConfig>::new("bob")
        .add_participant("alice", true)
        .add_participant("carol", true)
        .start(Box::new(bus.endpoint("bob")));

    assert_eq!(alice.active_participants(), bob.active_participants());
    assert_eq!(alice.active_participants(), &["alice", "bob", "carol"]);
}

#[test]
fn tap_propagates_the_turn_to_every_device() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    // Slot 0 is alice's; she taps.
    assert!(sessions[0].is_my_turn());
    sessions[0].handle_event(SessionEvent::Tap);
    deliver_all(&bus, &mut sessions);

    for session in &sessions {
        assert_eq!(session.turn_index(), TurnIndex::new(1));
        assert_eq!(session.current_holder(), Some(&"bob"));
    }
    assert!(sessions[1].is_my_turn());
    assert!(!sessions[0].is_my_turn());
    assert!(!sessions[2].is_my_turn());
}

#[test]
fn turn_cycles_through_all_devices_and_wraps() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    for expected_holder in ["bob", "carol", "alice"] {
        let holder = sessions
            .iter()
            .position(|s| s.is_my_turn())
            .expect("some device holds the turn");
        sessions[holder].handle_event(SessionEvent::Tap);
        deliver_all(&bus, &mut sessions);
        for session in &sessions {
            assert_eq!(session.current_holder(), Some(&expected_holder));
        }
    }
}

#[test]
fn only_the_holder_answers_a_newcomer() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    // Startup traffic: three user-loaded announcements. Each is answered by
    // the turn holder only, so the bootstrap cost stays at one responder.
    deliver_all(&bus, &mut sessions);

    bus.drop_all();
    let mut newcomer = session_on_bus(&bus, "dave", &["alice", "bob", "carol", "dave"]);
    for session in &mut sessions {
        session.handle_event(SessionEvent::PeerJoined { id: "dave" });
    }

    let traffic = bus.drain();
    // Exactly one announcement (dave's) queued so far.
    assert_eq!(traffic.len(), 1);
    assert_eq!(traffic[0].topic, Topic::UserLoaded);

    // Route the announcement by hand to observe who responds.
    for session in &mut sessions {
        session
            .handle_wire_message(traffic[0].topic.as_str(), &traffic[0].payload)
            .unwrap();
    }
    let responses = bus.drain();
    assert!(responses.iter().all(|e| e.from == "alice"));
    assert_eq!(responses.len(), 2);

    // The newcomer adopts the bootstrap state.
    for envelope in &responses {
        newcomer
            .handle_wire_message(envelope.topic.as_str(), &envelope.payload)
            .unwrap();
    }
    assert_eq!(newcomer.turn_index(), sessions[0].turn_index());
    assert_eq!(newcomer.background_index(), sessions[0].background_index());
}

#[test]
fn newcomer_bootstrap_carries_background_state() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    // Alice fails twice on her turn; the background advances locally only.
    sessions[0].handle_event(SessionEvent::Fail);
    sessions[0].handle_event(SessionEvent::Fail);
    assert_eq!(sessions[0].background_index(), 2);
    assert_eq!(sessions[1].background_index(), 0);

    // A newcomer's announcement spreads the holder's background everywhere.
    let mut newcomer = session_on_bus(&bus, "dave", &POOL);
    sessions.push(newcomer);
    for session in &mut sessions {
        if *session.self_id() != "dave" {
            session.handle_event(SessionEvent::PeerJoined { id: "dave" });
        }
    }
    deliver_all(&bus, &mut sessions);
    for session in &sessions {
        assert_eq!(session.background_index(), 2);
    }
    newcomer = sessions.pop().unwrap();
    assert_eq!(newcomer.background_index(), 2);
}

#[test]
fn devices_reconcile_identically_when_the_holder_leaves() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    // Move the turn to bob (slot 1), then bob vanishes.
    sessions[0].handle_event(SessionEvent::Tap);
    deliver_all(&bus, &mut sessions);
    sessions[0].handle_event(SessionEvent::PeerLeft { id: "bob" });
    sessions[2].handle_event(SessionEvent::PeerLeft { id: "bob" });

    // No message is needed: both survivors re-derive [alice, carol] and
    // re-home slot 1 onto carol.
    for session in [&sessions[0], &sessions[2]] {
        assert_eq!(session.active_participants(), &["alice", "carol"]);
        assert_eq!(session.turn_index(), TurnIndex::new(1));
        assert_eq!(session.current_holder(), Some(&"carol"));
    }
    assert!(sessions[2].is_my_turn());
}

#[test]
fn lost_broadcast_diverges_until_the_next_delivery() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    // Alice taps but the broadcast never arrives.
    sessions[0].handle_event(SessionEvent::Tap);
    let lost = bus.drain();
    assert_eq!(lost.len(), 1);
    assert_eq!(sessions[0].turn_index(), TurnIndex::new(1));
    assert_eq!(sessions[1].turn_index(), TurnIndex::new(0));

    // Nobody considers the turn theirs now: alice believes it is bob's,
    // bob and carol still believe it is alice's. Best effort means this
    // stalls rather than self-heals; a newcomer announcement draws no
    // response from anyone.
    assert!(sessions.iter().all(|s| !s.is_my_turn()));
    for session in &mut sessions {
        session.handle_event(SessionEvent::UserLoadedMsg);
    }
    assert!(bus.is_idle());

    // Redelivering the writer's message (transport-level retry) converges
    // everyone by plain overwrite.
    for session in &mut sessions[1..] {
        session
            .handle_wire_message(lost[0].topic.as_str(), &lost[0].payload)
            .unwrap();
    }
    for session in &sessions {
        assert_eq!(session.turn_index(), TurnIndex::new(1));
        assert_eq!(session.current_holder(), Some(&"bob"));
    }
    assert!(sessions[1].is_my_turn());
}

#[test]
fn display_commands_reflect_the_turn_on_each_device() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);
    for session in &mut sessions {
        let _ = session.display_commands().count();
    }

    sessions[0].handle_event(SessionEvent::Tap);
    deliver_all(&bus, &mut sessions);

    // Bob's display turns the panel and countdown on; carol's stays off.
    let bob_commands: Vec<DisplayCommand> = sessions[1].display_commands().collect();
    assert!(bob_commands.contains(&DisplayCommand::SetTurnPanelVisible(true)));
    assert!(bob_commands.contains(&DisplayCommand::SetCounterRunning(true)));
    let carol_commands: Vec<DisplayCommand> = sessions[2].display_commands().collect();
    assert!(carol_commands.contains(&DisplayCommand::SetTurnPanelVisible(false)));
    assert!(carol_commands.contains(&DisplayCommand::SetCounterRunning(false)));
}

#[test]
fn restart_then_handshake_resets_every_device() {
    let bus = Bus::new();
    let mut sessions = three_on_a_bus(&bus);
    deliver_all(&bus, &mut sessions);

    // Alice fails, then an announcement spreads background 1 everywhere.
    sessions[0].handle_event(SessionEvent::Fail);
    sessions[0].handle_event(SessionEvent::UserLoadedMsg);
    deliver_all(&bus, &mut sessions);
    assert!(sessions.iter().all(|s| s.background_index() == 1));

    // Restart is local; the next handshake spreads the reset.
    sessions[0].handle_event(SessionEvent::Restart);
    assert_eq!(sessions[0].background_index(), 0);
    assert_eq!(sessions[0].player_count(), 3);
    sessions[0].handle_event(SessionEvent::UserLoadedMsg);
    deliver_all(&bus, &mut sessions);
    assert!(sessions.iter().all(|s| s.background_index() == 0));
}
