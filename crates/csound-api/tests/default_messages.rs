mod common;

use std::cell::RefCell;
use std::rc::Rc;

use csound_api::{HostConfig, HostData, MessageKind};

use common::{init_logging, ScriptedHost};

// The default message callback is process-wide, so the whole lifecycle runs in one test.
#[test]
fn default_callback_covers_instances_without_their_own() {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let before = host.create(HostData::none()).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    host.set_default_message_callback(move |_, attributes, text| {
        sink.borrow_mut().push((attributes.kind(), text.to_string()))
    });

    let quiet = host.create(HostData::none()).unwrap();
    let chatty = host.create(HostData::none()).unwrap();
    let own = Rc::new(RefCell::new(Vec::new()));
    let own_sink = own.clone();
    host.set_message_callback(chatty, move |_, _, _, text| {
        own_sink.borrow_mut().push(text.to_string())
    })
    .unwrap();

    host.message(before, "too early\n").unwrap();
    host.message(quiet, "routed\n").unwrap();
    host.compile_orc(quiet, "instr 1\n").unwrap();
    host.message(chatty, "kept\n").unwrap();
    host.run_until_idle();

    {
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (MessageKind::Default, "routed\n".to_string()));
        assert_eq!(seen[1].0, MessageKind::Error);
        assert!(seen[1].1.contains("syntax error"));
    }
    assert_eq!(*own.borrow(), ["kept\n"]);

    // The callback may clear itself; later messages are dropped.
    host.set_default_message_callback(|host, _, _| host.clear_default_message_callback());
    host.message(quiet, "first\n").unwrap();
    host.message(quiet, "second\n").unwrap();
    host.run_until_idle();
    host.message(quiet, "after\n").unwrap();
    assert_eq!(host.poll_events(), 0);
    assert_eq!(seen.borrow().len(), 2);

    // A second host takes the route over; the first stops receiving.
    let first = Rc::new(RefCell::new(0));
    let first_sink = first.clone();
    host.set_default_message_callback(move |_, _, _| *first_sink.borrow_mut() += 1);
    let mut other = ScriptedHost::new(HostConfig::default());
    let second = Rc::new(RefCell::new(0));
    let second_sink = second.clone();
    other.set_default_message_callback(move |_, _, _| *second_sink.borrow_mut() += 1);
    let later = other.create(HostData::none()).unwrap();
    other.message(later, "to the second host\n").unwrap();
    other.run_until_idle();
    host.run_until_idle();
    assert_eq!((*first.borrow(), *second.borrow()), (0, 1));

    // Clearing on a host that lost the route leaves the owner's route in place.
    host.clear_default_message_callback();
    other.message(later, "still routed\n").unwrap();
    other.run_until_idle();
    assert_eq!(*second.borrow(), 2);
}
