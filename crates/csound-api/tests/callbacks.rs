mod common;

use std::cell::RefCell;
use std::rc::Rc;

use csound_api::{file_type, GraphData, HostData, MessageAttributes, MessageKind, Status};

use common::{host, ORCHESTRA};

#[test]
fn messages_carry_their_attributes() {
    let (mut host, id) = host();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    host.set_message_callback(id, move |_, instance, attributes, text| {
        sink.borrow_mut().push((instance, attributes, text.to_string()))
    })
    .unwrap();

    host.message_s(id, MessageAttributes::WARNING | MessageAttributes::FG_RED, "hot\n")
        .unwrap();
    host.compile_orc(id, "instr 1\n").unwrap();
    assert_eq!(host.poll_events(), 2);

    let seen = seen.borrow();
    assert_eq!(seen[0].0, id);
    assert_eq!(seen[0].1.kind(), MessageKind::Warning);
    assert_eq!(seen[0].2, "hot\n");
    assert_eq!(seen[1].1.kind(), MessageKind::Error);
    assert!(seen[1].2.contains("syntax error"));
}

#[test]
fn events_wait_for_the_host_to_pump() {
    let (mut host, id) = host();
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    host.set_message_callback(id, move |_, _, _, _| *sink.borrow_mut() += 1)
        .unwrap();

    host.message(id, "one\n").unwrap();
    host.message(id, "two\n").unwrap();
    assert_eq!(*count.borrow(), 0);
    host.run_until_idle();
    assert_eq!(*count.borrow(), 2);
}

#[test]
fn callbacks_may_reenter_the_host() {
    let (mut host, id) = host();
    host.compile_orc(id, "chn_k \"level\", 3\ninstr 1\nendin\n").unwrap();
    host.set_message_callback(id, |host, instance, _, text| {
        if let Ok(value) = text.trim().parse::<f64>() {
            host.set_control_channel(instance, "level", value).unwrap();
            host.message(instance, "ack\n").unwrap();
        }
    })
    .unwrap();

    host.message(id, "0.75\n").unwrap();
    host.run_until_idle();
    let level = host.control_channel(id, "level").unwrap();
    assert_eq!(level.value, 0.75);
    assert_eq!(level.status, Status::SUCCESS);
}

#[test]
fn a_callback_can_replace_itself() {
    let (mut host, id) = host();
    let log = Rc::new(RefCell::new(Vec::new()));
    let first = log.clone();
    host.set_message_callback(id, move |host, instance, _, _| {
        first.borrow_mut().push("first");
        let second = first.clone();
        host.set_message_callback(instance, move |_, _, _, _| second.borrow_mut().push("second"))
            .unwrap();
    })
    .unwrap();

    host.message(id, "a\n").unwrap();
    host.message(id, "b\n").unwrap();
    host.run_until_idle();
    assert_eq!(*log.borrow(), ["first", "second"]);
}

#[test]
fn cleared_callbacks_receive_nothing() {
    let (mut host, id) = host();
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    host.set_message_callback(id, move |_, _, _, _| *sink.borrow_mut() += 1)
        .unwrap();
    host.message(id, "queued\n").unwrap();
    host.clear_message_callback(id).unwrap();
    host.message(id, "unseen\n").unwrap();
    host.run_until_idle();
    assert_eq!(*count.borrow(), 0);
}

#[test]
fn events_of_a_destroyed_instance_are_dropped() {
    let (mut host, id) = host();
    let other = host.create(HostData::none()).unwrap();
    let count = Rc::new(RefCell::new(Vec::new()));
    for instance in [id, other] {
        let sink = count.clone();
        host.set_message_callback(instance, move |_, from, _, _| sink.borrow_mut().push(from))
            .unwrap();
        host.message(instance, "hello\n").unwrap();
    }
    host.destroy(id).unwrap();
    host.run_until_idle();
    assert_eq!(*count.borrow(), [other]);
}

#[test]
fn file_open_reports_the_output() {
    let (mut host, id) = host();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.aiff");
    let opened = Rc::new(RefCell::new(Vec::new()));
    let sink = opened.clone();
    host.set_file_open_callback(id, move |_, _, file| sink.borrow_mut().push(file.clone()))
        .unwrap();

    host.compile_orc(id, ORCHESTRA).unwrap();
    host.set_output(id, path.to_str().unwrap(), None, None).unwrap();
    assert_eq!(host.start(id).unwrap(), Status::SUCCESS);
    host.run_until_idle();

    let opened = opened.borrow();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].path, path.to_str().unwrap());
    assert_eq!(opened[0].file_type, file_type::AIFF);
    assert!(opened[0].for_writing);
    assert!(!opened[0].temporary);
    assert!(path.exists());
}

#[test]
fn realtime_output_opens_no_file() {
    let (mut host, id) = host();
    let opened = Rc::new(RefCell::new(0));
    let sink = opened.clone();
    host.set_file_open_callback(id, move |_, _, _| *sink.borrow_mut() += 1)
        .unwrap();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.set_option(id, "-odac").unwrap();
    host.start(id).unwrap();
    host.run_until_idle();
    assert_eq!(*opened.borrow(), 0);
}

#[test]
fn graphs_follow_the_table_lifecycle() {
    let (mut host, id) = host();
    let events: Rc<RefCell<Vec<(&'static str, GraphData)>>> = Rc::new(RefCell::new(Vec::new()));
    let make = events.clone();
    let draw = events.clone();
    let kill = events.clone();
    host.set_make_graph_callback(id, move |_, _, graph, name| {
        assert_eq!(name, graph.caption);
        make.borrow_mut().push(("make", graph.clone()))
    })
    .unwrap();
    host.set_draw_graph_callback(id, move |_, _, graph| {
        draw.borrow_mut().push(("draw", graph.clone()))
    })
    .unwrap();
    host.set_kill_graph_callback(id, move |_, _, graph| {
        kill.borrow_mut().push(("kill", graph.clone()))
    })
    .unwrap();

    assert!(!host.set_is_graphable(id, true).unwrap());
    assert!(host.set_is_graphable(id, true).unwrap());
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "f 1 0 4 -2 -1 0 0.5 1\n").unwrap();
    host.start(id).unwrap();
    host.cleanup(id).unwrap();
    host.run_until_idle();

    let events = events.borrow();
    let kinds: Vec<&str> = events.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, ["make", "draw", "kill"]);
    let graph = &events[0].1;
    assert_eq!(graph.caption, "ftable 1:");
    assert_eq!(graph.samples, [-1.0, 0.0, 0.5, 1.0]);
    assert_eq!(graph.polarity, csound_sys::BIPOL);
    assert_eq!(graph.min, -1.0);
    assert_eq!(graph.absmax, 1.0);
}

#[test]
fn graphs_stay_hidden_when_displays_are_off() {
    let (mut host, id) = host();
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    host.set_draw_graph_callback(id, move |_, _, _| *sink.borrow_mut() += 1)
        .unwrap();
    host.set_is_graphable(id, true).unwrap();
    host.set_option(id, "-d").unwrap();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "f 1 0 8 10 1\n").unwrap();
    host.start(id).unwrap();
    host.run_until_idle();
    assert_eq!(*count.borrow(), 0);
}
