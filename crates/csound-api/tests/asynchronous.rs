mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use csound_api::{BridgeError, PerformanceState, Status};

use common::{host, pump_until, ORCHESTRA};

#[test]
fn completion_reports_the_end_of_the_score() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 0.5\n").unwrap();
    host.start(id).unwrap();

    let finished = Rc::new(Cell::new(None));
    let sink = finished.clone();
    host.perform_async(id, move |host, instance, result| {
        assert_eq!(host.performance_state(instance).unwrap(), PerformanceState::Completed);
        sink.set(Some(result));
    })
    .unwrap();
    assert_eq!(host.performance_state(id).unwrap(), PerformanceState::Performing);

    host.run_until_idle();
    assert!(finished.get().unwrap() > 0);
    assert_eq!(host.last_performance_result(id).unwrap(), finished.get());
    assert_eq!(host.score_time(id).unwrap(), 0.5);
}

#[test]
fn progress_runs_after_each_period() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 0.5\n").unwrap();
    host.start(id).unwrap();

    let periods = Rc::new(RefCell::new(Vec::new()));
    let sink = periods.clone();
    host.perform_ksmps_async(
        id,
        move |host, instance| sink.borrow_mut().push(host.current_time_samples(instance).unwrap()),
        |_, _, _| {},
    )
    .unwrap();
    host.run_until_idle();

    // Progress is delivered after the fact; each entry saw at least its own period.
    let seen = periods.borrow();
    assert_eq!(seen.len(), 5);
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(seen.iter().all(|samples| *samples >= 10));
}

#[test]
fn stop_from_another_thread() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();

    let result = Rc::new(Cell::new(None));
    let sink = result.clone();
    let handle = host.perform_async(id, move |_, _, code| sink.set(Some(code))).unwrap();
    assert_eq!(handle.instance(), id);

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.stop();
    });
    host.run_until_idle();
    stopper.join().unwrap();

    assert_eq!(result.get(), Some(0));
    assert_eq!(host.performance_state(id).unwrap(), PerformanceState::Stopped);
}

#[test]
fn stop_through_the_host() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();
    host.perform_async(id, |_, _, _| {}).unwrap();

    let handle = host.performance_handle(id).unwrap().unwrap();
    host.stop(id).unwrap();
    assert!(handle.is_stop_requested());
    host.run_until_idle();
    assert_eq!(host.last_performance_result(id).unwrap(), Some(0));
    assert!(host.performance_handle(id).unwrap().is_none());
}

#[test]
fn one_performance_at_a_time() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();
    host.perform_async(id, |_, _, _| {}).unwrap();

    assert!(matches!(
        host.perform_async(id, |_, _, _| {}),
        Err(BridgeError::AlreadyPerforming(instance)) if instance == id
    ));
    assert!(matches!(host.perform(id), Err(BridgeError::AlreadyPerforming(_))));
    assert!(matches!(host.perform_ksmps(id), Err(BridgeError::AlreadyPerforming(_))));
    assert!(matches!(host.reset(id), Err(BridgeError::AlreadyPerforming(_))));

    host.stop(id).unwrap();
    host.run_until_idle();
}

#[test]
fn engine_feeding_calls_are_deferred_to_the_worker() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();

    let printed = Rc::new(RefCell::new(Vec::new()));
    let sink = printed.clone();
    host.set_message_callback(id, move |_, _, _, text| sink.borrow_mut().push(text.to_string()))
        .unwrap();
    host.perform_async(id, |_, _, _| {}).unwrap();

    assert_eq!(
        host.compile_orc(id, "instr 2\nprints \"two\\n\"\nendin\n").unwrap(),
        Status::SUCCESS
    );
    assert_eq!(host.score_event(id, 'i', &[2.0, 0.0, 0.1]).unwrap(), Status::SUCCESS);
    assert!(pump_until(&mut host, |_| printed.borrow().iter().any(|text| text == "two\n")));

    host.stop(id).unwrap();
    host.run_until_idle();
}

#[test]
fn queued_commands_left_at_exit_still_reach_the_engine() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();

    let seen_by_completion = Rc::new(Cell::new(None));
    let sink = seen_by_completion.clone();
    host.perform_async(id, move |host, instance, _| {
        sink.set(Some(host.table_length(instance, 3).unwrap()))
    })
    .unwrap();

    host.stop(id).unwrap();
    host.read_score(id, "f 3 0 4 -2 1 2 3 4\n").unwrap();
    host.run_until_idle();
    // No control period ran with the table, so completion must not see it.
    assert_eq!(seen_by_completion.get(), Some(-1));
    assert_eq!(host.table_length(id, 3).unwrap(), 4);
}

#[test]
fn leftover_commands_follow_a_restarted_performance() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();

    host.perform_async(id, |host, instance, _| {
        host.perform_async(instance, |_, _, _| {}).unwrap();
    })
    .unwrap();
    host.stop(id).unwrap();
    host.read_score(id, "f 5 0 2 -2 7 8\n").unwrap();

    assert!(pump_until(&mut host, |host| host.table_length(id, 5).unwrap() == 2));
    assert_eq!(host.performance_state(id).unwrap(), PerformanceState::Performing);
    host.stop(id).unwrap();
    host.run_until_idle();
}

#[test]
fn completion_may_start_the_next_performance() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 0.2\n").unwrap();
    host.start(id).unwrap();

    let results = Rc::new(RefCell::new(Vec::new()));
    let first = results.clone();
    host.perform_async(id, move |host, instance, result| {
        first.borrow_mut().push(result);
        host.rewind_score(instance).unwrap();
        let second = first.clone();
        host.perform_async(instance, move |_, _, result| second.borrow_mut().push(result))
            .unwrap();
    })
    .unwrap();
    host.run_until_idle();

    let results = results.borrow();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|result| *result > 0));
}

#[test]
fn destroy_during_performance_releases_the_engine() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();
    let liveness = host.engine(id).unwrap().liveness();

    let completed = Rc::new(Cell::new(false));
    let sink = completed.clone();
    host.perform_async(id, move |_, _, _| sink.set(true)).unwrap();
    host.destroy(id).unwrap();

    assert!(pump_until(&mut host, |_| liveness.upgrade().is_none()));
    host.run_for(Duration::from_millis(20));
    assert!(!completed.get());
    assert!(!host.is_performing_any());
}

#[test]
fn instances_perform_independently() {
    let (mut host, a) = host();
    let b = host.create(csound_api::HostData::none()).unwrap();
    for (id, score) in [(a, "i 1 0 0.3\n"), (b, "i 1 0 -1\n")] {
        host.compile_orc(id, ORCHESTRA).unwrap();
        host.read_score(id, score).unwrap();
        host.start(id).unwrap();
        host.perform_async(id, |_, _, _| {}).unwrap();
    }

    assert!(pump_until(&mut host, |host| {
        host.performance_state(a).unwrap() == PerformanceState::Completed
    }));
    assert_eq!(host.performance_state(b).unwrap(), PerformanceState::Performing);
    host.stop(b).unwrap();
    host.run_until_idle();
    assert_eq!(host.performance_state(b).unwrap(), PerformanceState::Stopped);
}

#[test]
fn breakpoint_pauses_the_worker_until_continued() {
    let (mut host, id) = host();
    host.compile_orc(id, "sr = 100\nksmps = 10\ninstr 1\nkamp = p4 * 2\nendin\n")
        .unwrap();
    host.read_score(id, "i 1 0 -1 0.25\n").unwrap();

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = hits.clone();
    host.set_breakpoint_callback(id, move |info| {
        sink.lock().unwrap().push((thread::current().name().map(str::to_string), info.clone()));
    })
    .unwrap();
    host.debugger_init(id).unwrap();
    host.set_instrument_breakpoint(id, 1.0, 2).unwrap();
    host.start(id).unwrap();
    host.perform_async(id, |_, _, _| {}).unwrap();

    assert!(pump_until(&mut host, |_| !hits.lock().unwrap().is_empty()));
    let paused_at = {
        let hits = hits.lock().unwrap();
        let (thread_name, info) = &hits[0];
        assert_ne!(thread_name.as_deref(), Some("csound-perform"));
        assert_eq!(info.variable("kamp"), Some(&csound_api::VariableValue::Number(0.5)));
        info.instrument.as_ref().unwrap().kcounter
    };
    assert_eq!(paused_at, 0);

    // Still paused: no further hits and time stands still.
    host.run_for(Duration::from_millis(20));
    assert_eq!(hits.lock().unwrap().len(), 1);
    let held = host.current_time_samples(id).unwrap();
    host.run_for(Duration::from_millis(20));
    assert_eq!(host.current_time_samples(id).unwrap(), held);

    host.debug_continue(id).unwrap();
    assert!(pump_until(&mut host, |_| hits.lock().unwrap().len() >= 2));
    assert_eq!(hits.lock().unwrap()[1].1.instrument.as_ref().unwrap().kcounter, 3);

    host.clear_breakpoints(id).unwrap();
    host.stop(id).unwrap();
    host.run_until_idle();
    assert_eq!(host.performance_state(id).unwrap(), PerformanceState::Stopped);
}

#[test]
fn end_event_finishes_an_open_ended_score() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 -1\n").unwrap();
    host.start(id).unwrap();

    let result = Rc::new(Cell::new(None));
    let sink = result.clone();
    host.perform_async(id, move |_, _, code| sink.set(Some(code))).unwrap();
    assert_eq!(host.score_event(id, 'e', &[]).unwrap(), Status::SUCCESS);
    host.run_until_idle();

    assert!(result.get().unwrap() > 0);
    assert_eq!(host.performance_state(id).unwrap(), PerformanceState::Completed);
}

#[test]
fn completion_may_destroy_its_instance() {
    let (mut host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 0.1\n").unwrap();
    host.start(id).unwrap();
    host.perform_async(id, |host, instance, _| host.destroy(instance).unwrap())
        .unwrap();
    host.run_until_idle();

    assert!(!host.contains(id));
    assert!(matches!(host.performance_state(id), Err(BridgeError::UnknownInstance(_))));
}
