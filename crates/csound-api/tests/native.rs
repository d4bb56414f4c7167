//! Smoke tests against the real engine.
#![cfg(feature = "libcsound")]

use std::cell::RefCell;
use std::rc::Rc;

use csound_api::{CsoundHost, HostConfig, HostData, Status};

const ORCHESTRA: &str =
    "sr = 44100\nksmps = 32\nnchnls = 1\n0dbfs = 1\ninstr 1\nprints \"native\\n\"\nendin\n";

fn host() -> (CsoundHost, csound_api::InstanceId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = HostConfig {
        options: vec!["-n".to_string(), "-d".to_string()],
        ..HostConfig::default()
    };
    let mut host = CsoundHost::new(config);
    let id = host.create(HostData::none()).unwrap();
    (host, id)
}

#[test]
fn reports_versions() {
    assert!(CsoundHost::version() >= 6000);
    assert_eq!(CsoundHost::size_of_myflt(), 8);
}

#[test]
fn compiles_and_performs() {
    let (mut host, id) = host();
    let printed = Rc::new(RefCell::new(String::new()));
    let sink = printed.clone();
    host.set_message_callback(id, move |_, _, _, text| sink.borrow_mut().push_str(text))
        .unwrap();

    assert_eq!(host.compile_orc(id, ORCHESTRA).unwrap(), Status::SUCCESS);
    assert_eq!(host.ksmps(id).unwrap(), 32);
    assert_eq!(host.read_score(id, "i 1 0 0.01\n").unwrap(), Status::SUCCESS);
    assert_eq!(host.start(id).unwrap(), Status::SUCCESS);

    let result = Rc::new(RefCell::new(None));
    let sink = result.clone();
    host.perform_async(id, move |_, _, code| *sink.borrow_mut() = Some(code))
        .unwrap();
    host.run_until_idle();

    assert!(result.borrow().unwrap() > 0);
    assert!(printed.borrow().contains("native"));
}

#[test]
fn lists_opcodes() {
    let (host, id) = host();
    let (count, mut list) = host.new_opcode_list(id).unwrap();
    assert!(count > 100);
    assert!(list.iter().any(|entry| entry.name == "oscili"));
    host.dispose_opcode_list(id, &mut list).unwrap();
}
