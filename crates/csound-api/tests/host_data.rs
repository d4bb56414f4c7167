mod common;

use std::cell::RefCell;
use std::rc::Rc;

use csound_api::{BridgeError, HostConfig, HostData};
use csound_testkit::ScriptedHost;

use common::init_logging;

#[derive(Debug, PartialEq)]
struct Session {
    name: &'static str,
}

#[test]
fn host_data_is_returned_by_identity() {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let session = Rc::new(Session { name: "rehearsal" });
    let id = host.create(HostData::from_rc(session.clone())).unwrap();

    let data = host.host_data(id).unwrap();
    assert!(Rc::ptr_eq(&data.downcast::<Session>().unwrap(), &session));
    assert_eq!(data.downcast_ref::<Session>().unwrap().name, "rehearsal");
    assert!(data.downcast_ref::<String>().is_none());
    assert_eq!(data, HostData::from_rc(session.clone()));
    assert_ne!(data, HostData::new(Session { name: "rehearsal" }));
}

#[test]
fn host_data_can_be_replaced_and_cleared() {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let id = host.create(HostData::new(1_u32)).unwrap();
    host.set_host_data(id, HostData::new("two")).unwrap();
    assert_eq!(host.host_data(id).unwrap().downcast_ref::<&str>(), Some(&"two"));
    host.set_host_data(id, HostData::none()).unwrap();
    assert!(host.host_data(id).unwrap().is_none());

    host.destroy(id).unwrap();
    assert!(matches!(host.host_data(id), Err(BridgeError::UnknownInstance(_))));
}

#[test]
fn callbacks_reach_their_instance_data() {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let id = host.create(HostData::from_rc(log.clone())).unwrap();
    host.set_message_callback(id, |host, instance, _, text| {
        let data = host.host_data(instance).unwrap();
        if let Some(log) = data.downcast::<RefCell<Vec<String>>>() {
            log.borrow_mut().push(text.trim().to_string());
        }
    })
    .unwrap();

    host.message(id, "noted\n").unwrap();
    host.run_until_idle();
    assert_eq!(*log.borrow(), ["noted"]);
}

#[test]
fn dropping_the_host_releases_instances() {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let data = Rc::new(());
    let id = host.create(HostData::from_rc(data.clone())).unwrap();
    let liveness = host.engine(id).unwrap().liveness();
    assert_eq!(Rc::strong_count(&data), 2);
    drop(host);
    assert_eq!(Rc::strong_count(&data), 1);
    assert!(liveness.upgrade().is_none());
}
