#![allow(dead_code)]

use std::time::{Duration, Instant};

use csound_api::{HostConfig, HostData, InstanceId};
pub use csound_testkit::ScriptedHost;

/// Ten control periods per second, so score times map to whole periods.
pub const ORCHESTRA: &str = "sr = 100\nksmps = 10\ninstr 1\nendin\n";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn host() -> (ScriptedHost, InstanceId) {
    init_logging();
    let mut host = ScriptedHost::new(HostConfig::default());
    let id = host.create(HostData::none()).unwrap();
    (host, id)
}

/// Pumps events until `done` holds or two seconds pass. Returns whether `done` held.
pub fn pump_until(host: &mut ScriptedHost, mut done: impl FnMut(&ScriptedHost) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        host.run_for(Duration::from_millis(5));
        if done(host) {
            return true;
        }
    }
    false
}
