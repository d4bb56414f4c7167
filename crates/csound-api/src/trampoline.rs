//! Delivery of engine callbacks into the host context.
//!
//! The engine may raise callbacks on the host thread or on a performance worker. The hub
//! marshals their arguments on the spot and queues a [`HostEvent`]; the host runs the
//! matching closure the next time it pumps events. Breakpoints are the exception: the
//! raising thread waits until the host has run the breakpoint callback.
//!
//! Messages of instances without their own message callback go to the process-wide
//! default route, which belongs to at most one host at a time.

use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use csound_sys::{debug_bkpt_info_t, WINDAT};
use libc::{c_char, c_int};
use parking_lot::{const_mutex, Mutex};

use crate::marshal::{
    breakpoint_from_native, file_open_from_native, graph_from_native, string_from_ptr,
    BreakpointInfo, FileOpenInfo, GraphData,
};
use crate::message::MessageAttributes;
use crate::registry::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Message,
    MakeGraph,
    DrawGraph,
    KillGraph,
    FileOpen,
    Breakpoint,
}

/// Breakpoint callbacks run while the performing thread is paused, so they must be `Send`.
pub type BreakpointCallback = Box<dyn FnMut(&BreakpointInfo) + Send>;

#[derive(Debug)]
pub(crate) enum HostEvent {
    Message {
        instance: InstanceId,
        attributes: MessageAttributes,
        text: String,
    },
    MakeGraph {
        instance: InstanceId,
        graph: GraphData,
        name: String,
    },
    DrawGraph {
        instance: InstanceId,
        graph: GraphData,
    },
    KillGraph {
        instance: InstanceId,
        graph: GraphData,
    },
    FileOpen {
        instance: InstanceId,
        file: FileOpenInfo,
    },
    Breakpoint {
        instance: InstanceId,
        info: BreakpointInfo,
        reply: Sender<()>,
    },
    DefaultMessage {
        attributes: MessageAttributes,
        text: String,
    },
    Progress {
        instance: InstanceId,
    },
    PerformanceFinished {
        instance: InstanceId,
        result: i32,
        stopped: bool,
    },
}

impl HostEvent {
    /// Instance the event belongs to; `None` for process-wide events.
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            HostEvent::Message { instance, .. }
            | HostEvent::MakeGraph { instance, .. }
            | HostEvent::DrawGraph { instance, .. }
            | HostEvent::KillGraph { instance, .. }
            | HostEvent::FileOpen { instance, .. }
            | HostEvent::Breakpoint { instance, .. }
            | HostEvent::Progress { instance }
            | HostEvent::PerformanceFinished { instance, .. } => Some(*instance),
            HostEvent::DefaultMessage { .. } => None,
        }
    }
}

struct DefaultMessageRoute {
    owner: u64,
    events: Sender<HostEvent>,
}

static DEFAULT_MESSAGE_ROUTE: Mutex<Option<DefaultMessageRoute>> = const_mutex(None);

/// Delivers a message raised through the engine's process-wide default message callback.
///
/// Engines call this for instances that have no message callback of their own. The message
/// is queued to the host that registered the default callback, or dropped when none did.
pub fn deliver_default_message(attributes: i32, text: &CStr) {
    let route = DEFAULT_MESSAGE_ROUTE.lock();
    let Some(route) = route.as_ref() else {
        return;
    };
    let event = HostEvent::DefaultMessage {
        attributes: MessageAttributes::from(attributes),
        text: text.to_string_lossy().into_owned(),
    };
    if route.events.send(event).is_err() {
        log::debug!("Host {} is gone; dropping default message.", route.owner);
    }
}

/// Points the default route at `owner`. Returns the previous owner.
pub(crate) fn route_default_messages(owner: u64, events: Sender<HostEvent>) -> Option<u64> {
    DEFAULT_MESSAGE_ROUTE
        .lock()
        .replace(DefaultMessageRoute { owner, events })
        .map(|previous| previous.owner)
}

/// Removes the default route if `owner` holds it. Returns whether it did.
pub(crate) fn unroute_default_messages(owner: u64) -> bool {
    let mut route = DEFAULT_MESSAGE_ROUTE.lock();
    if route.as_ref().is_some_and(|route| route.owner == owner) {
        *route = None;
        true
    } else {
        false
    }
}

/// Per-instance target of the engine's native callbacks.
///
/// Engines receive an `Arc<CallbackHub>` at creation and call into it from whatever
/// thread raised the callback.
pub struct CallbackHub {
    instance: InstanceId,
    events: Sender<HostEvent>,
    host_thread: ThreadId,
    detached: AtomicBool,
    breakpoint: Mutex<Option<BreakpointCallback>>,
    poll_interval: Duration,
}

impl CallbackHub {
    pub(crate) fn new(
        instance: InstanceId,
        events: Sender<HostEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            instance,
            events,
            host_thread: thread::current().id(),
            detached: AtomicBool::new(false),
            breakpoint: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Stops all further delivery. Pending breakpoint waits give up at the next poll.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.breakpoint.lock().take();
    }

    pub fn message(&self, attributes: i32, text: &CStr) {
        self.send(HostEvent::Message {
            instance: self.instance,
            attributes: MessageAttributes::from(attributes),
            text: text.to_string_lossy().into_owned(),
        });
    }

    /// # Safety
    ///
    /// `data` and `name` must be null or valid for the duration of the call.
    pub unsafe fn make_graph(&self, data: *const WINDAT, name: *const c_char) {
        if let Some(graph) = graph_from_native(data) {
            self.send(HostEvent::MakeGraph {
                instance: self.instance,
                graph,
                name: string_from_ptr(name).unwrap_or_default(),
            });
        }
    }

    /// # Safety
    ///
    /// `data` must be null or valid for the duration of the call.
    pub unsafe fn draw_graph(&self, data: *const WINDAT) {
        if let Some(graph) = graph_from_native(data) {
            self.send(HostEvent::DrawGraph {
                instance: self.instance,
                graph,
            });
        }
    }

    /// # Safety
    ///
    /// `data` must be null or valid for the duration of the call.
    pub unsafe fn kill_graph(&self, data: *const WINDAT) {
        if let Some(graph) = graph_from_native(data) {
            self.send(HostEvent::KillGraph {
                instance: self.instance,
                graph,
            });
        }
    }

    /// # Safety
    ///
    /// `path` must be null or a valid NUL-terminated string.
    pub unsafe fn file_open(
        &self,
        path: *const c_char,
        file_type: c_int,
        write: c_int,
        temp: c_int,
    ) {
        self.send(HostEvent::FileOpen {
            instance: self.instance,
            file: file_open_from_native(path, file_type, write, temp),
        });
    }

    /// Runs the breakpoint callback and returns once it has completed.
    ///
    /// On the host thread the callback runs inline. On any other thread the report is sent
    /// to the host and this call blocks until the host has handled it, the instance is
    /// destroyed, or the host goes away.
    ///
    /// # Safety
    ///
    /// `info` must be null or valid for the duration of the call.
    pub unsafe fn breakpoint(&self, info: *const debug_bkpt_info_t) {
        if self.is_detached() || self.breakpoint.lock().is_none() {
            return;
        }
        let info = breakpoint_from_native(info);

        if thread::current().id() == self.host_thread {
            self.run_breakpoint(&info);
            return;
        }

        let (reply, done) = channel::bounded(1);
        let event = HostEvent::Breakpoint {
            instance: self.instance,
            info,
            reply,
        };
        if self.events.send(event).is_err() {
            return;
        }
        loop {
            match done.recv_timeout(self.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) if self.is_detached() => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    pub(crate) fn set_breakpoint_callback(&self, callback: Option<BreakpointCallback>) {
        *self.breakpoint.lock() = callback;
    }

    pub(crate) fn run_breakpoint(&self, info: &BreakpointInfo) {
        if let Some(callback) = self.breakpoint.lock().as_mut() {
            callback(info);
        }
    }

    pub(crate) fn progress(&self) {
        self.send(HostEvent::Progress { instance: self.instance });
    }

    /// Always delivered, even when detached, so the host can reap the worker.
    pub(crate) fn performance_finished(&self, result: i32, stopped: bool) {
        let event = HostEvent::PerformanceFinished {
            instance: self.instance,
            result,
            stopped,
        };
        if self.events.send(event).is_err() {
            log::debug!("Host for instance {} is gone; dropping completion.", self.instance);
        }
    }

    fn send(&self, event: HostEvent) {
        if self.is_detached() {
            return;
        }
        if self.events.send(event).is_err() {
            log::debug!("Host for instance {} is gone; dropping callback.", self.instance);
        }
    }
}

impl std::fmt::Debug for CallbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHub")
            .field("instance", &self.instance)
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::sync::Arc;

    use crossbeam::channel::unbounded;

    use super::*;

    fn hub() -> (Arc<CallbackHub>, crossbeam::channel::Receiver<HostEvent>) {
        let (tx, rx) = unbounded();
        let hub = Arc::new(CallbackHub::new(InstanceId::detached(), tx, Duration::from_millis(5)));
        (hub, rx)
    }

    #[test]
    fn messages_are_queued_in_order() {
        let (hub, rx) = hub();
        for text in ["one", "two", "three"] {
            hub.message(0, &CString::new(text).unwrap());
        }
        let texts: Vec<String> = rx
            .try_iter()
            .map(|event| match event {
                HostEvent::Message { text, .. } => text,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn default_route_belongs_to_its_last_owner() {
        let (first, first_rx) = unbounded();
        let (second, second_rx) = unbounded();
        assert_eq!(route_default_messages(u64::MAX - 1, first), None);
        assert_eq!(route_default_messages(u64::MAX, second), Some(u64::MAX - 1));
        deliver_default_message(0, &CString::new("quiet").unwrap());
        assert!(first_rx.try_recv().is_err());
        assert!(matches!(
            second_rx.try_recv(),
            Ok(HostEvent::DefaultMessage { text, .. }) if text == "quiet"
        ));

        assert!(!unroute_default_messages(u64::MAX - 1));
        assert!(unroute_default_messages(u64::MAX));
        deliver_default_message(0, &CString::new("dropped").unwrap());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn detached_hub_drops_callbacks() {
        let (hub, rx) = hub();
        hub.detach();
        hub.message(0, &CString::new("late").unwrap());
        hub.performance_finished(0, true);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HostEvent::PerformanceFinished { stopped: true, .. }));
    }

    #[test]
    fn breakpoint_on_host_thread_runs_inline() {
        let (hub, rx) = hub();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        hub.set_breakpoint_callback(Some(Box::new(move |_| *counter.lock() += 1)));
        unsafe { hub.breakpoint(std::ptr::null()) };
        assert_eq!(*hits.lock(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn breakpoint_on_worker_waits_for_host() {
        let (hub, rx) = hub();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        hub.set_breakpoint_callback(Some(Box::new(move |_| *counter.lock() += 1)));

        let worker_hub = hub.clone();
        let worker = thread::spawn(move || unsafe { worker_hub.breakpoint(std::ptr::null()) });

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            HostEvent::Breakpoint { info, reply, .. } => {
                assert!(!worker.is_finished());
                hub.run_breakpoint(&info);
                reply.send(()).unwrap();
            }
            other => panic!("unexpected {other:?}"),
        }
        worker.join().unwrap();
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn breakpoint_wait_ends_when_detached() {
        let (hub, rx) = hub();
        hub.set_breakpoint_callback(Some(Box::new(|_| {})));
        let worker_hub = hub.clone();
        let worker = thread::spawn(move || unsafe { worker_hub.breakpoint(std::ptr::null()) });

        let _pending = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        hub.detach();
        worker.join().unwrap();
    }
}
