//! The host context: instance registry, callback slots and the event pump.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::bridge::Performance;
use crate::config::HostConfig;
use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use crate::host_data::HostData;
use crate::marshal::{c_string, BreakpointInfo, FileOpenInfo, GraphData};
use crate::message::MessageAttributes;
use crate::registry::{InstanceId, Registry};
use crate::trampoline::{self, CallbackHub, CallbackKind, HostEvent};

pub type MessageCallback<E> = Box<dyn FnMut(&mut Host<E>, InstanceId, MessageAttributes, &str)>;
pub type DefaultMessageCallback<E> = Box<dyn FnMut(&mut Host<E>, MessageAttributes, &str)>;
pub type MakeGraphCallback<E> = Box<dyn FnMut(&mut Host<E>, InstanceId, &GraphData, &str)>;
pub type GraphCallback<E> = Box<dyn FnMut(&mut Host<E>, InstanceId, &GraphData)>;
pub type FileOpenCallback<E> = Box<dyn FnMut(&mut Host<E>, InstanceId, &FileOpenInfo)>;
pub type ProgressCallback<E> = Box<dyn FnMut(&mut Host<E>, InstanceId)>;
pub type CompletionCallback<E> = Box<dyn FnOnce(&mut Host<E>, InstanceId, i32)>;

/// One registered callback. The generation changes on every registration so a callback
/// that replaces or clears itself while running is not put back afterwards.
pub(crate) struct Slot<F> {
    callback: Option<F>,
    generation: u64,
}

impl<F> Default for Slot<F> {
    fn default() -> Self {
        Self {
            callback: None,
            generation: 0,
        }
    }
}

impl<F> Slot<F> {
    pub fn set(&mut self, callback: Option<F>) {
        self.callback = callback;
        self.generation += 1;
    }

    pub fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    fn borrow(&mut self) -> Option<(F, u64)> {
        self.callback.take().map(|callback| (callback, self.generation))
    }

    fn give_back(&mut self, callback: F, generation: u64) {
        if self.generation == generation {
            self.callback = Some(callback);
        }
    }
}

pub(crate) struct HostCallbacks<E: Engine> {
    pub message: Slot<MessageCallback<E>>,
    pub make_graph: Slot<MakeGraphCallback<E>>,
    pub draw_graph: Slot<GraphCallback<E>>,
    pub kill_graph: Slot<GraphCallback<E>>,
    pub file_open: Slot<FileOpenCallback<E>>,
    pub breakpoint: bool,
}

impl<E: Engine> Default for HostCallbacks<E> {
    fn default() -> Self {
        Self {
            message: Slot::default(),
            make_graph: Slot::default(),
            draw_graph: Slot::default(),
            kill_graph: Slot::default(),
            file_open: Slot::default(),
            breakpoint: false,
        }
    }
}

impl<E: Engine> HostCallbacks<E> {
    fn installed(&self) -> Vec<CallbackKind> {
        [
            (CallbackKind::Message, self.message.is_set()),
            (CallbackKind::MakeGraph, self.make_graph.is_set()),
            (CallbackKind::DrawGraph, self.draw_graph.is_set()),
            (CallbackKind::KillGraph, self.kill_graph.is_set()),
            (CallbackKind::FileOpen, self.file_open.is_set()),
            (CallbackKind::Breakpoint, self.breakpoint),
        ]
        .into_iter()
        .filter_map(|(kind, set)| set.then_some(kind))
        .collect()
    }
}

pub(crate) struct Instance<E: Engine> {
    pub engine: Arc<E>,
    pub hub: Arc<CallbackHub>,
    pub host_data: HostData,
    pub callbacks: HostCallbacks<E>,
    pub performance: Performance<E>,
}

/// Owner of engine instances and of every host-side callback.
///
/// A `Host` is tied to the thread that created it. Engine callbacks raised anywhere are
/// queued and run inside [`poll_events`](Self::poll_events),
/// [`run_until_idle`](Self::run_until_idle) or [`run_for`](Self::run_for) on that thread.
///
/// Synchronous operations may be issued while an asynchronous performance runs. Those that
/// feed the engine (`compile_orc`, `read_score`, `score_event`, `input_message`) are deferred
/// to the worker; the rest are forwarded directly and rely on the engine's own thread-safety.
pub struct Host<E: Engine> {
    token: u64,
    config: HostConfig,
    registry: Registry<Instance<E>>,
    sender: Sender<HostEvent>,
    events: Receiver<HostEvent>,
    backlog: VecDeque<HostEvent>,
    default_message: Slot<DefaultMessageCallback<E>>,
}

static NEXT_HOST_TOKEN: AtomicU64 = AtomicU64::new(1);

impl<E: Engine> Host<E> {
    /// Initialises the engine for this process and creates an empty host.
    pub fn new(config: HostConfig) -> Self {
        let code = E::initialize(config.init_flags);
        log::debug!("Engine initialised with flags {:#x} (code {}).", config.init_flags, code);
        let (sender, events) = channel::unbounded();
        Self {
            token: NEXT_HOST_TOKEN.fetch_add(1, Ordering::Relaxed),
            config,
            registry: Registry::new(),
            sender,
            events,
            backlog: VecDeque::new(),
            default_message: Slot::default(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Creates an instance carrying `host_data` and applies the configured options.
    pub fn create(&mut self, host_data: HostData) -> Result<InstanceId> {
        let sender = self.sender.clone();
        let poll_interval = self.config.breakpoint_poll_interval();
        let id = self.registry.try_insert_with(|id| {
            let hub = Arc::new(CallbackHub::new(id, sender, poll_interval));
            let engine = E::create(hub.clone()).ok_or(BridgeError::CreateFailed)?;
            Ok::<_, BridgeError>(Instance {
                engine: Arc::new(engine),
                hub,
                host_data,
                callbacks: HostCallbacks::default(),
                performance: Performance::default(),
            })
        })?;

        let engine = self.instance(id)?.engine.clone();
        for option in &self.config.options {
            let status = engine.set_option(&c_string("option", option)?);
            if !status.is_success() {
                log::warn!("Option `{}` rejected by instance {}: {}", option, id, status);
            }
        }
        if let Some(level) = self.config.message_level {
            engine.set_message_level(level);
        }
        log::debug!("Created instance {}.", id);
        Ok(id)
    }

    /// Releases the instance. Its callbacks are detached first; a running performance is
    /// asked to stop and releases the engine when its current step ends.
    pub fn destroy(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.registry.remove(id).ok_or(BridgeError::UnknownInstance(id))?;
        // Dropping the worker handle detaches the thread.
        let _worker = Self::teardown(instance);
        self.discard_events(id);
        log::debug!("Destroyed instance {}.", id);
        Ok(())
    }

    fn teardown(mut instance: Instance<E>) -> Option<std::thread::JoinHandle<()>> {
        instance.hub.detach();
        match instance.performance.control.as_ref() {
            Some(control) => control.request_stop(),
            None => {
                for kind in instance.callbacks.installed() {
                    instance.engine.install_callback(kind, false);
                }
            }
        }
        instance.performance.worker.take()
    }

    /// Drops every queued event of `id`. A worker waiting at a breakpoint is released.
    fn discard_events(&mut self, id: InstanceId) {
        let pending: Vec<HostEvent> = self.events.try_iter().collect();
        self.backlog.extend(pending);
        self.backlog.retain(|event| event.instance() != Some(id));
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.registry.get(id).is_some()
    }

    pub fn instances(&self) -> Vec<InstanceId> {
        self.registry.ids()
    }

    pub fn host_data(&self, id: InstanceId) -> Result<HostData> {
        Ok(self.instance(id)?.host_data.clone())
    }

    pub fn set_host_data(&mut self, id: InstanceId, host_data: HostData) -> Result<()> {
        self.instance_mut(id)?.host_data = host_data;
        Ok(())
    }

    pub(crate) fn instance(&self, id: InstanceId) -> Result<&Instance<E>> {
        self.registry.get(id).ok_or(BridgeError::UnknownInstance(id))
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> Result<&mut Instance<E>> {
        self.registry.get_mut(id).ok_or(BridgeError::UnknownInstance(id))
    }

    /// Direct access to the engine of `id`. Calls made here bypass the deferral of
    /// engine-feeding operations during an asynchronous performance.
    pub fn engine(&self, id: InstanceId) -> Result<&E> {
        Ok(self.instance(id)?.engine.as_ref())
    }

    pub fn is_performing_any(&self) -> bool {
        self.registry.values().any(|instance| instance.performance.is_performing())
    }

    // Callback registration

    pub fn set_message_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&mut Host<E>, InstanceId, MessageAttributes, &str) + 'static,
    {
        self.register(id, CallbackKind::Message, |callbacks| {
            callbacks.message.set(Some(Box::new(callback)))
        })
    }

    pub fn clear_message_callback(&mut self, id: InstanceId) -> Result<()> {
        self.unregister(id, CallbackKind::Message, |callbacks| callbacks.message.set(None))
    }

    pub fn set_make_graph_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&mut Host<E>, InstanceId, &GraphData, &str) + 'static,
    {
        self.register(id, CallbackKind::MakeGraph, |callbacks| {
            callbacks.make_graph.set(Some(Box::new(callback)))
        })
    }

    pub fn clear_make_graph_callback(&mut self, id: InstanceId) -> Result<()> {
        self.unregister(id, CallbackKind::MakeGraph, |callbacks| callbacks.make_graph.set(None))
    }

    pub fn set_draw_graph_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&mut Host<E>, InstanceId, &GraphData) + 'static,
    {
        self.register(id, CallbackKind::DrawGraph, |callbacks| {
            callbacks.draw_graph.set(Some(Box::new(callback)))
        })
    }

    pub fn clear_draw_graph_callback(&mut self, id: InstanceId) -> Result<()> {
        self.unregister(id, CallbackKind::DrawGraph, |callbacks| callbacks.draw_graph.set(None))
    }

    pub fn set_kill_graph_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&mut Host<E>, InstanceId, &GraphData) + 'static,
    {
        self.register(id, CallbackKind::KillGraph, |callbacks| {
            callbacks.kill_graph.set(Some(Box::new(callback)))
        })
    }

    pub fn clear_kill_graph_callback(&mut self, id: InstanceId) -> Result<()> {
        self.unregister(id, CallbackKind::KillGraph, |callbacks| callbacks.kill_graph.set(None))
    }

    pub fn set_file_open_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&mut Host<E>, InstanceId, &FileOpenInfo) + 'static,
    {
        self.register(id, CallbackKind::FileOpen, |callbacks| {
            callbacks.file_open.set(Some(Box::new(callback)))
        })
    }

    pub fn clear_file_open_callback(&mut self, id: InstanceId) -> Result<()> {
        self.unregister(id, CallbackKind::FileOpen, |callbacks| callbacks.file_open.set(None))
    }

    /// Registers the process-wide default message callback.
    ///
    /// It receives the messages of instances created afterwards that have no message callback
    /// of their own, and of the engine outside any instance. Only one host holds it: setting
    /// it here takes it over from any other host.
    pub fn set_default_message_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Host<E>, MessageAttributes, &str) + 'static,
    {
        self.default_message.set(Some(Box::new(callback)));
        let previous = trampoline::route_default_messages(self.token, self.sender.clone());
        if let Some(previous) = previous.filter(|previous| *previous != self.token) {
            log::debug!(
                "Default message callback moved from host {} to host {}.",
                previous,
                self.token
            );
        }
        E::set_default_message_callback(true);
    }

    /// Clears the default message callback. The engine's own default output is restored if
    /// this host held it.
    pub fn clear_default_message_callback(&mut self) {
        self.default_message.set(None);
        if trampoline::unroute_default_messages(self.token) {
            E::set_default_message_callback(false);
        }
    }

    /// Registers the breakpoint callback.
    ///
    /// It runs while the engine is paused at the breakpoint: inline during synchronous
    /// performance, on the host thread with the worker blocked during asynchronous performance.
    pub fn set_breakpoint_callback<F>(&mut self, id: InstanceId, callback: F) -> Result<()>
    where
        F: FnMut(&BreakpointInfo) + Send + 'static,
    {
        let instance = self.instance_mut(id)?;
        instance.hub.set_breakpoint_callback(Some(Box::new(callback)));
        instance.callbacks.breakpoint = true;
        instance.engine.install_callback(CallbackKind::Breakpoint, true);
        Ok(())
    }

    pub fn clear_breakpoint_callback(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instance_mut(id)?;
        instance.hub.set_breakpoint_callback(None);
        instance.callbacks.breakpoint = false;
        instance.engine.install_callback(CallbackKind::Breakpoint, false);
        Ok(())
    }

    fn register(
        &mut self,
        id: InstanceId,
        kind: CallbackKind,
        store: impl FnOnce(&mut HostCallbacks<E>),
    ) -> Result<()> {
        let instance = self.instance_mut(id)?;
        store(&mut instance.callbacks);
        instance.engine.install_callback(kind, true);
        Ok(())
    }

    fn unregister(
        &mut self,
        id: InstanceId,
        kind: CallbackKind,
        clear: impl FnOnce(&mut HostCallbacks<E>),
    ) -> Result<()> {
        let instance = self.instance_mut(id)?;
        clear(&mut instance.callbacks);
        instance.engine.install_callback(kind, false);
        Ok(())
    }

    // Event pump

    /// Runs the callbacks for every event queued so far. Returns how many were handled.
    pub fn poll_events(&mut self) -> usize {
        let pending = self.backlog.len() + self.events.len();
        let mut handled = 0;
        while handled < pending {
            let Some(event) = self.next_event() else {
                break;
            };
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Handles events until no asynchronous performance is running and the queue is empty.
    pub fn run_until_idle(&mut self) {
        loop {
            self.poll_events();
            if !self.is_performing_any() {
                self.poll_events();
                return;
            }
            match self.events.recv() {
                Ok(event) => self.dispatch(event),
                Err(_) => return,
            }
        }
    }

    /// Handles events as they arrive for `duration`, then returns.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            self.poll_events();
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            match self.events.recv_timeout(deadline - now) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn next_event(&mut self) -> Option<HostEvent> {
        self.backlog.pop_front().or_else(|| self.events.try_recv().ok())
    }

    fn dispatch(&mut self, event: HostEvent) {
        let Some(id) = event.instance() else {
            if let HostEvent::DefaultMessage { attributes, text } = event {
                self.dispatch_default_message(attributes, &text);
            }
            return;
        };
        if !self.contains(id) {
            log::debug!("Dropping event for unknown instance {}.", id);
            return;
        }
        match event {
            HostEvent::Message { attributes, text, .. } => {
                self.with_slot(id, |instance| &mut instance.callbacks.message, |host, callback| {
                    callback(host, id, attributes, &text)
                })
            }
            HostEvent::MakeGraph { graph, name, .. } => {
                self.with_slot(id, |instance| &mut instance.callbacks.make_graph, |host, callback| {
                    callback(host, id, &graph, &name)
                })
            }
            HostEvent::DrawGraph { graph, .. } => {
                self.with_slot(id, |instance| &mut instance.callbacks.draw_graph, |host, callback| {
                    callback(host, id, &graph)
                })
            }
            HostEvent::KillGraph { graph, .. } => {
                self.with_slot(id, |instance| &mut instance.callbacks.kill_graph, |host, callback| {
                    callback(host, id, &graph)
                })
            }
            HostEvent::FileOpen { file, .. } => {
                self.with_slot(id, |instance| &mut instance.callbacks.file_open, |host, callback| {
                    callback(host, id, &file)
                })
            }
            HostEvent::DefaultMessage { .. } => {}
            HostEvent::Breakpoint { info, reply, .. } => {
                if let Ok(instance) = self.instance(id) {
                    instance.hub.run_breakpoint(&info);
                }
                let _ = reply.send(());
            }
            HostEvent::Progress { .. } => {
                self.with_slot(id, |instance| &mut instance.performance.progress, |host, callback| {
                    callback(host, id)
                })
            }
            HostEvent::PerformanceFinished { result, stopped, .. } => {
                self.finish_performance(id, result, stopped)
            }
        }
    }

    fn dispatch_default_message(&mut self, attributes: MessageAttributes, text: &str) {
        if let Some((mut callback, generation)) = self.default_message.borrow() {
            callback(self, attributes, text);
            self.default_message.give_back(callback, generation);
        }
    }

    /// Takes a callback out of its slot, runs it with full access to the host and puts it
    /// back unless it was replaced, cleared or its instance destroyed in the meantime.
    fn with_slot<F>(
        &mut self,
        id: InstanceId,
        slot: fn(&mut Instance<E>) -> &mut Slot<F>,
        call: impl FnOnce(&mut Self, &mut F),
    ) {
        let borrowed = self.registry.get_mut(id).and_then(|instance| slot(instance).borrow());
        let Some((mut callback, generation)) = borrowed else {
            return;
        };
        call(self, &mut callback);
        if let Some(instance) = self.registry.get_mut(id) {
            slot(instance).give_back(callback, generation);
        }
    }
}

impl<E: Engine> Default for Host<E> {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl<E: Engine> Drop for Host<E> {
    fn drop(&mut self) {
        if trampoline::unroute_default_messages(self.token) {
            E::set_default_message_callback(false);
        }
        let mut workers = Vec::new();
        for id in self.registry.ids() {
            if let Some(instance) = self.registry.remove(id) {
                workers.extend(Self::teardown(instance));
            }
        }
        self.backlog.clear();
        for _ in self.events.try_iter() {}
        for worker in workers {
            if worker.join().is_err() {
                log::warn!("Performance worker panicked during host shutdown.");
            }
        }
    }
}
