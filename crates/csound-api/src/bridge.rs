//! Asynchronous performance: one worker thread per in-flight performance.
//!
//! The worker steps the engine one control period at a time. Between steps it checks the
//! cooperative stop flag and applies commands queued by the host. When the loop exits
//! it reports the result through the host's event queue, and the completion callback
//! runs on the host thread.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::queue::SegQueue;
use libc::c_char;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use crate::host::{CompletionCallback, Host, ProgressCallback, Slot};
use crate::registry::InstanceId;
use crate::status::Status;
use crate::trampoline::CallbackHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PerformanceState {
    #[default]
    Idle,
    Performing,
    /// The score ended; the engine returned a positive result.
    Completed,
    /// The loop exited because stop was requested. The result is 0.
    Stopped,
    /// The engine returned a negative result.
    Errored,
}

/// Engine calls deferred to the worker while a performance is running.
#[derive(Debug)]
pub(crate) enum Command {
    CompileOrc(CString),
    ReadScore(CString),
    ScoreEvent(c_char, Vec<f64>),
    InputMessage(CString),
}

impl Command {
    pub fn run<E: Engine>(&self, engine: &E) -> Status {
        match self {
            Command::CompileOrc(orchestra) => engine.compile_orc(orchestra),
            Command::ReadScore(score) => engine.read_score(score),
            Command::ScoreEvent(kind, pfields) => engine.score_event(*kind, pfields),
            Command::InputMessage(message) => {
                engine.input_message(message);
                Status::SUCCESS
            }
        }
    }

    fn apply<E: Engine>(self, engine: &E) {
        let status = self.run(engine);
        if !status.is_success() {
            log::warn!("Deferred {:?} returned {}.", self, status);
        }
    }
}

/// State shared between the host and one performance worker.
#[derive(Debug, Default)]
pub(crate) struct PerformanceControl {
    stop_requested: AtomicBool,
    commands: SegQueue<Command>,
}

impl PerformanceControl {
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn push(&self, command: Command) {
        log::debug!("Queued {:?} for the performance worker.", command);
        self.commands.push(command);
    }

    pub fn drain_commands<E: Engine>(&self, engine: &E) {
        while let Some(command) = self.commands.pop() {
            command.apply(engine);
        }
    }

    fn forward_commands(&self, next: &PerformanceControl) {
        while let Some(command) = self.commands.pop() {
            next.push(command);
        }
    }
}

/// Thread-safe handle to an in-flight performance.
#[derive(Debug, Clone)]
pub struct PerformanceHandle {
    instance: InstanceId,
    control: Arc<PerformanceControl>,
}

impl PerformanceHandle {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Requests the worker to exit after its current control period. Callable from any thread.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.control.stop_requested()
    }
}

pub(crate) struct Performance<E: Engine> {
    pub state: PerformanceState,
    pub control: Option<Arc<PerformanceControl>>,
    pub worker: Option<JoinHandle<()>>,
    pub completion: Option<CompletionCallback<E>>,
    pub progress: Slot<ProgressCallback<E>>,
    pub last_result: Option<i32>,
}

impl<E: Engine> Default for Performance<E> {
    fn default() -> Self {
        Self {
            state: PerformanceState::Idle,
            control: None,
            worker: None,
            completion: None,
            progress: Slot::default(),
            last_result: None,
        }
    }
}

impl<E: Engine> Performance<E> {
    pub fn is_performing(&self) -> bool {
        self.state == PerformanceState::Performing
    }

    /// Control block of the running performance, if any.
    pub fn active_control(&self) -> Option<&Arc<PerformanceControl>> {
        self.control.as_ref().filter(|_| self.is_performing())
    }
}

fn run_worker<E: Engine>(
    engine: Arc<E>,
    hub: Arc<CallbackHub>,
    control: Arc<PerformanceControl>,
    report_progress: bool,
) {
    let instance = hub.instance();
    log::debug!("Performance worker for instance {} entering run loop.", instance);

    let mut stopped = false;
    let result = loop {
        if control.stop_requested() {
            stopped = true;
            break 0;
        }
        // Everything applied here is followed by a step.
        control.drain_commands(&*engine);
        let result = engine.perform_ksmps();
        if result != 0 {
            break result;
        }
        if report_progress {
            hub.progress();
        }
    };

    log::info!(
        "Performance worker for instance {} exiting run loop (result {}, stopped {}).",
        instance,
        result,
        stopped
    );
    // The host may destroy the instance as soon as it sees the result.
    drop(engine);
    hub.performance_finished(result, stopped);
}

impl<E: Engine> Host<E> {
    /// Runs the performance on a worker thread. `completion` runs on the host thread with the
    /// final result: 0 when stopped, positive at the end of the score, negative on error.
    pub fn perform_async<F>(&mut self, id: InstanceId, completion: F) -> Result<PerformanceHandle>
    where
        F: FnOnce(&mut Host<E>, InstanceId, i32) + 'static,
    {
        self.spawn_performance(id, None, Box::new(completion))
    }

    /// Like [`perform_async`](Self::perform_async), and additionally runs `progress` on the host
    /// thread after every control period that did not end the performance.
    pub fn perform_ksmps_async<P, F>(
        &mut self,
        id: InstanceId,
        progress: P,
        completion: F,
    ) -> Result<PerformanceHandle>
    where
        P: FnMut(&mut Host<E>, InstanceId) + 'static,
        F: FnOnce(&mut Host<E>, InstanceId, i32) + 'static,
    {
        self.spawn_performance(id, Some(Box::new(progress)), Box::new(completion))
    }

    fn spawn_performance(
        &mut self,
        id: InstanceId,
        progress: Option<ProgressCallback<E>>,
        completion: CompletionCallback<E>,
    ) -> Result<PerformanceHandle> {
        let worker_config = self.config().worker.clone();
        let instance = self.instance_mut(id)?;
        if instance.performance.is_performing() {
            return Err(BridgeError::AlreadyPerforming(id));
        }

        let control = Arc::new(PerformanceControl::default());
        let report_progress = progress.is_some();
        let engine = instance.engine.clone();
        let hub = instance.hub.clone();
        let worker_control = control.clone();

        let mut builder = thread::Builder::new().name(worker_config.thread_name);
        if let Some(stack_size) = worker_config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let worker = builder
            .spawn(move || run_worker(engine, hub, worker_control, report_progress))
            .map_err(BridgeError::WorkerSpawn)?;

        let performance = &mut instance.performance;
        performance.state = PerformanceState::Performing;
        performance.control = Some(control.clone());
        performance.worker = Some(worker);
        performance.completion = Some(completion);
        performance.progress.set(progress);
        performance.last_result = None;

        log::info!("Started asynchronous performance of instance {}.", id);
        Ok(PerformanceHandle { instance: id, control })
    }

    /// Requests a running performance to end after its current control period.
    /// Without one, forwards to the engine's own stop.
    pub fn stop(&self, id: InstanceId) -> Result<()> {
        let instance = self.instance(id)?;
        match instance.performance.active_control() {
            Some(control) => control.request_stop(),
            None => instance.engine.stop(),
        }
        Ok(())
    }

    /// Handle to the running performance, for stopping it from another thread.
    pub fn performance_handle(&self, id: InstanceId) -> Result<Option<PerformanceHandle>> {
        Ok(self
            .instance(id)?
            .performance
            .active_control()
            .map(|control| PerformanceHandle {
                instance: id,
                control: control.clone(),
            }))
    }

    pub fn performance_state(&self, id: InstanceId) -> Result<PerformanceState> {
        Ok(self.instance(id)?.performance.state)
    }

    /// Result of the last asynchronous performance, once it has finished.
    pub fn last_performance_result(&self, id: InstanceId) -> Result<Option<i32>> {
        Ok(self.instance(id)?.performance.last_result)
    }

    /// Performs the whole score on the calling thread.
    pub fn perform(&self, id: InstanceId) -> Result<i32> {
        Ok(self.idle_engine(id)?.perform())
    }

    /// Performs one control period. Returns `true` once the performance has ended.
    pub fn perform_ksmps(&self, id: InstanceId) -> Result<bool> {
        Ok(self.idle_engine(id)?.perform_ksmps() != 0)
    }

    /// Performs one buffer of output. Returns `true` once the performance has ended.
    pub fn perform_buffer(&self, id: InstanceId) -> Result<bool> {
        Ok(self.idle_engine(id)?.perform_buffer() != 0)
    }

    pub(crate) fn idle_engine(&self, id: InstanceId) -> Result<&E> {
        let instance = self.instance(id)?;
        if instance.performance.is_performing() {
            return Err(BridgeError::AlreadyPerforming(id));
        }
        Ok(instance.engine.as_ref())
    }

    pub(crate) fn finish_performance(&mut self, id: InstanceId, result: i32, stopped: bool) {
        let Ok(instance) = self.instance_mut(id) else {
            return;
        };
        let performance = &mut instance.performance;
        if let Some(worker) = performance.worker.take() {
            if worker.join().is_err() {
                log::warn!("Performance worker for instance {} panicked.", id);
            }
        }
        performance.state = if stopped {
            PerformanceState::Stopped
        } else if result > 0 {
            PerformanceState::Completed
        } else {
            PerformanceState::Errored
        };
        performance.last_result = Some(result);
        performance.progress.set(None);
        let completion = performance.completion.take();
        let leftover = performance.control.take();
        log::info!(
            "Asynchronous performance of instance {} finished as {:?} with result {}.",
            id,
            instance.performance.state,
            result
        );

        // Completion sees the engine as the last period left it; commands queued after
        // that period are applied afterwards.
        if let Some(completion) = completion {
            completion(self, id, result);
        }
        if let Some(control) = leftover {
            self.apply_leftover_commands(id, &control);
        }
    }

    fn apply_leftover_commands(&self, id: InstanceId, control: &PerformanceControl) {
        let Ok(instance) = self.instance(id) else {
            if !control.commands.is_empty() {
                log::debug!("Dropping commands queued for destroyed instance {}.", id);
            }
            return;
        };
        match instance.performance.active_control() {
            Some(next) => control.forward_commands(next),
            None => control.drain_commands(&*instance.engine),
        }
    }
}
