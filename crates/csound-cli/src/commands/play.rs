use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use csound_api::{Engine, Host, InstanceId, MessageAttributes, PerformanceState};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::{expect_success, CliError};
use crate::style;

#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Output file or device, passed as `--output=`.
    pub output: Option<String>,
    /// Perform on a worker thread instead of blocking in `perform`.
    pub asynchronous: bool,
    /// Stop the performance after this long. Implies `asynchronous`.
    pub stop_after: Option<Duration>,
    /// Show a spinner updated after every control period. Implies `asynchronous`.
    pub progress: bool,
    /// Print engine messages to stderr as they arrive.
    pub echo: bool,
}

impl PlayOptions {
    fn in_background(&self) -> bool {
        self.asynchronous || self.progress || self.stop_after.is_some()
    }
}

#[derive(Debug)]
pub struct PlayReport {
    /// Final result: 0 when stopped, positive at the end of the score.
    pub result: i32,
    /// Control periods reported through progress.
    pub periods: usize,
    pub messages: Vec<(MessageAttributes, String)>,
}

/// Compiles `orchestra` and `score`, then performs them to the end or until stopped.
pub fn handle_play<E: Engine>(
    host: &mut Host<E>,
    id: InstanceId,
    orchestra: &str,
    score: &str,
    options: &PlayOptions,
) -> Result<PlayReport, CliError> {
    let transcript = Rc::new(RefCell::new(Vec::new()));
    let sink = transcript.clone();
    let echo = options.echo;
    host.set_message_callback(id, move |_, _, attributes, text| {
        if echo {
            eprint!("{}", style::render(attributes, text));
        }
        sink.borrow_mut().push((attributes, text.to_string()));
    })?;

    if let Some(output) = &options.output {
        expect_success("set_option", host.set_option(id, &format!("--output={output}"))?)?;
    }
    expect_success("compile_orc", host.compile_orc(id, orchestra)?)?;
    expect_success("read_score", host.read_score(id, score)?)?;
    expect_success("start", host.start(id)?)?;

    let (result, periods) = if options.in_background() {
        perform_in_background(host, id, options)?
    } else {
        (host.perform(id)?, 0)
    };

    host.run_until_idle();
    host.clear_message_callback(id)?;
    let messages = transcript.take();
    log::info!(
        "Performance of instance {} ended with {} after {} messages.",
        id,
        result,
        messages.len()
    );

    if result < 0 {
        return Err(CliError::PerformanceFailed(result));
    }
    Ok(PlayReport { result, periods, messages })
}

fn perform_in_background<E: Engine>(
    host: &mut Host<E>,
    id: InstanceId,
    options: &PlayOptions,
) -> Result<(i32, usize), CliError> {
    let finished = Rc::new(Cell::new(None));
    let sink = finished.clone();
    let completion = move |_: &mut Host<E>, _: InstanceId, result: i32| sink.set(Some(result));
    let periods = Rc::new(Cell::new(0));

    if options.progress {
        let spinner = spinner(options.echo);
        let counter = periods.clone();
        let ticker = spinner.clone();
        host.perform_ksmps_async(
            id,
            move |host, instance| {
                counter.set(counter.get() + 1);
                if let Ok(seconds) = host.score_time(instance) {
                    ticker.set_message(format!("{seconds:.2}s"));
                }
                ticker.tick();
            },
            completion,
        )?;
        wait(host, id, options.stop_after)?;
        spinner.finish_and_clear();
    } else {
        host.perform_async(id, completion)?;
        wait(host, id, options.stop_after)?;
    }

    Ok((finished.get().unwrap_or(0), periods.get()))
}

fn wait<E: Engine>(
    host: &mut Host<E>,
    id: InstanceId,
    stop_after: Option<Duration>,
) -> Result<(), CliError> {
    if let Some(delay) = stop_after {
        host.run_for(delay);
        if host.performance_state(id)? == PerformanceState::Performing {
            log::debug!("Stopping instance {} after {:?}.", id, delay);
            host.stop(id)?;
        }
    }
    host.run_until_idle();
    Ok(())
}

fn spinner(visible: bool) -> ProgressBar {
    let target = if visible {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let spinner = ProgressBar::with_draw_target(None, target);
    if let Ok(style) = ProgressStyle::with_template("{spinner} performing {msg}") {
        spinner.set_style(style);
    }
    spinner
}
