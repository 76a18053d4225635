use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::media::domain::readiness::{ReadinessNotifier, ReadinessSignal};
use crate::media::domain::sample_sink::{SampleSink, SinkReport};
use crate::media::domain::sample_source::SampleSource;
use crate::pipeline::completion::{CompletionExecutor, CompletionOnce};
use crate::pipeline::transcode_logger::{
    NullTranscodeLogger, TranscodeLogger, AUDIO_SECONDS_METRIC,
};
use crate::shared::constants::PUMP_THREAD_NAME;
use crate::shared::error::TranscodeError;
use crate::shared::pipeline_status::PipelineStatus;
use crate::shared::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Running,
    Draining,
    Finalizing,
    Done(PumpOutcome),
}

impl PumpState {
    pub fn is_done(&self) -> bool {
        matches!(self, PumpState::Done(_))
    }
}

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscodeReport {
    pub destination: PathBuf,
    pub samples_written: u64,
    pub duration: Timestamp,
    pub buffers_pushed: u64,
    pub elapsed: Duration,
}

pub type TranscodeCompletion = Box<dyn FnOnce(Result<TranscodeReport, TranscodeError>) + Send>;

type SharedState = Arc<Mutex<PumpState>>;

/// Moves buffers from a started source into a started sink.
///
/// Runs on its own thread. Each time the sink signals readiness the pump
/// pulls and pushes until the sink is full again, then blocks on the
/// signal. Exhausting the source finalizes the sink; the final result is
/// handed to the completion handler exactly once.
pub struct TranscodePump {
    source: Box<dyn SampleSource>,
    sink: Box<dyn SampleSink>,
    end: Timestamp,
    logger: Box<dyn TranscodeLogger>,
}

impl TranscodePump {
    /// `end` is where the output session stops, normally the asset duration.
    pub fn new(source: Box<dyn SampleSource>, sink: Box<dyn SampleSink>, end: Timestamp) -> Self {
        Self {
            source,
            sink,
            end,
            logger: Box::new(NullTranscodeLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn TranscodeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Checks both ends are started, then spawns the pump thread.
    pub fn run(
        self,
        executor: Arc<dyn CompletionExecutor>,
        on_complete: TranscodeCompletion,
    ) -> Result<PumpHandle, TranscodeError> {
        if self.source.status() != PipelineStatus::Reading {
            return Err(TranscodeError::start_failed(
                "pump",
                format!("source is {:?}, expected Reading", self.source.status()),
            ));
        }
        if self.sink.status() != PipelineStatus::Writing {
            return Err(TranscodeError::start_failed(
                "pump",
                format!("sink is {:?}, expected Writing", self.sink.status()),
            ));
        }

        let state: SharedState = Arc::new(Mutex::new(PumpState::Idle));
        let cancelled = Arc::new(AtomicBool::new(false));
        let readiness = self.sink.readiness();
        let wake = readiness.notifier();
        let completion = Arc::new(CompletionOnce::new(executor, on_complete));

        let worker = PumpWorker {
            source: self.source,
            sink: self.sink,
            end: self.end,
            logger: self.logger,
            readiness,
            state: state.clone(),
            cancelled: cancelled.clone(),
            completion,
            buffers_pushed: 0,
            started: Instant::now(),
        };

        set_state(&state, PumpState::Running);
        let thread = std::thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| TranscodeError::start_failed("pump", e))?;

        Ok(PumpHandle {
            state,
            cancelled,
            wake,
            thread: Some(thread),
        })
    }
}

/// Control surface for a running pump.
pub struct PumpHandle {
    state: SharedState,
    cancelled: Arc<AtomicBool>,
    wake: ReadinessNotifier,
    thread: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Requests cancellation. The pump stops at its next check and reports
    /// `Cancelled`; the sink discards its partial output.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            log::info!("Cancellation requested");
        }
        self.wake.notify();
    }

    pub fn state(&self) -> PumpState {
        get_state(&self.state)
    }

    /// Waits for the pump thread to exit. Finalization may still be
    /// running on the sink's worker afterwards.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Pump thread panicked");
                set_state(&self.state, PumpState::Done(PumpOutcome::Failed));
            }
        }
    }
}

enum LoopExit {
    Drained,
    Cancelled,
    Failed(TranscodeError),
}

struct PumpWorker {
    source: Box<dyn SampleSource>,
    sink: Box<dyn SampleSink>,
    end: Timestamp,
    logger: Box<dyn TranscodeLogger>,
    readiness: ReadinessSignal,
    state: SharedState,
    cancelled: Arc<AtomicBool>,
    completion: Arc<CompletionOnce<Result<TranscodeReport, TranscodeError>>>,
    buffers_pushed: u64,
    started: Instant,
}

impl PumpWorker {
    fn run(mut self) {
        log::debug!("Pump running until {}", self.end);

        match self.pump() {
            LoopExit::Drained => {
                set_state(&self.state, PumpState::Draining);
                self.sink.mark_finished();
                match self.source.status() {
                    PipelineStatus::Completed => self.finalize(),
                    PipelineStatus::Cancelled => self.cancel(),
                    status => {
                        let error = self.source.take_error().unwrap_or_else(|| {
                            TranscodeError::DecodeFailed(format!("source ended as {status:?}"))
                        });
                        self.fail(error);
                    }
                }
            }
            LoopExit::Cancelled => self.cancel(),
            LoopExit::Failed(error) => self.fail(error),
        }
    }

    /// Pull/push until the source runs dry, something fails, or cancel.
    fn pump(&mut self) -> LoopExit {
        loop {
            if self.is_cancelled() {
                return LoopExit::Cancelled;
            }

            while self.sink.is_ready_for_more() {
                if self.is_cancelled() {
                    return LoopExit::Cancelled;
                }

                let pull_start = Instant::now();
                let Some(buffer) = self.source.pull_next() else {
                    return LoopExit::Drained;
                };
                self.logger.timing("pull", elapsed_ms(pull_start));
                self.logger.metric("samples", buffer.frames() as f64);
                let audio_seconds = buffer.duration().seconds();

                if let Err(e) = self.sink.push(buffer) {
                    return LoopExit::Failed(self.sink.take_error().unwrap_or(e));
                }
                self.buffers_pushed += 1;
                self.logger.metric(AUDIO_SECONDS_METRIC, audio_seconds);
            }

            if self.sink.status() != PipelineStatus::Writing {
                let error = self.sink.take_error().unwrap_or_else(|| {
                    TranscodeError::AppendFailed(format!(
                        "sink stopped accepting input ({:?})",
                        self.sink.status()
                    ))
                });
                return LoopExit::Failed(error);
            }
            if self.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let wait_start = Instant::now();
            self.readiness.wait();
            self.logger.timing("wait", elapsed_ms(wait_start));
        }
    }

    fn finalize(self) {
        set_state(&self.state, PumpState::Finalizing);
        log::debug!("Source drained after {} buffers, finalizing", self.buffers_pushed);

        let PumpWorker {
            source,
            mut sink,
            end,
            mut logger,
            state,
            completion,
            buffers_pushed,
            started,
            ..
        } = self;
        drop(source);

        sink.finalize(
            end,
            Box::new(move |result: Result<SinkReport, TranscodeError>| {
                let result = result.map(|report| TranscodeReport {
                    destination: report.path,
                    samples_written: report.samples_written,
                    duration: report.duration,
                    buffers_pushed,
                    elapsed: started.elapsed(),
                });
                let outcome = match &result {
                    Ok(report) => {
                        logger.info(&format!(
                            "Wrote {} ({})",
                            report.destination.display(),
                            report.duration
                        ));
                        PumpOutcome::Succeeded
                    }
                    Err(e) => {
                        log::error!("Finalizing failed: {e}");
                        PumpOutcome::Failed
                    }
                };
                logger.summary();
                set_state(&state, PumpState::Done(outcome));
                completion.fire(result);
            }),
        );
    }

    fn cancel(self) {
        self.finish_without_output(TranscodeError::Cancelled, PumpOutcome::Cancelled);
    }

    fn fail(self, error: TranscodeError) {
        log::error!("Transcode failed: {error}");
        self.finish_without_output(error, PumpOutcome::Failed);
    }

    fn finish_without_output(self, error: TranscodeError, outcome: PumpOutcome) {
        let PumpWorker {
            mut source,
            sink,
            logger,
            state,
            completion,
            ..
        } = self;
        source.cancel();
        // The sink discards its partial file when dropped unfinalized.
        drop(sink);
        drop(source);
        logger.summary();
        set_state(&state, PumpState::Done(outcome));
        completion.fire(Err(error));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn get_state(state: &SharedState) -> PumpState {
    *state.lock().unwrap_or_else(|e| e.into_inner())
}

fn set_state(state: &SharedState, next: PumpState) {
    let mut current = state.lock().unwrap_or_else(|e| e.into_inner());
    if current.is_done() {
        return;
    }
    log::debug!("Pump {:?} -> {:?}", *current, next);
    *current = next;
}
