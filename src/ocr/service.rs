//! OCR service: one-shot readiness plus a pool of engine workers.
//!
//! Engines are created on a background thread because setup can be slow
//! (locating tesseract, downloading models). Until that finishes the service
//! is `Initializing` and every request is rejected with `OcrUnavailable`
//! instead of being queued. Once `Ready`, requests go through a shared
//! channel to worker threads that each own one engine, so an engine never
//! sees two images at once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use super::engine::{OcrEngine, OcrOutput};
use crate::error::{CaptchaError, CaptchaResult};

/// Public view of the service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Initializing,
    Ready,
    Failed,
}

/// A recognition request for a worker.
struct OcrJob {
    png: Vec<u8>,
    reply: Sender<anyhow::Result<OcrOutput>>,
}

enum State {
    Initializing,
    Ready(Sender<OcrJob>),
    Failed(String),
}

impl State {
    fn readiness(&self) -> Readiness {
        match self {
            State::Initializing => Readiness::Initializing,
            State::Ready(_) => Readiness::Ready,
            State::Failed(_) => Readiness::Failed,
        }
    }
}

struct Shared {
    state: Mutex<State>,
    settled: Condvar,
}

/// Cloneable handle to the OCR worker pool.
#[derive(Clone)]
pub struct OcrService {
    shared: Arc<Shared>,
}

impl OcrService {
    /// Starts initialization on a background thread and returns immediately.
    ///
    /// `init` builds the engines; one worker thread is spawned per engine.
    /// The service settles exactly once, to `Ready` or `Failed`; a panic in
    /// `init` counts as a failure.
    pub fn start<E, F>(init: F) -> Self
    where
        E: OcrEngine + 'static,
        F: FnOnce() -> anyhow::Result<Vec<E>> + Send + 'static,
    {
        let service = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Initializing),
                settled: Condvar::new(),
            }),
        };

        let handle = service.clone();
        thread::spawn(move || {
            info!("OCR initialization started");
            let outcome = match panic::catch_unwind(AssertUnwindSafe(init)) {
                Ok(Ok(engines)) if engines.is_empty() => {
                    State::Failed("no OCR engines were created".to_string())
                }
                Ok(Ok(engines)) => State::Ready(spawn_workers(engines)),
                Ok(Err(e)) => State::Failed(format!("{:#}", e)),
                Err(payload) => State::Failed(format!(
                    "OCR initialization panicked: {}",
                    panic_message(payload.as_ref())
                )),
            };
            match &outcome {
                State::Failed(reason) => error!("OCR initialization failed: {}", reason),
                _ => info!("OCR engine ready"),
            }
            handle.settle(outcome);
        });

        service
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves out of `Initializing`. Later calls are ignored.
    fn settle(&self, outcome: State) {
        let mut state = self.lock();
        if matches!(*state, State::Initializing) {
            *state = outcome;
            self.shared.settled.notify_all();
        }
    }

    /// Current readiness, without blocking.
    pub fn readiness(&self) -> Readiness {
        self.lock().readiness()
    }

    /// Blocks until initialization has finished one way or the other.
    pub fn wait(&self) -> Readiness {
        let state = self.lock();
        let state = self
            .shared
            .settled
            .wait_while(state, |s| matches!(s, State::Initializing))
            .unwrap_or_else(PoisonError::into_inner);
        state.readiness()
    }

    /// Like `wait`, but gives up after `timeout` and reports `Initializing`.
    pub fn wait_timeout(&self, timeout: Duration) -> Readiness {
        let state = self.lock();
        let (state, _) = self
            .shared
            .settled
            .wait_timeout_while(state, timeout, |s| matches!(s, State::Initializing))
            .unwrap_or_else(PoisonError::into_inner);
        state.readiness()
    }

    /// Error to report for a request right now, if any.
    pub fn ensure_ready(&self) -> CaptchaResult<()> {
        match &*self.lock() {
            State::Ready(_) => Ok(()),
            State::Initializing => Err(CaptchaError::OcrUnavailable),
            State::Failed(reason) => Err(CaptchaError::OcrEngineFailure(reason.clone())),
        }
    }

    /// Recognizes one PNG image. Never queues while initializing.
    pub fn recognize(&self, png: Vec<u8>) -> CaptchaResult<OcrOutput> {
        let jobs = match &*self.lock() {
            State::Ready(jobs) => jobs.clone(),
            State::Initializing => return Err(CaptchaError::OcrUnavailable),
            State::Failed(reason) => return Err(CaptchaError::OcrEngineFailure(reason.clone())),
        };

        let (reply, response) = channel();
        jobs.send(OcrJob { png, reply })
            .map_err(|_| CaptchaError::OcrEngineFailure("OCR workers have shut down".to_string()))?;

        response
            .recv()
            .map_err(|_| CaptchaError::OcrEngineFailure("OCR worker dropped the request".to_string()))?
            .map_err(|e| CaptchaError::RecognitionFailure(format!("{:#}", e)))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns one worker per engine, all pulling from the same job queue.
fn spawn_workers<E: OcrEngine + 'static>(engines: Vec<E>) -> Sender<OcrJob> {
    let (jobs, queue) = channel::<OcrJob>();
    let queue = Arc::new(Mutex::new(queue));

    let count = engines.len();
    for (index, engine) in engines.into_iter().enumerate() {
        let queue = Arc::clone(&queue);
        thread::spawn(move || run_worker(index, engine, queue));
    }
    info!("Started {} OCR worker(s)", count);

    jobs
}

/// Worker loop: runs until every sender is dropped.
fn run_worker<E: OcrEngine>(index: usize, mut engine: E, queue: Arc<Mutex<Receiver<OcrJob>>>) {
    debug!("OCR worker {} started", index);

    loop {
        // Hold the lock only while waiting for the next job
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();

        let job = match next {
            Ok(job) => job,
            Err(_) => break,
        };

        let result = engine.recognize(&job.png);
        if let Err(e) = &result {
            debug!("OCR worker {}: recognition failed: {:#}", index, e);
        }
        // The caller may have given up; nothing to do then
        let _ = job.reply.send(result);
    }

    debug!("OCR worker {} finished", index);
}
