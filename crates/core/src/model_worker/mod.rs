//! Worker-pool inference executioner
//!
//! An [`InferenceExecutioner`] owns one loaded model and a fixed pool of
//! worker threads draining a bounded request queue:
//!
//! - `SEQUENTIAL` workers hand the model one request per call
//! - `BATCHED` workers take up to `batch_limit` queued requests and make a
//!   single model call, then route each output back to its own caller
//!
//! Submissions beyond `queue_limit` fail at once with
//! [`Error::QueueFull`] (the "server busy" signal), never blocking the
//! caller. A failing model call fails every request of that batch and
//! nothing else; the worker keeps serving.

use crate::config::ExecutionerConfig;
use crate::data::Data;
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

mod batch;
mod request;
mod status;

use batch::{QueuedRequest, Shared, Worker};
pub use request::PendingInference;
use request::{Request, RequestState};
pub use status::ExecutionerStats;

/// Whether a model tolerates concurrent calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelConcurrency {
    /// Safe to call from every worker at once
    #[default]
    Shared,
    /// Must never run two calls concurrently; requires a single worker
    Exclusive,
}

/// A loaded model
///
/// `infer` receives a batch (length 1 in `SEQUENTIAL` mode) and must return
/// exactly one output per input, in input order.
pub trait InferenceModel: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Identifier used in logs and worker thread names
    fn model_id(&self) -> &str;

    /// Concurrency the model tolerates
    fn concurrency(&self) -> ModelConcurrency {
        ModelConcurrency::Shared
    }

    /// Perform inference on a batch
    fn infer(&self, batch: Vec<Self::Input>) -> anyhow::Result<Vec<Self::Output>>;
}

impl<M: InferenceModel + ?Sized> InferenceModel for Box<M> {
    type Input = M::Input;
    type Output = M::Output;

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn concurrency(&self) -> ModelConcurrency {
        (**self).concurrency()
    }

    fn infer(&self, batch: Vec<Self::Input>) -> anyhow::Result<Vec<Self::Output>> {
        (**self).infer(batch)
    }
}

/// A `Data -> Data` model, the kind pipeline model steps run
pub type DataModel = Box<dyn InferenceModel<Input = Data, Output = Data>>;

/// Loads a model from a source reference (path or URI)
pub trait ModelLoader: Send + Sync {
    type Model: InferenceModel;

    fn load(&self, source: &str) -> anyhow::Result<Self::Model>;
}

/// Loader producing [`DataModel`]s, as held by the host
pub type DataModelLoader = dyn ModelLoader<Model = DataModel>;

/// [`ModelLoader`] backed by a closure
pub struct FnLoader<F, M> {
    load: F,
    _model: PhantomData<fn() -> M>,
}

/// Wrap a closure as a [`ModelLoader`]
pub fn loader_fn<F, M>(load: F) -> FnLoader<F, M>
where
    F: Fn(&str) -> anyhow::Result<M> + Send + Sync,
    M: InferenceModel,
{
    FnLoader {
        load,
        _model: PhantomData,
    }
}

impl<F, M> ModelLoader for FnLoader<F, M>
where
    F: Fn(&str) -> anyhow::Result<M> + Send + Sync,
    M: InferenceModel,
{
    type Model = M;

    fn load(&self, source: &str) -> anyhow::Result<M> {
        (self.load)(source)
    }
}

/// Adapts any `Data -> Data` loader to [`DataModelLoader`]
pub(crate) struct BoxedLoader<L>(pub(crate) L);

impl<L> ModelLoader for BoxedLoader<L>
where
    L: ModelLoader,
    L::Model: InferenceModel<Input = Data, Output = Data>,
{
    type Model = DataModel;

    fn load(&self, source: &str) -> anyhow::Result<DataModel> {
        Ok(Box::new(self.0.load(source)?))
    }
}

/// Worker pool serving one model
pub struct InferenceExecutioner<M: InferenceModel> {
    name: String,
    config: ExecutionerConfig,
    model: Arc<M>,
    sender: Sender<QueuedRequest<M>>,
    /// Kept to drain stranded requests on stop
    queue: Receiver<QueuedRequest<M>>,
    shared: Arc<Shared>,
    /// Submitters hold the read side; stop flips it under the write side
    accepting: RwLock<bool>,
    shutdown: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl<M: InferenceModel> InferenceExecutioner<M> {
    /// Load the model once through `loader` and start the pool
    pub fn initialize<L>(loader: &L, source: &str, config: ExecutionerConfig) -> Result<Self>
    where
        L: ModelLoader<Model = M> + ?Sized,
    {
        config
            .validate()
            .map_err(|e| Error::Initialization(e.to_string()))?;
        let started = Instant::now();
        let model = loader.load(source).map_err(|e| {
            Error::Initialization(format!("failed to load model from '{}': {:#}", source, e))
        })?;
        info!(
            source,
            model = model.model_id(),
            load_ms = started.elapsed().as_millis() as u64,
            "Model loaded"
        );
        Self::from_model(model, config)
    }

    /// Start a pool over an already loaded model
    pub fn from_model(model: M, config: ExecutionerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Initialization(e.to_string()))?;
        if model.concurrency() == ModelConcurrency::Exclusive && config.workers > 1 {
            return Err(Error::Initialization(format!(
                "model '{}' is exclusive and cannot run on {} workers",
                model.model_id(),
                config.workers
            )));
        }

        let name = model.model_id().to_string();
        let model = Arc::new(model);
        let shared = Arc::new(Shared::default());
        let (sender, queue) = channel::bounded(config.queue_limit);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let batch_timeout = match config.inference_mode {
            crate::config::InferenceMode::Batched => config.batch_timeout(),
            crate::config::InferenceMode::Sequential => Duration::ZERO,
        };

        let mut handles = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker = Worker {
                name: format!("{}-{}", name, index),
                model: Arc::clone(&model),
                queue: queue.clone(),
                shutdown: shutdown_rx.clone(),
                shared: Arc::clone(&shared),
                batch_limit: config.effective_batch_limit(),
                batch_timeout,
            };
            let spawned = thread::Builder::new()
                .name(format!("infer-{}", index))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.stopped.store(true, Ordering::Release);
                    drop(shutdown_tx);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Initialization(format!(
                        "failed to spawn worker {} of {}: {}",
                        index, config.workers, e
                    )));
                }
            }
        }

        info!(
            model = %name,
            workers = config.workers,
            mode = ?config.inference_mode,
            batch_limit = config.effective_batch_limit(),
            queue_limit = config.queue_limit,
            "Inference executioner started"
        );

        Ok(Self {
            name,
            config,
            model,
            sender,
            queue,
            shared,
            accepting: RwLock::new(true),
            shutdown: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(handles),
            next_id: AtomicU64::new(1),
        })
    }

    /// Enqueue a request without blocking
    ///
    /// Fails with [`Error::QueueFull`] when `queue_limit` requests are
    /// already waiting and with [`Error::Shutdown`] once stopped.
    pub fn submit(&self, input: M::Input) -> Result<PendingInference<M::Output>> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(Error::Shutdown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(RequestState::default());
        let (reply, receiver) = channel::bounded(1);
        let request = Request {
            id,
            input,
            state: Arc::clone(&state),
            reply,
            enqueued_at: Instant::now(),
        };

        match self.sender.try_send(request) {
            Ok(()) => {
                self.shared.status.record_submitted();
                debug!(model = %self.name, request_id = id, "Request queued");
                Ok(PendingInference::new(id, state, receiver))
            }
            Err(TrySendError::Full(_)) => {
                self.shared.status.record_rejected();
                warn!(
                    model = %self.name,
                    queue_limit = self.config.queue_limit,
                    "Inference queue full; rejecting request"
                );
                Err(Error::QueueFull {
                    limit: self.config.queue_limit,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Shutdown),
        }
    }

    /// Submit and block until the result arrives
    pub fn execute(&self, input: M::Input) -> Result<M::Output> {
        self.submit(input)?.wait()
    }

    /// Submit and wait at most `timeout`
    ///
    /// A request that times out while still queued is withdrawn.
    pub fn execute_timeout(&self, input: M::Input, timeout: Duration) -> Result<M::Output> {
        let pending = self.submit(input)?;
        match pending.wait_timeout(timeout) {
            Err(Error::Timeout { timeout_ms }) => {
                if pending.cancel() {
                    debug!(
                        model = %self.name,
                        request_id = pending.id(),
                        "Withdrew timed-out request"
                    );
                }
                Err(Error::Timeout { timeout_ms })
            }
            other => other,
        }
    }

    /// Stop accepting work and shut the workers down
    ///
    /// Running batches finish; queued requests fail with
    /// [`Error::Shutdown`]. Blocks until every worker has exited.
    /// Idempotent.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        {
            let mut accepting = self.accepting.write();
            if !*accepting && workers.is_empty() {
                return;
            }
            *accepting = false;
        }
        self.shared.stopped.store(true, Ordering::Release);
        drop(self.shutdown.lock().take());
        self.shared.fail_shutdown(batch::drain(&self.queue));

        let count = workers.len();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!(model = %self.name, "Worker thread panicked");
            }
        }
        self.shared.fail_shutdown(batch::drain(&self.queue));
        info!(model = %self.name, workers = count, "Inference executioner stopped");
    }

    /// Whether the pool still accepts work
    pub fn is_running(&self) -> bool {
        *self.accepting.read()
    }

    /// Requests waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> ExecutionerStats {
        self.shared.status.snapshot()
    }

    pub fn config(&self) -> &ExecutionerConfig {
        &self.config
    }

    pub fn model_id(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: InferenceModel> Drop for InferenceExecutioner<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<M: InferenceModel> std::fmt::Debug for InferenceExecutioner<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceExecutioner")
            .field("model", &self.name)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
