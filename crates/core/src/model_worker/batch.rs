//! Worker loop: drain the queue, call the model, demultiplex results

use super::request::Request;
use super::status::StatusTracker;
use super::InferenceModel;
use crate::error::panic_message;
use crate::Error;
use crossbeam::channel::{select, Receiver};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub(crate) type QueuedRequest<M> =
    Request<<M as InferenceModel>::Input, <M as InferenceModel>::Output>;

/// State shared by the executioner handle and its workers
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) stopped: AtomicBool,
    pub(crate) status: StatusTracker,
}

impl Shared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Resolve every request in `requests` with [`Error::Shutdown`]
    pub(crate) fn fail_shutdown<I, O>(&self, requests: impl IntoIterator<Item = Request<I, O>>) {
        let mut count = 0;
        for request in requests {
            request.respond(Err(Error::Shutdown));
            count += 1;
        }
        if count > 0 {
            self.status.record_shut_down(count);
            debug!(count, "Dropped queued requests on shutdown");
        }
    }
}

/// One worker thread of an executioner
pub(crate) struct Worker<M: InferenceModel> {
    pub(crate) name: String,
    pub(crate) model: Arc<M>,
    pub(crate) queue: Receiver<QueuedRequest<M>>,
    /// Never carries a message; disconnects when the pool stops
    pub(crate) shutdown: Receiver<()>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) batch_limit: usize,
    pub(crate) batch_timeout: Duration,
}

impl<M: InferenceModel> Worker<M> {
    pub(crate) fn run(self) {
        debug!(worker = %self.name, "Worker started");
        loop {
            if self.shared.is_stopped() {
                break;
            }
            let first = select! {
                recv(self.queue) -> request => match request {
                    Ok(request) => request,
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            };

            self.serve(first);
        }
        debug!(worker = %self.name, "Worker exiting");
    }

    /// Batch up behind `first` and run it
    ///
    /// Requests pulled off the queue run unless cancelled, even when stop
    /// is requested while the batch is filling.
    fn serve(&self, first: QueuedRequest<M>) {
        let batch = self.claim(self.fill_batch(first));
        if !batch.is_empty() {
            self.run_batch(batch);
        }
    }

    /// Take up to `batch_limit` requests, starting with `first`
    fn fill_batch(&self, first: QueuedRequest<M>) -> Vec<QueuedRequest<M>> {
        let mut batch = Vec::with_capacity(self.batch_limit);
        batch.push(first);
        let deadline =
            (!self.batch_timeout.is_zero()).then(|| Instant::now() + self.batch_timeout);
        while batch.len() < self.batch_limit {
            let next = match deadline {
                Some(deadline) => self.queue.recv_deadline(deadline).ok(),
                None => self.queue.try_recv().ok(),
            };
            match next {
                Some(request) => batch.push(request),
                None => break,
            }
        }
        batch
    }

    /// Drop cancelled requests, marking the rest running
    fn claim(&self, batch: Vec<QueuedRequest<M>>) -> Vec<QueuedRequest<M>> {
        let mut claimed = Vec::with_capacity(batch.len());
        for request in batch {
            if request.state.claim() {
                claimed.push(request);
            } else {
                debug!(request_id = request.id, "Skipping cancelled request");
                self.shared.status.record_cancelled();
                request.respond(Err(Error::Cancelled));
            }
        }
        claimed
    }

    fn run_batch(&self, batch: Vec<QueuedRequest<M>>) {
        let size = batch.len();
        let oldest_wait = batch
            .iter()
            .map(|r| r.enqueued_at.elapsed())
            .max()
            .unwrap_or_default();
        debug!(
            worker = %self.name,
            batch_size = size,
            queued_ms = oldest_wait.as_millis() as u64,
            "Running batch"
        );

        let mut inputs = Vec::with_capacity(size);
        let mut replies = Vec::with_capacity(size);
        for Request { input, reply, .. } in batch {
            inputs.push(input);
            replies.push(reply);
        }

        let started = Instant::now();
        let outcome = self.call_model(inputs, size);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(outputs) => {
                self.shared.status.record_batch(size, true);
                debug!(worker = %self.name, batch_size = size, elapsed_ms, "Batch complete");
                for (reply, output) in replies.into_iter().zip(outputs) {
                    let _ = reply.send(Ok(output));
                }
            }
            Err(err) => {
                self.shared.status.record_batch(size, false);
                error!(
                    worker = %self.name,
                    batch_size = size,
                    elapsed_ms,
                    error = %err,
                    "Model call failed"
                );
                let shared = Arc::new(err);
                for reply in replies {
                    let _ = reply.send(Err(Error::ModelCall(Arc::clone(&shared))));
                }
            }
        }
    }

    /// Invoke the model once, turning panics and miscounted outputs into errors
    fn call_model(
        &self,
        inputs: Vec<M::Input>,
        expected: usize,
    ) -> anyhow::Result<Vec<M::Output>> {
        let model = &self.model;
        let outputs = panic::catch_unwind(AssertUnwindSafe(|| model.infer(inputs)))
            .map_err(|payload| anyhow::anyhow!("model panicked: {}", panic_message(&*payload)))??;
        if outputs.len() != expected {
            anyhow::bail!(
                "model returned {} outputs for a batch of {}",
                outputs.len(),
                expected
            );
        }
        Ok(outputs)
    }
}

/// Drain whatever is left in `queue` without blocking
pub(crate) fn drain<T>(queue: &Receiver<T>) -> Vec<T> {
    queue.try_iter().collect()
}
