//! Queued requests and the caller-side handle

use crate::{Error, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle of one request, shared by the caller and the worker
#[derive(Debug, Default)]
pub(crate) struct RequestState(AtomicU8);

impl RequestState {
    /// Worker side: take the request if nobody cancelled it
    pub(crate) fn claim(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Caller side: withdraw the request if no worker took it
    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == CANCELLED
    }
}

/// A request sitting in the executioner queue
pub(crate) struct Request<I, O> {
    pub(crate) id: u64,
    pub(crate) input: I,
    pub(crate) state: Arc<RequestState>,
    pub(crate) reply: Sender<Result<O>>,
    pub(crate) enqueued_at: Instant,
}

impl<I, O> Request<I, O> {
    /// Resolve the caller's handle; a caller that gave up is ignored
    pub(crate) fn respond(self, result: Result<O>) {
        let _ = self.reply.send(result);
    }
}

/// Caller-side handle to a submitted request
///
/// Dropping the handle abandons the result; the request still runs.
#[derive(Debug)]
pub struct PendingInference<O> {
    id: u64,
    state: Arc<RequestState>,
    reply: Receiver<Result<O>>,
}

impl<O> PendingInference<O> {
    pub(crate) fn new(id: u64, state: Arc<RequestState>, reply: Receiver<Result<O>>) -> Self {
        Self { id, state, reply }
    }

    /// Executioner-assigned request id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the result arrives
    pub fn wait(self) -> Result<O> {
        if self.state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // A dropped sender means the pool went away without answering.
        self.reply.recv().unwrap_or(Err(Error::Shutdown))
    }

    /// Block for at most `timeout`
    ///
    /// On [`Error::Timeout`] the request stays queued or running and the
    /// handle can be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<O> {
        if self.state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.reply.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Shutdown),
        }
    }

    /// Withdraw the request if it has not started running
    ///
    /// Returns whether it was withdrawn. A withdrawn request resolves
    /// [`Error::Cancelled`]; its queue slot frees up when a worker drains it.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }
}
