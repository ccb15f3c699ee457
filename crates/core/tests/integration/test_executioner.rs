//! Integration tests for the inference executioner
//!
//! The gate model blocks every model call until the test releases it, so
//! the tests control exactly which requests share a batch.

use crossbeam::channel::{unbounded, Receiver, Sender};
use inferhost_core::model_worker::ExecutionerStats;
use inferhost_core::{Error, ExecutionerConfig, InferenceExecutioner, InferenceMode, InferenceModel};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Multiplies by ten; negative inputs fail the whole batch
struct Gate {
    started: Sender<usize>,
    release: Receiver<()>,
}

impl InferenceModel for Gate {
    type Input = i64;
    type Output = i64;

    fn model_id(&self) -> &str {
        "gate"
    }

    fn infer(&self, batch: Vec<i64>) -> anyhow::Result<Vec<i64>> {
        let _ = self.started.send(batch.len());
        self.release.recv()?;
        if let Some(bad) = batch.iter().find(|x| **x < 0) {
            anyhow::bail!("negative input {}", bad);
        }
        Ok(batch.into_iter().map(|x| x * 10).collect())
    }
}

fn gated(config: ExecutionerConfig) -> (InferenceExecutioner<Gate>, Receiver<usize>, Sender<()>) {
    let (started_tx, started) = unbounded();
    let (release, release_rx) = unbounded();
    let model = Gate {
        started: started_tx,
        release: release_rx,
    };
    let executioner = InferenceExecutioner::from_model(model, config).unwrap();
    (executioner, started, release)
}

fn batched(batch_limit: usize, queue_limit: usize) -> ExecutionerConfig {
    ExecutionerConfig::new()
        .with_workers(1)
        .with_mode(InferenceMode::Batched)
        .with_batch_limit(batch_limit)
        .with_queue_limit(queue_limit)
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_batch_results_reach_their_callers() {
    let (exec, started, release) = gated(batched(4, 16));

    let blocker = exec.submit(0).unwrap();
    assert_eq!(started.recv_timeout(WAIT).unwrap(), 1);

    let pending: Vec<_> = (1..=4).map(|x| exec.submit(x).unwrap()).collect();
    assert_eq!(exec.pending(), 4);

    release.send(()).unwrap();
    assert_eq!(blocker.wait().unwrap(), 0);

    // the four queued requests go to the model together
    assert_eq!(started.recv_timeout(WAIT).unwrap(), 4);
    release.send(()).unwrap();
    let results: Vec<i64> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
    assert_eq!(results, vec![10, 20, 30, 40]);

    let stats = exec.stats();
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.largest_batch, 4);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.average_batch_size(), 2.5);
}

#[test]
fn test_sequential_mode_never_batches() {
    let config = batched(4, 16).with_mode(InferenceMode::Sequential);
    let (exec, started, release) = gated(config);

    let blocker = exec.submit(0).unwrap();
    assert_eq!(started.recv_timeout(WAIT).unwrap(), 1);
    let queued: Vec<_> = (1..=3).map(|x| exec.submit(x).unwrap()).collect();

    for _ in 0..4 {
        release.send(()).unwrap();
    }
    blocker.wait().unwrap();
    for p in queued {
        p.wait().unwrap();
    }
    let sizes: Vec<usize> = started.try_iter().collect();
    assert_eq!(sizes, vec![1, 1, 1]);
    assert_eq!(exec.stats().largest_batch, 1);
}

#[test]
fn test_queue_full_rejects_without_blocking() {
    let (exec, started, release) = gated(batched(4, 2));

    let running = exec.submit(1).unwrap();
    assert_eq!(started.recv_timeout(WAIT).unwrap(), 1);
    let queued = [exec.submit(2).unwrap(), exec.submit(3).unwrap()];

    match exec.submit(4) {
        Err(Error::QueueFull { limit }) => assert_eq!(limit, 2),
        other => panic!("expected QueueFull, got {:?}", other),
    }
    assert!(exec.submit(5).unwrap_err().is_retryable());

    release.send(()).unwrap();
    release.send(()).unwrap();
    assert_eq!(running.wait().unwrap(), 10);
    let [a, b] = queued;
    assert_eq!(a.wait().unwrap(), 20);
    assert_eq!(b.wait().unwrap(), 30);

    assert_eq!(
        exec.stats(),
        ExecutionerStats {
            submitted: 3,
            rejected: 2,
            completed: 3,
            batches: 2,
            largest_batch: 2,
            ..Default::default()
        }
    );
}

#[test]
fn test_failed_batch_is_isolated() {
    let (exec, started, release) = gated(batched(4, 16));

    let blocker = exec.submit(0).unwrap();
    started.recv_timeout(WAIT).unwrap();
    let bad = exec.submit(-1).unwrap();
    let innocent = exec.submit(2).unwrap();

    release.send(()).unwrap();
    blocker.wait().unwrap();
    assert_eq!(started.recv_timeout(WAIT).unwrap(), 2);
    release.send(()).unwrap();

    let (Err(Error::ModelCall(first)), Err(Error::ModelCall(second))) = (bad.wait(), innocent.wait())
    else {
        panic!("both callers in the failed batch should see the model error");
    };
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.to_string().contains("negative input -1"));

    // the pool keeps serving
    release.send(()).unwrap();
    assert_eq!(exec.execute(7).unwrap(), 70);
    let stats = exec.stats();
    assert_eq!((stats.completed, stats.failed), (2, 2));
}

#[test]
fn test_stop_fails_queued_and_finishes_running() {
    let (exec, started, release) = gated(batched(4, 16));
    let exec = Arc::new(exec);

    let running = exec.submit(1).unwrap();
    started.recv_timeout(WAIT).unwrap();
    let queued: Vec<_> = (2..=3).map(|x| exec.submit(x).unwrap()).collect();

    let stopper = {
        let exec = Arc::clone(&exec);
        thread::spawn(move || exec.stop())
    };
    for p in queued {
        assert!(matches!(p.wait(), Err(Error::Shutdown)));
    }
    assert!(!exec.is_running());
    assert!(matches!(exec.submit(9), Err(Error::Shutdown)));

    release.send(()).unwrap();
    assert_eq!(running.wait().unwrap(), 10);
    stopper.join().unwrap();

    let stats = exec.stats();
    assert_eq!(stats.shut_down, 2);
    assert_eq!(stats.resolved(), stats.submitted);
}

#[test]
fn test_cancel_queued_request() {
    let (exec, started, release) = gated(batched(4, 16));

    let blocker = exec.submit(0).unwrap();
    started.recv_timeout(WAIT).unwrap();
    let doomed = exec.submit(1).unwrap();
    let kept = exec.submit(2).unwrap();
    assert!(doomed.cancel());
    assert!(matches!(doomed.wait(), Err(Error::Cancelled)));

    release.send(()).unwrap();
    release.send(()).unwrap();
    blocker.wait().unwrap();
    assert_eq!(kept.wait().unwrap(), 20);

    // the cancelled request never reached the model
    assert_eq!(started.try_iter().collect::<Vec<_>>(), vec![1]);
    assert_eq!(exec.stats().cancelled, 1);
}

#[test]
fn test_execute_timeout_withdraws_request() {
    let (exec, started, release) = gated(batched(4, 16));

    let blocker = exec.submit(0).unwrap();
    started.recv_timeout(WAIT).unwrap();
    let err = exec.execute_timeout(5, Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 20 }));

    release.send(()).unwrap();
    blocker.wait().unwrap();
    release.send(()).unwrap();
    assert_eq!(exec.execute(6).unwrap(), 60);
    assert_eq!(exec.stats().cancelled, 1);
}

struct Miscount;

impl InferenceModel for Miscount {
    type Input = i64;
    type Output = i64;

    fn model_id(&self) -> &str {
        "miscount"
    }

    fn infer(&self, _batch: Vec<i64>) -> anyhow::Result<Vec<i64>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_output_count_mismatch_is_model_error() {
    let exec = InferenceExecutioner::from_model(Miscount, ExecutionerConfig::default()).unwrap();
    match exec.execute(1) {
        Err(Error::ModelCall(cause)) => {
            assert!(cause.to_string().contains("0 outputs for a batch of 1"))
        }
        other => panic!("expected ModelCall, got {:?}", other),
    }
}

struct Square;

impl InferenceModel for Square {
    type Input = i64;
    type Output = i64;

    fn model_id(&self) -> &str {
        "square"
    }

    fn infer(&self, batch: Vec<i64>) -> anyhow::Result<Vec<i64>> {
        Ok(batch.into_iter().map(|x| x * x).collect())
    }
}

#[test]
fn test_concurrent_callers_get_their_own_results() {
    let config = ExecutionerConfig::new()
        .with_workers(3)
        .with_mode(InferenceMode::Batched)
        .with_batch_limit(8)
        .with_queue_limit(256)
        .with_batch_timeout(Duration::from_millis(2));
    let exec = Arc::new(InferenceExecutioner::from_model(Square, config).unwrap());

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let exec = Arc::clone(&exec);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..25 {
                    let x: i64 = rng.gen_range(-1000..1000);
                    assert_eq!(exec.execute(x).unwrap(), x * x);
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    exec.stop();
    let stats = exec.stats();
    assert_eq!(stats.completed, 200);
    assert!(stats.largest_batch <= 8);
}
