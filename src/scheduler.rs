//! # Arrival Scheduler and Concurrency Limiter
//!
//! The scheduler releases request descriptors over time according to a
//! stochastic arrival process and hands them to the orchestrator through an
//! async channel; consumers read releases instead of depending on generator
//! suspension semantics. The limiter bounds how many executor calls are in
//! flight at once.
//!
//! Inter-arrival intervals are sampled from a Gamma distribution with
//! shape = burstiness and scale = 1 / (rate x burstiness). Burstiness 1.0
//! reduces to an exponential inter-arrival distribution, i.e. a Poisson
//! process; larger values space requests more evenly, smaller values clump
//! them.

use crate::error::BenchmarkError;
use crate::executor::RequestDescriptor;
use rand_distr::{Distribution, Gamma};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Arrival process parameters.
///
/// `rate` is requests per second; `f64::INFINITY` means descriptors are
/// released back to back with no imposed delay. `burstiness` must be
/// strictly positive.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalSpec {
    pub rate: f64,
    pub burstiness: f64,
}

impl ArrivalSpec {
    /// Release with no pacing at all.
    pub fn unbounded() -> Self {
        Self {
            rate: f64::INFINITY,
            burstiness: 1.0,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.rate.is_infinite()
    }

    /// Reject invalid parameters before any request is dispatched.
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if !(self.burstiness > 0.0) {
            return Err(BenchmarkError::Configuration(format!(
                "burstiness must be strictly positive, got {}",
                self.burstiness
            )));
        }
        if !(self.rate > 0.0) {
            return Err(BenchmarkError::Configuration(format!(
                "request rate must be positive, got {}",
                self.rate
            )));
        }
        Ok(())
    }

    /// The inter-arrival distribution, or `None` when the rate is unbounded.
    fn interval_distribution(&self) -> Result<Option<Gamma<f64>>, BenchmarkError> {
        self.validate()?;
        if self.is_unbounded() {
            return Ok(None);
        }
        let scale = 1.0 / (self.rate * self.burstiness);
        Gamma::new(self.burstiness, scale)
            .map(Some)
            .map_err(|err| {
                BenchmarkError::Configuration(format!("invalid arrival distribution: {}", err))
            })
    }
}

/// Release descriptors over time on a channel, in input order.
///
/// Finite and single-pass: the channel closes once every descriptor has been
/// released. The pacing task stops early when `cancel` fires or the receiver
/// is dropped. Parameter validation happens here, before anything is sent.
pub fn pace_requests(
    descriptors: Vec<RequestDescriptor>,
    spec: &ArrivalSpec,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<RequestDescriptor>, BenchmarkError> {
    let interval_dist = spec.interval_distribution()?;
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let total = descriptors.len();
        for (released, descriptor) in descriptors.into_iter().enumerate() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("arrival scheduler cancelled after {}/{} releases", released, total);
                    return;
                }
                sent = tx.send(descriptor) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }

            if let Some(dist) = &interval_dist {
                let interval = dist.sample(&mut rand::thread_rng());
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("arrival scheduler cancelled mid-interval");
                        return;
                    }
                    _ = sleep(Duration::from_secs_f64(interval)) => {}
                }
            }
        }
    });

    Ok(rx)
}

/// Bounds the number of simultaneously in-flight executor calls.
///
/// Acquisition suspends the caller until a slot frees; the returned permit
/// releases its slot on drop, so release is guaranteed on every exit path of
/// the guarded call. `None` capacity means unlimited.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Wait for a slot. Returns `None` when the limiter is unlimited (no
    /// permit needed) and when the semaphore has been closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        }
    }
}
