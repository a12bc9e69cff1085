//! Task executors
//!
//! The per-URL work lives in [`CrawlEngine::process`]; an executor only
//! decides how many of those run at once and on what. Two implementations
//! exist:
//!
//! - [`WorkerPool`]: a fixed set of OS threads, each pulling from the frontier
//!   under its lock and driving one fetch at a time to completion
//! - [`CooperativeLoop`]: one async scheduling loop that holds a counting
//!   semaphore and spawns a task per permit, reaping them in completion order

use crate::crawler::engine::CrawlEngine;
use crate::crawler::frontier::Dequeued;
use crate::{CrawlError, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// How long an idle pool worker waits on the frontier before rechecking state
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Concurrency model selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExecutionMode {
    /// Worker threads sharing the frontier lock
    #[default]
    Pool,
    /// Single async loop with bounded permits
    Cooperative,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Cooperative => "cooperative",
        }
    }

    /// Builds the executor for this mode with `workers` threads or permits
    pub fn executor(&self, workers: usize) -> Box<dyn TaskExecutor> {
        match self {
            Self::Pool => Box::new(WorkerPool::new(workers)),
            Self::Cooperative => Box::new(CooperativeLoop::new(workers)),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the engine until the frontier drains or a stop is requested
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn run(&self, engine: Arc<CrawlEngine>) -> Result<()>;
}

/// Active concurrency target, lowered under memory pressure
///
/// Halves on every shed and recovers one slot per relax, never leaving
/// `1..=max`.
#[derive(Debug)]
pub struct Throttle {
    target: AtomicUsize,
    max: usize,
}

impl Throttle {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            target: AtomicUsize::new(max),
            max,
        }
    }

    pub fn target(&self) -> usize {
        self.target.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Halves the target; returns the new value
    pub fn shed(&self) -> usize {
        let previous = self
            .target
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some((t / 2).max(1)))
            .unwrap_or(1);
        (previous / 2).max(1)
    }

    /// Raises the target by one slot; returns the new value
    pub fn relax(&self) -> usize {
        let max = self.max;
        let previous = self
            .target
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some((t + 1).min(max)))
            .unwrap_or(max);
        (previous + 1).min(max)
    }
}

/// Fixed-size pool of blocking worker threads
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

fn worker_loop(index: usize, engine: Arc<CrawlEngine>, runtime: Handle) {
    tracing::debug!("Worker {} started", index);

    loop {
        if engine.is_stopping() {
            break;
        }

        // Workers above the throttle target sit out until pressure eases, but
        // must still notice when the remaining workers finish the frontier
        if index >= engine.throttle().target() {
            if engine.frontier().is_drained() {
                break;
            }
            thread::sleep(WORKER_POLL);
            continue;
        }

        match engine.frontier().dequeue_timeout(WORKER_POLL) {
            Dequeued::Entry(entry) => runtime.block_on(engine.process(entry)),
            Dequeued::Idle => continue,
            Dequeued::Drained | Dequeued::Closed => break,
        }
    }

    tracing::debug!("Worker {} finished", index);
}

#[async_trait]
impl TaskExecutor for WorkerPool {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Pool
    }

    async fn run(&self, engine: Arc<CrawlEngine>) -> Result<()> {
        let runtime = Handle::current();

        let handles = (0..self.workers)
            .map(|index| {
                let engine = Arc::clone(&engine);
                let runtime = runtime.clone();
                thread::Builder::new()
                    .name(format!("crawl-worker-{}", index))
                    .spawn(move || worker_loop(index, engine, runtime))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        tracing::info!("Started {} worker threads", handles.len());

        tokio::task::spawn_blocking(move || {
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| CrawlError::Worker("worker thread panicked".to_string()))
                })
                .collect::<Result<Vec<()>>>()
        })
        .await
        .map_err(|e| CrawlError::Worker(e.to_string()))??;

        Ok(())
    }
}

/// Single scheduling loop with a counting semaphore
///
/// The semaphore is sized to the configured permit count. When the throttle
/// target drops, the loop withholds the difference so only `target` fetches
/// can hold a permit at once.
pub struct CooperativeLoop {
    permits: usize,
}

impl CooperativeLoop {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: permits.max(1),
        }
    }
}

/// Grows or shrinks `withheld` toward `count` permits taken out of circulation
///
/// Permits still held by running tasks are picked up on a later call.
fn withhold_permits(
    permits: &Arc<Semaphore>,
    withheld: &mut Vec<OwnedSemaphorePermit>,
    count: usize,
) {
    withheld.truncate(count);
    while withheld.len() < count {
        match Arc::clone(permits).try_acquire_owned() {
            Ok(permit) => withheld.push(permit),
            Err(_) => break,
        }
    }
}

#[async_trait]
impl TaskExecutor for CooperativeLoop {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Cooperative
    }

    async fn run(&self, engine: Arc<CrawlEngine>) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.permits));
        let mut withheld = Vec::new();
        let mut tasks = JoinSet::new();

        loop {
            if !engine.is_stopping() {
                let target = engine.throttle().target().min(self.permits);
                withhold_permits(&permits, &mut withheld, self.permits - target);

                loop {
                    let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                        break;
                    };
                    let Some(entry) = engine.frontier().try_dequeue() else {
                        break;
                    };

                    let engine = Arc::clone(&engine);
                    tasks.spawn(async move {
                        let _permit = permit;
                        engine.process(entry).await;
                    });
                }
            }

            // Completion order, not submission order
            match tasks.join_next().await {
                Some(Ok(())) => {}
                Some(Err(e)) => return Err(CrawlError::Worker(e.to_string())),
                None => break,
            }
        }

        Ok(())
    }
}
