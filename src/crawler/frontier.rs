//! Crawl frontier
//!
//! This module handles:
//! - The FIFO work queue of (URL, depth) entries
//! - Atomic check-and-insert against the visited sets
//! - The depth limit
//! - Tracking in-flight work so "drained" can be told apart from "momentarily empty"
//!
//! Queue and visited sets share one lock. A URL is marked visited in the same
//! critical section that queues it, so two workers offering the same link can
//! never both enqueue it.

use crate::governor::Reclaim;
use crate::state::VisitedSet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized absolute URL
    pub url: Url,

    /// Link distance from the seed
    pub depth: u32,

    /// Registrable domain of `url`
    pub domain: String,
}

/// What [`Frontier::enqueue`] did with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Already queued or fetched during this run
    Duplicate,
    /// Beyond the depth limit
    TooDeep,
    /// Domain was registered by a previous run
    Settled,
    /// The frontier no longer accepts work
    Closed,
}

/// Result of a blocking dequeue
#[derive(Debug)]
pub enum Dequeued {
    Entry(FrontierEntry),
    /// Nothing arrived before the wait timed out; work is still in flight
    Idle,
    /// Queue empty and nothing in flight: no more work will appear
    Drained,
    /// The crawl is stopping
    Closed,
}

struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    visited: VisitedSet,
    in_flight: usize,
    closed: bool,
}

impl FrontierState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    fn take(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(entry)
    }
}

pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Condvar,
    max_depth: u32,
}

impl Frontier {
    /// Creates an empty frontier over `visited`
    pub fn new(max_depth: u32, visited: VisitedSet) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                queue: VecDeque::new(),
                visited,
                in_flight: 0,
                closed: false,
            }),
            changed: Condvar::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Offers a normalized URL at `depth`
    ///
    /// Duplicates, over-deep entries and URLs on settled domains are dropped
    /// without error. `host` is recorded in the subdomain set whenever the
    /// URL itself is accepted.
    pub fn enqueue(&self, url: Url, depth: u32, domain: &str, host: &str) -> EnqueueOutcome {
        if depth > self.max_depth {
            return EnqueueOutcome::TooDeep;
        }

        let mut state = self.state.lock();
        if state.closed {
            return EnqueueOutcome::Closed;
        }
        if state.visited.is_settled(domain) {
            return EnqueueOutcome::Settled;
        }
        if !state.visited.insert_url(url.as_str()) {
            return EnqueueOutcome::Duplicate;
        }
        state.visited.insert_host(host);

        state.queue.push_back(FrontierEntry {
            url,
            depth,
            domain: domain.to_string(),
        });
        drop(state);

        self.changed.notify_one();
        EnqueueOutcome::Queued
    }

    /// Takes the oldest entry without waiting
    ///
    /// Every entry handed out must be followed by exactly one [`Frontier::complete`].
    pub fn try_dequeue(&self) -> Option<FrontierEntry> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.take()
    }

    /// Takes the oldest entry, waiting up to `wait` for one to appear
    pub fn dequeue_timeout(&self, wait: Duration) -> Dequeued {
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Dequeued::Closed;
            }
            if let Some(entry) = state.take() {
                return Dequeued::Entry(entry);
            }
            if state.in_flight == 0 {
                return Dequeued::Drained;
            }
            if self.changed.wait_for(&mut state, wait).timed_out() {
                return Dequeued::Idle;
            }
        }
    }

    /// Marks one dequeued entry as finished
    ///
    /// Must be called after any links found while processing it were enqueued.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let drained = state.is_drained();
        drop(state);

        if drained {
            self.changed.notify_all();
        }
    }

    /// Stops handing out and accepting work and wakes every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }

    pub fn is_drained(&self) -> bool {
        self.state.lock().is_drained()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Number of distinct hosts accepted this run
    pub fn host_count(&self) -> usize {
        self.state.lock().visited.host_count()
    }

    /// Number of distinct URLs accepted this run
    pub fn url_count(&self) -> usize {
        self.state.lock().visited.url_count()
    }
}

impl Reclaim for Frontier {
    fn reclaim(&self) {
        let mut state = self.state.lock();
        state.queue.shrink_to_fit();
        state.visited.shrink_to_fit();
    }
}
