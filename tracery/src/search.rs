//! Search-as-you-type: a quiet-period debounce plus sequence numbers.
//!
//! Each keystroke takes a new ticket. A ticket only dispatches once the
//! quiet period passes without a newer ticket, and its result is only
//! applied if it is still the newest ticket when the response arrives.
//! Superseded requests are never aborted, their results are just dropped.

use crate::ErrorPayload;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    latest: AtomicU64,
}

impl Debouncer {
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            latest: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Registers an input change and supersedes every earlier ticket.
    pub fn touch(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Waits out the quiet period; `true` if nothing newer arrived meanwhile.
    pub async fn settle(&self, ticket: Ticket) -> bool {
        tokio::time::sleep(self.quiet).await;
        self.is_current(ticket)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A newer input arrived before the quiet period ended; nothing was sent.
    Superseded,
    /// The request was sent but a newer input arrived before it completed.
    Discarded,
    Applied,
}

/// The most recently applied search.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub ticket: Ticket,
    pub query: String,
    pub result: Result<T, ErrorPayload>,
}

#[derive(Debug)]
pub struct DebouncedSearch<T> {
    debouncer: Debouncer,
    applied: Mutex<Option<Applied<T>>>,
}

impl<T> Default for DebouncedSearch<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl<T> DebouncedSearch<T> {
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(quiet),
            applied: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Handles one input change.
    ///
    /// Resolves once this input is either applied or known to be superseded.
    pub async fn input<F, Fut>(&self, query: String, fetch: F) -> SearchOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, ErrorPayload>>,
    {
        let ticket = self.debouncer.touch();
        if !self.debouncer.settle(ticket).await {
            return SearchOutcome::Superseded;
        }
        let result = fetch(query.clone()).await;
        if !self.debouncer.is_current(ticket) {
            tracing::debug!(%query, "discarding superseded search result");
            return SearchOutcome::Discarded;
        }
        *self.applied.lock() = Some(Applied {
            ticket,
            query,
            result,
        });
        SearchOutcome::Applied
    }
}

impl<T: Clone> DebouncedSearch<T> {
    #[must_use]
    pub fn latest(&self) -> Option<Applied<T>> {
        self.applied.lock().clone()
    }
}
