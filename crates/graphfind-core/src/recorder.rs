//! Result aggregation and cooperative cancellation.
//!
//! The engine never touches a [`SearchableResponse`] directly; it records
//! matches through a [`Recorder`], which lets the single-threaded and the
//! concurrent search share the same traversal code:
//!
//! | Recorder | Storage | Used by |
//! |----------|---------|---------|
//! | [`ResponseRecorder`] | plain ordered response | sequential search |
//! | [`SharedRecorder`] | response behind a mutex, cloned per task | concurrent search |
//!
//! Both enforce the threshold at insertion time: the limit is checked and
//! the identifier inserted under one borrow (or one lock), so the total
//! never exceeds the threshold even with concurrent writers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::SearchableResponse;

/// Outcome of a single [`Recorder::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Added,
    /// Already recorded under the same name.
    Duplicate,
    /// The threshold had already been reached; nothing was recorded.
    Full,
}

/// Idempotent accumulator of matched record identifiers.
pub trait Recorder: Send {
    fn add(&mut self, name: &str, oid: i64) -> Admission;

    /// Total identifiers recorded across all names.
    fn count(&self) -> usize;

    /// Whether the threshold has been reached.
    fn is_full(&self) -> bool;
}

fn admit(response: &mut SearchableResponse, limit: usize, name: &str, oid: i64) -> Admission {
    if response.contains(name, oid) {
        return Admission::Duplicate;
    }
    if limit > 0 && response.count() >= limit {
        return Admission::Full;
    }
    response.add(name, oid);
    Admission::Added
}

/// Single-threaded recorder over a plain [`SearchableResponse`].
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    response: SearchableResponse,
    limit: usize,
}

impl ResponseRecorder {
    /// `limit` of `0` means unlimited.
    pub fn new(limit: usize) -> Self {
        Self {
            response: SearchableResponse::new(),
            limit,
        }
    }

    pub fn response(&self) -> &SearchableResponse {
        &self.response
    }

    pub fn into_response(self) -> SearchableResponse {
        self.response
    }
}

impl Recorder for ResponseRecorder {
    fn add(&mut self, name: &str, oid: i64) -> Admission {
        admit(&mut self.response, self.limit, name, oid)
    }

    fn count(&self) -> usize {
        self.response.count()
    }

    fn is_full(&self) -> bool {
        self.limit > 0 && self.response.count() >= self.limit
    }
}

/// Recorder shared between concurrent search tasks.
///
/// Cloning is cheap; every clone appends to the same response.
#[derive(Debug, Clone, Default)]
pub struct SharedRecorder {
    inner: Arc<Mutex<SearchableResponse>>,
    limit: usize,
}

impl SharedRecorder {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SearchableResponse::new())),
            limit,
        }
    }

    pub fn snapshot(&self) -> SearchableResponse {
        self.inner.lock().clone()
    }

    /// Takes the accumulated response, cloning only if other handles are alive.
    pub fn into_response(self) -> SearchableResponse {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}

impl Recorder for SharedRecorder {
    fn add(&mut self, name: &str, oid: i64) -> Admission {
        let mut response = self.inner.lock();
        admit(&mut response, self.limit, name, oid)
    }

    fn count(&self) -> usize {
        self.inner.lock().count()
    }

    fn is_full(&self) -> bool {
        self.limit > 0 && self.inner.lock().count() >= self.limit
    }
}

/// Cooperative cancellation flag, polled by the engine between steps.
///
/// Tripped by the engine when the recorder fills up, or externally by the
/// caller. In-flight store calls are never interrupted.
#[derive(Debug, Default)]
pub struct Cancellation {
    cancelled: AtomicBool,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
