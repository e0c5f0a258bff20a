//! ChangeNotifier - Batched model updates with ordered listeners
//!
//! ## Responsibilities
//!
//! - Hold the current in-memory model
//! - Stage field updates until an explicit commit point
//! - On commit, call every listener with `(new, old, context)` in
//!   registration order on the calling thread
//!
//! ## Design
//!
//! - The first failing listener aborts the rest of the chain and its error
//!   is returned to the committer
//! - The in-memory model only moves forward once every listener succeeded,
//!   so a failed persist leaves memory and disk on the same document
//! - Staged changes are consumed by every commit attempt

use crate::error::Result;
use crate::models::{StatusChange, StatusDocument};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A model the notifier can apply staged changes to
pub trait Model: Clone {
    type Change: std::fmt::Debug;

    fn apply(&mut self, change: Self::Change);
}

impl Model for StatusDocument {
    type Change = StatusChange;

    fn apply(&mut self, change: StatusChange) {
        match change {
            StatusChange::Status(status) => self.status = Some(status),
            StatusChange::Index(index) => self.index = index,
            StatusChange::TotalCaptures(total) => self.total_captures = total,
            StatusChange::ResultUrl(url) => self.result_url = url,
        }
    }
}

/// Metadata passed to listeners with each commit
#[derive(Debug, Clone)]
pub struct ChangeContext {
    /// Logical operation that produced the change (e.g. "capture")
    pub operation: &'static str,
    pub request_id: Uuid,
    pub at: DateTime<Utc>,
}

impl ChangeContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            request_id: Uuid::new_v4(),
            at: Utc::now(),
        }
    }
}

/// Listener callback: `(new, old, context)`
pub type Listener<M> = Box<dyn Fn(&M, &M, &ChangeContext) -> Result<()> + Send + Sync>;

/// Applies staged changes as one batch and notifies listeners
pub struct ChangeNotifier<M: Model> {
    model: M,
    staged: Vec<M::Change>,
    listeners: Vec<(String, Listener<M>)>,
}

impl<M: Model> ChangeNotifier<M> {
    /// Create notifier around an initial model
    pub fn new(model: M) -> Self {
        Self {
            model,
            staged: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Current committed model
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Register a named listener
    ///
    /// Re-registering an existing name replaces the callback in place and
    /// keeps its position in the call order.
    pub fn add_listener<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: Fn(&M, &M, &ChangeContext) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let listener: Listener<M> = Box::new(listener);
        match self.listeners.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = listener,
            None => self.listeners.push((name, listener)),
        }
    }

    /// Unregister a listener, returns whether it existed
    pub fn remove_listener(&mut self, name: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(n, _)| n != name);
        self.listeners.len() != before
    }

    /// Stage one change for the next commit
    pub fn request_update(&mut self, change: M::Change) {
        self.staged.push(change);
    }

    /// Number of staged changes
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Apply staged changes and notify listeners
    ///
    /// Returns `Ok(false)` without calling listeners when nothing is staged.
    pub fn commit(&mut self, context: &ChangeContext) -> Result<bool> {
        if self.staged.is_empty() {
            return Ok(false);
        }

        let mut next = self.model.clone();
        for change in self.staged.drain(..) {
            next.apply(change);
        }

        for (name, listener) in &self.listeners {
            if let Err(e) = listener(&next, &self.model, context) {
                tracing::warn!(
                    listener = %name,
                    operation = context.operation,
                    request_id = %context.request_id,
                    error = %e,
                    "Change listener failed, commit aborted"
                );
                return Err(e);
            }
        }

        self.model = next;
        Ok(true)
    }

    /// Replace the model without notifying listeners
    ///
    /// Discards staged changes.
    pub fn replace(&mut self, model: M) {
        self.staged.clear();
        self.model = model;
    }
}
