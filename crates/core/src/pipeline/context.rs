//! Per-request execution context

use crate::Error;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Stage identity handed to observers
#[derive(Debug, Clone, Copy)]
pub struct StageInfo<'a> {
    /// Zero-based stage index
    pub index: usize,
    /// Step type tag
    pub step_type: &'a str,
}

/// Hook notified around every stage of an execution
pub trait StageObserver: Send + Sync {
    fn on_stage_start(&self, _ctx: &Context, _stage: StageInfo<'_>) {}

    fn on_stage_end(
        &self,
        _ctx: &Context,
        _stage: StageInfo<'_>,
        _elapsed: Duration,
        _outcome: Result<(), &Error>,
    ) {
    }
}

/// Context of one pipeline execution
#[derive(Clone)]
pub struct Context {
    request_id: Uuid,
    metadata: HashMap<String, String>,
    observer: Option<Arc<dyn StageObserver>>,
}

impl Context {
    /// Fresh context with a random request id
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4())
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            metadata: HashMap::new(),
            observer: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a stage observer
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub(crate) fn observer(&self) -> Option<&dyn StageObserver> {
        self.observer.as_deref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("metadata", &self.metadata)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
