// Flow store - loads capture files once per session and keeps them in memory
use crate::capture;
use crate::error::QueryError;
use crate::models::Flow;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Extensions tried, in order, when a session id has no exact file match.
const SESSION_EXTENSIONS: &[&str] = &["har", "jsonl", "ndjson"];

type Slot = Arc<Mutex<Option<Arc<[Flow]>>>>;

/// Session-keyed cache of parsed captures.
///
/// The cache is unbounded: every session loaded stays resident until
/// [`FlowStore::evict`] or [`FlowStore::clear`] is called.
pub struct FlowStore {
    capture_dir: PathBuf,
    sessions: Mutex<HashMap<String, Slot>>,
    reads: AtomicUsize,
}

impl FlowStore {
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            sessions: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// Load all flows of a session, reading the capture file on first use only.
    pub fn load(&self, session_id: &str) -> Result<Arc<[Flow]>, QueryError> {
        validate_session_id(session_id)?;

        // Only the slot lookup happens under the map lock; parsing holds the
        // per-session lock so other sessions are not blocked.
        let slot = {
            let mut sessions = lock(&self.sessions);
            sessions.entry(session_id.to_string()).or_default().clone()
        };

        let mut cached = lock(&slot);
        if let Some(flows) = cached.as_ref() {
            debug!("Session {} served from cache", session_id);
            return Ok(flows.clone());
        }

        let loaded = self.resolve(session_id).and_then(|path| {
            let flows: Arc<[Flow]> = capture::read_capture(&path)?.into();
            self.reads.fetch_add(1, Ordering::SeqCst);
            info!("Loaded {} flows from {}", flows.len(), path.display());
            Ok(flows)
        });

        match loaded {
            Ok(flows) => {
                *cached = Some(flows.clone());
                Ok(flows)
            }
            Err(e) => {
                drop(cached);
                self.discard_empty_slot(session_id, &slot);
                Err(e)
            }
        }
    }

    /// Forget a slot whose load failed so unknown ids do not accumulate.
    fn discard_empty_slot(&self, session_id: &str, slot: &Slot) {
        let mut sessions = lock(&self.sessions);
        let unused = sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && lock(current).is_none());
        if unused {
            sessions.remove(session_id);
        }
    }

    /// Map a session id to an existing capture file.
    pub fn resolve(&self, session_id: &str) -> Result<PathBuf, QueryError> {
        let exact = self.capture_dir.join(session_id);
        if exact.is_file() {
            return Ok(exact);
        }

        SESSION_EXTENSIONS
            .iter()
            .map(|ext| self.capture_dir.join(format!("{}.{}", session_id, ext)))
            .find(|candidate| candidate.is_file())
            .ok_or(QueryError::SessionNotFound(exact))
    }

    /// Drop one session from the cache. Returns whether it was cached.
    pub fn evict(&self, session_id: &str) -> bool {
        lock(&self.sessions).remove(session_id).is_some()
    }

    pub fn clear(&self) {
        lock(&self.sessions).clear();
    }

    pub fn cached_sessions(&self) -> Vec<String> {
        let sessions = lock(&self.sessions);
        let mut ids: Vec<String> = sessions
            .iter()
            .filter(|(_, slot)| lock(slot).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of capture files read since the store was created.
    pub fn load_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

fn validate_session_id(session_id: &str) -> Result<(), QueryError> {
    if session_id.trim().is_empty() {
        return Err(QueryError::invalid("Missing session_id"));
    }

    let escapes = Path::new(session_id)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || session_id.contains('/') || session_id.contains('\\') {
        return Err(QueryError::invalid(format!(
            "Invalid session_id: {}",
            session_id
        )));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
