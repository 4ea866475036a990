//! The engine owns the single in-memory document and its locking tiers.
//!
//! Mutation discipline: the caller's closure runs against a working copy of
//! the document while the global lock is held; the copy is persisted and
//! only then installed as the live document. A failed persist therefore
//! rolls the operation back by construction, and readers never observe a
//! half-applied mutation.

use std::sync::Arc;

use tokio::sync::Mutex;

use common::clock::Clock;
use store::{Document, DocumentStore};

use crate::error::{EngineError, EngineResult};
use crate::locks::LockRegistry;

pub struct Engine {
    clock: Clock,
    store: Arc<dyn DocumentStore>,
    /// The global state lock.
    doc: Mutex<Document>,
    pub(crate) locks: LockRegistry,
}

impl Engine {
    pub fn new(doc: Document, store: Arc<dyn DocumentStore>, clock: Clock) -> Self {
        Self {
            clock,
            store,
            doc: Mutex::new(doc),
            locks: LockRegistry::new(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Run a read-only closure against a consistent snapshot of the
    /// document. The global lock is held only for the duration of the
    /// closure; do not serialize or block inside it.
    pub async fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> T {
        let guard = self.doc.lock().await;
        f(&guard)
    }

    /// Read-modify-write under the global lock, with persist-then-publish.
    pub(crate) async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Document, &Clock) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.mutate_if(|doc, clock| f(doc, clock).map(Some))
            .await
            .map(|out| out.expect("mutate closure returned Some"))
    }

    /// Like [`Engine::mutate`], but the closure may decide nothing needs to
    /// change (`Ok(None)`), in which case the working copy is discarded and
    /// no write is issued.
    pub(crate) async fn mutate_if<T>(
        &self,
        f: impl FnOnce(&mut Document, &Clock) -> EngineResult<Option<T>>,
    ) -> EngineResult<Option<T>> {
        let mut guard = self.doc.lock().await;
        let mut working = guard.clone();

        let Some(out) = f(&mut working, &self.clock)? else {
            return Ok(None);
        };

        self.store
            .save(&working)
            .await
            .map_err(EngineError::Store)?;
        *guard = working;
        Ok(Some(out))
    }
}
