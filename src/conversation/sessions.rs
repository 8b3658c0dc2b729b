//! In-process session store keyed by thread id
//!
//! Each thread lives behind its own async mutex. An exchange holds the owned
//! guard from the moment it appends the user message until the assistant turn
//! is written back, so two exchanges on one thread never interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use super::Conversation;

/// Exclusive handle on one thread for the duration of an exchange.
pub type SessionGuard = OwnedMutexGuard<Conversation>;

/// Errors from acquiring a thread
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Thread {thread_id} is busy with another exchange (waited {waited:?})")]
    Busy { thread_id: String, waited: Duration },

    #[error("Thread {thread_id} has an exchange in progress")]
    InUse { thread_id: String },
}

#[derive(Debug, Default)]
pub struct SessionStore {
    threads: Mutex<HashMap<String, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an existing thread without creating it
    pub async fn get(&self, thread_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.threads.lock().await.get(thread_id).cloned()
    }

    /// Create a thread, or return the existing one if the id is already known
    pub async fn create(&self, thread_id: &str) -> Arc<Mutex<Conversation>> {
        self.threads
            .lock()
            .await
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(thread_id))))
            .clone()
    }

    /// Take exclusive access to a thread, creating it on first reference.
    ///
    /// Waits up to `wait` for a running exchange on the same thread to finish.
    pub async fn acquire(
        &self,
        thread_id: &str,
        wait: Duration,
    ) -> Result<SessionGuard, SessionError> {
        let deadline = Instant::now() + wait;

        loop {
            let thread = self.create(thread_id).await;
            let guard = tokio::time::timeout_at(deadline, thread.clone().lock_owned())
                .await
                .map_err(|_| SessionError::Busy {
                    thread_id: thread_id.to_string(),
                    waited: wait,
                })?;

            // Evicted between lookup and lock: start over on the current entry
            if self.is_current(thread_id, &thread).await {
                return Ok(guard);
            }
        }
    }

    async fn is_current(&self, thread_id: &str, thread: &Arc<Mutex<Conversation>>) -> bool {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .is_some_and(|current| Arc::ptr_eq(current, thread))
    }

    /// Drop an idle thread from memory. Returns whether it existed.
    ///
    /// A thread held by a running exchange is left in place.
    pub async fn evict(&self, thread_id: &str) -> Result<bool, SessionError> {
        let mut threads = self.threads.lock().await;
        let Some(thread) = threads.get(thread_id) else {
            return Ok(false);
        };
        if thread.try_lock().is_err() {
            return Err(SessionError::InUse {
                thread_id: thread_id.to_string(),
            });
        }
        threads.remove(thread_id);
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.threads.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[tokio::test]
    async fn test_create_on_first_reference() {
        let store = SessionStore::new();
        assert!(store.get("t1").await.is_none());

        let mut guard = store.acquire("t1", Duration::from_secs(1)).await.unwrap();
        guard.append(Message::user("hello"));
        drop(guard);

        let thread = store.get("t1").await.unwrap();
        let conversation = thread.lock().await;
        assert_eq!(conversation.id(), "t1");
        assert_eq!(conversation.history().len(), 1);
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = SessionStore::new();
        let a = store.create("same").await;
        let b = store.create("same").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_busy_thread_times_out() {
        let store = SessionStore::new();
        let _held = store.acquire("t1", Duration::from_secs(1)).await.unwrap();

        let second = store.acquire("t1", Duration::from_millis(20)).await;
        assert!(matches!(second, Err(SessionError::Busy { .. })));

        // Other threads are unaffected
        assert!(store.acquire("t2", Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_exchange_sees_first_append() {
        let store = Arc::new(SessionStore::new());
        let mut first = store.acquire("t1", Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let guard = store.acquire("t1", Duration::from_secs(5)).await.unwrap();
                guard.history().len()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        first.add_user("question");
        first.add_assistant("answer");
        drop(first);

        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_evict() {
        let store = SessionStore::new();
        store.create("gone").await;
        assert!(store.evict("gone").await.unwrap());
        assert!(!store.evict("gone").await.unwrap());
        assert!(store.get("gone").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_refused_while_held() {
        let store = SessionStore::new();
        let mut held = store.acquire("t", Duration::from_secs(1)).await.unwrap();
        held.add_user("question");

        let err = store.evict("t").await.unwrap_err();
        assert!(matches!(err, SessionError::InUse { .. }));

        // The thread is still serialized behind the running exchange
        let second = store.acquire("t", Duration::from_millis(20)).await;
        assert!(matches!(second, Err(SessionError::Busy { .. })));

        drop(held);
        let guard = store.acquire("t", Duration::from_secs(1)).await.unwrap();
        assert_eq!(guard.history().len(), 1);
    }
}
