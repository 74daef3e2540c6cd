//! Session registry with load-balanced dialer selection

use dashmap::DashMap;
use rand::Rng;
use revdial_transport::TunnelSession;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

use crate::dialer::Dialer;

/// Application close code used when the registry tears sessions down.
pub const SHUTDOWN_CODE: u32 = 0;

const SHUTDOWN_REASON: &str = "server shutdown";

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no session registered for client {0:?}")]
    NoSession(String),
}

/// Concurrent map of client keys to their live sessions.
///
/// Lookups go through the sharded map without a global lock; each bucket
/// guards its session list with its own mutex. Buckets are created
/// lazily on the first `add` and removed when the last session leaves, so
/// the key set is exactly the set of non-empty buckets.
#[derive(Debug)]
pub struct SessionRegistry<S: TunnelSession> {
    clients: DashMap<String, Arc<SessionBucket<S>>>,
}

#[derive(Debug)]
struct SessionBucket<S> {
    sessions: Mutex<Vec<Arc<S>>>,
}

impl<S: TunnelSession> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Appends a session to the client's bucket, creating it on first use.
    pub fn add(&self, client_key: &str, session: Arc<S>) {
        let entry = self
            .clients
            .entry(client_key.to_string())
            .or_insert_with(|| {
                Arc::new(SessionBucket {
                    sessions: Mutex::new(Vec::new()),
                })
            });
        entry.value().sessions.lock().unwrap().push(session);
        debug!(client_key, "session registered");
    }

    /// Removes exactly the matching session, by identity. Other sessions
    /// sharing the bucket keep running. A session not present is a no-op.
    /// The key disappears once its bucket empties.
    pub fn remove(&self, client_key: &str, session: &Arc<S>) {
        let Some(bucket) = self
            .clients
            .get(client_key)
            .map(|entry| entry.value().clone())
        else {
            return;
        };

        let emptied = {
            let mut sessions = bucket.sessions.lock().unwrap();
            sessions.retain(|candidate| !Arc::ptr_eq(candidate, session));
            sessions.is_empty()
        };

        if emptied {
            // Re-checked under the map shard so a concurrent add wins.
            self.clients
                .remove_if(client_key, |_, bucket| {
                    bucket.sessions.lock().unwrap().is_empty()
                });
        }

        debug!(client_key, "session removed");
    }

    /// A dialer bound to a uniformly random live session of this client.
    pub fn get_dialer(&self, client_key: &str) -> Result<Dialer<S>, RegistryError> {
        let bucket = self
            .clients
            .get(client_key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NoSession(client_key.to_string()))?;

        let sessions = bucket.sessions.lock().unwrap();
        if sessions.is_empty() {
            return Err(RegistryError::NoSession(client_key.to_string()));
        }

        let picked = rand::thread_rng().gen_range(0..sessions.len());
        Ok(Dialer::new(sessions[picked].clone()))
    }

    /// Closes every session with the shutdown code and clears the map.
    pub fn remove_all(&self) {
        for entry in self.clients.iter() {
            let sessions = entry.value().sessions.lock().unwrap();
            for session in sessions.iter() {
                session.close(SHUTDOWN_CODE, SHUTDOWN_REASON);
            }
        }
        self.clients.clear();
        info!("all sessions closed");
    }

    /// Number of client keys with at least one live session.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl<S: TunnelSession> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
