//! Connection registry for targeted and broadcast sends.

use micro_wire::connection::{ConnWriter, MaybeTlsStream};
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

type Writer = ConnWriter<MaybeTlsStream>;

/// Live connections of a server keyed by connection id.
///
/// The lock is only held while the map is touched, never across a send.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<u64, Writer>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: u64, writer: Writer) {
        self.lock().insert(id, writer);
        trace!(id, "client registered");
    }

    /// Removes `id` only while it still maps to `writer`, so a late unregister of a reused
    /// id cannot evict its new owner. Returns whether an entry was removed.
    pub fn unregister(&self, id: u64, writer: &Writer) -> bool {
        let mut clients = self.lock();
        if clients.get(&id).is_some_and(|current| current.ptr_eq(writer)) {
            clients.remove(&id);
            trace!(id, "client unregistered");
            return true;
        }
        false
    }

    /// Sends `data` to one client. Returns `false` if the id is unknown or the send failed.
    pub async fn send_data(&self, id: u64, data: &[u8]) -> bool {
        let Some(writer) = self.lock().get(&id).cloned() else {
            return false;
        };

        match writer.send(data).await {
            Ok(()) => true,
            Err(e) => {
                debug!(id, cause = %e, "send to client failed");
                false
            }
        }
    }

    /// Sends `data` to every client and returns how many received it. Failures are skipped.
    pub async fn broadcast_data(&self, data: &[u8]) -> usize {
        let writers: Vec<Writer> = {
            let clients = self.lock();
            let mut unique: Vec<Writer> = Vec::with_capacity(clients.len());
            for writer in clients.values() {
                if !unique.iter().any(|w| w.ptr_eq(writer)) {
                    unique.push(writer.clone());
                }
            }
            unique
        };

        let mut delivered = 0;
        for writer in writers {
            match writer.send(data).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(cause = %e, "broadcast to client failed"),
            }
        }
        delivered
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Writer>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for ClientRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry").field("clients", &self.len()).finish()
    }
}
