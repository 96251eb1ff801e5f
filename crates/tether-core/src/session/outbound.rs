//! The single outbound slot shared by the connection and every handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Result, TetherError};

struct Attached {
    connection: u64,
    tx: UnboundedSender<String>,
}

/// Mutex-guarded sender for the attached connection, if any.
///
/// Frames only go into an unbounded queue while the lock is held; the
/// connection's writer task does the network I/O.
pub(crate) struct Outbound {
    slot: Mutex<Option<Attached>>,
    next_connection: AtomicU64,
}

impl Outbound {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Attach a connection's queue. Fails while another live connection is
    /// attached. Returns the connection number to pass to [`detach`](Self::detach).
    pub(crate) fn attach(&self, tx: UnboundedSender<String>) -> Result<u64> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slot.as_ref() {
            if !current.tx.is_closed() {
                return Err(TetherError::AlreadyConnected);
            }
        }
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Attached { connection, tx });
        Ok(connection)
    }

    /// Detach `connection` if it is still the attached one.
    pub(crate) fn detach(&self, connection: u64) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(current) if current.connection == connection => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Detach whatever is attached.
    pub(crate) fn detach_any(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take().is_some()
    }

    pub(crate) fn is_connected(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|current| !current.tx.is_closed())
    }

    pub(crate) fn send(&self, frame: String) -> Result<()> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let current = slot.as_ref().ok_or(TetherError::NotConnected)?;
        current.tx.send(frame).map_err(|_| TetherError::Transport {
            message: "connection writer has stopped".to_string(),
        })
    }
}
