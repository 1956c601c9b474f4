//! Live connection state shared between the session task and the registry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use huddle_core::frames::ServerFrame;
use huddle_core::{ConnectionId, Identity};

/// One live transport channel, owned by exactly one session.
///
/// Unauthenticated connections carry no identity; the identity slot is filled
/// once by the session after a successful handshake and never changes again.
pub struct ClientConnection {
    /// Unique connection ID, assigned at accept time.
    pub id: ConnectionId,
    /// Bound identity (set once after authentication).
    identity: Mutex<Option<Identity>>,
    /// Send channel to the connection's socket writer task.
    tx: mpsc::Sender<String>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Set on teardown; frames queued after this are dropped, not delivered.
    closed: AtomicBool,
    /// Count of frames dropped due to a full or closed queue.
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            identity: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            closed: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Bind this connection to its authenticated identity.
    ///
    /// Returns `false` (and leaves the binding untouched) if an identity was
    /// already bound; a connection belongs to at most one identity.
    pub fn bind_identity(&self, identity: Identity) -> bool {
        let mut slot = self.identity.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(identity);
        true
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    /// Queue a raw text frame for the writer task.
    ///
    /// Returns `false` if the connection is closed or its queue is full or
    /// gone; the frame is dropped and counted, never blocked on.
    pub fn send_raw(&self, frame: String) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a server frame and queue it.
    pub fn send(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send_raw(json),
            Err(_) => false,
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Mark the connection closed. In-flight sends after this fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat loop.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
