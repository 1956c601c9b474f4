//! Out-of-band error signaling to a single connection.

use tracing::debug;

use huddle_core::frames::ServerFrame;
use huddle_core::ErrorKind;

use crate::connection::ClientConnection;

/// Push an error frame to a connection.
///
/// Error frames are tagged distinctly from message frames, so clients can
/// always tell them apart. Delivery failure (connection already gone, queue
/// full) is swallowed: a failed notification must never interfere with
/// connection teardown.
pub fn notify(conn: &ClientConnection, kind: ErrorKind, detail: impl Into<String>) {
    let detail = detail.into();
    debug!(conn_id = %conn.id, kind = kind.as_str(), detail, "error frame");
    let _ = conn.send(&ServerFrame::Error { kind, detail });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn notify_sends_error_frame() {
        let (tx, mut rx) = mpsc::channel(8);
        let conn = ClientConnection::new(tx);

        notify(&conn, ErrorKind::PayloadTooLarge, "4096 > 1024");

        let json: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "payload_too_large");
        assert_eq!(json["detail"], "4096 > 1024");
    }

    #[tokio::test]
    async fn notify_swallows_closed_connection() {
        let (tx, rx) = mpsc::channel(8);
        let conn = ClientConnection::new(tx);
        drop(rx);

        // Must not panic or error
        notify(&conn, ErrorKind::PersistenceFailed, "store down");
    }

    #[tokio::test]
    async fn notify_swallows_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(tx);
        assert!(conn.send_raw("filler".into()));

        notify(&conn, ErrorKind::DeliveryFailed, "queue full");
        assert_eq!(conn.drop_count(), 1);
    }
}
