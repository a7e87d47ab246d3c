//! Message header codes and frame helpers
//!
//! Every message on a channel is one frame: a single header byte selecting the
//! message kind, followed by an opaque payload owned by that kind's handler.
//! Inbound header values are fixed by the protocol; all other values are
//! reserved and treated as unsupported.

use bytes::{BufMut, Bytes, BytesMut};

// Inbound headers (client -> server)
pub const HEADER_SESSION_OPEN_REQUEST: u8 = 0x01;
pub const HEADER_INVOCATION_REQUEST: u8 = 0x03;
pub const HEADER_TX_COMMIT_REQUEST: u8 = 0x0F;
pub const HEADER_TX_ROLLBACK_REQUEST: u8 = 0x10;
pub const HEADER_TX_PREPARE_REQUEST: u8 = 0x11;
pub const HEADER_TX_FORGET_REQUEST: u8 = 0x12;
pub const HEADER_TX_BEFORE_COMPLETION_REQUEST: u8 = 0x13;

// Outbound headers (server -> client)
pub const HEADER_MODULE_AVAILABLE: u8 = 0x08;
pub const HEADER_MODULE_UNAVAILABLE: u8 = 0x09;
pub const HEADER_TX_RESPONSE: u8 = 0x14;
pub const HEADER_CLUSTER_TOPOLOGY_COMPLETE: u8 = 0x15;
pub const HEADER_CLUSTER_FORMED: u8 = 0x16;
pub const HEADER_CLUSTER_REMOVED: u8 = 0x17;
pub const HEADER_CLUSTER_NODES_ADDED: u8 = 0x18;
pub const HEADER_CLUSTER_NODES_REMOVED: u8 = 0x19;

/// Build one outbound frame from a header byte and an encoded payload.
pub fn frame(header: u8, payload: Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(header);
    buf.extend_from_slice(&payload);
    buf.freeze()
}

/// Split an inbound frame into its header byte and payload.
///
/// Returns `None` for an empty frame, which carries no header and is dropped
/// by the dispatcher.
pub fn split_frame(frame: &Bytes) -> Option<(u8, Bytes)> {
    if frame.is_empty() {
        return None;
    }
    Some((frame[0], frame.slice(1..)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let framed = frame(HEADER_TX_PREPARE_REQUEST, Bytes::from_static(b"{}"));
        assert_eq!(framed[0], 0x11);
        assert_eq!(&framed[1..], b"{}");
    }

    #[test]
    fn test_split_frame() {
        let framed = frame(HEADER_INVOCATION_REQUEST, Bytes::from_static(b"abc"));
        let (header, payload) = split_frame(&framed).expect("non-empty frame");
        assert_eq!(header, HEADER_INVOCATION_REQUEST);
        assert_eq!(&payload[..], b"abc");
    }

    #[test]
    fn test_split_empty_frame() {
        assert!(split_frame(&Bytes::new()).is_none());
    }

    #[test]
    fn test_header_only_frame_has_empty_payload() {
        let framed = frame(HEADER_TX_FORGET_REQUEST, Bytes::new());
        let (header, payload) = split_frame(&framed).expect("header byte present");
        assert_eq!(header, HEADER_TX_FORGET_REQUEST);
        assert!(payload.is_empty());
    }
}
