//! Message-framed channel abstraction
//!
//! A `Channel` is one full-duplex session between this server and one remote
//! client. Frames are whole messages: the transport layer below delivers and
//! accepts complete `Bytes` frames, and every write is atomic at the frame
//! level. The inbound half is owned by exactly one reader (the dispatcher
//! loop), so at most one read is outstanding at a time; `ChannelWriter` is
//! cheap to clone and any number of threads may write concurrently.

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use tarpon_common::TarponError;

/// Writing half of a channel. Clonable; each `send` is one framed message.
#[derive(Clone)]
pub struct ChannelWriter {
    id: String,
    outbound: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
}

impl ChannelWriter {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue one outbound frame. Fails once the channel is closed.
    pub async fn send(&self, frame: Bytes) -> Result<(), TarponError> {
        if *self.closed.borrow() {
            return Err(TarponError::ChannelClosed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TarponError::ChannelClosed)
    }

    /// Close the channel. Idempotent; returns true only for the call that
    /// actually performed the close.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.send_replace(true);
        if !was_closed {
            trace!(channel = %self.id, "channel closed");
        }
        !was_closed
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Observe the closed flag; used by the transport to stop pumping bytes.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// A channel as seen by its single reader.
pub struct Channel {
    writer: ChannelWriter,
    inbound: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
}

impl Channel {
    /// Create a channel and its transport-facing half.
    ///
    /// The transport half is handed to whatever moves bytes (a TCP pump, or a
    /// test harness injecting frames directly).
    pub fn pair(id: impl Into<String>, capacity: usize) -> (Channel, ChannelTransport) {
        let id = id.into();
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = watch::channel(false);

        let writer = ChannelWriter {
            id: id.clone(),
            outbound: outbound_tx,
            closed: closed_tx,
        };
        let channel = Channel {
            writer: writer.clone(),
            inbound: inbound_rx,
            closed: closed_rx.clone(),
        };
        let transport = ChannelTransport {
            inbound: inbound_tx,
            outbound: outbound_rx,
            closed: closed_rx,
        };
        (channel, transport)
    }

    pub fn id(&self) -> &str {
        self.writer.id()
    }

    /// A clonable writing handle for this channel.
    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Receive the next inbound frame.
    ///
    /// Returns `None` on end-of-stream (transport gone) or once the channel
    /// has been closed from any path.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if *self.closed.borrow() {
            return None;
        }
        tokio::select! {
            frame = self.inbound.recv() => frame,
            _ = self.closed.changed() => None,
        }
    }
}

/// Transport-facing half of a channel.
pub struct ChannelTransport {
    inbound: mpsc::Sender<Bytes>,
    outbound: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
}

impl ChannelTransport {
    /// Deliver one inbound frame to the channel's reader.
    ///
    /// Returns false once the channel is closed or its reader is gone.
    pub async fn deliver(&self, frame: Bytes) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        self.inbound.send(frame).await.is_ok()
    }

    /// Next frame queued for the remote peer, or `None` once closed.
    pub async fn next_outbound(&mut self) -> Option<Bytes> {
        if *self.closed.borrow() {
            return None;
        }
        tokio::select! {
            frame = self.outbound.recv() => frame,
            _ = self.closed.changed() => None,
        }
    }

    /// Non-blocking variant of [`next_outbound`](Self::next_outbound).
    pub fn try_next_outbound(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }

    /// Split into independent inbound/outbound halves for a two-task pump.
    pub fn into_split(self) -> (TransportInbound, TransportOutbound) {
        (
            TransportInbound {
                inbound: self.inbound,
                closed: self.closed.clone(),
            },
            TransportOutbound {
                outbound: self.outbound,
                closed: self.closed,
            },
        )
    }
}

/// Inbound half of a split transport: socket bytes flow into the channel.
pub struct TransportInbound {
    inbound: mpsc::Sender<Bytes>,
    closed: watch::Receiver<bool>,
}

impl TransportInbound {
    pub async fn deliver(&self, frame: Bytes) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        self.inbound.send(frame).await.is_ok()
    }

    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }
}

/// Outbound half of a split transport: channel frames flow to the socket.
pub struct TransportOutbound {
    outbound: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
}

impl TransportOutbound {
    pub async fn next(&mut self) -> Option<Bytes> {
        if *self.closed.borrow() {
            return None;
        }
        tokio::select! {
            frame = self.outbound.recv() => frame,
            _ = self.closed.changed() => None,
        }
    }
}
