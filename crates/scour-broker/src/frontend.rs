//! The frontend abstraction.
//!
//! The coordinator is generic over where client requests come from. The
//! TCP implementation lives in [`crate::tcp`]; the channel implementation
//! here serves tests and embedders.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use bytes::Bytes;
use scour_types::ConnId;

use crate::error::{BrokerError, BrokerResult};

/// Source of client requests and sink for their replies.
///
/// The coordinator calls [`Frontend::poll`] only while at least one
/// worker is idle — implementations must leave unpolled requests queued,
/// which is what bounds the number of in-flight tasks.
pub trait Frontend {
    /// Waits up to `timeout` for one request.
    fn poll(&mut self, timeout: Duration) -> BrokerResult<Option<(ConnId, String)>>;

    /// Delivers a reply to the named client.
    fn send(&mut self, conn: &ConnId, reply: &[u8]) -> BrokerResult<()>;
}

/// In-process frontend over channels.
#[derive(Debug)]
pub struct ChannelFrontend {
    requests: Receiver<(ConnId, String)>,
    replies: Sender<(ConnId, Bytes)>,
}

impl ChannelFrontend {
    /// Creates the frontend and the client-side handle.
    pub fn new() -> (Self, ChannelFrontendHandle) {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        (
            Self {
                requests: request_rx,
                replies: reply_tx,
            },
            ChannelFrontendHandle {
                requests: request_tx,
                replies: reply_rx,
            },
        )
    }
}

impl Frontend for ChannelFrontend {
    fn poll(&mut self, timeout: Duration) -> BrokerResult<Option<(ConnId, String)>> {
        match self.requests.recv_timeout(timeout) {
            Ok(request) => Ok(Some(request)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BrokerError::BackendClosed),
        }
    }

    fn send(&mut self, conn: &ConnId, reply: &[u8]) -> BrokerResult<()> {
        self.replies
            .send((conn.clone(), Bytes::copy_from_slice(reply)))
            .map_err(|_| BrokerError::BackendClosed)
    }
}

/// Client side of a [`ChannelFrontend`].
#[derive(Debug)]
pub struct ChannelFrontendHandle {
    requests: Sender<(ConnId, String)>,
    replies: Receiver<(ConnId, Bytes)>,
}

impl ChannelFrontendHandle {
    /// Submits a request line on behalf of `conn`.
    pub fn submit(&self, conn: ConnId, request: impl Into<String>) -> BrokerResult<()> {
        self.requests
            .send((conn, request.into()))
            .map_err(|_| BrokerError::BackendClosed)
    }

    /// Waits up to `timeout` for the next reply.
    pub fn recv_reply(&self, timeout: Duration) -> Option<(ConnId, Bytes)> {
        self.replies.recv_timeout(timeout).ok()
    }

    /// Takes a reply if one is already waiting.
    pub fn try_recv_reply(&self) -> Option<(ConnId, Bytes)> {
        match self.replies.try_recv() {
            Ok(reply) => Some(reply),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}
