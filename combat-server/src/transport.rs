//! Message transport between clients and the authority
//!
//! ```text
//! ChannelClient ──bincode CombatRequest──► ChannelServer ──► CombatAuthority
//!       ▲                                       │
//!       └──────────bincode ServerMessage────────┘ (one channel per client)
//! ```
//!
//! The in-process implementation runs over tokio unbounded mpsc channels, so
//! a host can run the authority and its own observer in one process while
//! exercising the same encode/decode path a remote link would.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::protocol::{decode, encode, CombatRequest, ServerMessage, WireError};

/// Authority side of a link.
pub trait ServerTransport {
    /// Next pending request. `Ok(None)` when nothing is queued.
    fn recv_request(&mut self) -> Result<Option<CombatRequest>, WireError>;
    /// Send to every connected client. Returns how many received it.
    fn broadcast(&mut self, message: &ServerMessage) -> Result<usize, WireError>;
}

/// Client side of a link.
pub trait ClientTransport {
    fn send_request(&mut self, request: &CombatRequest) -> Result<(), WireError>;
    /// Next pending message. `Ok(None)` when nothing is queued.
    fn recv_message(&mut self) -> Result<Option<ServerMessage>, WireError>;
}

type Frame = Vec<u8>;

pub struct ChannelServer {
    requests_tx: mpsc::UnboundedSender<Frame>,
    requests_rx: mpsc::UnboundedReceiver<Frame>,
    clients: Vec<mpsc::UnboundedSender<Frame>>,
}

impl ChannelServer {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            requests_tx,
            requests_rx,
            clients: Vec::new(),
        }
    }

    /// Open a new client link.
    pub fn connect(&mut self) -> ChannelClient {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        self.clients.push(messages_tx);
        ChannelClient {
            requests_tx: self.requests_tx.clone(),
            messages_rx,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ChannelServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerTransport for ChannelServer {
    fn recv_request(&mut self) -> Result<Option<CombatRequest>, WireError> {
        match self.requests_rx.try_recv() {
            Ok(frame) => decode(&frame).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WireError::ChannelClosed),
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) -> Result<usize, WireError> {
        let frame = encode(message)?;
        let before = self.clients.len();
        // Dropped clients are forgotten on first failed send
        self.clients.retain(|client| client.send(frame.clone()).is_ok());
        if self.clients.len() < before {
            tracing::debug!("{} client link(s) closed", before - self.clients.len());
        }
        Ok(self.clients.len())
    }
}

pub struct ChannelClient {
    requests_tx: mpsc::UnboundedSender<Frame>,
    messages_rx: mpsc::UnboundedReceiver<Frame>,
}

impl ChannelClient {
    /// Push an already-encoded frame (relays, fuzzing).
    pub fn send_raw(&self, frame: Vec<u8>) -> Result<(), WireError> {
        self.requests_tx
            .send(frame)
            .map_err(|_| WireError::ChannelClosed)
    }
}

impl ClientTransport for ChannelClient {
    fn send_request(&mut self, request: &CombatRequest) -> Result<(), WireError> {
        self.send_raw(encode(request)?)
    }

    fn recv_message(&mut self) -> Result<Option<ServerMessage>, WireError> {
        match self.messages_rx.try_recv() {
            Ok(frame) => decode(&frame).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WireError::ChannelClosed),
        }
    }
}
