use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Address of a peer, usually its user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind:    String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind:    kind.into(),
            payload: payload.into(),
        }
    }
}

/// Result of a direct send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    /// Transient: the peer may accept the message if sent again.
    Resend,
    Failure(String),
}

/// Pending completion of a send.
#[derive(Debug)]
pub struct SendHandle {
    rx: oneshot::Receiver<SendOutcome>,
}

/// Completes the matching [`SendHandle`].
#[derive(Debug)]
pub struct SendCompleter {
    tx: oneshot::Sender<SendOutcome>,
}

impl SendCompleter {
    pub fn complete(self, outcome: SendOutcome) {
        // The waiting side may have given up.
        let _ = self.tx.send(outcome);
    }
}

impl SendHandle {
    pub fn pending() -> (SendCompleter, SendHandle) {
        let (tx, rx) = oneshot::channel();
        (SendCompleter { tx }, SendHandle { rx })
    }

    pub fn ready(outcome: SendOutcome) -> Self {
        let (completer, handle) = Self::pending();
        completer.complete(outcome);
        handle
    }

    /// Blocks until the send completes. A dropped completer counts as failure.
    ///
    /// Must not be called from async code.
    pub fn wait(self) -> SendOutcome {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| SendOutcome::Failure("send abandoned".into()))
    }
}

/// Direct peer messaging.
pub trait MessageManager: Send + Sync {
    fn send(&self, peer: &PeerId, message: &Message) -> SendHandle;
}
