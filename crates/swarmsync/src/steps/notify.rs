use std::sync::Arc;

use swarmsync_data::{Message, MessageManager, PeerId, SendOutcome};
use swarmsync_process::{ProcessExecutionError, ProcessStep, StepContext};

/// Sends one message to each peer, resending while peers ask for it.
///
/// A peer that rejects the message, or still asks for a resend after the
/// limit, fails the step. Sent notifications cannot be recalled, so there is
/// nothing to roll back.
pub struct NotifyPeersStep {
    messages:     Arc<dyn MessageManager>,
    peers:        Vec<PeerId>,
    message:      Message,
    resend_limit: u32,
}

impl NotifyPeersStep {
    pub fn new(messages: Arc<dyn MessageManager>, peers: Vec<PeerId>, message: Message, resend_limit: u32) -> Self {
        Self {
            messages,
            peers,
            message,
            resend_limit,
        }
    }

    fn notify(&self, peer: &PeerId) -> Result<(), ProcessExecutionError> {
        for attempt in 0..=self.resend_limit {
            match self.messages.send(peer, &self.message).wait() {
                SendOutcome::Success => {
                    tracing::debug!(%peer, attempt, kind = %self.message.kind, "peer notified");
                    return Ok(());
                }
                SendOutcome::Resend => {
                    tracing::debug!(%peer, attempt, "peer asked for resend");
                }
                SendOutcome::Failure(reason) => {
                    return Err(ProcessExecutionError::new(format!("peer {peer} rejected notification: {reason}")));
                }
            }
        }
        Err(ProcessExecutionError::new(format!(
            "peer {peer} did not accept notification after {} attempts",
            self.resend_limit + 1
        )))
    }
}

impl ProcessStep for NotifyPeersStep {
    fn execute(&self, ctx: &StepContext<'_>) -> Result<(), ProcessExecutionError> {
        for (done, peer) in self.peers.iter().enumerate() {
            ctx.checkpoint();
            self.notify(peer)?;
            ctx.set_progress((done + 1) as f64 / self.peers.len() as f64);
        }
        Ok(())
    }
}
