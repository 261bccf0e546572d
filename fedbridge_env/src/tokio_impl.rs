//! Production implementation of RtiAmbassador using a Tokio channel.

use crate::ambassador::RtiAmbassador;
use crate::error::EnvError;
use crate::rti::RtiRequest;
use crate::types::RequestId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A request tagged with its correlation id, as seen by the RTI client task.
pub type TaggedRequest = (RequestId, RtiRequest);

/// Ambassador that hands requests to an RTI client task.
///
/// The client task owns the real RTI connection and reports every result
/// back as `RtiCallback::RequestReturn` with the same `RequestId`.
/// `submit` never blocks, so it is safe to call from the dispatch thread.
pub struct ChannelRtiAmbassador {
    /// Sender to the RTI client task
    tx: mpsc::UnboundedSender<TaggedRequest>,

    /// Next request id
    next_id: AtomicU64,
}

impl ChannelRtiAmbassador {
    /// Creates an ambassador and the receiver the RTI client task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaggedRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ambassador = Self {
            tx,
            next_id: AtomicU64::new(1),
        };
        (ambassador, rx)
    }

    /// Creates an Arc-wrapped ambassador for sharing across threads.
    pub fn shared() -> (Arc<Self>, mpsc::UnboundedReceiver<TaggedRequest>) {
        let (ambassador, rx) = Self::new();
        (Arc::new(ambassador), rx)
    }

    /// Returns true once the RTI client task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RtiAmbassador for ChannelRtiAmbassador {
    fn submit(&self, request: RtiRequest) -> Result<RequestId, EnvError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = request.name();
        self.tx
            .send((id, request))
            .map_err(|_| EnvError::rti(format!("RTI link closed while sending {}", name)))?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_ambassador_assigns_increasing_ids() {
        let (ambassador, mut rx) = ChannelRtiAmbassador::new();

        let first = ambassador.submit(RtiRequest::EnableTimeConstrained).unwrap();
        let second = ambassador
            .submit(RtiRequest::TimeAdvanceRequest { time: 10.0 })
            .unwrap();
        assert!(second > first);

        let (id, request) = rx.recv().await.unwrap();
        assert_eq!(id, first);
        assert_eq!(request, RtiRequest::EnableTimeConstrained);

        let (id, request) = rx.recv().await.unwrap();
        assert_eq!(id, second);
        assert_eq!(request, RtiRequest::TimeAdvanceRequest { time: 10.0 });
    }

    #[tokio::test]
    async fn test_channel_ambassador_closed_link() {
        let (ambassador, rx) = ChannelRtiAmbassador::new();
        drop(rx);

        assert!(ambassador.is_closed());
        let result = ambassador.submit(RtiRequest::FederateSaveBegun);
        assert!(matches!(result, Err(EnvError::RtiError(_))));
    }
}
