//! Identity lookups that wait for a client
//!
//! Lookups issued while the organization is still connecting are held until
//! a client is published on the watch channel. The wait wakes on every
//! client change and also re-checks after `retry_delay`.

use std::sync::Arc;
use std::time::Duration;

use daoshell_connector_core::{ConnectorError, OrgClient};
use daoshell_protocol::AddressIdentity;
use tokio::sync::watch;
use tracing::debug;

pub type ClientSlot = watch::Receiver<Option<Arc<dyn OrgClient>>>;

#[derive(Clone)]
pub struct IdentityResolver {
    client_rx: ClientSlot,
    retry_delay: Duration,
}

impl IdentityResolver {
    pub fn new(client_rx: ClientSlot, retry_delay: Duration) -> Self {
        Self {
            client_rx,
            retry_delay,
        }
    }

    /// Client currently adopted by the orchestrator, if any
    pub fn current(&self) -> Option<Arc<dyn OrgClient>> {
        self.client_rx.borrow().clone()
    }

    /// Resolve the identity of `address`, waiting for a client if needed.
    pub async fn resolve(&self, address: &str) -> Result<Option<AddressIdentity>, ConnectorError> {
        let mut client_rx = self.client_rx.clone();
        let mut attempts: u64 = 0;

        loop {
            let client = client_rx.borrow_and_update().clone();
            if let Some(client) = client {
                return client.resolve_address_identity(address).await;
            }

            attempts += 1;
            debug!(
                component = "identity",
                event = "identity.resolve_waiting",
                address = %address,
                attempts,
                "No client yet, waiting before retrying"
            );

            tokio::select! {
                changed = client_rx.changed() => {
                    if changed.is_err() {
                        return Err(ConnectorError::ChannelClosed);
                    }
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }
}
