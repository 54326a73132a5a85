//! Default provider reachability
//!
//! Polls the default provider with a JSON-RPC `net_listening` call and
//! reports the result to the orchestrator whenever it changes.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::orchestrator::OrchestratorHandle;

pub trait ConnectivityProbe: Send + Sync + 'static {
    /// True when the provider answered and reports it is listening.
    fn probe(&self) -> BoxFuture<'_, bool>;
}

/// Probe backed by an HTTP JSON-RPC endpoint
pub struct RpcProbe {
    client: reqwest::Client,
    url: String,
}

impl RpcProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn net_listening(&self) -> Result<bool, reqwest::Error> {
        let reply: Value = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "net_listening",
                "params": [],
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(interpret_rpc_reply(&reply))
    }
}

impl ConnectivityProbe for RpcProbe {
    fn probe(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.net_listening().await {
                Ok(listening) => listening,
                Err(e) => {
                    debug!(
                        component = "connectivity",
                        event = "connectivity.probe_failed",
                        url = %self.url,
                        error = %e,
                    );
                    false
                }
            }
        })
    }
}

/// `{"result": true}` means listening; errors and anything else do not.
pub fn interpret_rpc_reply(reply: &Value) -> bool {
    reply.get("error").is_none() && reply.get("result").and_then(Value::as_bool) == Some(true)
}

/// Value to report after a probe, if it differs from the last one reported.
fn report_change(last: &mut Option<bool>, connected: bool) -> Option<bool> {
    if *last == Some(connected) {
        return None;
    }
    *last = Some(connected);
    Some(connected)
}

/// Poll until the orchestrator goes away.
pub async fn poll_connectivity<P: ConnectivityProbe>(
    probe: P,
    interval: Duration,
    handle: OrchestratorHandle,
) {
    let mut last = None;
    loop {
        let connected = probe.probe().await;
        if let Some(connected) = report_change(&mut last, connected) {
            info!(
                component = "connectivity",
                event = "connectivity.changed",
                connected,
            );
            if handle.set_connected(connected).await.is_err() {
                break;
            }
        }
        tokio::time::sleep(interval).await;
    }
}
