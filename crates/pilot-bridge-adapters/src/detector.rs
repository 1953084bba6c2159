use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;

use pilot_bridge_core::{
    sniff, ChainId, DetectionResult, ErrorTracker, Message, NetworkTrackingState, ProbeOutcome,
    RequestBody, TabId, TabMessenger,
};

/// Works out which chain the JSON-RPC endpoints used by pages belong to.
///
/// Active detection asks the tab's content script to probe the endpoint, passive detection
/// reads the chain id some dApps put into their request bodies. Both write into the same
/// tracking state and the first confirmed chain for a URL wins.
pub struct NetworkDetector {
    state: Arc<Mutex<NetworkTrackingState>>,
    tabs: Arc<dyn TabMessenger>,
    tracker: Arc<dyn ErrorTracker>,
    probe_timeout: Duration,
}

impl NetworkDetector {
    pub fn new(
        state: Arc<Mutex<NetworkTrackingState>>,
        tabs: Arc<dyn TabMessenger>,
        tracker: Arc<dyn ErrorTracker>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            state,
            tabs,
            tracker,
            probe_timeout,
        }
    }

    pub fn state(&self) -> &Arc<Mutex<NetworkTrackingState>> {
        &self.state
    }

    pub async fn detect_network_of_rpc_url(&self, url: &str, tab_id: TabId) -> DetectionResult {
        let (probe_id, probe) = {
            let mut state = self.lock();
            if state.is_confirmed(url) {
                return DetectionResult::KNOWN;
            }
            state.probe_or_start(url, || {
                tracing::debug!(url, %tab_id, "starting chain probe");
                probe_via_tab(
                    Arc::clone(&self.tabs),
                    tab_id,
                    url.to_owned(),
                    self.probe_timeout,
                )
                .boxed()
            })
        };

        match probe.await {
            Ok(Some(chain_id)) => {
                let mut state = self.lock();
                if !state.confirm(url, chain_id) {
                    return DetectionResult::KNOWN;
                }
                state.track_rpc_url(tab_id, url);
                tracing::info!(url, %tab_id, %chain_id, "detected new rpc endpoint");
                DetectionResult::NEW
            }
            Ok(None) => {
                self.tracker
                    .capture_message(&format!("could not determine chain of {url}"));
                if self.lock().evict_probe(url, probe_id) {
                    tracing::debug!(url, "evicted inconclusive chain probe");
                }
                DetectionResult::KNOWN
            }
            Err(reason) => {
                tracing::warn!(url, %tab_id, reason = %reason, "chain probe failed");
                self.tracker.capture_message(&reason);
                if self.lock().evict_probe(url, probe_id) {
                    tracing::debug!(url, "evicted failed chain probe");
                }
                DetectionResult::KNOWN
            }
        }
    }

    pub fn parse_network_from_request_body(
        &self,
        request_body: &RequestBody,
        url: &str,
        tab_id: TabId,
    ) -> DetectionResult {
        let result =
            sniff::parse_network_from_request_body(&mut self.lock(), request_body, url, tab_id);
        if result.new_endpoint {
            tracing::info!(url, %tab_id, "detected rpc endpoint from request body");
        }
        result
    }

    pub fn chain_id_of(&self, url: &str) -> Option<ChainId> {
        self.lock().chain_id_of(url)
    }

    pub fn track_tab(&self, tab_id: TabId) -> bool {
        self.lock().track_tab(tab_id)
    }

    pub fn untrack_tab(&self, tab_id: TabId) -> bool {
        self.lock().untrack_tab(tab_id)
    }

    pub fn is_tracked(&self, tab_id: TabId) -> bool {
        self.lock().is_tracked(tab_id)
    }

    pub fn rpc_urls_for_tab(&self, tab_id: TabId) -> Vec<String> {
        self.lock().rpc_urls_for_tab(tab_id)
    }

    fn lock(&self) -> MutexGuard<'_, NetworkTrackingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn probe_via_tab(
    tabs: Arc<dyn TabMessenger>,
    tab_id: TabId,
    url: String,
    timeout: Duration,
) -> ProbeOutcome {
    let request = tabs.send_to_tab(tab_id, Message::ProbeChainId { url: url.clone() });
    match tokio::time::timeout(timeout, request).await {
        Err(_) => Err(format!(
            "chain probe for {url} timed out after {}ms",
            timeout.as_millis()
        )),
        Ok(Err(e)) => Err(format!("chain probe for {url} failed: {e}")),
        Ok(Ok(Some(Message::ProbeChainIdResponse { chain_id }))) => Ok(chain_id),
        Ok(Ok(Some(other))) => Err(format!(
            "chain probe for {url} got an unexpected reply: {other:?}"
        )),
        Ok(Ok(None)) => Err(format!("chain probe for {url} got no reply")),
    }
}
