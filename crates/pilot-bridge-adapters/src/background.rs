use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pilot_bridge_core::{
    BridgeError, ErrorTracker, MessageHandler, NetworkTrackingState, TabId, WalletProvider,
};

use crate::bridge::ProviderBridge;
use crate::detector::NetworkDetector;
use crate::injected::InjectedProvider;
use crate::page::Page;
use crate::probe::ChainProbe;
use crate::relay::ContentScriptRelay;
use crate::runtime::{ExtensionRuntime, ListenerId};
use crate::BridgeConfig;

/// A browser tab with the content script and the injected provider in place.
#[derive(Clone)]
pub struct Tab {
    pub id: TabId,
    pub page: Page,
    pub provider: InjectedProvider,
    relay: Arc<ContentScriptRelay>,
}

impl Tab {
    pub fn relay(&self) -> &Arc<ContentScriptRelay> {
        &self.relay
    }
}

/// The extension's background context: owns the runtime bus, the provider bridge and the
/// network detector, and opens tabs wired to them.
pub struct Background {
    config: BridgeConfig,
    runtime: ExtensionRuntime,
    bridge: Arc<ProviderBridge>,
    detector: Arc<NetworkDetector>,
    probe: ChainProbe,
    bridge_listener: Mutex<Option<ListenerId>>,
    tabs: Mutex<HashMap<TabId, Tab>>,
}

impl Background {
    /// Builds the background context with the panel open.
    pub fn new(
        config: BridgeConfig,
        provider: Arc<dyn WalletProvider>,
        tracker: Arc<dyn ErrorTracker>,
    ) -> Result<Self, BridgeError> {
        let runtime = ExtensionRuntime::new();
        let bridge = Arc::new(ProviderBridge::new(Arc::new(runtime.clone()), provider));
        let detector = Arc::new(NetworkDetector::new(
            Arc::new(Mutex::new(NetworkTrackingState::new())),
            Arc::new(runtime.clone()),
            Arc::clone(&tracker),
            config.probe_timeout(),
        ));
        let probe = ChainProbe::new(tracker);
        let background = Self {
            config,
            runtime,
            bridge,
            detector,
            probe,
            bridge_listener: Mutex::new(None),
            tabs: Mutex::new(HashMap::new()),
        };
        background.open_panel()?;
        Ok(background)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn runtime(&self) -> &ExtensionRuntime {
        &self.runtime
    }

    pub fn bridge(&self) -> &Arc<ProviderBridge> {
        &self.bridge
    }

    pub fn detector(&self) -> &Arc<NetworkDetector> {
        &self.detector
    }

    /// Loads `origin` into a new tab: installs the content script and the provider, and
    /// starts tracking the tab's endpoints. Needs a Tokio runtime.
    pub fn open_tab(&self, tab_id: TabId, origin: &str) -> Result<Tab, BridgeError> {
        let mut tabs = lock(&self.tabs);
        if tabs.contains_key(&tab_id) {
            return Err(BridgeError::Validation(format!("tab {tab_id} is already open")));
        }
        let page = Page::new(origin);
        let relay = ContentScriptRelay::install(
            &page,
            Arc::new(self.runtime.port_for_tab(tab_id)),
            self.probe.clone(),
        )
        .ok_or_else(|| BridgeError::Validation(format!("tab {tab_id} already has a relay")))?;
        let provider = InjectedProvider::install(&page)?;

        self.runtime
            .register_content_script(tab_id, Arc::clone(&relay) as Arc<dyn MessageHandler>)?;
        self.detector.track_tab(tab_id);
        tracing::info!(%tab_id, origin, "tab opened");

        let tab = Tab {
            id: tab_id,
            page,
            provider,
            relay,
        };
        tabs.insert(tab_id, tab.clone());
        Ok(tab)
    }

    /// Closes the tab's page. Provider requests still pending in it fail with `4900`.
    pub fn close_tab(&self, tab_id: TabId) -> bool {
        let Some(tab) = lock(&self.tabs).remove(&tab_id) else {
            return false;
        };
        self.runtime.unregister_content_script(tab_id);
        tab.page.close();
        self.detector.untrack_tab(tab_id);
        if self.bridge.active_tab() == Some(tab_id) {
            self.bridge.set_active_tab(None);
        }
        tracing::info!(%tab_id, "tab closed");
        true
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        lock(&self.tabs).get(&tab_id).cloned()
    }

    pub fn activate_tab(&self, tab_id: TabId) {
        self.bridge.set_active_tab(Some(tab_id));
    }

    /// Opens the Pilot panel: the bridge starts answering provider requests again.
    /// Returns `false` when it was already open.
    pub fn open_panel(&self) -> Result<bool, BridgeError> {
        let mut listener = lock(&self.bridge_listener);
        if listener.is_some() {
            return Ok(false);
        }
        *listener = Some(
            self.runtime
                .add_listener(Arc::clone(&self.bridge) as Arc<dyn MessageHandler>)?,
        );
        tracing::debug!("panel opened");
        Ok(true)
    }

    /// Closes the Pilot panel. The active tab is told the Pilot disconnected, and requests
    /// that arrive afterwards go unanswered.
    pub async fn close_panel(&self) -> bool {
        let Some(id) = lock(&self.bridge_listener).take() else {
            return false;
        };
        self.bridge.disconnect().await;
        self.runtime.remove_listener(id);
        tracing::debug!("panel closed");
        true
    }

    pub fn is_panel_open(&self) -> bool {
        lock(&self.bridge_listener).is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
