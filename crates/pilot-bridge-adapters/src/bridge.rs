use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};

use pilot_bridge_core::{
    ChainId, EventName, Message, MessageHandler, MessageSender, TabId, TabMessenger,
    WalletProvider,
};

/// Values last pushed to the page. `None` means nothing was synced yet.
#[derive(Debug, Default)]
struct Synced {
    account: Option<Option<Address>>,
    chain_id: Option<ChainId>,
}

/// Extension side of the provider relay: answers requests coming from the active tab with
/// the real wallet, and pushes wallet state changes down to that tab.
pub struct ProviderBridge {
    tabs: Arc<dyn TabMessenger>,
    provider: RwLock<Arc<dyn WalletProvider>>,
    active_tab: Mutex<Option<TabId>>,
    synced: Mutex<Synced>,
}

impl ProviderBridge {
    pub fn new(tabs: Arc<dyn TabMessenger>, provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            tabs,
            provider: RwLock::new(provider),
            active_tab: Mutex::new(None),
            synced: Mutex::new(Synced::default()),
        }
    }

    /// Swaps the wallet. Requests already in flight finish on the previous one.
    pub fn set_provider(&self, provider: Arc<dyn WalletProvider>) {
        *self
            .provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = provider;
    }

    pub fn set_active_tab(&self, tab_id: Option<TabId>) {
        *lock(&self.active_tab) = tab_id;
    }

    pub fn active_tab(&self) -> Option<TabId> {
        *lock(&self.active_tab)
    }

    /// Pushes `accountsChanged` for a new account value. The first sync only emits when an
    /// account is present; later changes always emit, `[]` once the account is gone.
    pub async fn sync_account(&self, account: Option<Address>) {
        let accounts = {
            let mut synced = lock(&self.synced);
            match synced.account {
                Some(previous) if previous == account => return,
                Some(_) => {
                    synced.account = Some(account);
                    account.into_iter().collect::<Vec<_>>()
                }
                None => {
                    synced.account = Some(account);
                    match account {
                        Some(account) => vec![account],
                        None => return,
                    }
                }
            }
        };
        let data = json!(accounts
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<String>>());
        self.emit(EventName::AccountsChanged, data).await;
    }

    /// Pushes `connect` on the first sync and `chainChanged` on every later change.
    pub async fn sync_chain_id(&self, chain_id: ChainId) {
        let first = {
            let mut synced = lock(&self.synced);
            let previous = synced.chain_id.replace(chain_id);
            match previous {
                Some(previous) if previous == chain_id => return,
                Some(_) => false,
                None => true,
            }
        };
        if first {
            self.emit(EventName::Connect, json!({ "chainId": chain_id.to_hex() }))
                .await;
        } else {
            self.emit(EventName::ChainChanged, json!(chain_id.to_hex()))
                .await;
        }
    }

    /// Tells the active tab that the Pilot went away.
    pub async fn disconnect(&self) {
        if let Some(tab_id) = self.active_tab() {
            if let Err(e) = self.tabs.send_to_tab(tab_id, Message::PilotDisconnect).await {
                tracing::debug!(%tab_id, error = %e, "disconnect not delivered");
            }
        }
    }

    async fn emit(&self, event_name: EventName, event_data: Value) {
        let Some(tab_id) = self.active_tab() else {
            tracing::debug!(event = %event_name, "no active tab for provider event");
            return;
        };
        tracing::debug!(%tab_id, event = %event_name, "pushing provider event");
        if let Err(e) = self
            .tabs
            .send_to_tab(tab_id, Message::event(event_name, event_data))
            .await
        {
            tracing::debug!(%tab_id, error = %e, "provider event not delivered");
        }
    }

    fn current_provider(&self) -> Arc<dyn WalletProvider> {
        Arc::clone(&self.provider.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl MessageHandler for ProviderBridge {
    async fn handle(&self, message: Message, sender: MessageSender) -> Option<Message> {
        match message {
            Message::InjectedProviderRequest {
                request_id,
                injection_id,
                request,
            } => {
                let tab_id = sender.tab_id?;
                if self.active_tab() != Some(tab_id) {
                    return None;
                }
                let provider = self.current_provider();
                tracing::debug!(
                    %tab_id,
                    %request_id,
                    %injection_id,
                    method = %request.method,
                    "answering provider request"
                );
                Some(match provider.request(request).await {
                    Ok(response) => Message::InjectedProviderResponse {
                        request_id,
                        response,
                    },
                    Err(error) => Message::InjectedProviderError { request_id, error },
                })
            }
            Message::InjectedProviderResponse { .. }
            | Message::InjectedProviderError { .. }
            | Message::InjectedProviderEvent { .. }
            | Message::ProbeChainId { .. }
            | Message::ProbeChainIdResponse { .. }
            | Message::PilotDisconnect => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
