use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use alloy::primitives::Address;
use serde_json::Value;
use tokio::sync::oneshot;

use pilot_bridge_core::{
    provider_info_for_origin, BridgeError, ChainId, EventEmitter, EventName, InjectionId,
    JsonRpcPayload, JsonRpcResponse, Message, ProviderInfo, ProviderRpcError, RequestId,
    RpcRequest, SubscriptionId,
};

use crate::page::{Page, WindowListener, PROVIDER_INJECTED_MARKER};
use crate::random::{random_hex, uuid_v4};

type RpcOutcome = Result<Value, ProviderRpcError>;

/// The EIP-1193 provider a dApp sees in its own page.
///
/// Every call is posted to the page window and answered by whatever relays it to the
/// Pilot. `request` has no timeout: a wallet call may legitimately wait on the user for
/// as long as it takes, and a call whose relay or bridge went away stays pending. Only
/// closing the page ends it, with `4900`.
#[derive(Clone)]
pub struct InjectedProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    page: Page,
    injection_id: InjectionId,
    announcement_uuid: String,
    next_sequence: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<RpcOutcome>>>,
    shadow: Mutex<ShadowState>,
    emitter: EventEmitter,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShadowState {
    chain_id: ChainId,
    selected_address: Option<Address>,
}

impl InjectedProvider {
    /// Installs the provider into `page` and starts relaying replies and wallet events to
    /// it. Fails with `Validation` if the page already has one. Needs a Tokio runtime.
    pub fn install(page: &Page) -> Result<Self, BridgeError> {
        let injection_id = InjectionId::new(random_hex::<8>()?);
        let announcement_uuid = uuid_v4()?;
        if !page.mark(PROVIDER_INJECTED_MARKER) {
            tracing::debug!(origin = page.origin(), "provider already injected");
            return Err(BridgeError::Validation(format!(
                "provider already injected into {}",
                page.origin()
            )));
        }
        let inner = Arc::new(ProviderInner {
            page: page.clone(),
            injection_id,
            announcement_uuid,
            next_sequence: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            shadow: Mutex::new(ShadowState::default()),
            emitter: EventEmitter::new(),
        });
        tokio::spawn(relay_window(Arc::downgrade(&inner), page.subscribe()));
        tracing::debug!(
            origin = page.origin(),
            injection_id = %inner.injection_id,
            "provider injected"
        );
        Ok(Self { inner })
    }

    pub async fn request(&self, request: RpcRequest) -> RpcOutcome {
        let request_id = self.inner.next_request_id();
        // Register before posting so the reply cannot slip past.
        let (tx, rx) = oneshot::channel();
        self.inner.pending().insert(request_id.clone(), tx);
        if self.inner.page.is_closed() {
            self.inner.pending().remove(&request_id);
            return Err(page_closed());
        }
        tracing::debug!(%request_id, method = %request.method, "posting provider request");
        self.inner.page.post_message(Message::InjectedProviderRequest {
            request_id,
            injection_id: self.inner.injection_id.clone(),
            request,
        });
        rx.await.unwrap_or_else(|_| Err(page_closed()))
    }

    /// Legacy `send(method, params)`.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.request(RpcRequest::new(method, params)).await
    }

    /// Legacy `sendAsync(payload, callback)`: the outcome wrapped in a JSON-RPC envelope.
    pub async fn send_async(&self, payload: JsonRpcPayload) -> JsonRpcResponse {
        let outcome = self
            .request(RpcRequest::new(payload.method.clone(), payload.params.clone()))
            .await;
        JsonRpcResponse::from_outcome(&payload, outcome)
    }

    /// Legacy `enable()`.
    pub async fn enable(&self) -> Result<Vec<Address>, ProviderRpcError> {
        let accounts = self
            .request(RpcRequest::new("eth_requestAccounts", Value::Array(vec![])))
            .await?;
        serde_json::from_value(accounts)
            .map_err(|e| ProviderRpcError::internal(format!("invalid accounts response: {e}")))
    }

    pub fn on<F>(&self, event: EventName, listener: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event, Arc::new(listener))
    }

    pub fn once<F>(&self, event: EventName, listener: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.emitter.once(event, Arc::new(listener))
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.remove_listener(id)
    }

    pub fn listener_count(&self, event: &EventName) -> usize {
        self.inner.emitter.listener_count(event)
    }

    pub fn chain_id(&self) -> ChainId {
        self.inner.shadow().chain_id
    }

    pub fn selected_address(&self) -> Option<Address> {
        self.inner.shadow().selected_address
    }

    pub fn injection_id(&self) -> &InjectionId {
        &self.inner.injection_id
    }

    /// EIP-6963 announcement for the page this provider lives in.
    pub fn announce_provider(&self) -> ProviderInfo {
        provider_info_for_origin(self.inner.page.origin(), self.inner.announcement_uuid.clone())
    }
}

impl ProviderInner {
    fn next_request_id(&self) -> RequestId {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        RequestId::new(&self.injection_id, sequence)
    }

    fn shadow(&self) -> MutexGuard<'_, ShadowState> {
        self.shadow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<RpcOutcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First reply for an id wins; later ones, and replies for other pages, are ignored.
    fn resolve(&self, request_id: &RequestId, outcome: RpcOutcome) {
        let Some(tx) = self.pending().remove(request_id) else {
            return;
        };
        if tx.send(outcome).is_err() {
            tracing::trace!(%request_id, "provider request dropped before its reply");
        }
    }

    fn fail_pending(&self) {
        let pending: Vec<_> = self.pending().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(page_closed()));
        }
    }

    fn apply_event(&self, event: &EventName, data: &Value) {
        {
            let mut shadow = self.shadow();
            match event {
                EventName::Connect => {
                    if let Some(chain_id) = data.get("chainId").and_then(|v| ChainId::from_json(v).ok())
                    {
                        shadow.chain_id = chain_id;
                    }
                }
                EventName::ChainChanged => {
                    if let Ok(chain_id) = ChainId::from_json(data) {
                        shadow.chain_id = chain_id;
                    }
                }
                EventName::AccountsChanged => {
                    shadow.selected_address = data
                        .get(0)
                        .and_then(Value::as_str)
                        .and_then(|raw| raw.parse().ok());
                }
                EventName::Disconnect | EventName::Message | EventName::Other(_) => {}
            }
        }
        self.emitter.emit(event, data);
    }
}

async fn relay_window(provider: Weak<ProviderInner>, mut window: WindowListener) {
    while let Some(message) = window.recv().await {
        let Some(inner) = provider.upgrade() else {
            return;
        };
        match message {
            Message::InjectedProviderResponse {
                request_id,
                response,
            } => inner.resolve(&request_id, Ok(response)),
            Message::InjectedProviderError { request_id, error } => {
                inner.resolve(&request_id, Err(error))
            }
            Message::InjectedProviderEvent {
                event_name,
                event_data,
            } => inner.apply_event(&event_name, &event_data),
            Message::InjectedProviderRequest { .. }
            | Message::ProbeChainId { .. }
            | Message::ProbeChainIdResponse { .. }
            | Message::PilotDisconnect => {}
        }
    }
    if let Some(inner) = provider.upgrade() {
        inner.fail_pending();
    }
}

fn page_closed() -> ProviderRpcError {
    ProviderRpcError::disconnected("page window closed")
}
