#![allow(dead_code)]

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};
use tokio::sync::Notify;

use pilot_bridge_core::{
    BridgeError, ChainId, Message, ProviderRpcError, RpcRequest, TabId, TabMessenger,
    WalletProvider,
};

pub fn chain(id: u64) -> ChainId {
    ChainId::new(id).expect("non-zero chain id")
}

pub fn account_a() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("account a")
}

pub fn account_b() -> Address {
    "0x2000000000000000000000000000000000000002"
        .parse()
        .expect("account b")
}

/// JSON-RPC endpoint answering each incoming request with the next scripted
/// `(status, body)` pair. Request bodies are recorded as JSON.
pub struct MockRpcServer {
    pub url: String,
    pub bodies: Arc<Mutex<Vec<Value>>>,
    join: Option<thread::JoinHandle<()>>,
}

impl MockRpcServer {
    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().expect("bodies lock").clone()
    }

    /// Waits until every scripted response was served.
    pub fn finish(mut self) -> Vec<Value> {
        if let Some(join) = self.join.take() {
            join.join().expect("mock server thread");
        }
        self.bodies()
    }
}

pub fn spawn_rpc_server(responses: Vec<(u16, String)>) -> MockRpcServer {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let url = format!("http://{}", server.server_addr());
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&bodies);

    let join = thread::spawn(move || {
        for (code, payload) in responses {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut body = String::new();
            let _ = req.as_reader().read_to_string(&mut body);
            if let Ok(mut g) = recorded.lock() {
                g.push(serde_json::from_str(&body).unwrap_or(Value::String(body)));
            }
            let response = Response::from_string(payload).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    MockRpcServer {
        url,
        bodies,
        join: Some(join),
    }
}

pub fn rpc_result(result: Value) -> (u16, String) {
    (200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
}

type ReplyFn = dyn Fn(TabId, &Message) -> Result<Option<Message>, BridgeError> + Send + Sync;

/// `TabMessenger` with a scripted reply, an optional delay before replying, and a record of
/// everything that was sent.
pub struct ScriptedTabs {
    reply: Box<ReplyFn>,
    delay: Duration,
    sent: Mutex<Vec<(TabId, Message)>>,
}

impl ScriptedTabs {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(TabId, &Message) -> Result<Option<Message>, BridgeError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Accepts everything, answers nothing.
    pub fn silent() -> Self {
        Self::new(|_, _| Ok(None))
    }

    /// Answers every chain probe with `chain_id`.
    pub fn probing(chain_id: Option<ChainId>) -> Self {
        Self::new(move |_, message| match message {
            Message::ProbeChainId { .. } => Ok(Some(Message::ProbeChainIdResponse { chain_id })),
            _ => Ok(None),
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<(TabId, Message)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn probe_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|(_, m)| matches!(m, Message::ProbeChainId { .. }))
            .count()
    }
}

#[async_trait]
impl TabMessenger for ScriptedTabs {
    async fn send_to_tab(
        &self,
        tab_id: TabId,
        message: Message,
    ) -> Result<Option<Message>, BridgeError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((tab_id, message.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.reply)(tab_id, &message)
    }
}

/// Wallet that answers every request with its tag, optionally only after `release`.
pub struct TaggedWallet {
    tag: &'static str,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl TaggedWallet {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(tag: &'static str, gate: Arc<Notify>) -> Self {
        Self {
            tag,
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for TaggedWallet {
    async fn request(&self, request: RpcRequest) -> Result<Value, ProviderRpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if request.method == "eth_sign" {
            return Err(ProviderRpcError::new(
                ProviderRpcError::USER_REJECTED,
                format!("{} rejected", self.tag),
            ));
        }
        Ok(json!({ "wallet": self.tag, "method": request.method }))
    }
}
