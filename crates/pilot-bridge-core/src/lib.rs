pub mod domain;
pub mod eip6963;
pub mod emitter;
pub mod known_rpc;
pub mod message;
pub mod ports;
pub mod sniff;
pub mod tracking;

pub use domain::{
    ChainId, ChainIdError, InjectionId, JsonRpcPayload, JsonRpcResponse, ProviderRpcError,
    RequestId, RpcRequest, TabId,
};
pub use eip6963::{provider_info_for_origin, ProviderInfo};
pub use emitter::{EventEmitter, Listener, SubscriptionId};
pub use known_rpc::lookup_known_rpc;
pub use message::{EventName, Message};
pub use ports::{
    BridgeError, ErrorTracker, MessageHandler, MessageSender, RuntimeMessenger, TabMessenger,
    WalletProvider,
};
pub use sniff::{parse_network_from_request_body, DetectionResult, RequestBody, UploadData};
pub use tracking::{NetworkTrackingState, ProbeId, ProbeOutcome, SharedProbe};
