pub mod background;
pub mod bridge;
pub mod config;
pub mod detector;
pub mod eip1193;
pub mod injected;
pub mod page;
pub mod probe;
mod random;
pub mod relay;
pub mod runtime;
pub mod tracker;

pub use background::{Background, Tab};
pub use bridge::ProviderBridge;
pub use config::BridgeConfig;
pub use detector::NetworkDetector;
pub use eip1193::{HttpWalletProvider, MemoryWalletProvider};
pub use injected::InjectedProvider;
pub use page::{Page, WindowListener};
pub use probe::{ChainProbe, ProbeError};
pub use relay::ContentScriptRelay;
pub use runtime::{ContentScriptPort, ExtensionRuntime, ListenerId};
pub use tracker::{CapturedError, MemoryErrorTracker, TracingErrorTracker};
