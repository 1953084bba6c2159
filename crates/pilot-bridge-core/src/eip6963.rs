use serde::{Deserialize, Serialize};

pub const PILOT_NAME: &str = "Zodiac Pilot";
pub const PILOT_RDNS: &str = "io.zodiac.pilot";
pub const PILOT_ICON: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAzMiAzMiI+PGNpcmNsZSBjeD0iMTYiIGN5PSIxNiIgcj0iMTYiLz48L3N2Zz4=";

const METAMASK_NAME: &str = "MetaMask";
const METAMASK_RDNS: &str = "io.metamask";

/// dApps that only offer MetaMask in their connect dialog.
pub const METAMASK_SPOOFED_ORIGINS: &[&str] = &[
    "https://app.morpho.org",
    "https://app.spark.fi",
    "https://summer.fi",
];

/// `EIP6963ProviderInfo` as announced through `eip6963:announceProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

pub fn is_spoofed_origin(origin: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    METAMASK_SPOOFED_ORIGINS
        .iter()
        .any(|listed| listed.eq_ignore_ascii_case(origin))
}

pub fn provider_info_for_origin(origin: &str, uuid: impl Into<String>) -> ProviderInfo {
    let (name, rdns) = if is_spoofed_origin(origin) {
        (METAMASK_NAME, METAMASK_RDNS)
    } else {
        (PILOT_NAME, PILOT_RDNS)
    };
    ProviderInfo {
        uuid: uuid.into(),
        name: name.to_owned(),
        icon: PILOT_ICON.to_owned(),
        rdns: rdns.to_owned(),
    }
}
