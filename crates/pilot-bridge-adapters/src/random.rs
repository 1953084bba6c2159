use pilot_bridge_core::BridgeError;

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], BridgeError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| BridgeError::Transport(format!("random id generation failed: {e}")))?;
    Ok(buf)
}

pub(crate) fn random_hex<const N: usize>() -> Result<String, BridgeError> {
    random_bytes::<N>().map(alloy::hex::encode)
}

/// RFC 4122 version 4 UUID string.
pub(crate) fn uuid_v4() -> Result<String, BridgeError> {
    let mut b = random_bytes::<16>()?;
    b[6] = (b[6] & 0x0f) | 0x40;
    b[8] = (b[8] & 0x3f) | 0x80;
    let hex = alloy::hex::encode(b);
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
