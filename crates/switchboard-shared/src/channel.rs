//! Channel name rules (RFC 2812, section 1.3).

use crate::constants::CHANNEL_PREFIXES;
use crate::error::ProtocolError;

/// Returns `true` if `name` starts with one of the channel prefixes.
pub fn is_channel(name: &str) -> bool {
    name.starts_with(CHANNEL_PREFIXES)
}

/// Validate a user supplied channel name and prepend `#` when it lacks a
/// channel prefix.
///
/// Empty names and names containing whitespace, control characters (BEL in
/// particular) or commas are rejected.
pub fn normalize_channel_name(name: &str) -> Result<String, ProtocolError> {
    let illegal = |c: char| c.is_whitespace() || c.is_control() || c == ',';

    if name.is_empty() || name.contains(illegal) {
        return Err(ProtocolError::IllegalChannelName);
    }

    if is_channel(name) {
        Ok(name.to_string())
    } else {
        Ok(format!("#{name}"))
    }
}
