//! Pseudo user ids for IRC nicks.
//!
//! Users that only exist on a bridged IRC network have no native account.
//! They get an id of the form `i<base64(nick)>` (unpadded) so that every
//! member of every window is addressed the same way. The mapping is
//! reversible, which is how outbound messages recover the nick.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::ProtocolError;
use crate::types::UserId;

const IRC_ID_PREFIX: char = 'i';

/// Derive the pseudo user id of an IRC nick, e.g. `ilkka` -> `iaWxra2E`.
pub fn irc_user_id(nick: &str) -> UserId {
    UserId(format!("{IRC_ID_PREFIX}{}", STANDARD_NO_PAD.encode(nick)))
}

/// Recover the nick from a pseudo user id created by [`irc_user_id`].
pub fn irc_nick(user_id: &UserId) -> Result<String, ProtocolError> {
    let invalid = || ProtocolError::InvalidPseudoId(user_id.to_string());

    let encoded = user_id.as_str().strip_prefix(IRC_ID_PREFIX).ok_or_else(invalid)?;
    let bytes = STANDARD_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|_| invalid())?;

    String::from_utf8(bytes).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        assert_eq!(irc_user_id("ilkka").as_str(), "iaWxra2E");
    }

    #[test]
    fn test_inverse_mapping() {
        for nick in ["a", "bob_", "Zed[42]", "x|y^"] {
            assert_eq!(irc_nick(&irc_user_id(nick)).unwrap(), nick);
        }
    }

    #[test]
    fn test_rejects_foreign_ids() {
        assert!(irc_nick(&UserId::new("m42")).is_err());
        assert!(irc_nick(&UserId::new("i***")).is_err());
    }
}
