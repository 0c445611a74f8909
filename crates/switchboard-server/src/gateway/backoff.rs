use std::time::Duration;

use switchboard_shared::constants::{LONG_BACKOFF_SECS, MEDIUM_BACKOFF_SECS, SHORT_BACKOFF_SECS};

/// Reconnect schedule after an unexpected disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub delay: Duration,
    /// Line shown in every window of the network.
    pub message: String,
}

/// `retry_count` is the number of failed attempts before this one.
pub fn backoff(retry_count: i64, reason: &str) -> Backoff {
    if retry_count < 4 {
        Backoff {
            delay: Duration::from_secs(SHORT_BACKOFF_SECS),
            message: format!(
                "Lost connection to IRC server ({reason}). Will try to reconnect in 30 seconds."
            ),
        }
    } else if retry_count < 8 {
        Backoff {
            delay: Duration::from_secs(MEDIUM_BACKOFF_SECS),
            message: format!(
                "Lost connection to IRC server ({reason}). Will try to reconnect in 3 minutes."
            ),
        }
    } else {
        Backoff {
            delay: Duration::from_secs(LONG_BACKOFF_SECS),
            message: "Error in connection to IRC server after multiple attempts. Waiting one hour \
                      before making another connection attempt. Close this window if you do not \
                      wish to retry."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule() {
        assert_eq!(backoff(0, "x").delay, Duration::from_secs(30));
        assert_eq!(backoff(3, "x").delay, Duration::from_secs(30));
        assert_eq!(backoff(4, "x").delay, Duration::from_secs(180));
        assert_eq!(backoff(7, "x").delay, Duration::from_millis(180_000));
        assert_eq!(backoff(8, "x").delay, Duration::from_secs(3600));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            backoff(1, "Connection reset").message,
            "Lost connection to IRC server (Connection reset). Will try to reconnect in 30 seconds."
        );
        assert!(backoff(5, "eof").message.ends_with("3 minutes."));
        assert!(backoff(12, "eof").message.starts_with("Error in connection to IRC server"));
        assert!(!backoff(12, "eof").message.contains("  "));
    }
}
