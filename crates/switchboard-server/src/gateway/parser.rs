//! IRC line parsing (RFC 2812, section 2.3.1).

use switchboard_shared::channel::is_channel;

/// Origin of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// `:irc.example.org`
    Server(String),
    /// `:nick!ident@host`
    User { nick: String, user_host: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<Prefix>,
    pub command: String,
    /// First parameter of a numeric reply, normally our own nick.
    pub target: Option<String>,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse one line. Returns `None` for blank lines and lines without a
    /// command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim();

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, tail) = stripped.split_once(' ')?;
            prefix = Some(parse_prefix(raw));
            rest = tail;
        }

        let (command, mut rest) = match rest.trim_start().split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest.trim_start(), ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        let numeric = command.bytes().all(|b| b.is_ascii_digit());
        let mut target = None;
        if numeric && !params.is_empty() {
            target = Some(fold_channel(params.remove(0)));

            // The trailing parameter is free text and keeps its case.
            let middle = params.len().saturating_sub(1);
            for param in params.iter_mut().take(middle) {
                if is_channel(param) {
                    *param = param.to_lowercase();
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_string(),
            target,
            params,
        })
    }

    pub fn nick(&self) -> Option<&str> {
        match &self.prefix {
            Some(Prefix::User { nick, .. }) => Some(nick),
            _ => None,
        }
    }

    pub fn user_host(&self) -> &str {
        match &self.prefix {
            Some(Prefix::User { user_host, .. }) => user_host,
            _ => "",
        }
    }

    /// Nick of the sender, or the server name for server lines.
    pub fn source(&self) -> &str {
        match &self.prefix {
            Some(Prefix::User { nick, .. }) => nick,
            Some(Prefix::Server(name)) => name,
            None => "",
        }
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn parse_prefix(raw: &str) -> Prefix {
    match raw.find(['!', '@']) {
        Some(end) => Prefix::User {
            nick: raw[..end].to_string(),
            user_host: raw[end + 1..].to_string(),
        },
        None => Prefix::Server(raw.to_string()),
    }
}

/// Channel names are case-insensitive; always use the lower case form.
fn fold_channel(name: String) -> String {
    if is_channel(&name) {
        name.to_lowercase()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prefix_and_trailing() {
        let msg = IrcMessage::parse(":neo!i=ilkkao@iao.iki.fi PRIVMSG #Rust :hello there  world").unwrap();

        assert_eq!(
            msg.prefix,
            Some(Prefix::User {
                nick: "neo".into(),
                user_host: "i=ilkkao@iao.iki.fi".into()
            })
        );
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.target, None);
        assert_eq!(msg.params, vec!["#Rust", "hello there  world"]);
    }

    #[test]
    fn test_server_prefix_numeric() {
        let msg = IrcMessage::parse(":mas.example.org 001 toyni :Welcome to the MAS IRC toyni\r\n").unwrap();

        assert_eq!(msg.prefix, Some(Prefix::Server("mas.example.org".into())));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.target.as_deref(), Some("toyni"));
        assert_eq!(msg.params, vec!["Welcome to the MAS IRC toyni"]);
        assert_eq!(msg.source(), "mas.example.org");
    }

    #[test]
    fn test_numeric_channels_lower_cased() {
        let msg = IrcMessage::parse(":own.freenode.net 353 drwillie @ #EverGreen :@Drwillie ilkkaoks").unwrap();
        assert_eq!(msg.params, vec!["@", "#evergreen", "@Drwillie ilkkaoks"]);

        let msg = IrcMessage::parse(":srv 332 ilkka #Portaali :Cool Topic").unwrap();
        assert_eq!(msg.params, vec!["#portaali", "Cool Topic"]);
    }

    #[test]
    fn test_no_prefix_and_empty_trailing() {
        let msg = IrcMessage::parse("PING :irc.example.org").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.params, vec!["irc.example.org"]);

        let msg = IrcMessage::parse(":a!b@c PART #x :").unwrap();
        assert_eq!(msg.params, vec!["#x", ""]);
    }

    #[test]
    fn test_mode_parameters() {
        let msg = IrcMessage::parse(":ilkka9!~ilkka9@localhost MODE #sunnuntai +ov alice bob").unwrap();
        assert_eq!(msg.params, vec!["#sunnuntai", "+ov", "alice", "bob"]);
        assert_eq!(msg.nick(), Some("ilkka9"));
        assert_eq!(msg.user_host(), "~ilkka9@localhost");
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(IrcMessage::parse(""), None);
        assert_eq!(IrcMessage::parse("   "), None);
        assert_eq!(IrcMessage::parse(":only.prefix"), None);
    }
}
