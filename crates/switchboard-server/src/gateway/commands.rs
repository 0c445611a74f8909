/// IRC commands the gateway reacts to. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Welcome, MOTD and similar numerics shown as plain server text.
    ServerText,
    /// 043: the server picked a nick for us.
    ForcedNick,
    /// 332: channel topic.
    TopicReply,
    /// 353: a chunk of a channel member list.
    Names,
    /// 366: end of a channel member list.
    EndOfNames,
    /// 376: end of MOTD, registration is complete.
    EndOfMotd,
    /// 432/433: the nick we asked for was refused.
    NickRefused,
    /// 482: we are not channel operator.
    NotOperator,
    Join,
    Part,
    Quit,
    Nick,
    Mode,
    Topic,
    Privmsg,
    Error,
}

pub fn lookup(command: &str) -> Option<Command> {
    let command = match command {
        "001" | "002" | "003" | "004" | "005" | "020" | "042" | "242" | "250" | "251" | "252"
        | "253" | "254" | "255" | "265" | "266" | "372" | "375" | "452" => Command::ServerText,
        "043" => Command::ForcedNick,
        "332" => Command::TopicReply,
        "353" => Command::Names,
        "366" => Command::EndOfNames,
        "376" => Command::EndOfMotd,
        "432" | "433" => Command::NickRefused,
        "482" => Command::NotOperator,
        "JOIN" => Command::Join,
        "PART" => Command::Part,
        "QUIT" => Command::Quit,
        "NICK" => Command::Nick,
        "MODE" => Command::Mode,
        "TOPIC" => Command::Topic,
        "PRIVMSG" => Command::Privmsg,
        "ERROR" => Command::Error,
        _ => return None,
    };
    Some(command)
}
