use crate::message::IrcMessage;

/// Every message kind the watcher reacts to. Anything else is dropped before
/// it reaches the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// 311 RPL_WHOISUSER
    WhoisUser,
    /// 401 ERR_NOSUCHNICK
    NoSuchNick,
    /// 307, not in any RFC. Some networks use it for "is a registered nick".
    RegisteredNick,
    /// 312 RPL_WHOISSERVER
    WhoisServer,
    /// 313 RPL_WHOISOPERATOR
    WhoisOperator,
    /// 319 RPL_WHOISCHANNELS
    WhoisChannels,
    /// 671, not in any RFC. "is using a secure connection".
    SecureConnection,
    /// 318 RPL_ENDOFWHOIS
    EndOfWhois,
    Join,
    Part,
    Quit,
}

impl ReplyKind {
    pub fn from_command(command: &str) -> Option<Self> {
        let kind = match command {
            "311" => ReplyKind::WhoisUser,
            "401" => ReplyKind::NoSuchNick,
            "307" => ReplyKind::RegisteredNick,
            "312" => ReplyKind::WhoisServer,
            "313" => ReplyKind::WhoisOperator,
            "319" => ReplyKind::WhoisChannels,
            "671" => ReplyKind::SecureConnection,
            "318" => ReplyKind::EndOfWhois,
            "JOIN" => ReplyKind::Join,
            "PART" => ReplyKind::Part,
            "QUIT" => ReplyKind::Quit,
            _ => return None,
        };
        Some(kind)
    }

    pub fn numeric(self) -> Option<u16> {
        match self {
            ReplyKind::WhoisUser => Some(311),
            ReplyKind::NoSuchNick => Some(401),
            ReplyKind::RegisteredNick => Some(307),
            ReplyKind::WhoisServer => Some(312),
            ReplyKind::WhoisOperator => Some(313),
            ReplyKind::WhoisChannels => Some(319),
            ReplyKind::SecureConnection => Some(671),
            ReplyKind::EndOfWhois => Some(318),
            ReplyKind::Join | ReplyKind::Part | ReplyKind::Quit => None,
        }
    }

    pub fn is_presence(self) -> bool {
        matches!(self, ReplyKind::Join | ReplyKind::Part | ReplyKind::Quit)
    }
}

/// Who sent a message: a user (`nick!user@host`) or a server name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub username: Option<String>,
    pub host: Option<String>,
}

impl Source {
    pub fn parse(prefix: &str) -> Self {
        let (name, rest) = match prefix.split_once('!') {
            Some((name, rest)) => (name, Some(rest)),
            None => (prefix, None),
        };

        let (username, host) = match rest {
            Some(rest) => match rest.split_once('@') {
                Some((username, host)) => (Some(username), Some(host)),
                None => (Some(rest), None),
            },
            None => match name.split_once('@') {
                Some((_, host)) => (None, Some(host)),
                None => (None, None),
            },
        };

        let name = name.split('@').next().unwrap_or(name);

        Source {
            name: name.to_string(),
            username: username.map(str::to_string),
            host: host.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub kind: ReplyKind,
    pub source: Source,
    /// Free text of the message, i.e. its last parameter.
    pub message: String,
    pub params: Vec<String>,
}

impl ReplyEvent {
    pub fn new(kind: ReplyKind, source: Source, params: Vec<String>) -> Self {
        ReplyEvent {
            kind,
            source,
            message: params.last().cloned().unwrap_or_default(),
            params,
        }
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The nick a WHOIS reply is about. Numerics lead with our own nick, so
    /// the subject sits in the second parameter.
    pub fn target_nick(&self) -> Option<&str> {
        match self.kind.numeric() {
            Some(_) => self.param(1).filter(|nick| !nick.is_empty()),
            None => None,
        }
    }

    /// Channel a JOIN or PART happened on.
    pub fn channel(&self) -> Option<&str> {
        match self.kind {
            ReplyKind::Join | ReplyKind::Part => self.param(0),
            _ => None,
        }
    }
}

impl TryFrom<IrcMessage> for ReplyEvent {
    type Error = IrcMessage;

    fn try_from(value: IrcMessage) -> Result<Self, Self::Error> {
        let Some(kind) = ReplyKind::from_command(&value.command) else {
            return Err(value);
        };

        let source = value.prefix.as_deref().map(Source::parse).unwrap_or_default();

        Ok(ReplyEvent::new(kind, source, value.params))
    }
}
