use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};

/// Outbound commands the watcher and its callers can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Whois(String),
    Mode {
        target: String,
        modes: String,
        param: Option<String>,
    },
    Kick {
        channel: String,
        nick: String,
        comment: Option<String>,
    },
    Privmsg(String, String),
    Notice(String, String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Whois(nick) => write!(f, "WHOIS {}", nick),
            Command::Mode { target, modes, param } => match param {
                Some(param) => write!(f, "MODE {} {} {}", target, modes, param),
                None => write!(f, "MODE {} {}", target, modes),
            },
            Command::Kick { channel, nick, comment } => match comment {
                Some(comment) => write!(f, "KICK {} {} :{}", channel, nick, comment),
                None => write!(f, "KICK {} {}", channel, nick),
            },
            Command::Privmsg(target, text) => write!(f, "PRIVMSG {} :{}", target, text),
            Command::Notice(target, text) => write!(f, "NOTICE {} :{}", target, text),
        }
    }
}

/// Where outbound commands go. Only [`CommandSink::send`] is required; the
/// rest build the matching [`Command`].
pub trait CommandSink {
    fn send(&mut self, command: Command) -> Result<()>;

    fn send_whois(&mut self, nick: &str) -> Result<()> {
        self.send(Command::Whois(nick.to_string()))
    }

    fn send_mode(&mut self, target: &str, modes: &str, param: Option<&str>) -> Result<()> {
        self.send(Command::Mode {
            target: target.to_string(),
            modes: modes.to_string(),
            param: param.map(str::to_string),
        })
    }

    fn send_kick(&mut self, channel: &str, nick: &str, comment: Option<&str>) -> Result<()> {
        self.send(Command::Kick {
            channel: channel.to_string(),
            nick: nick.to_string(),
            comment: comment.map(str::to_string),
        })
    }

    fn send_privmsg(&mut self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Privmsg(target.to_string(), text.to_string()))
    }

    fn send_notice(&mut self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Notice(target.to_string(), text.to_string()))
    }
}

// The connection's writer task owns the receiving end.
impl CommandSink for UnboundedSender<Command> {
    fn send(&mut self, command: Command) -> Result<()> {
        UnboundedSender::send(self, command).map_err(|_| Error::SinkClosed)
    }
}

impl CommandSink for Vec<Command> {
    fn send(&mut self, command: Command) -> Result<()> {
        self.push(command);
        Ok(())
    }
}
