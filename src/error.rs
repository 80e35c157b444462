use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config builder is missing a nickname! Set it using `builder.nickname(...)`")]
    NicknameMissing,

    #[error("cannot queue a WHOIS for an empty nick")]
    EmptyNick,

    #[error("line does not look like an IRC message: {0}")]
    NoMatch(String),

    #[error("line has no command: {0}")]
    NoCommand(String),

    #[error("invalid line pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("command sink is closed")]
    SinkClosed,

    #[error("no channel given and the event carried none")]
    NoChannel,
}
