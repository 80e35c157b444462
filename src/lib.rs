//! Enriches IRC joins, parts and quits with WHOIS data.
//!
//! A [`PresenceHandler`] gets a [`UserProfile`] for every presence event of
//! another user and may pass it to [`WhoisCorrelator::queue_whois`], which
//! collects the scattered WHOIS numerics for that nick into the profile and
//! hands it back once the server is done.

pub mod casemap;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod event_handler;
pub mod listeners;
pub mod message;
pub mod users;
pub mod watch;
pub mod whois;

pub use command::{Command, CommandSink};
pub use config::{WatchConfig, WatchConfigBuilder};
pub use error::{Error, Result};
pub use event::{ReplyEvent, ReplyKind, Source};
pub use event_handler::{PresenceCallbacks, PresenceHandler};
pub use listeners::SessionId;
pub use message::IrcMessage;
pub use users::UserProfile;
pub use watch::UserWatch;
pub use whois::{Stage, WhoisCorrelator};
