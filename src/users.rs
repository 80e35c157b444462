use std::collections::BTreeSet;

use crate::command::CommandSink;
use crate::error::{Error, Result};

/// One user as seen at a presence event, enriched by WHOIS replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub host: String,
    pub server: String,

    pub irc_operator: bool,
    pub identified: bool,
    pub secure_connection: bool,

    pub modes: BTreeSet<String>,
    pub channels: BTreeSet<String>,

    /// Channel of the JOIN/PART this profile came from. `None` for QUIT.
    pub channel: Option<String>,
}

impl UserProfile {
    pub fn new<T: Into<String>>(nick: T) -> Self {
        UserProfile {
            nick: nick.into(),
            ..Default::default()
        }
    }

    /// Replaces the channel list with the space separated `list`.
    pub fn set_channels(&mut self, list: &str) {
        self.channels = list
            .split(' ')
            .filter(|channel| !channel.is_empty())
            .map(str::to_string)
            .collect();
    }

    fn channel_or(&self, channel: Option<&str>) -> Result<String> {
        channel
            .or(self.channel.as_deref())
            .map(str::to_string)
            .ok_or(Error::NoChannel)
    }

    /// e.g. `user.set_user_mode(&mut sink, "+iws", None)`
    pub fn set_user_mode(&self, sink: &mut impl CommandSink, modes: &str, param: Option<&str>) -> Result<()> {
        sink.send_mode(&self.nick, modes, param)
    }

    /// e.g. `user.set_channel_mode(&mut sink, "+b", Some("nick!~user@host"), None)`
    pub fn set_channel_mode(&self, sink: &mut impl CommandSink, modes: &str, param: Option<&str>, channel: Option<&str>) -> Result<()> {
        let channel = self.channel_or(channel)?;
        sink.send_mode(&channel, modes, param)
    }

    pub fn kick(&self, sink: &mut impl CommandSink, comment: Option<&str>, channel: Option<&str>) -> Result<()> {
        let channel = self.channel_or(channel)?;
        sink.send_kick(&channel, &self.nick, comment)
    }

    pub fn privmsg_channel(&self, sink: &mut impl CommandSink, text: &str, channel: Option<&str>) -> Result<()> {
        let channel = self.channel_or(channel)?;
        sink.send_privmsg(&channel, text)
    }

    pub fn privmsg_user(&self, sink: &mut impl CommandSink, text: &str) -> Result<()> {
        sink.send_privmsg(&self.nick, text)
    }

    pub fn notice_channel(&self, sink: &mut impl CommandSink, text: &str, channel: Option<&str>) -> Result<()> {
        let channel = self.channel_or(channel)?;
        sink.send_notice(&channel, text)
    }

    pub fn notice_user(&self, sink: &mut impl CommandSink, text: &str) -> Result<()> {
        sink.send_notice(&self.nick, text)
    }
}
