use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_WHOIS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Our own nick on the connection. Presence events for it are skipped.
    pub nickname: String,
    pub whois_timeout: Option<Duration>,
}

impl WatchConfig {
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::new()
    }
}

pub struct WatchConfigBuilder {
    nickname: Option<String>,
    whois_timeout: Option<Duration>,
}

impl Default for WatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchConfigBuilder {
    pub fn new() -> Self {
        WatchConfigBuilder {
            nickname: None,
            whois_timeout: Some(DEFAULT_WHOIS_TIMEOUT),
        }
    }

    pub fn build(self) -> Result<WatchConfig, Error> {
        let nickname = match self.nickname {
            Some(nickname) if !nickname.is_empty() => nickname,
            _ => return Err(Error::NicknameMissing),
        };

        Ok(WatchConfig {
            nickname,
            whois_timeout: self.whois_timeout,
        })
    }

    pub fn nickname<T: Into<String>>(mut self, nickname: T) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// `None` lets a WHOIS wait for its reply forever.
    pub fn whois_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.whois_timeout = timeout;
        self
    }
}
