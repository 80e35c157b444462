use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::command::CommandSink;
use crate::config::WatchConfig;
use crate::error::Result;
use crate::event::ReplyEvent;
use crate::event_handler::{handle_presence, PresenceHandler};
use crate::message::IrcMessage;
use crate::whois::WhoisCorrelator;

/// Glue between a connection and the watcher: presence events go to the
/// handler, WHOIS numerics to the correlator.
pub struct UserWatch<S, H> {
    nickname: String,
    whois: WhoisCorrelator<S>,
    handler: H,
}

impl<S: CommandSink, H: PresenceHandler<S>> UserWatch<S, H> {
    pub fn new(config: WatchConfig, sink: S, handler: H) -> Self {
        UserWatch {
            nickname: config.nickname,
            whois: WhoisCorrelator::new(sink, config.whois_timeout),
            handler,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Call after our own nick changed so our events keep being skipped.
    pub fn set_nickname<T: Into<String>>(&mut self, nickname: T) {
        self.nickname = nickname.into();
    }

    pub fn whois(&self) -> &WhoisCorrelator<S> {
        &self.whois
    }

    pub fn whois_mut(&mut self) -> &mut WhoisCorrelator<S> {
        &mut self.whois
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn dispatch(&mut self, event: &ReplyEvent) -> bool {
        if event.kind.is_presence() {
            handle_presence(&mut self.handler, event, &self.nickname, &mut self.whois)
        } else {
            self.whois.dispatch(event)
        }
    }

    /// Parses one line from the server and dispatches it. Lines of other
    /// kinds are not an error, they just are not consumed.
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        let message = IrcMessage::try_from(line)?;

        match ReplyEvent::try_from(message) {
            Ok(event) => Ok(self.dispatch(&event)),
            Err(_) => Ok(false),
        }
    }

    /// Processes lines until the sending side goes away, expiring WHOIS
    /// sessions as their deadlines pass.
    pub async fn run(&mut self, mut lines: UnboundedReceiver<String>) {
        loop {
            let deadline = self.whois.next_deadline();

            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        break;
                    };

                    if let Err(err) = self.handle_line(&line) {
                        warn!(%err, "skipping line");
                    }
                }
                _ = wait_until(deadline) => {
                    self.whois.expire(Instant::now());
                }
            }
        }

        debug!("line channel closed");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
