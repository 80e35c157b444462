//! WHOIS correlation.
//!
//! A WHOIS is answered by a run of numerics that share the connection with
//! everything else the server sends. Each queued query becomes a session that
//! owns the profile being filled in and a handful of listeners in the
//! [`ListenerRegistry`]. Replies are routed to a session by (kind, target
//! nick). A session ends on RPL_ENDOFWHOIS, ERR_NOSUCHNICK or its deadline,
//! and every way out drops all of its listeners before the caller's
//! continuation runs.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::command::CommandSink;
use crate::error::{Error, Result};
use crate::event::{ReplyEvent, ReplyKind};
use crate::listeners::{Delivery, ListenerRegistry, SessionId};
use crate::users::UserProfile;

pub type OnSuccess = Box<dyn FnOnce(UserProfile)>;
pub type OnError = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for RPL_WHOISUSER or ERR_NOSUCHNICK.
    AwaitingUserInfo,
    /// RPL_WHOISUSER seen, collecting everything up to RPL_ENDOFWHOIS.
    CollectingDetails,
}

// RPL_WHOISCHANNELS is repeated for users in many channels.
const DETAIL_LISTENERS: [(ReplyKind, Delivery); 6] = [
    (ReplyKind::RegisteredNick, Delivery::Once),
    (ReplyKind::WhoisServer, Delivery::Once),
    (ReplyKind::WhoisOperator, Delivery::Once),
    (ReplyKind::WhoisChannels, Delivery::Every),
    (ReplyKind::SecureConnection, Delivery::Once),
    (ReplyKind::EndOfWhois, Delivery::Once),
];

struct WhoisSession {
    profile: UserProfile,
    stage: Stage,
    on_success: OnSuccess,
    on_error: Option<OnError>,
    deadline: Option<Instant>,
}

pub struct WhoisCorrelator<S> {
    sink: S,
    timeout: Option<Duration>,
    sessions: BTreeMap<SessionId, WhoisSession>,
    listeners: ListenerRegistry,
    next_id: u64,
}

impl<S: CommandSink> WhoisCorrelator<S> {
    /// `timeout` bounds how long a session may wait for its terminal reply.
    /// With `None` a session the server never answers stays open.
    pub fn new(sink: S, timeout: Option<Duration>) -> Self {
        WhoisCorrelator {
            sink,
            timeout,
            sessions: BTreeMap::new(),
            listeners: ListenerRegistry::default(),
            next_id: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Sends a WHOIS for `profile.nick`. `on_success` gets the filled in
    /// profile once the server ends the reply.
    pub fn queue_whois<F>(&mut self, profile: UserProfile, on_success: F) -> Result<SessionId>
    where
        F: FnOnce(UserProfile) + 'static,
    {
        self.open(profile, Box::new(on_success), None)
    }

    /// Like [`queue_whois`](Self::queue_whois), but `on_error` runs when the
    /// nick does not exist or the session times out.
    pub fn queue_whois_or_else<F, E>(&mut self, profile: UserProfile, on_success: F, on_error: E) -> Result<SessionId>
    where
        F: FnOnce(UserProfile) + 'static,
        E: FnOnce() + 'static,
    {
        self.open(profile, Box::new(on_success), Some(Box::new(on_error)))
    }

    fn open(&mut self, profile: UserProfile, on_success: OnSuccess, on_error: Option<OnError>) -> Result<SessionId> {
        if profile.nick.is_empty() {
            return Err(Error::EmptyNick);
        }

        self.sink.send_whois(&profile.nick)?;

        let id = SessionId(self.next_id);
        self.next_id += 1;

        self.listeners.subscribe(id, ReplyKind::WhoisUser, &profile.nick, Delivery::Once);
        self.listeners.subscribe(id, ReplyKind::NoSuchNick, &profile.nick, Delivery::Once);

        debug!(session = ?id, nick = %profile.nick, "whois queued");

        self.sessions.insert(id, WhoisSession {
            profile,
            stage: Stage::AwaitingUserInfo,
            on_success,
            on_error,
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
        });

        Ok(id)
    }

    /// Feeds one inbound event. Returns whether a session consumed it.
    pub fn dispatch(&mut self, event: &ReplyEvent) -> bool {
        let Some(nick) = event.target_nick() else {
            return false;
        };

        let Some(id) = self.listeners.claim(event.kind, nick) else {
            trace!(kind = ?event.kind, nick, "no session waiting for reply");
            return false;
        };

        match event.kind {
            ReplyKind::WhoisUser => self.user_info(id, event),
            ReplyKind::NoSuchNick => self.no_such_nick(id),
            ReplyKind::EndOfWhois => self.finish(id),
            _ => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    extract(&mut session.profile, event);
                }
            }
        }

        true
    }

    fn user_info(&mut self, id: SessionId, event: &ReplyEvent) {
        self.listeners.unsubscribe(id, ReplyKind::NoSuchNick);

        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        session.stage = Stage::CollectingDetails;
        extract(&mut session.profile, event);

        for (kind, delivery) in DETAIL_LISTENERS {
            self.listeners.subscribe(id, kind, &session.profile.nick, delivery);
        }
    }

    fn no_such_nick(&mut self, id: SessionId) {
        self.listeners.remove_session(id);

        let Some(session) = self.sessions.remove(&id) else {
            return;
        };

        debug!(session = ?id, nick = %session.profile.nick, "no such nick");

        if let Some(on_error) = session.on_error {
            on_error();
        }
    }

    fn finish(&mut self, id: SessionId) {
        self.listeners.remove_session(id);

        let Some(session) = self.sessions.remove(&id) else {
            return;
        };

        debug!(session = ?id, nick = %session.profile.nick, "whois complete");

        (session.on_success)(session.profile);
    }

    /// Ends every session whose deadline is at or before `now` and runs their
    /// error continuations. Returns how many sessions expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();

        let mut on_errors = Vec::new();
        for id in &expired {
            self.listeners.remove_session(*id);

            if let Some(session) = self.sessions.remove(id) {
                debug!(session = ?id, nick = %session.profile.nick, "whois timed out");
                on_errors.extend(session.on_error);
            }
        }

        for on_error in on_errors {
            on_error();
        }

        expired.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|session| session.deadline)
            .min()
    }

    pub fn stage(&self, id: SessionId) -> Option<Stage> {
        self.sessions.get(&id).map(|session| session.stage)
    }

    pub fn is_listening(&self, id: SessionId, kind: ReplyKind) -> bool {
        self.listeners.is_subscribed(id, kind)
    }

    pub fn listener_count(&self, id: SessionId) -> usize {
        self.listeners.count(id)
    }

    /// Number of sessions still waiting for a terminal reply.
    pub fn in_flight(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty() && self.listeners.is_empty()
    }
}

fn extract(profile: &mut UserProfile, event: &ReplyEvent) {
    match event.kind {
        // <me> <nick> <user> <host> * :<realname>
        ReplyKind::WhoisUser => {
            if !event.source.name.is_empty() {
                profile.server = event.source.name.clone();
            }
            if let Some(username) = event.param(2) {
                profile.username = username.to_string();
            }
            if let Some(host) = event.param(3) {
                profile.host = host.to_string();
            }
            if let Some(realname) = event.param(5) {
                profile.realname = realname.to_string();
            }
        }
        // 307 wording differs between networks, only the text tells.
        ReplyKind::RegisteredNick => {
            if event.message.contains("identi") || event.message.contains("regist") {
                profile.identified = true;
            }
        }
        // <me> <nick> <server> :<server info>
        ReplyKind::WhoisServer => {
            if let Some(server) = event.param(2) {
                profile.server = server.to_string();
            }
        }
        ReplyKind::WhoisOperator => profile.irc_operator = true,
        // <me> <nick> :{[@+]<channel> }
        ReplyKind::WhoisChannels => {
            if let Some(list) = event.param(2) {
                profile.set_channels(list);
            }
        }
        ReplyKind::SecureConnection => {
            if event.message.contains("secure") {
                profile.secure_connection = true;
            }
        }
        ReplyKind::NoSuchNick
        | ReplyKind::EndOfWhois
        | ReplyKind::Join
        | ReplyKind::Part
        | ReplyKind::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use super::*;
    use crate::command::Command;
    use crate::event::Source;

    fn reply(kind: ReplyKind, params: &[&str]) -> ReplyEvent {
        let source = Source {
            name: "irc.example.net".to_string(),
            ..Default::default()
        };
        ReplyEvent::new(kind, source, params.iter().map(|p| p.to_string()).collect())
    }

    fn whois_user(nick: &str) -> ReplyEvent {
        reply(ReplyKind::WhoisUser, &["bot", nick, "user", "host", "*", "realname"])
    }

    fn end_of_whois(nick: &str) -> ReplyEvent {
        reply(ReplyKind::EndOfWhois, &["bot", nick, "End of /WHOIS list."])
    }

    fn no_such_nick(nick: &str) -> ReplyEvent {
        reply(ReplyKind::NoSuchNick, &["bot", nick, "No such nick/channel"])
    }

    type Done = Rc<RefCell<Vec<UserProfile>>>;

    fn correlator() -> WhoisCorrelator<Vec<Command>> {
        WhoisCorrelator::new(Vec::new(), None)
    }

    fn queue(whois: &mut WhoisCorrelator<Vec<Command>>, nick: &str) -> (SessionId, Done, Rc<Cell<usize>>) {
        let done: Done = Rc::default();
        let failed = Rc::new(Cell::new(0));

        let id = {
            let done = done.clone();
            let failed = failed.clone();
            whois
                .queue_whois_or_else(
                    UserProfile::new(nick),
                    move |user| done.borrow_mut().push(user),
                    move || failed.set(failed.get() + 1),
                )
                .unwrap()
        };

        (id, done, failed)
    }

    #[test]
    fn empty_nick_is_not_queued() {
        let mut whois = correlator();

        let result = whois.queue_whois(UserProfile::default(), |_| panic!("must not complete"));

        assert!(matches!(result, Err(Error::EmptyNick)));
        assert!(whois.sink().is_empty());
        assert!(whois.is_idle());
    }

    #[test]
    fn closed_sink_registers_nothing() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Command>();
        drop(rx);
        let mut whois = WhoisCorrelator::new(tx, None);

        let result = whois.queue_whois(UserProfile::new("Alice"), |_| {});

        assert!(matches!(result, Err(Error::SinkClosed)));
        assert!(whois.is_idle());
    }

    #[test]
    fn success() {
        let mut whois = correlator();
        let (id, done, failed) = queue(&mut whois, "Alice");

        assert_eq!(whois.sink(), &vec![Command::Whois("Alice".to_string())]);
        assert_eq!(whois.stage(id), Some(Stage::AwaitingUserInfo));
        assert_eq!(whois.listener_count(id), 2);

        assert!(whois.dispatch(&whois_user("Alice")));
        assert_eq!(whois.stage(id), Some(Stage::CollectingDetails));
        assert!(!whois.is_listening(id, ReplyKind::NoSuchNick));
        assert!(whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Alice", "srv1", "Example server"])));
        assert!(whois.dispatch(&end_of_whois("Alice")));

        assert!(whois.is_idle());
        assert_eq!(failed.get(), 0);

        let done = done.borrow();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].nick, "Alice");
        assert_eq!(done[0].username, "user");
        assert_eq!(done[0].host, "host");
        assert_eq!(done[0].realname, "realname");
        assert_eq!(done[0].server, "srv1");
        assert!(!done[0].irc_operator);
    }

    #[test]
    fn finished_session_ignores_late_replies() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Alice");

        whois.dispatch(&whois_user("Alice"));
        whois.dispatch(&end_of_whois("Alice"));

        assert!(!whois.dispatch(&reply(ReplyKind::WhoisOperator, &["bot", "Alice", "is an IRC operator"])));
        assert!(!whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Alice", "#late"])));
        assert!(!whois.dispatch(&end_of_whois("Alice")));

        let done = done.borrow();
        assert_eq!(done.len(), 1);
        assert!(!done[0].irc_operator);
        assert!(done[0].channels.is_empty());
    }

    #[test]
    fn whois_user_provides_provisional_server() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Alice");

        whois.dispatch(&whois_user("Alice"));
        whois.dispatch(&end_of_whois("Alice"));

        assert_eq!(done.borrow()[0].server, "irc.example.net");
    }

    #[test]
    fn no_such_nick_fails_once() {
        let mut whois = correlator();
        let (id, done, failed) = queue(&mut whois, "Bob");

        assert!(whois.dispatch(&no_such_nick("Bob")));
        assert_eq!(failed.get(), 1);
        assert_eq!(whois.stage(id), None);
        assert!(whois.is_idle());

        assert!(!whois.dispatch(&whois_user("Bob")));
        assert!(!whois.dispatch(&end_of_whois("Bob")));
        assert!(!whois.dispatch(&no_such_nick("Bob")));
        assert_eq!(failed.get(), 1);
        assert!(done.borrow().is_empty());
    }

    #[test]
    fn no_such_nick_without_error_continuation() {
        let mut whois = correlator();
        whois.queue_whois(UserProfile::new("Bob"), |_| panic!("must not complete")).unwrap();

        assert!(whois.dispatch(&no_such_nick("Bob")));
        assert!(whois.is_idle());
    }

    #[test]
    fn whois_user_cancels_no_such_nick() {
        let mut whois = correlator();
        let (_, done, failed) = queue(&mut whois, "Bob");

        assert!(whois.dispatch(&whois_user("Bob")));
        assert!(!whois.dispatch(&no_such_nick("Bob")));
        assert!(whois.dispatch(&end_of_whois("Bob")));

        assert_eq!(failed.get(), 0);
        assert_eq!(done.borrow().len(), 1);
    }

    #[test]
    fn channels_are_not_merged() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Carol");

        whois.dispatch(&whois_user("Carol"));
        assert!(whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Carol", "#a #b"])));
        assert!(whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Carol", "#c"])));
        whois.dispatch(&end_of_whois("Carol"));

        assert_eq!(done.borrow()[0].channels, BTreeSet::from(["#c".to_string()]));
    }

    #[test]
    fn legacy_numerics_match_on_text() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Dave");

        whois.dispatch(&whois_user("Dave"));
        whois.dispatch(&reply(ReplyKind::RegisteredNick, &["bot", "Dave", "has identified for this nick"]));
        whois.dispatch(&reply(ReplyKind::SecureConnection, &["bot", "Dave", "is using a secure connection"]));
        whois.dispatch(&reply(ReplyKind::WhoisOperator, &["bot", "Dave"]));
        whois.dispatch(&end_of_whois("Dave"));

        let done = done.borrow();
        assert!(done[0].identified);
        assert!(done[0].secure_connection);
        assert!(done[0].irc_operator);
    }

    #[test]
    fn legacy_numerics_without_keywords() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Eve");

        whois.dispatch(&whois_user("Eve"));
        assert!(whois.dispatch(&reply(ReplyKind::RegisteredNick, &["bot", "Eve", "IS A REGISTERED NICK"])));
        // one-shot: a second 307 is no longer listened for
        assert!(!whois.dispatch(&reply(ReplyKind::RegisteredNick, &["bot", "Eve", "is a registered nick"])));
        whois.dispatch(&reply(ReplyKind::SecureConnection, &["bot", "Eve", "is using TLS"]));
        whois.dispatch(&end_of_whois("Eve"));

        let done = done.borrow();
        assert!(!done[0].identified);
        assert!(!done[0].secure_connection);
    }

    #[test]
    fn missing_params_leave_fields_alone() {
        let mut whois = correlator();
        let mut profile = UserProfile::new("Frank");
        profile.username = "frank".to_string();
        profile.host = "old.host".to_string();

        let done: Done = Rc::default();
        {
            let done = done.clone();
            whois.queue_whois(profile, move |user| done.borrow_mut().push(user)).unwrap();
        }

        whois.dispatch(&reply(ReplyKind::WhoisUser, &["bot", "Frank"]));
        whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Frank"]));
        whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Frank"]));
        whois.dispatch(&end_of_whois("Frank"));

        let done = done.borrow();
        assert_eq!(done[0].username, "frank");
        assert_eq!(done[0].host, "old.host");
        assert_eq!(done[0].server, "irc.example.net");
        assert!(done[0].realname.is_empty());
    }

    #[test]
    fn replies_for_other_nicks_are_ignored() {
        let mut whois = correlator();
        let (_, done, _) = queue(&mut whois, "Alice");

        assert!(!whois.dispatch(&whois_user("Mallory")));
        assert!(!whois.dispatch(&no_such_nick("Mallory")));
        assert!(whois.dispatch(&whois_user("alice")));
        assert!(!whois.dispatch(&end_of_whois("Mallory")));
        assert!(whois.dispatch(&end_of_whois("ALICE")));

        assert_eq!(done.borrow().len(), 1);
    }

    #[test]
    fn concurrent_sessions_do_not_cross() {
        let mut whois = correlator();
        let (_, alice, _) = queue(&mut whois, "Alice");
        let (_, bob, bob_failed) = queue(&mut whois, "Bob");
        let (_, carol, _) = queue(&mut whois, "Carol");

        whois.dispatch(&whois_user("Alice"));
        whois.dispatch(&whois_user("Carol"));
        whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Carol", "srv-carol", ""]));
        whois.dispatch(&no_such_nick("Bob"));
        whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Alice", "srv-alice", ""]));
        whois.dispatch(&reply(ReplyKind::WhoisOperator, &["bot", "Carol", "is an IRC operator"]));
        whois.dispatch(&end_of_whois("Carol"));
        whois.dispatch(&end_of_whois("Alice"));

        assert!(whois.is_idle());
        assert_eq!(bob_failed.get(), 1);
        assert!(bob.borrow().is_empty());

        let alice = alice.borrow();
        let carol = carol.borrow();
        assert_eq!(alice[0].server, "srv-alice");
        assert!(!alice[0].irc_operator);
        assert_eq!(carol[0].server, "srv-carol");
        assert!(carol[0].irc_operator);
    }

    #[test]
    fn same_nick_twice() {
        let mut whois = correlator();
        let (first_id, first, _) = queue(&mut whois, "Dave");
        let (second_id, second, _) = queue(&mut whois, "Dave");

        whois.dispatch(&whois_user("Dave"));
        assert_eq!(whois.stage(first_id), Some(Stage::CollectingDetails));
        assert_eq!(whois.stage(second_id), Some(Stage::AwaitingUserInfo));

        whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Dave", "srv1", ""]));
        whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Dave", "#one"]));
        whois.dispatch(&end_of_whois("Dave"));

        whois.dispatch(&whois_user("Dave"));
        whois.dispatch(&reply(ReplyKind::WhoisServer, &["bot", "Dave", "srv2", ""]));
        whois.dispatch(&reply(ReplyKind::WhoisChannels, &["bot", "Dave", "#two"]));
        whois.dispatch(&end_of_whois("Dave"));

        assert!(whois.is_idle());
        assert_eq!(first.borrow()[0].server, "srv1");
        assert_eq!(first.borrow()[0].channels, BTreeSet::from(["#one".to_string()]));
        assert_eq!(second.borrow()[0].server, "srv2");
        assert_eq!(second.borrow()[0].channels, BTreeSet::from(["#two".to_string()]));
    }

    #[test]
    fn presence_events_are_not_consumed() {
        let mut whois = correlator();
        queue(&mut whois, "Alice");

        let join = ReplyEvent::new(ReplyKind::Join, Source::parse("Alice!a@h"), vec!["#rust".to_string()]);
        assert!(!whois.dispatch(&join));
        assert_eq!(whois.in_flight(), 1);
    }

    #[test]
    fn no_deadline_without_timeout() {
        let mut whois = correlator();
        queue(&mut whois, "Alice");

        assert_eq!(whois.next_deadline(), None);
        assert_eq!(whois.expire(Instant::now() + Duration::from_secs(3600)), 0);
        assert_eq!(whois.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_tears_down() {
        let mut whois = WhoisCorrelator::new(Vec::new(), Some(Duration::from_secs(30)));
        let (id, done, failed) = queue(&mut whois, "Ghost");

        whois.dispatch(&whois_user("Ghost"));
        assert_eq!(whois.next_deadline(), Some(Instant::now() + Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(whois.expire(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(whois.expire(Instant::now()), 1);

        assert_eq!(failed.get(), 1);
        assert_eq!(whois.stage(id), None);
        assert!(whois.is_idle());
        assert_eq!(whois.next_deadline(), None);

        assert!(!whois.dispatch(&end_of_whois("Ghost")));
        assert!(done.borrow().is_empty());
    }
}
