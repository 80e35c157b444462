use crate::casemap::irc_to_lower;
use crate::event::ReplyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Removed by the first delivery it claims.
    Once,
    /// Stays until the owning session removes it.
    Every,
}

#[derive(Debug, Clone)]
struct Listener {
    session: SessionId,
    kind: ReplyKind,
    nick: String,
    delivery: Delivery,
}

/// Subscriptions of all in-flight WHOIS sessions, keyed by reply kind and
/// folded target nick.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
}

impl ListenerRegistry {
    pub fn subscribe(&mut self, session: SessionId, kind: ReplyKind, nick: &str, delivery: Delivery) {
        self.listeners.push(Listener {
            session,
            kind,
            nick: irc_to_lower(nick),
            delivery,
        });
    }

    pub fn unsubscribe(&mut self, session: SessionId, kind: ReplyKind) {
        self.listeners
            .retain(|listener| !(listener.session == session && listener.kind == kind));
    }

    pub fn remove_session(&mut self, session: SessionId) {
        self.listeners.retain(|listener| listener.session != session);
    }

    /// Finds the session a reply belongs to. The oldest session with a
    /// matching listener wins, and a one-shot listener is consumed by the
    /// claim.
    pub fn claim(&mut self, kind: ReplyKind, nick: &str) -> Option<SessionId> {
        let nick = irc_to_lower(nick);

        let index = self
            .listeners
            .iter()
            .enumerate()
            .filter(|(_, listener)| listener.kind == kind && listener.nick == nick)
            .min_by_key(|(_, listener)| listener.session)
            .map(|(index, _)| index)?;

        let session = self.listeners[index].session;
        if self.listeners[index].delivery == Delivery::Once {
            self.listeners.remove(index);
        }

        Some(session)
    }

    pub fn is_subscribed(&self, session: SessionId, kind: ReplyKind) -> bool {
        self.listeners
            .iter()
            .any(|listener| listener.session == session && listener.kind == kind)
    }

    pub fn count(&self, session: SessionId) -> usize {
        self.listeners
            .iter()
            .filter(|listener| listener.session == session)
            .count()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
