use crate::casemap::irc_eq;
use crate::event::{ReplyEvent, ReplyKind};
use crate::users::UserProfile;
use crate::whois::WhoisCorrelator;

/// Receives a fresh profile for every join, part and quit of somebody other
/// than ourselves. Unimplemented methods ignore the event.
///
/// The correlator is handed in so a handler can enrich the profile with
/// [`WhoisCorrelator::queue_whois`].
pub trait PresenceHandler<S> {
    fn on_join(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        let _ = (user, whois);
    }

    fn on_part(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        let _ = (user, whois);
    }

    fn on_quit(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        let _ = (user, whois);
    }
}

pub type PresenceCallback<S> = Box<dyn FnMut(UserProfile, &mut WhoisCorrelator<S>)>;

/// A [`PresenceHandler`] made of optional closures.
pub struct PresenceCallbacks<S> {
    join: Option<PresenceCallback<S>>,
    part: Option<PresenceCallback<S>>,
    quit: Option<PresenceCallback<S>>,
}

impl<S> Default for PresenceCallbacks<S> {
    fn default() -> Self {
        PresenceCallbacks {
            join: None,
            part: None,
            quit: None,
        }
    }
}

impl<S> PresenceCallbacks<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_join<F: FnMut(UserProfile, &mut WhoisCorrelator<S>) + 'static>(mut self, callback: F) -> Self {
        self.join = Some(Box::new(callback));
        self
    }

    pub fn on_part<F: FnMut(UserProfile, &mut WhoisCorrelator<S>) + 'static>(mut self, callback: F) -> Self {
        self.part = Some(Box::new(callback));
        self
    }

    pub fn on_quit<F: FnMut(UserProfile, &mut WhoisCorrelator<S>) + 'static>(mut self, callback: F) -> Self {
        self.quit = Some(Box::new(callback));
        self
    }
}

impl<S> PresenceHandler<S> for PresenceCallbacks<S> {
    fn on_join(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        if let Some(callback) = self.join.as_mut() {
            callback(user, whois);
        }
    }

    fn on_part(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        if let Some(callback) = self.part.as_mut() {
            callback(user, whois);
        }
    }

    fn on_quit(&mut self, user: UserProfile, whois: &mut WhoisCorrelator<S>) {
        if let Some(callback) = self.quit.as_mut() {
            callback(user, whois);
        }
    }
}

/// Profile for the user behind a presence event. `None` when the event has
/// no nick or is our own.
pub fn presence_profile(event: &ReplyEvent, own_nick: &str) -> Option<UserProfile> {
    if !event.kind.is_presence() {
        return None;
    }

    let nick = event.source.name.as_str();
    if nick.is_empty() || irc_eq(nick, own_nick) {
        return None;
    }

    let mut user = UserProfile::new(nick);
    user.username = event.source.username.clone().unwrap_or_default();
    user.host = event.source.host.clone().unwrap_or_default();
    user.channel = event.channel().map(str::to_string);

    Some(user)
}

/// Hands a presence event to the matching handler method. Returns whether a
/// profile was produced.
pub fn handle_presence<S, H>(handler: &mut H, event: &ReplyEvent, own_nick: &str, whois: &mut WhoisCorrelator<S>) -> bool
where
    H: PresenceHandler<S> + ?Sized,
{
    let Some(user) = presence_profile(event, own_nick) else {
        return false;
    };

    match event.kind {
        ReplyKind::Join => handler.on_join(user, whois),
        ReplyKind::Part => handler.on_part(user, whois),
        ReplyKind::Quit => handler.on_quit(user, whois),
        _ => return false,
    }

    true
}
