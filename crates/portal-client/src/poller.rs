//! Chat panel polling state machine.
//!
//! The poller does no I/O. Callers feed it the current time, user input and
//! completed requests; it answers with the requests to issue and the effects
//! to render. Every request carries enough context to recognise a response
//! that arrives after the user has moved on.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use portal_types::models::{ChatMessage, Contact};

use crate::timer::PollTimer;
use crate::transport::ClientError;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub messages: Duration,
    pub contacts: Duration,
    pub unread: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            messages: Duration::milliseconds(1500),
            contacts: Duration::seconds(5),
            unread: Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Closed,
    Contacts,
    Conversation { peer_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollRequest {
    Contacts {
        generation: u64,
        search: Option<String>,
    },
    Messages {
        generation: u64,
        peer_id: i64,
        since: i64,
        /// First fetch after selecting the contact.
        initial: bool,
    },
    UnreadCount,
}

#[derive(Debug, Clone)]
pub enum PollResponse {
    Contacts(Vec<Contact>),
    Messages(Vec<ChatMessage>),
    UnreadCount(i64),
}

/// Actions the user starts explicitly; their failures are shown, not swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    SendMessage,
    UploadFile,
}

impl UserAction {
    fn fallback_message(self) -> &'static str {
        match self {
            Self::SendMessage => "Failed to send message",
            Self::UploadFile => "Failed to upload file",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEffect {
    PanelChanged(PanelState),
    ContactsUpdated(Vec<Contact>),
    MessagesAppended {
        peer_id: i64,
        messages: Vec<ChatMessage>,
    },
    ScrollToBottom,
    /// Messages arrived while the user was scrolled up. A count of zero
    /// clears the hint.
    NewMessagesHint {
        count: usize,
    },
    UnreadBadge {
        count: i64,
    },
    DesktopNotification {
        peer_id: i64,
        title: String,
        body: String,
    },
    Alert(String),
}

#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub effects: Vec<ChatEffect>,
    pub requests: Vec<PollRequest>,
}

impl Step {
    fn effect(effect: ChatEffect) -> Self {
        Self {
            effects: vec![effect],
            requests: Vec::new(),
        }
    }
}

pub struct ChatPoller {
    state: PanelState,
    search: String,
    contacts: Vec<Contact>,
    last_seen_id: i64,
    conversation_gen: u64,
    contacts_gen: u64,
    at_bottom: bool,
    pending_new: usize,
    window_focused: bool,
    notifications_allowed: bool,
    messages_timer: PollTimer,
    contacts_timer: PollTimer,
    unread_timer: PollTimer,
}

impl ChatPoller {
    pub fn new(intervals: PollIntervals) -> Self {
        Self {
            state: PanelState::Closed,
            search: String::new(),
            contacts: Vec::new(),
            last_seen_id: 0,
            conversation_gen: 0,
            contacts_gen: 0,
            at_bottom: true,
            pending_new: 0,
            window_focused: true,
            notifications_allowed: false,
            messages_timer: PollTimer::new(intervals.messages),
            contacts_timer: PollTimer::new(intervals.contacts),
            unread_timer: PollTimer::new(intervals.unread),
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn current_peer(&self) -> Option<i64> {
        match self.state {
            PanelState::Conversation { peer_id } => Some(peer_id),
            _ => None,
        }
    }

    pub fn last_seen_id(&self) -> i64 {
        self.last_seen_id
    }

    pub fn pending_new(&self) -> usize {
        self.pending_new
    }

    /// Starts the global unread counter. It keeps running whether or not the
    /// panel is open.
    pub fn start(&mut self, now: DateTime<Utc>) -> Step {
        if self.unread_timer.is_armed() {
            return Step::default();
        }
        self.unread_timer.restart(now);
        Step {
            effects: Vec::new(),
            requests: vec![PollRequest::UnreadCount],
        }
    }

    pub fn open(&mut self, now: DateTime<Utc>) -> Step {
        if self.state != PanelState::Closed {
            return Step::default();
        }
        self.state = PanelState::Contacts;
        Step {
            effects: vec![ChatEffect::PanelChanged(self.state)],
            requests: vec![self.refresh_contacts(now)],
        }
    }

    pub fn select_contact(&mut self, now: DateTime<Utc>, peer_id: i64) -> Step {
        if self.state == PanelState::Closed {
            debug!("Ignoring contact selection while the panel is closed");
            return Step::default();
        }

        self.state = PanelState::Conversation { peer_id };
        self.conversation_gen += 1;
        self.last_seen_id = 0;
        self.pending_new = 0;
        self.at_bottom = true;
        self.messages_timer.restart(now);

        Step {
            effects: vec![ChatEffect::PanelChanged(self.state)],
            requests: vec![PollRequest::Messages {
                generation: self.conversation_gen,
                peer_id,
                since: 0,
                initial: true,
            }],
        }
    }

    /// Conversation back to the contact list.
    pub fn back(&mut self, now: DateTime<Utc>) -> Step {
        if !matches!(self.state, PanelState::Conversation { .. }) {
            return Step::default();
        }
        self.leave_conversation();
        self.state = PanelState::Contacts;
        Step {
            effects: vec![ChatEffect::PanelChanged(self.state)],
            requests: vec![self.refresh_contacts(now)],
        }
    }

    pub fn close(&mut self) -> Step {
        if self.state == PanelState::Closed {
            return Step::default();
        }
        self.leave_conversation();
        self.contacts_gen += 1;
        self.contacts_timer.cancel();
        self.state = PanelState::Closed;
        Step::effect(ChatEffect::PanelChanged(self.state))
    }

    /// While a search term is set the contact list only refreshes when the
    /// term changes.
    pub fn set_search(&mut self, now: DateTime<Utc>, term: &str) -> Step {
        let term = term.trim();
        if term == self.search {
            return Step::default();
        }
        self.search = term.to_string();
        if self.state == PanelState::Closed {
            return Step::default();
        }

        Step {
            effects: Vec::new(),
            requests: vec![self.refresh_contacts(now)],
        }
    }

    /// Requests whose timers have come due.
    pub fn due(&mut self, now: DateTime<Utc>) -> Step {
        let mut requests = Vec::new();

        if self.unread_timer.poll(now) {
            requests.push(PollRequest::UnreadCount);
        }
        if self.state != PanelState::Closed
            && self.search.is_empty()
            && self.contacts_timer.poll(now)
        {
            requests.push(self.contacts_request());
        }
        if let PanelState::Conversation { peer_id } = self.state {
            if self.messages_timer.poll(now) {
                requests.push(PollRequest::Messages {
                    generation: self.conversation_gen,
                    peer_id,
                    since: self.last_seen_id,
                    initial: false,
                });
            }
        }

        Step {
            effects: Vec::new(),
            requests,
        }
    }

    pub fn on_response(&mut self, now: DateTime<Utc>, request: PollRequest, response: PollResponse) -> Step {
        match (request, response) {
            (PollRequest::UnreadCount, PollResponse::UnreadCount(count)) => {
                self.unread_timer.complete(now);
                Step::effect(ChatEffect::UnreadBadge { count })
            }
            (PollRequest::Contacts { generation, .. }, PollResponse::Contacts(contacts)) => {
                if generation != self.contacts_gen {
                    debug!("Dropping stale contact list (generation {})", generation);
                    return Step::default();
                }
                self.contacts_timer.complete(now);
                self.contacts = contacts.clone();
                Step::effect(ChatEffect::ContactsUpdated(contacts))
            }
            (
                PollRequest::Messages {
                    generation,
                    peer_id,
                    initial,
                    ..
                },
                PollResponse::Messages(messages),
            ) => {
                if !self.is_current(generation, peer_id) {
                    debug!(
                        "Dropping stale messages for peer {} (generation {})",
                        peer_id, generation
                    );
                    return Step::default();
                }
                self.messages_timer.complete(now);
                self.append(peer_id, initial, messages)
            }
            (request, _) => {
                warn!("Response does not match request {:?}", request);
                Step::default()
            }
        }
    }

    /// Background poll failures are logged and otherwise ignored; the timer
    /// simply tries again next period.
    pub fn on_poll_failed(&mut self, now: DateTime<Utc>, request: &PollRequest, error: &ClientError) {
        match *request {
            PollRequest::UnreadCount => {
                warn!("Unread count poll failed: {}", error);
                self.unread_timer.complete(now);
            }
            PollRequest::Contacts { generation, .. } if generation == self.contacts_gen => {
                warn!("Contact list poll failed: {}", error);
                self.contacts_timer.complete(now);
            }
            PollRequest::Messages {
                generation, peer_id, ..
            } if self.is_current(generation, peer_id) => {
                warn!("Message poll for peer {} failed: {}", peer_id, error);
                self.messages_timer.complete(now);
            }
            _ => debug!("Ignoring failure of stale request: {}", error),
        }
    }

    /// Fetches new messages right away, e.g. after the user sent one.
    pub fn refresh_messages(&mut self, now: DateTime<Utc>) -> Step {
        if self.current_peer().is_none() {
            return Step::default();
        }
        self.messages_timer.expedite(now);
        self.due(now)
    }

    pub fn on_action_failed(&mut self, action: UserAction, error: &ClientError) -> Step {
        warn!("{:?} failed: {}", action, error);
        let message = match error {
            ClientError::Server(message) => message.clone(),
            _ => action.fallback_message().to_string(),
        };
        Step::effect(ChatEffect::Alert(message))
    }

    pub fn set_viewport_at_bottom(&mut self, at_bottom: bool) -> Step {
        self.at_bottom = at_bottom;
        if at_bottom && self.pending_new > 0 {
            self.pending_new = 0;
            return Step::effect(ChatEffect::NewMessagesHint { count: 0 });
        }
        Step::default()
    }

    pub fn set_window_focus(&mut self, focused: bool) {
        self.window_focused = focused;
    }

    pub fn set_notification_permission(&mut self, granted: bool) {
        self.notifications_allowed = granted;
    }

    fn is_current(&self, generation: u64, peer_id: i64) -> bool {
        generation == self.conversation_gen && self.state == PanelState::Conversation { peer_id }
    }

    fn leave_conversation(&mut self) {
        self.conversation_gen += 1;
        self.messages_timer.cancel();
        self.pending_new = 0;
    }

    fn contacts_request(&self) -> PollRequest {
        PollRequest::Contacts {
            generation: self.contacts_gen,
            search: (!self.search.is_empty()).then(|| self.search.clone()),
        }
    }

    /// Fetches contacts now, superseding any fetch already outstanding.
    fn refresh_contacts(&mut self, now: DateTime<Utc>) -> PollRequest {
        self.contacts_gen += 1;
        self.contacts_timer.restart(now);
        self.contacts_request()
    }

    fn append(&mut self, peer_id: i64, initial: bool, messages: Vec<ChatMessage>) -> Step {
        let fresh: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| m.id > self.last_seen_id)
            .collect();
        let Some(newest) = fresh.iter().map(|m| m.id).max() else {
            return Step::default();
        };
        self.last_seen_id = newest;

        let notifications: Vec<ChatEffect> =
            if !initial && !self.window_focused && self.notifications_allowed {
                let title = self.display_name(peer_id);
                fresh
                    .iter()
                    .filter(|m| m.sender_id == peer_id)
                    .map(|m| ChatEffect::DesktopNotification {
                        peer_id,
                        title: title.clone(),
                        body: preview(m),
                    })
                    .collect()
            } else {
                Vec::new()
            };

        let count = fresh.len();
        let mut effects = vec![ChatEffect::MessagesAppended {
            peer_id,
            messages: fresh,
        }];
        if initial || self.at_bottom {
            self.pending_new = 0;
            effects.push(ChatEffect::ScrollToBottom);
        } else {
            self.pending_new += count;
            effects.push(ChatEffect::NewMessagesHint {
                count: self.pending_new,
            });
        }
        effects.extend(notifications);

        Step {
            effects,
            requests: Vec::new(),
        }
    }

    fn display_name(&self, peer_id: i64) -> String {
        self.contacts
            .iter()
            .find(|c| c.id == peer_id)
            .map(|c| c.full_name.clone())
            .unwrap_or_else(|| "New message".to_string())
    }
}

fn preview(message: &ChatMessage) -> String {
    match (message.message.as_deref(), message.file_name.as_deref()) {
        (Some(text), _) if !text.trim().is_empty() => text.trim().chars().take(PREVIEW_CHARS).collect(),
        (_, Some(name)) => format!("Sent a file: {}", name),
        _ => "New message".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: i64 = 1;
    const PEER: i64 = 2;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn msg(id: i64, sender_id: i64, text: &str) -> ChatMessage {
        ChatMessage {
            id,
            sender_id,
            receiver_id: if sender_id == ME { PEER } else { ME },
            message: Some(text.to_string()),
            file_path: None,
            file_name: None,
            file_type: None,
            file_size: None,
            is_read: false,
            created_at: t(id),
        }
    }

    fn contact(id: i64, full_name: &str) -> Contact {
        Contact {
            id,
            username: full_name.to_lowercase(),
            full_name: full_name.to_string(),
            role: "user".to_string(),
            unread_count: 0,
            last_message_at: None,
        }
    }

    /// Opens the panel and selects PEER, completing both initial fetches.
    fn in_conversation() -> (ChatPoller, PollRequest) {
        let mut poller = ChatPoller::new(PollIntervals::default());
        let step = poller.open(t(0));
        poller.on_response(
            t(0),
            step.requests[0].clone(),
            PollResponse::Contacts(vec![contact(PEER, "Dana Peer")]),
        );
        let step = poller.select_contact(t(0), PEER);
        let initial = step.requests[0].clone();
        (poller, initial)
    }

    fn message_request(step: &Step) -> Option<PollRequest> {
        step.requests
            .iter()
            .find(|r| matches!(r, PollRequest::Messages { .. }))
            .cloned()
    }

    #[test]
    fn unread_counter_runs_in_every_state() {
        let mut poller = ChatPoller::new(PollIntervals::default());
        let step = poller.start(t(0));
        assert_eq!(step.requests, vec![PollRequest::UnreadCount]);
        assert_eq!(poller.start(t(1)), Step::default());

        let step = poller.on_response(t(100), PollRequest::UnreadCount, PollResponse::UnreadCount(3));
        assert_eq!(step.effects, vec![ChatEffect::UnreadBadge { count: 3 }]);

        assert!(poller.due(t(30_099)).requests.is_empty());
        assert_eq!(poller.due(t(30_100)).requests, vec![PollRequest::UnreadCount]);
    }

    #[test]
    fn opening_fetches_contacts_then_every_five_seconds() {
        let mut poller = ChatPoller::new(PollIntervals::default());
        let step = poller.open(t(0));
        assert_eq!(step.effects, vec![ChatEffect::PanelChanged(PanelState::Contacts)]);
        let first = step.requests[0].clone();
        assert!(matches!(first, PollRequest::Contacts { search: None, .. }));

        // single-flight: nothing while the first fetch is outstanding
        assert!(poller.due(t(6000)).requests.is_empty());

        let step = poller.on_response(t(200), first, PollResponse::Contacts(vec![contact(PEER, "Dana")]));
        assert_eq!(
            step.effects,
            vec![ChatEffect::ContactsUpdated(vec![contact(PEER, "Dana")])]
        );

        assert!(poller.due(t(5199)).requests.is_empty());
        assert_eq!(poller.due(t(5200)).requests.len(), 1);
        assert_eq!(poller.open(t(5300)), Step::default());
    }

    #[test]
    fn active_search_suspends_periodic_contact_refresh() {
        let mut poller = ChatPoller::new(PollIntervals::default());
        let first = poller.open(t(0)).requests[0].clone();

        let step = poller.set_search(t(100), "  dana ");
        let search_req = step.requests[0].clone();
        assert!(step.effects.is_empty());
        assert!(matches!(
            &search_req,
            PollRequest::Contacts { search: Some(term), .. } if term == "dana"
        ));

        // the unfiltered fetch started before the search is now stale
        assert_eq!(
            poller.on_response(t(150), first, PollResponse::Contacts(vec![contact(3, "Other")])),
            Step::default()
        );

        let step = poller.on_response(t(200), search_req, PollResponse::Contacts(vec![contact(PEER, "Dana")]));
        assert_eq!(step.effects.len(), 1);
        assert!(poller.due(t(60_000)).requests.is_empty());

        let step = poller.set_search(t(60_000), "");
        assert!(matches!(step.requests[0], PollRequest::Contacts { search: None, .. }));
    }

    #[test]
    fn selecting_a_contact_loads_the_whole_conversation_once() {
        let (mut poller, initial) = in_conversation();
        assert!(matches!(
            initial,
            PollRequest::Messages { peer_id: PEER, since: 0, initial: true, .. }
        ));

        poller.set_window_focus(false);
        poller.set_notification_permission(true);
        let step = poller.on_response(
            t(100),
            initial,
            PollResponse::Messages(vec![msg(1, PEER, "hi"), msg(2, ME, "hello")]),
        );
        assert_eq!(
            step.effects,
            vec![
                ChatEffect::MessagesAppended {
                    peer_id: PEER,
                    messages: vec![msg(1, PEER, "hi"), msg(2, ME, "hello")],
                },
                ChatEffect::ScrollToBottom,
            ]
        );
        assert_eq!(poller.last_seen_id(), 2);

        assert!(message_request(&poller.due(t(1599))).is_none());
        let next = message_request(&poller.due(t(1600))).unwrap();
        assert!(matches!(next, PollRequest::Messages { since: 2, initial: false, .. }));
    }

    #[test]
    fn message_poll_is_single_flight() {
        let (mut poller, initial) = in_conversation();
        poller.on_response(t(0), initial, PollResponse::Messages(vec![]));

        let req = message_request(&poller.due(t(1500))).unwrap();
        assert!(message_request(&poller.due(t(3000))).is_none());
        assert!(message_request(&poller.due(t(4500))).is_none());

        poller.on_response(t(5000), req, PollResponse::Messages(vec![]));
        assert!(message_request(&poller.due(t(6499))).is_none());
        assert!(message_request(&poller.due(t(6500))).is_some());
    }

    #[test]
    fn responses_for_a_previous_selection_are_discarded() {
        let mut poller = ChatPoller::new(PollIntervals::default());
        poller.open(t(0));
        let for_peer = poller.select_contact(t(0), PEER).requests[0].clone();
        let for_other = poller.select_contact(t(10), 3).requests[0].clone();

        let step = poller.on_response(t(20), for_peer, PollResponse::Messages(vec![msg(9, PEER, "late")]));
        assert_eq!(step, Step::default());
        assert_eq!(poller.last_seen_id(), 0);

        // the same peer selected again still counts as a new selection
        poller.select_contact(t(30), 3);
        let step = poller.on_response(t(40), for_other, PollResponse::Messages(vec![msg(5, 3, "x")]));
        assert_eq!(step, Step::default());
    }

    #[test]
    fn only_newer_ids_are_rendered() {
        let (mut poller, initial) = in_conversation();
        poller.on_response(t(0), initial, PollResponse::Messages(vec![msg(4, PEER, "a")]));

        let req = message_request(&poller.due(t(1500))).unwrap();
        let step = poller.on_response(
            t(1600),
            req,
            PollResponse::Messages(vec![msg(3, PEER, "old"), msg(4, PEER, "a"), msg(5, PEER, "b")]),
        );
        assert_eq!(
            step.effects[0],
            ChatEffect::MessagesAppended {
                peer_id: PEER,
                messages: vec![msg(5, PEER, "b")],
            }
        );
        assert_eq!(poller.last_seen_id(), 5);

        let req = message_request(&poller.due(t(3100))).unwrap();
        let step = poller.on_response(t(3200), req, PollResponse::Messages(vec![msg(5, PEER, "b")]));
        assert!(step.effects.is_empty());
    }

    #[test]
    fn scrolled_up_viewers_get_a_running_hint() {
        let (mut poller, initial) = in_conversation();
        poller.on_response(t(0), initial, PollResponse::Messages(vec![msg(1, PEER, "a")]));
        assert_eq!(poller.set_viewport_at_bottom(false), Step::default());

        let req = message_request(&poller.due(t(1500))).unwrap();
        let step = poller.on_response(t(1500), req, PollResponse::Messages(vec![msg(2, PEER, "b")]));
        assert_eq!(step.effects[1], ChatEffect::NewMessagesHint { count: 1 });

        let req = message_request(&poller.due(t(3000))).unwrap();
        let step = poller.on_response(
            t(3000),
            req,
            PollResponse::Messages(vec![msg(3, PEER, "c"), msg(4, ME, "d")]),
        );
        assert_eq!(step.effects[1], ChatEffect::NewMessagesHint { count: 3 });
        assert_eq!(poller.pending_new(), 3);

        let step = poller.set_viewport_at_bottom(true);
        assert_eq!(step.effects, vec![ChatEffect::NewMessagesHint { count: 0 }]);
        assert_eq!(poller.pending_new(), 0);
    }

    #[test]
    fn desktop_notifications_need_blur_permission_and_a_peer_message() {
        let (mut poller, initial) = in_conversation();
        poller.on_response(t(0), initial, PollResponse::Messages(vec![]));

        let poll = |poller: &mut ChatPoller, at: i64, messages: Vec<ChatMessage>| {
            let req = message_request(&poller.due(t(at))).unwrap();
            poller
                .on_response(t(at), req, PollResponse::Messages(messages))
                .effects
                .into_iter()
                .filter(|e| matches!(e, ChatEffect::DesktopNotification { .. }))
                .collect::<Vec<_>>()
        };

        // focused window
        poller.set_notification_permission(true);
        assert!(poll(&mut poller, 1500, vec![msg(1, PEER, "a")]).is_empty());

        // blurred but no permission
        poller.set_window_focus(false);
        poller.set_notification_permission(false);
        assert!(poll(&mut poller, 3000, vec![msg(2, PEER, "b")]).is_empty());

        poller.set_notification_permission(true);
        let notes = poll(&mut poller, 4500, vec![msg(3, ME, "mine"), msg(4, PEER, "theirs")]);
        assert_eq!(
            notes,
            vec![ChatEffect::DesktopNotification {
                peer_id: PEER,
                title: "Dana Peer".to_string(),
                body: "theirs".to_string(),
            }]
        );
    }

    #[test]
    fn back_and_close_cancel_panel_timers() {
        let (mut poller, initial) = in_conversation();
        poller.start(t(0));
        poller.on_response(t(0), PollRequest::UnreadCount, PollResponse::UnreadCount(0));

        let step = poller.back(t(100));
        assert_eq!(step.effects, vec![ChatEffect::PanelChanged(PanelState::Contacts)]);
        assert!(matches!(step.requests[0], PollRequest::Contacts { .. }));
        assert_eq!(poller.state(), PanelState::Contacts);

        // the conversation's in-flight fetch no longer applies
        let late = poller.on_response(t(200), initial, PollResponse::Messages(vec![msg(1, PEER, "x")]));
        assert_eq!(late, Step::default());
        assert!(message_request(&poller.due(t(60_000))).is_none());
        assert_eq!(poller.back(t(60_000)), Step::default());

        let step = poller.close();
        assert_eq!(step.effects, vec![ChatEffect::PanelChanged(PanelState::Closed)]);
        poller.on_response(t(60_000), PollRequest::UnreadCount, PollResponse::UnreadCount(0));
        let due = poller.due(t(120_000));
        assert_eq!(due.requests, vec![PollRequest::UnreadCount]);
        assert_eq!(poller.select_contact(t(120_000), PEER), Step::default());
    }

    #[test]
    fn poll_failures_are_silent_and_retried() {
        let (mut poller, initial) = in_conversation();
        poller.on_poll_failed(t(100), &initial, &ClientError::Status(502));
        assert!(message_request(&poller.due(t(1599))).is_none());
        assert!(message_request(&poller.due(t(1600))).is_some());
    }

    #[test]
    fn user_action_failures_raise_alerts() {
        let mut poller = ChatPoller::new(PollIntervals::default());
        let step = poller.on_action_failed(
            UserAction::UploadFile,
            &ClientError::Server("File too large (max 10MB)".into()),
        );
        assert_eq!(
            step.effects,
            vec![ChatEffect::Alert("File too large (max 10MB)".into())]
        );

        let step = poller.on_action_failed(UserAction::SendMessage, &ClientError::Status(502));
        assert_eq!(
            step.effects,
            vec![ChatEffect::Alert("Failed to send message".into())]
        );
    }

    #[test]
    fn sending_triggers_an_immediate_fetch() {
        let (mut poller, initial) = in_conversation();
        assert!(message_request(&poller.refresh_messages(t(50))).is_none());

        poller.on_response(t(100), initial, PollResponse::Messages(vec![msg(1, PEER, "a")]));
        let req = message_request(&poller.refresh_messages(t(200))).unwrap();
        assert!(matches!(req, PollRequest::Messages { since: 1, initial: false, .. }));
    }

    #[test]
    fn previews_prefer_text_then_file_name() {
        let mut m = msg(1, PEER, "  hello  ");
        assert_eq!(preview(&m), "hello");
        m.message = None;
        m.file_name = Some("roster.pdf".into());
        assert_eq!(preview(&m), "Sent a file: roster.pdf");
        m.file_name = None;
        assert_eq!(preview(&m), "New message");
    }
}
