//! Async loop that owns the chat poller and notification widget.
//!
//! UI input arrives as [`UiCommand`]s; everything the UI should show is sent
//! back as [`ClientEvent`]s. Network calls run on a `JoinSet` so a slow
//! request never blocks input handling.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use portal_types::models::Notification;

use crate::clock::Clock;
use crate::poller::{ChatEffect, ChatPoller, PollIntervals, PollRequest, PollResponse, Step, UserAction};
use crate::transport::{ChatTransport, ClientError, NotificationTransport, OutgoingFile};
use crate::widget::{NotificationWidget, SeenStorage, WidgetEffect};

const TICK: StdDuration = StdDuration::from_millis(250);

#[derive(Debug)]
pub enum UiCommand {
    OpenPanel,
    ClosePanel,
    Back,
    SelectContact(i64),
    Search(String),
    Send(String),
    Upload {
        file: OutgoingFile,
        caption: Option<String>,
    },
    ViewportAtBottom(bool),
    WindowFocus(bool),
    NotificationPermission(bool),
    MarkNotificationRead(i64),
    MarkAllNotificationsRead,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Chat(ChatEffect),
    Notifications(WidgetEffect),
}

enum Outcome {
    Poll(PollRequest, Result<PollResponse, ClientError>),
    Check(Result<Vec<Notification>, ClientError>),
    Action(UserAction, Result<(), ClientError>),
    Dismiss(Result<(), ClientError>),
}

pub struct Driver<T, C, S: SeenStorage> {
    transport: Arc<T>,
    clock: C,
    poller: ChatPoller,
    widget: NotificationWidget<S>,
    events: mpsc::Sender<ClientEvent>,
    tasks: JoinSet<Outcome>,
}

impl<T, C, S> Driver<T, C, S>
where
    T: ChatTransport + NotificationTransport,
    C: Clock,
    S: SeenStorage,
{
    pub fn new(
        transport: Arc<T>,
        clock: C,
        seen: S,
        intervals: PollIntervals,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        let now = clock.now();
        Self {
            transport,
            widget: NotificationWidget::new(seen, now),
            poller: ChatPoller::new(intervals),
            clock,
            events,
            tasks: JoinSet::new(),
        }
    }

    /// Runs until the command channel closes or the event receiver is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UiCommand>) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let step = self.poller.start(self.clock.now());
        if !self.apply(step).await {
            return;
        }

        loop {
            let keep_going = tokio::select! {
                _ = tick.tick() => self.on_tick().await,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        info!("Command channel closed, stopping client");
                        false
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(outcome) => self.on_outcome(outcome).await,
                    Err(e) => {
                        warn!("Client task failed: {}", e);
                        true
                    }
                },
            };
            if !keep_going {
                break;
            }
        }

        self.tasks.abort_all();
    }

    async fn on_tick(&mut self) -> bool {
        let now = self.clock.now();
        if self.widget.due(now) {
            let transport = self.transport.clone();
            self.tasks
                .spawn(async move { Outcome::Check(transport.check().await) });
        }
        let step = self.poller.due(now);
        self.apply(step).await
    }

    async fn on_command(&mut self, cmd: UiCommand) -> bool {
        let now = self.clock.now();
        match cmd {
            UiCommand::OpenPanel => {
                let step = self.poller.open(now);
                self.apply(step).await
            }
            UiCommand::ClosePanel => {
                let step = self.poller.close();
                self.apply(step).await
            }
            UiCommand::Back => {
                let step = self.poller.back(now);
                self.apply(step).await
            }
            UiCommand::SelectContact(peer_id) => {
                let step = self.poller.select_contact(now, peer_id);
                self.apply(step).await
            }
            UiCommand::Search(term) => {
                let step = self.poller.set_search(now, &term);
                self.apply(step).await
            }
            UiCommand::Send(body) => {
                let Some(peer_id) = self.poller.current_peer() else {
                    debug!("Send with no conversation open");
                    return true;
                };
                let body = body.trim().to_string();
                if body.is_empty() {
                    return true;
                }
                let transport = self.transport.clone();
                self.tasks.spawn(async move {
                    Outcome::Action(
                        UserAction::SendMessage,
                        transport.send_message(peer_id, &body).await,
                    )
                });
                true
            }
            UiCommand::Upload { file, caption } => {
                let Some(peer_id) = self.poller.current_peer() else {
                    debug!("Upload with no conversation open");
                    return true;
                };
                let transport = self.transport.clone();
                self.tasks.spawn(async move {
                    Outcome::Action(
                        UserAction::UploadFile,
                        transport.upload_file(peer_id, file, caption.as_deref()).await,
                    )
                });
                true
            }
            UiCommand::ViewportAtBottom(at_bottom) => {
                let step = self.poller.set_viewport_at_bottom(at_bottom);
                self.apply(step).await
            }
            UiCommand::WindowFocus(focused) => {
                self.poller.set_window_focus(focused);
                true
            }
            UiCommand::NotificationPermission(granted) => {
                self.poller.set_notification_permission(granted);
                true
            }
            UiCommand::MarkNotificationRead(id) => {
                let effects = self.widget.mark_read(id);
                let transport = self.transport.clone();
                self.tasks
                    .spawn(async move { Outcome::Dismiss(transport.mark_read(id).await) });
                self.emit_widget(effects).await
            }
            UiCommand::MarkAllNotificationsRead => {
                let effects = self.widget.mark_all_read();
                let transport = self.transport.clone();
                self.tasks
                    .spawn(async move { Outcome::Dismiss(transport.mark_all_read().await) });
                self.emit_widget(effects).await
            }
        }
    }

    async fn on_outcome(&mut self, outcome: Outcome) -> bool {
        let now = self.clock.now();
        match outcome {
            Outcome::Poll(request, Ok(response)) => {
                let step = self.poller.on_response(now, request, response);
                self.apply(step).await
            }
            Outcome::Poll(request, Err(e)) => {
                self.poller.on_poll_failed(now, &request, &e);
                true
            }
            Outcome::Check(Ok(notifications)) => {
                let effects = self.widget.on_check(now, notifications);
                self.emit_widget(effects).await
            }
            Outcome::Check(Err(e)) => {
                self.widget.on_check_failed(now, &e);
                true
            }
            Outcome::Action(_, Ok(())) => {
                let step = self.poller.refresh_messages(now);
                self.apply(step).await
            }
            Outcome::Action(action, Err(e)) => {
                let step = self.poller.on_action_failed(action, &e);
                self.apply(step).await
            }
            Outcome::Dismiss(Ok(())) => true,
            Outcome::Dismiss(Err(e)) => {
                self.widget.on_dismiss_failed(&e);
                true
            }
        }
    }

    /// Issues the step's requests and forwards its effects. Returns false once
    /// nobody is listening.
    async fn apply(&mut self, step: Step) -> bool {
        for request in step.requests {
            let transport = self.transport.clone();
            self.tasks.spawn(async move {
                let response = execute(transport.as_ref(), &request).await;
                Outcome::Poll(request, response)
            });
        }
        for effect in step.effects {
            if self.events.send(ClientEvent::Chat(effect)).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn emit_widget(&mut self, effects: Vec<WidgetEffect>) -> bool {
        for effect in effects {
            if self
                .events
                .send(ClientEvent::Notifications(effect))
                .await
                .is_err()
            {
                return false;
            }
        }
        true
    }
}

async fn execute<T: ChatTransport>(transport: &T, request: &PollRequest) -> Result<PollResponse, ClientError> {
    match request {
        PollRequest::Contacts { search, .. } => transport
            .get_contacts(search.as_deref())
            .await
            .map(PollResponse::Contacts),
        PollRequest::Messages { peer_id, since, .. } => transport
            .get_messages(*peer_id, *since)
            .await
            .map(PollResponse::Messages),
        PollRequest::UnreadCount => transport.unread_count().await.map(PollResponse::UnreadCount),
    }
}
