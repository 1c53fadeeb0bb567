//! Notification bell.
//!
//! Two separate notions of state live here. *Read* is server-side and
//! removes a notification from every future check. *Seen* is local: it only
//! stops the sound and bell animation from repeating for something the user
//! has already been alerted about, and it expires after a day.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use portal_types::models::Notification;

use crate::timer::PollTimer;
use crate::transport::ClientError;

pub const SEEN_TTL_HOURS: i64 = 24;
pub const CHECK_INTERVAL_SECS: i64 = 30;

/// Notification ids the user has already been alerted about, with the time
/// they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeenSet {
    entries: HashMap<i64, DateTime<Utc>>,
}

impl SeenSet {
    /// Records `id` as seen. Returns true if it was not already seen.
    pub fn insert(&mut self, id: i64, now: DateTime<Utc>) -> bool {
        if self.contains(id, now) {
            return false;
        }
        self.entries.insert(id, now);
        true
    }

    pub fn contains(&self, id: i64, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|seen_at| now - *seen_at < Duration::hours(SEEN_TTL_HOURS))
    }

    /// Drops expired entries, returning how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, seen_at| now - *seen_at < Duration::hours(SEEN_TTL_HOURS));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub trait SeenStorage: Send + 'static {
    fn load(&self) -> Result<SeenSet, ClientError>;
    fn save(&self, seen: &SeenSet) -> Result<(), ClientError>;
}

/// Persists the seen set as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSeenStorage {
    path: PathBuf,
}

impl FileSeenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SeenStorage for FileSeenStorage {
    fn load(&self) -> Result<SeenSet, ClientError> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SeenSet::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, seen: &SeenSet) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(seen)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySeenStorage {
    stored: Mutex<SeenSet>,
}

impl MemorySeenStorage {
    pub fn snapshot(&self) -> SeenSet {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SeenStorage for MemorySeenStorage {
    fn load(&self) -> Result<SeenSet, ClientError> {
        Ok(self.snapshot())
    }

    fn save(&self, seen: &SeenSet) -> Result<(), ClientError> {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = seen.clone();
        Ok(())
    }
}

impl<T: SeenStorage + Sync> SeenStorage for Arc<T> {
    fn load(&self) -> Result<SeenSet, ClientError> {
        (**self).load()
    }

    fn save(&self, seen: &SeenSet) -> Result<(), ClientError> {
        (**self).save(seen)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEffect {
    PlaySound,
    ShakeBell,
    Render(Vec<Notification>),
    Badge { count: usize },
}

pub struct NotificationWidget<S: SeenStorage> {
    storage: S,
    seen: SeenSet,
    items: Vec<Notification>,
    timer: PollTimer,
}

impl<S: SeenStorage> NotificationWidget<S> {
    /// Loads the seen set; an unreadable store starts empty rather than
    /// blocking the widget.
    pub fn new(storage: S, now: DateTime<Utc>) -> Self {
        let mut seen = storage.load().unwrap_or_else(|e| {
            warn!("Could not load seen notifications: {}", e);
            SeenSet::default()
        });
        seen.prune(now);

        let mut timer = PollTimer::new(Duration::seconds(CHECK_INTERVAL_SECS));
        timer.restart(now);
        timer.complete(now);
        timer.expedite(now);

        Self {
            storage,
            seen,
            items: Vec::new(),
            timer,
        }
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    /// True when a check should be issued now. Marks it outstanding.
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        self.timer.poll(now)
    }

    /// Applies a check result. New ids alert exactly once per check, however
    /// many of them arrived.
    pub fn on_check(&mut self, now: DateTime<Utc>, notifications: Vec<Notification>) -> Vec<WidgetEffect> {
        self.timer.complete(now);

        let mut fresh = 0;
        for n in &notifications {
            if self.seen.insert(n.id, now) {
                fresh += 1;
            }
        }
        let expired = self.seen.prune(now);

        let mut effects = Vec::new();
        if fresh > 0 {
            debug!("{} new notifications", fresh);
            effects.push(WidgetEffect::PlaySound);
            effects.push(WidgetEffect::ShakeBell);
        }
        if fresh > 0 || expired > 0 {
            if let Err(e) = self.storage.save(&self.seen) {
                warn!("Could not persist seen notifications: {}", e);
            }
        }

        self.items = notifications;
        effects.extend(self.render());
        effects
    }

    pub fn on_check_failed(&mut self, now: DateTime<Utc>, error: &ClientError) {
        warn!("Notification check failed: {}", error);
        self.timer.complete(now);
    }

    /// Removes the item locally. The caller then tells the server.
    pub fn mark_read(&mut self, notification_id: i64) -> Vec<WidgetEffect> {
        self.items.retain(|n| n.id != notification_id);
        self.render()
    }

    pub fn mark_all_read(&mut self) -> Vec<WidgetEffect> {
        self.items.clear();
        self.render()
    }

    /// Local state is not restored; the next check reconciles.
    pub fn on_dismiss_failed(&self, error: &ClientError) {
        warn!("Failed to mark notifications read: {}", error);
    }

    fn render(&self) -> Vec<WidgetEffect> {
        vec![
            WidgetEffect::Render(self.items.clone()),
            WidgetEffect::Badge {
                count: self.items.len(),
            },
        ]
    }
}
