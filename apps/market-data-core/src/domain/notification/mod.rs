//! Notification Types
//!
//! In-memory ledger of notification records with a monotonic status
//! lifecycle (`unread → read → archived`, archived terminal) and the
//! delivery preferences consulted before any user-visible side effect.
//!
//! Preferences gate sound/desktop delivery only. The record itself is
//! always created and retrievable, even while quiet hours suppress the
//! side effects.

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Notification priority, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationPriority {
    /// Informational.
    Low,
    /// Normal priority.
    Medium,
    /// Important.
    High,
    /// Must-see.
    Critical,
}

impl NotificationPriority {
    /// Get the priority name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Notification read status. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    /// Not yet seen.
    Unread,
    /// Seen by the user.
    Read,
    /// Archived; terminal.
    Archived,
}

/// A stored notification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Unique notification id.
    pub id: Uuid,
    /// Producer-defined kind, e.g. `"price_alert"`.
    pub kind: String,
    /// Delivery priority.
    pub priority: NotificationPriority,
    /// Short title.
    pub title: String,
    /// Full message body.
    pub message: String,
    /// Current read status.
    pub status: NotificationStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Set iff status is read or archived.
    pub read_at: Option<DateTime<Utc>>,
    /// Set iff status is archived.
    pub archived_at: Option<DateTime<Utc>>,
}

/// Fields a producer supplies when creating a notification.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    /// Producer-defined kind.
    pub kind: String,
    /// Delivery priority.
    pub priority: NotificationPriority,
    /// Short title.
    pub title: String,
    /// Full message body.
    pub message: String,
}

// =============================================================================
// Preferences
// =============================================================================

/// A local-time window during which sound/desktop delivery is suppressed.
///
/// The window is `[start, end)` and wraps past midnight when
/// `start > end` (e.g. 22:00–08:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    /// Whether the window is enforced at all.
    pub enabled: bool,
    /// Window start, local wall time.
    pub start: NaiveTime,
    /// Window end (exclusive), local wall time.
    pub end: NaiveTime,
}

impl QuietHours {
    /// Check whether `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }

        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            // Wraps past midnight
            time >= self.start || time < self.end
        }
    }
}

/// Process-wide delivery preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPreferences {
    /// Whether to play an audible alert.
    pub enable_sound: bool,
    /// Whether to raise a desktop popup.
    pub enable_desktop: bool,
    /// Notifications below this priority are delivered silently.
    pub minimum_priority: NotificationPriority,
    /// Suppression window.
    pub quiet_hours: QuietHours,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enable_sound: true,
            enable_desktop: true,
            minimum_priority: NotificationPriority::Low,
            quiet_hours: QuietHours {
                enabled: false,
                start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
                end: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            },
        }
    }
}

/// Partial update applied over the current preferences.
#[derive(Debug, Clone, Default)]
pub struct PreferencesUpdate {
    /// New sound setting, if changing.
    pub enable_sound: Option<bool>,
    /// New desktop setting, if changing.
    pub enable_desktop: Option<bool>,
    /// New minimum priority, if changing.
    pub minimum_priority: Option<NotificationPriority>,
    /// New quiet-hours window, if changing.
    pub quiet_hours: Option<QuietHours>,
}

/// Which side effects a new notification may produce.
///
/// Computed from the preferences at creation time; the record itself is
/// created regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryDecision {
    /// Play the audible alert.
    pub sound: bool,
    /// Raise the desktop popup.
    pub desktop: bool,
}

impl DeliveryDecision {
    /// Whether any side effect is allowed.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.sound || self.desktop
    }
}

impl NotificationPreferences {
    /// Decide which side effects a notification of `priority` may produce
    /// at local time `now`.
    #[must_use]
    pub fn delivery_decision(
        &self,
        priority: NotificationPriority,
        now: NaiveTime,
    ) -> DeliveryDecision {
        if priority < self.minimum_priority || self.quiet_hours.contains(now) {
            return DeliveryDecision::default();
        }

        DeliveryDecision {
            sound: self.enable_sound,
            desktop: self.enable_desktop,
        }
    }
}

// =============================================================================
// Notification Store
// =============================================================================

struct StoreState {
    notifications: HashMap<Uuid, Notification>,
    preferences: NotificationPreferences,
}

/// In-memory notification ledger plus the process-wide preferences.
///
/// Constructed once per process and passed by reference to collaborators;
/// there is no hidden module-level instance. All mutating calls on unknown
/// ids return `false` rather than failing.
pub struct NotificationStore {
    inner: RwLock<StoreState>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store with default preferences.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState {
                notifications: HashMap::new(),
                preferences: NotificationPreferences::default(),
            }),
        }
    }

    /// Create a notification record and decide its side effects.
    ///
    /// The record is always stored with status unread; the returned
    /// [`DeliveryDecision`] tells the caller which user-visible side
    /// effects the current preferences allow.
    pub fn add_notification(&self, draft: NotificationDraft) -> (Uuid, DeliveryDecision) {
        self.add_notification_at(draft, Local::now().time())
    }

    /// Create a notification, evaluating preferences at an explicit local
    /// wall time. Split out for deterministic quiet-hours tests.
    pub fn add_notification_at(
        &self,
        draft: NotificationDraft,
        local_time: NaiveTime,
    ) -> (Uuid, DeliveryDecision) {
        let id = Uuid::new_v4();
        let mut state = self.inner.write();

        let decision = state.preferences.delivery_decision(draft.priority, local_time);

        let notification = Notification {
            id,
            kind: draft.kind,
            priority: draft.priority,
            title: draft.title,
            message: draft.message,
            status: NotificationStatus::Unread,
            created_at: Utc::now(),
            read_at: None,
            archived_at: None,
        };

        state.notifications.insert(id, notification);

        if !decision.any() {
            tracing::debug!(%id, "notification side effects suppressed by preferences");
        }

        (id, decision)
    }

    /// Mark a notification read.
    ///
    /// Returns `false` for unknown ids. Idempotent when already read; a
    /// no-op on archived records (archived is terminal).
    pub fn mark_as_read(&self, id: Uuid) -> bool {
        let mut state = self.inner.write();

        let Some(notification) = state.notifications.get_mut(&id) else {
            return false;
        };

        if notification.status == NotificationStatus::Unread {
            notification.status = NotificationStatus::Read;
            notification.read_at = Some(Utc::now());
        }

        true
    }

    /// Archive a notification from any prior status.
    ///
    /// Returns `false` for unknown ids. Archiving an unread record also
    /// stamps `read_at`, preserving the invariant that `read_at` is set
    /// iff the status is read or archived.
    pub fn archive_notification(&self, id: Uuid) -> bool {
        let now = Utc::now();
        let mut state = self.inner.write();

        let Some(notification) = state.notifications.get_mut(&id) else {
            return false;
        };

        if notification.status != NotificationStatus::Archived {
            notification.status = NotificationStatus::Archived;
            notification.archived_at = Some(now);
            if notification.read_at.is_none() {
                notification.read_at = Some(now);
            }
        }

        true
    }

    /// Remove a record entirely. Returns `false` for unknown ids.
    pub fn delete_notification(&self, id: Uuid) -> bool {
        self.inner.write().notifications.remove(&id).is_some()
    }

    /// Get a snapshot of one record.
    #[must_use]
    pub fn notification(&self, id: Uuid) -> Option<Notification> {
        self.inner.read().notifications.get(&id).cloned()
    }

    /// Snapshot of all unread notifications, newest first.
    #[must_use]
    pub fn unread_notifications(&self) -> Vec<Notification> {
        let mut unread: Vec<Notification> = self
            .inner
            .read()
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Unread)
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inner
            .read()
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Unread)
            .count()
    }

    /// Snapshot of the current preferences.
    #[must_use]
    pub fn preferences(&self) -> NotificationPreferences {
        self.inner.read().preferences.clone()
    }

    /// Apply a partial preferences update.
    pub fn update_preferences(&self, update: PreferencesUpdate) {
        let mut state = self.inner.write();

        if let Some(v) = update.enable_sound {
            state.preferences.enable_sound = v;
        }
        if let Some(v) = update.enable_desktop {
            state.preferences.enable_desktop = v;
        }
        if let Some(v) = update.minimum_priority {
            state.preferences.minimum_priority = v;
        }
        if let Some(v) = update.quiet_hours {
            state.preferences.quiet_hours = v;
        }
    }

    /// Reset preferences to the defaults.
    pub fn reset_preferences(&self) {
        self.inner.write().preferences = NotificationPreferences::default();
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().notifications.len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().notifications.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
