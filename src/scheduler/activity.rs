use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    FullReport,
    ChangeCheck,
    ManualReport,
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::FullReport => "Full report",
            Self::ChangeCheck => "Change check",
            Self::ManualReport => "Manual report",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Idle,
    Fetching,
    Notifying,
}

impl Display for ActivityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Notifying => "notifying",
        };
        write!(f, "{display}")
    }
}

/// One schedulable pipeline. At most one run is outstanding at a time.
#[derive(Debug)]
pub struct Activity {
    kind: ActivityKind,
    period: Option<Duration>,
    busy: AtomicBool,
    state: Mutex<ActivityState>,
    next_fire: Mutex<Option<DateTime<Utc>>>,
}

impl Activity {
    pub fn periodic(kind: ActivityKind, period: Duration) -> Arc<Self> {
        Arc::new(Self::build(kind, Some(period)))
    }

    pub fn on_demand(kind: ActivityKind) -> Arc<Self> {
        Arc::new(Self::build(kind, None))
    }

    fn build(kind: ActivityKind, period: Option<Duration>) -> Self {
        Self {
            kind,
            period,
            busy: AtomicBool::new(false),
            state: Mutex::new(ActivityState::Idle),
            next_fire: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Marks the activity busy, or returns `None` if a run is still outstanding.
    pub fn try_begin(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(BusyGuard {
            activity: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ActivityState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: ActivityState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        *self.next_fire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_next_fire(&self, at: DateTime<Utc>) {
        *self.next_fire.lock().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    /// Moves the next-fire timestamp one period past `now`.
    pub fn advance(&self, now: DateTime<Utc>) {
        let Some(period) = self.period else {
            return;
        };
        let step = chrono::Duration::from_std(period).unwrap_or(chrono::Duration::MAX);
        let next = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.set_next_fire(next);
    }

    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_fire()?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Clears the busy flag and resets the state when the run ends, on any path.
#[derive(Debug)]
pub struct BusyGuard {
    activity: Arc<Activity>,
}

impl BusyGuard {
    pub fn activity(&self) -> &Activity {
        &self.activity
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.activity.set_state(ActivityState::Idle);
        self.activity.busy.store(false, Ordering::Release);
    }
}

pub fn format_remaining(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
