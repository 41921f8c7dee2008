use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alert::format::{render_changes, render_report, FETCH_FAILED_MESSAGE};
use crate::alert::sink::NotificationSink;
use crate::changes::diff;
use crate::error::{AuthFailure, FetchFailure};
use crate::portal::session::SessionManager;
use crate::scheduler::activity::{format_remaining, Activity, ActivityKind, ActivityState};
use crate::types::{Delta, Snapshot};

pub const MANUAL_REPORT_BUSY_MESSAGE: &str = "A report is already being prepared.";

#[derive(Debug, Clone)]
pub struct Destinations {
    pub reports: String,
    pub changes: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub full_report: Duration,
    pub change_check: Duration,
}

/// Session and baseline are one resource: every cycle holds both or neither.
struct Shared {
    session: SessionManager,
    previous: Snapshot,
}

#[derive(Debug)]
pub enum TickOutcome {
    Started,
    Skipped,
}

pub struct Orchestrator {
    shared: Mutex<Shared>,
    sink: Arc<dyn NotificationSink>,
    destinations: Destinations,
    full_report: Arc<Activity>,
    change_check: Arc<Activity>,
    manual_report: Arc<Activity>,
}

impl Orchestrator {
    pub fn new(
        session: SessionManager,
        sink: Arc<dyn NotificationSink>,
        destinations: Destinations,
        intervals: Intervals,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Mutex::new(Shared {
                session,
                previous: Snapshot::new(),
            }),
            sink,
            destinations,
            full_report: Activity::periodic(ActivityKind::FullReport, intervals.full_report),
            change_check: Activity::periodic(ActivityKind::ChangeCheck, intervals.change_check),
            manual_report: Activity::on_demand(ActivityKind::ManualReport),
        })
    }

    pub fn activity(&self, kind: ActivityKind) -> &Arc<Activity> {
        match kind {
            ActivityKind::FullReport => &self.full_report,
            ActivityKind::ChangeCheck => &self.change_check,
            ActivityKind::ManualReport => &self.manual_report,
        }
    }

    /// Clone of the baseline the next change check will diff against.
    pub async fn previous_snapshot(&self) -> Snapshot {
        self.shared.lock().await.previous.clone()
    }

    async fn fetch_snapshot(&self, activity: &Activity) -> Result<Snapshot, FetchFailure> {
        let mut shared = self.shared.lock().await;
        activity.set_state(ActivityState::Fetching);
        shared.session.fetch_snapshot().await
    }

    async fn notify(&self, activity: &Activity, destination: &str, text: &str) {
        activity.set_state(ActivityState::Notifying);
        if let Err(err) = self.sink.send(destination, text).await {
            warn!("{}: failed sending notification: {err:#}", activity.kind());
        }
    }

    /// Leaves the activity idle whether or not the cycle succeeded.
    pub async fn run_full_report(&self) -> Result<(), FetchFailure> {
        let result = self.full_report_cycle().await;
        self.full_report.set_state(ActivityState::Idle);
        result
    }

    /// Diffs against the baseline and replaces it, whether or not anything
    /// changed. Leaves the activity idle afterwards.
    pub async fn run_change_check(&self) -> Result<Vec<Delta>, FetchFailure> {
        let result = self.change_check_cycle().await;
        self.change_check.set_state(ActivityState::Idle);
        result
    }

    async fn full_report_cycle(&self) -> Result<(), FetchFailure> {
        let activity = &self.full_report;
        let snapshot = self.fetch_snapshot(activity).await?;
        info!("full report: {} courses", snapshot.len());
        self.notify(activity, &self.destinations.reports, &render_report(&snapshot))
            .await;
        Ok(())
    }

    async fn change_check_cycle(&self) -> Result<Vec<Delta>, FetchFailure> {
        let activity = &self.change_check;
        let deltas = {
            let mut shared = self.shared.lock().await;
            activity.set_state(ActivityState::Fetching);
            let current = shared.session.fetch_snapshot().await?;
            let deltas = diff(&shared.previous, &current);
            shared.previous = current;
            deltas
        };
        info!("change check: {} deltas", deltas.len());
        if let Some(text) = render_changes(&deltas) {
            self.notify(activity, &self.destinations.changes, &text).await;
        }
        Ok(deltas)
    }

    pub async fn request_full_report(&self) -> String {
        let Some(guard) = self.manual_report.try_begin() else {
            return MANUAL_REPORT_BUSY_MESSAGE.to_string();
        };
        let text = match self.fetch_snapshot(guard.activity()).await {
            Ok(snapshot) => render_report(&snapshot),
            Err(err) => {
                warn!("manual report failed: {err}");
                FETCH_FAILED_MESSAGE.to_string()
            }
        };
        drop(guard);
        text
    }

    pub async fn request_reauthentication(&self) -> Result<(), AuthFailure> {
        let mut shared = self.shared.lock().await;
        shared.session.invalidate();
        shared.session.authenticate().await
    }

    /// Reads next-fire timestamps only; never touches the portal.
    pub fn request_schedule_status(&self) -> String {
        let now = Utc::now();
        [&self.full_report, &self.change_check]
            .iter()
            .map(|activity| {
                let when = activity
                    .time_until_next(now)
                    .map(|d| format!("next run in {}", format_remaining(d)))
                    .unwrap_or_else(|| "not scheduled".to_string());
                format!("{}: {when} ({})", activity.kind(), activity.state())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Handles one period of a scheduled activity. The next-fire time always
    /// advances; the cycle is skipped when the previous one is still running.
    /// On-demand activities have no period and ignore ticks.
    pub fn tick(self: &Arc<Self>, kind: ActivityKind, tasks: &mut JoinSet<()>) -> TickOutcome {
        let activity = self.activity(kind);
        if activity.period().is_none() {
            debug!("{kind} runs on request only, ignoring tick");
            return TickOutcome::Skipped;
        }
        activity.advance(Utc::now());
        let Some(guard) = activity.try_begin() else {
            warn!("{kind}: previous run still in progress, skipping this tick");
            return TickOutcome::Skipped;
        };
        let this = Arc::clone(self);
        tasks.spawn(async move {
            let result = if kind == ActivityKind::FullReport {
                this.run_full_report().await
            } else {
                this.run_change_check().await.map(|_| ())
            };
            if let Err(err) = result {
                warn!("{kind} failed, waiting for next tick: {err}");
            }
            drop(guard);
        });
        TickOutcome::Started
    }

    async fn run_schedule(self: Arc<Self>, kind: ActivityKind) {
        let Some(period) = self.activity(kind).period() else {
            return;
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.activity(kind).set_next_fire(Utc::now());
        let mut tasks = JoinSet::new();
        info!("{kind} scheduled every {}", format_remaining(period));
        loop {
            interval.tick().await;
            while tasks.try_join_next().is_some() {}
            self.tick(kind, &mut tasks);
        }
    }

    /// Starts both periodic activities. Aborting the returned handles drops
    /// their in-flight cycles too.
    pub fn spawn_schedules(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        [ActivityKind::FullReport, ActivityKind::ChangeCheck]
            .into_iter()
            .map(|kind| tokio::spawn(Arc::clone(self).run_schedule(kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use tokio::task::JoinSet;

    use super::{Destinations, Intervals, Orchestrator, TickOutcome};
    use crate::alert::format::{FETCH_FAILED_MESSAGE, NO_DATA_MESSAGE};
    use crate::alert::sink::NotificationSink;
    use crate::config::Credentials;
    use crate::error::TransportError;
    use crate::portal::http::{PortalResponse, PortalTransport};
    use crate::portal::session::testing::{ScriptedTransport, GRADEBOOK_PAGE};
    use crate::portal::session::SessionManager;
    use crate::portal::PortalUrls;
    use crate::scheduler::activity::{ActivityKind, ActivityState};
    use crate::types::DeltaKind;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().expect("sink mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, destination: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .expect("sink mutex poisoned")
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// Holds gradebook requests until a permit is released.
    struct GatedTransport {
        inner: ScriptedTransport,
        gate: Semaphore,
    }

    #[async_trait]
    impl PortalTransport for GatedTransport {
        async fn get(
            &self,
            url: &str,
            cookie: Option<&str>,
        ) -> Result<PortalResponse, TransportError> {
            if url.contains("Gradebook") {
                self.gate.acquire().await.expect("gate closed").forget();
            }
            self.inner.get(url, cookie).await
        }

        async fn post_form(
            &self,
            url: &str,
            cookie: Option<&str>,
            form: &[(String, String)],
        ) -> Result<PortalResponse, TransportError> {
            self.inner.post_form(url, cookie, form).await
        }
    }

    fn orchestrator(
        transport: Arc<dyn PortalTransport>,
        sink: Arc<RecordingSink>,
    ) -> Arc<Orchestrator> {
        let session = SessionManager::new(
            transport,
            PortalUrls::from_base("https://portal.example.org"),
            Credentials {
                username: "student".to_string(),
                password: "secret".to_string(),
            },
        );
        Orchestrator::new(
            session,
            sink,
            Destinations {
                reports: "reports-hook".to_string(),
                changes: "changes-hook".to_string(),
            },
            Intervals {
                full_report: Duration::from_secs(6 * 3600),
                change_check: Duration::from_secs(900),
            },
        )
    }

    #[tokio::test]
    async fn change_check_replaces_baseline_even_without_changes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_login();
        transport.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        transport.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport.clone(), sink.clone());

        let first = orchestrator.run_change_check().await.expect("first check");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, DeltaKind::Added);
        assert!(orchestrator.previous_snapshot().await.contains("Math"));

        let second = orchestrator.run_change_check().await.expect("second check");
        assert!(second.is_empty());

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "changes-hook");
        assert!(sent[0].1.contains("+ Math"));
    }

    #[tokio::test]
    async fn failed_change_check_keeps_baseline() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_login();
        transport.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport.clone(), sink.clone());
        orchestrator.run_change_check().await.expect("baseline");

        // Nothing else scripted: fetch and re-authentication both fail.
        assert!(orchestrator.run_change_check().await.is_err());
        assert!(orchestrator.previous_snapshot().await.contains("Math"));
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn direct_runs_leave_activity_idle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_login();
        transport.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        transport.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport, sink);

        orchestrator.run_change_check().await.expect("change check");
        assert_eq!(
            orchestrator.activity(ActivityKind::ChangeCheck).state(),
            ActivityState::Idle
        );
        orchestrator.run_full_report().await.expect("full report");
        assert_eq!(
            orchestrator.activity(ActivityKind::FullReport).state(),
            ActivityState::Idle
        );

        // Script exhausted: both runs now fail.
        assert!(orchestrator.run_change_check().await.is_err());
        assert_eq!(
            orchestrator.activity(ActivityKind::ChangeCheck).state(),
            ActivityState::Idle
        );
        assert!(orchestrator.run_full_report().await.is_err());
        assert_eq!(
            orchestrator.activity(ActivityKind::FullReport).state(),
            ActivityState::Idle
        );
    }

    #[tokio::test]
    async fn waiting_for_the_lock_is_not_reported_as_fetching() {
        let gated = Arc::new(GatedTransport {
            inner: ScriptedTransport::new(),
            gate: Semaphore::new(0),
        });
        gated.inner.push_login();
        gated.inner.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        gated.inner.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(gated.clone(), sink);
        let mut tasks = JoinSet::new();

        orchestrator.tick(ActivityKind::ChangeCheck, &mut tasks);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            orchestrator.activity(ActivityKind::ChangeCheck).state(),
            ActivityState::Fetching
        );

        // The change check holds the shared lock, so the full report queues.
        orchestrator.tick(ActivityKind::FullReport, &mut tasks);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            orchestrator.activity(ActivityKind::FullReport).state(),
            ActivityState::Idle
        );
        assert!(orchestrator.activity(ActivityKind::FullReport).is_busy());

        gated.gate.add_permits(2);
        while let Some(joined) = tasks.join_next().await {
            joined.expect("cycle task");
        }
        assert_eq!(
            orchestrator.activity(ActivityKind::FullReport).state(),
            ActivityState::Idle
        );
    }

    #[tokio::test]
    async fn manual_report_ignores_ticks() {
        let transport = Arc::new(ScriptedTransport::new());
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport.clone(), sink);
        let mut tasks = JoinSet::new();

        assert!(matches!(
            orchestrator.tick(ActivityKind::ManualReport, &mut tasks),
            TickOutcome::Skipped
        ));
        assert!(tasks.is_empty());
        let manual = orchestrator.activity(ActivityKind::ManualReport);
        assert!(manual.next_fire().is_none());
        assert!(!manual.is_busy());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn full_report_goes_to_reports_destination() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_login();
        transport.push(Ok(PortalResponse::ok("<html></html>")));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport, sink.clone());

        orchestrator.run_full_report().await.expect("report");
        assert_eq!(
            sink.sent(),
            vec![("reports-hook".to_string(), NO_DATA_MESSAGE.to_string())]
        );
        assert!(orchestrator.previous_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn manual_report_returns_failure_message() {
        let transport = Arc::new(ScriptedTransport::new());
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport, sink.clone());

        assert_eq!(orchestrator.request_full_report().await, FETCH_FAILED_MESSAGE);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn reauthentication_reports_outcome() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_login();
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport.clone(), sink);

        assert!(orchestrator.request_reauthentication().await.is_ok());
        assert!(orchestrator.request_reauthentication().await.is_err());
    }

    #[tokio::test]
    async fn schedule_status_does_not_fetch() {
        let transport = Arc::new(ScriptedTransport::new());
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(transport.clone(), sink);

        let status = orchestrator.request_schedule_status();
        assert!(status.contains("Full report: not scheduled (idle)"));
        orchestrator
            .activity(ActivityKind::ChangeCheck)
            .advance(chrono::Utc::now());
        let status = orchestrator.request_schedule_status();
        assert!(
            status.contains("Change check: next run in 14m")
                || status.contains("Change check: next run in 15m"),
            "{status}"
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn busy_tick_is_skipped_but_schedule_advances() {
        let gated = Arc::new(GatedTransport {
            inner: ScriptedTransport::new(),
            gate: Semaphore::new(0),
        });
        gated.inner.push_login();
        gated.inner.push(Ok(PortalResponse::ok(GRADEBOOK_PAGE)));
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(gated.clone(), sink.clone());
        let activity = orchestrator.activity(ActivityKind::ChangeCheck).clone();
        let mut tasks = JoinSet::new();

        assert!(matches!(
            orchestrator.tick(ActivityKind::ChangeCheck, &mut tasks),
            TickOutcome::Started
        ));
        let first_fire = activity.next_fire().expect("scheduled");
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(matches!(
            orchestrator.tick(ActivityKind::ChangeCheck, &mut tasks),
            TickOutcome::Skipped
        ));
        let second_fire = activity.next_fire().expect("scheduled");
        assert!(second_fire > first_fire);
        assert!(activity.is_busy());

        gated.gate.add_permits(1);
        while let Some(joined) = tasks.join_next().await {
            joined.expect("cycle task");
        }
        assert!(!activity.is_busy());
        assert_eq!(activity.state(), ActivityState::Idle);

        let gradebook_calls = gated
            .inner
            .calls()
            .into_iter()
            .filter(|c| c.url.contains("Gradebook"))
            .count();
        assert_eq!(gradebook_calls, 1);
        assert_eq!(sink.sent().len(), 1);
    }
}
