//! NotificationPoller: periodic incremental fetch, dedup, and exactly-once
//! dispatch of new notifications to the presentation collaborators.
//!
//! State machine: `Idle -> Polling -> Fetching -> Polling`, with `Stopped`
//! reachable from anywhere via [`NotificationPoller::stop`]. At most one fetch
//! cycle is in flight; concurrent [`check_now`](NotificationPoller::check_now)
//! calls join it through a watch channel instead of issuing a second request.
//! Each cycle runs in its own task, so stopping the poller or dropping a waiter
//! never tears a cycle down halfway through applying its result.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bps_notify_core::{
    AlertFeed, FetchError, FetchErrorKind, Notification, NotificationLedger, NotifySettings,
    PollerError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::api::NotificationApi;
use crate::capability::{Capabilities, DesktopAlert, Permission};
use crate::settings_store::{SettingsStore, load_or_default};
use crate::sink::NotificationSink;

// ─── Public types ─────────────────────────────────────────────────

/// What a fetch cycle (or a joined cycle) ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Response applied: `fresh` items dispatched, `unread` is the new count.
    Delivered { fresh: usize, unread: u32 },
    /// Request failed; nothing changed.
    Failed(FetchErrorKind),
    /// The cycle task died before reporting (panic in a collaborator).
    Aborted,
    /// The poller is stopped; no request was made.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerStatus {
    Idle,
    Polling,
    Fetching,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSnapshot {
    pub status: PollerStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub settings: NotifySettings,
}

// ─── Shared state ─────────────────────────────────────────────────

type OutcomeRx = watch::Receiver<Option<CycleOutcome>>;

struct PollerState {
    ledger: NotificationLedger,
    settings: NotifySettings,
    timer: Option<JoinHandle<()>>,
    /// Registered alert feeds and their periods; survives `stop()`.
    alert_feeds: Vec<(AlertFeed, u64)>,
    alert_timers: Vec<JoinHandle<()>>,
    stopped: bool,
    permission_probed: bool,
}

impl PollerState {
    fn abort_timers(&mut self) -> bool {
        let had_timer = self.timer.is_some() || !self.alert_timers.is_empty();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        for timer in self.alert_timers.drain(..) {
            timer.abort();
        }
        had_timer
    }
}

impl Drop for PollerState {
    fn drop(&mut self) {
        self.abort_timers();
    }
}

struct Shared<A, S> {
    api: A,
    sink: S,
    capabilities: Capabilities,
    store: Arc<dyn SettingsStore>,
    state: Mutex<PollerState>,
    /// Receiver for the cycle currently in flight, if any.
    in_flight: Mutex<Option<OutcomeRx>>,
}

/// Clears the in-flight slot however the cycle task ends.
struct InFlightGuard<A, S>(Arc<Shared<A, S>>);

impl<A, S> Drop for InFlightGuard<A, S> {
    fn drop(&mut self) {
        *self.0.in_flight.lock() = None;
    }
}

impl<A: NotificationApi, S: NotificationSink> Shared<A, S> {
    async fn run_cycle(&self) -> CycleOutcome {
        // Watermark is taken before the request goes out.
        let (since, started_at) = (self.state.lock().ledger.last_check(), Utc::now());
        tracing::debug!(?since, "fetching notifications");

        match self.api.fetch_notifications(since).await {
            Ok(response) => {
                let (batch, sound_enabled) = {
                    let st = self.state.lock();
                    (st.ledger.partition(response), st.settings.sound_enabled)
                };

                let delivered = self.deliver(&batch.fresh, sound_enabled);

                // Counts and watermark only move once the whole batch went out.
                let (count_changed, unread) = {
                    let mut st = self.state.lock();
                    let changed = st.ledger.settle(&batch);
                    st.ledger.commit_check(started_at);
                    (changed, st.ledger.unread_count())
                };
                if let Some(unread) = count_changed {
                    self.sink.on_count_changed(unread);
                }

                tracing::debug!(
                    "cycle applied: {delivered} new, {} known, {unread} unread",
                    batch.known
                );
                CycleOutcome::Delivered {
                    fresh: delivered,
                    unread,
                }
            }
            Err(e) => self.report_failure("notification updates", &e),
        }
    }

    async fn run_alert_check(&self, feed: AlertFeed) -> CycleOutcome {
        match self.api.fetch_alerts(feed).await {
            Ok(items) => {
                let sound_enabled = self.state.lock().settings.sound_enabled;
                let delivered = self.deliver(&items, sound_enabled);
                tracing::debug!("{feed} alerts: {delivered} new");
                CycleOutcome::Delivered {
                    fresh: delivered,
                    unread: self.state.lock().ledger.unread_count(),
                }
            }
            Err(e) => self.report_failure(feed.as_str(), &e),
        }
    }

    fn report_failure(&self, what: &str, error: &FetchError) -> CycleOutcome {
        tracing::warn!("failed to check for {what}: {error}");
        let kind = error.kind();
        self.sink.on_fetch_error(kind);
        CycleOutcome::Failed(kind)
    }

    /// Claim and dispatch each item in order; returns how many went out.
    /// An item is claimed right before its dispatch, so a dispatch that
    /// unwinds leaves the rest of the list unclaimed for the next fetch.
    fn deliver(&self, notifications: &[Notification], sound_enabled: bool) -> usize {
        let mut delivered = 0;
        for notification in notifications {
            if !self.state.lock().ledger.claim(&notification.id) {
                continue;
            }
            self.dispatch(notification, sound_enabled);
            delivered += 1;
        }
        delivered
    }

    /// Toast, then sound, then native notification. Capability failures are
    /// logged and otherwise ignored.
    fn dispatch(&self, notification: &Notification, sound_enabled: bool) {
        self.sink.on_new_notification(notification);

        if sound_enabled
            && let Some(ref player) = self.capabilities.sound
            && let Err(e) = player.play(notification.kind.style().sound)
        {
            tracing::debug!("could not play notification sound: {e}");
        }

        if let Some(ref desktop) = self.capabilities.desktop
            && desktop.permission() == Permission::Granted
            && let Err(e) = desktop.show(&DesktopAlert::from(notification))
        {
            tracing::debug!("could not show desktop notification: {e}");
        }
    }
}

// ─── Poller handle ────────────────────────────────────────────────

/// Cheaply cloneable handle; all clones drive the same poller.
pub struct NotificationPoller<A, S> {
    shared: Arc<Shared<A, S>>,
}

impl<A, S> Clone for NotificationPoller<A, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: NotificationApi, S: NotificationSink> NotificationPoller<A, S> {
    /// Build a poller. Settings are read from `store` once, here.
    pub fn new(
        api: A,
        sink: S,
        capabilities: Capabilities,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        let settings = load_or_default(store.as_ref());
        Self {
            shared: Arc::new(Shared {
                api,
                sink,
                capabilities,
                store,
                state: Mutex::new(PollerState {
                    ledger: NotificationLedger::new(),
                    settings,
                    timer: None,
                    alert_feeds: Vec::new(),
                    alert_timers: Vec::new(),
                    stopped: false,
                    permission_probed: false,
                }),
                in_flight: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ──

    /// Arm the polling timer. Fetches once immediately, then every `interval_ms`.
    ///
    /// Re-arms the timer when already running, and re-arms registered alert
    /// feeds after a `stop()`. Must be called inside a tokio runtime.
    pub fn start(&self, interval_ms: u64) -> Result<(), PollerError> {
        validate_interval(interval_ms)?;
        self.probe_permission();

        let timer = self.spawn_timer(interval_ms, true);
        let mut st = self.shared.state.lock();
        if let Some(old) = st.timer.replace(timer) {
            old.abort();
        }
        if st.alert_timers.is_empty() {
            self.arm_alert_feeds(&mut st);
        }
        st.stopped = false;
        tracing::info!("notification poller started (interval: {interval_ms}ms)");
        Ok(())
    }

    /// Start with the persisted check interval.
    pub fn start_with_settings(&self) -> Result<(), PollerError> {
        let interval_ms = self.settings().check_interval_ms;
        self.start(interval_ms)
    }

    /// Additionally poll a secondary alert feed every `period_ms`.
    /// The first check happens after one full period. Registering a feed
    /// again replaces its period. On a stopped poller the feed is armed by
    /// the next `start()`.
    pub fn start_alert_feed(&self, feed: AlertFeed, period_ms: u64) -> Result<(), PollerError> {
        validate_interval(period_ms)?;

        let mut st = self.shared.state.lock();
        st.alert_feeds.retain(|(f, _)| *f != feed);
        st.alert_feeds.push((feed, period_ms));
        if !st.stopped {
            self.arm_alert_feeds(&mut st);
        }
        tracing::info!("{feed} alert feed scheduled every {period_ms}ms");
        Ok(())
    }

    /// Cancel all timers. Idempotent. A cycle already in flight still
    /// completes and applies its result.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        let was_running = st.abort_timers();
        st.stopped = true;
        if was_running {
            tracing::info!("notification poller stopped");
        }
    }

    // ── Fetching ──

    /// Fetch now, outside the schedule. Joins the in-flight cycle if there is one.
    pub async fn check_now(&self) -> CycleOutcome {
        if self.shared.state.lock().stopped {
            return CycleOutcome::Stopped;
        }
        wait_outcome(self.join_or_begin_cycle()).await
    }

    /// Fetch one secondary alert feed and dispatch unseen items.
    /// Leaves `last_check` and the unread count alone.
    pub async fn check_alerts(&self, feed: AlertFeed) -> CycleOutcome {
        if self.shared.state.lock().stopped {
            return CycleOutcome::Stopped;
        }
        self.shared.run_alert_check(feed).await
    }

    // ── Read state ──

    /// Optimistically mark one notification read, then tell the server.
    ///
    /// A server failure is logged and returned but the local state is kept.
    pub async fn mark_read(&self, id: &str) -> Result<(), FetchError> {
        let changed = self.shared.state.lock().ledger.mark_read(id);
        if let Some(unread) = changed {
            self.shared.sink.on_count_changed(unread);
        }
        self.shared
            .api
            .mark_read(id)
            .await
            .inspect_err(|e| tracing::warn!("failed to mark notification {id} as read: {e}"))
    }

    /// Bulk form of [`mark_read`](Self::mark_read).
    pub async fn mark_all_read(&self) -> Result<(), FetchError> {
        let changed = self.shared.state.lock().ledger.mark_all_read();
        if let Some(unread) = changed {
            self.shared.sink.on_count_changed(unread);
        }
        self.shared
            .api
            .mark_all_read()
            .await
            .inspect_err(|e| tracing::warn!("failed to mark all notifications as read: {e}"))
    }

    // ── Settings ──

    pub fn settings(&self) -> NotifySettings {
        self.shared.state.lock().settings
    }

    pub fn set_sound_enabled(&self, enabled: bool) -> Result<(), PollerError> {
        self.update_settings(|s| s.sound_enabled = enabled)?;
        Ok(())
    }

    /// Flip the sound setting and return the new value.
    pub fn toggle_sound(&self) -> Result<bool, PollerError> {
        let updated = self.update_settings(|s| s.sound_enabled = !s.sound_enabled)?;
        let status = if updated.sound_enabled {
            "enabled"
        } else {
            "disabled"
        };
        tracing::info!("notification sounds {status}");
        Ok(updated.sound_enabled)
    }

    /// Persist a new check interval. A running timer is re-armed; the next
    /// fetch happens one new interval from now.
    pub fn set_check_interval(&self, interval_ms: u64) -> Result<(), PollerError> {
        validate_interval(interval_ms)?;
        self.update_settings(|s| s.check_interval_ms = interval_ms)?;

        let mut st = self.shared.state.lock();
        if let Some(old) = st.timer.take() {
            old.abort();
            st.timer = Some(self.spawn_timer(interval_ms, false));
            tracing::info!("notification poller re-armed (interval: {interval_ms}ms)");
        }
        Ok(())
    }

    // ── Introspection ──

    pub fn status(&self) -> PollerStatus {
        let st = self.shared.state.lock();
        if st.stopped {
            PollerStatus::Stopped
        } else if self.shared.in_flight.lock().is_some() {
            PollerStatus::Fetching
        } else if st.timer.is_some() {
            PollerStatus::Polling
        } else {
            PollerStatus::Idle
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.shared.state.lock().ledger.last_check()
    }

    pub fn unread_count(&self) -> u32 {
        self.shared.state.lock().ledger.unread_count()
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        let status = self.status();
        let st = self.shared.state.lock();
        PollerSnapshot {
            status,
            last_check: st.ledger.last_check(),
            unread_count: st.ledger.unread_count(),
            settings: st.settings,
        }
    }

    // ── Internals ──

    fn join_or_begin_cycle(&self) -> OutcomeRx {
        let mut slot = self.shared.in_flight.lock();
        if let Some(ref rx) = *slot {
            tracing::debug!("fetch already in flight, joining it");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        drop(slot);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let guard = InFlightGuard(Arc::clone(&shared));
            let outcome = shared.run_cycle().await;
            drop(guard);
            tx.send_replace(Some(outcome));
        });
        rx
    }

    fn spawn_timer(&self, interval_ms: u64, immediate: bool) -> JoinHandle<()> {
        let period = Duration::from_millis(interval_ms);
        let first = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(poller) = upgrade(&weak) else { break };
                let outcome = poller.check_now().await;
                tracing::debug!(?outcome, "scheduled check finished");
            }
        })
    }

    /// Replace every alert timer with a fresh one per registered feed.
    fn arm_alert_feeds(&self, st: &mut PollerState) {
        for timer in st.alert_timers.drain(..) {
            timer.abort();
        }
        let timers: Vec<_> = st
            .alert_feeds
            .iter()
            .map(|&(feed, period_ms)| self.spawn_alert_timer(feed, period_ms))
            .collect();
        st.alert_timers = timers;
    }

    fn spawn_alert_timer(&self, feed: AlertFeed, period_ms: u64) -> JoinHandle<()> {
        let period = Duration::from_millis(period_ms);
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(poller) = upgrade(&weak) else { break };
                poller.check_alerts(feed).await;
            }
        })
    }

    fn probe_permission(&self) {
        let Some(ref desktop) = self.shared.capabilities.desktop else {
            return;
        };
        {
            let mut st = self.shared.state.lock();
            if st.permission_probed {
                return;
            }
            st.permission_probed = true;
        }

        match desktop.permission() {
            Permission::Default => {
                if desktop.request_permission() == Permission::Granted {
                    tracing::info!("desktop notifications enabled");
                } else {
                    tracing::info!("desktop notifications denied");
                }
            }
            Permission::Unsupported => tracing::debug!("desktop notifications unsupported"),
            Permission::Granted | Permission::Denied => {}
        }
    }

    fn update_settings(
        &self,
        apply: impl FnOnce(&mut NotifySettings),
    ) -> Result<NotifySettings, PollerError> {
        let updated = {
            let mut st = self.shared.state.lock();
            apply(&mut st.settings);
            st.settings
        };
        self.shared.store.save(&updated)?;
        Ok(updated)
    }
}

fn upgrade<A, S>(weak: &Weak<Shared<A, S>>) -> Option<NotificationPoller<A, S>> {
    weak.upgrade().map(|shared| NotificationPoller { shared })
}

fn validate_interval(interval_ms: u64) -> Result<(), PollerError> {
    if interval_ms == 0 {
        return Err(PollerError::InvalidConfig(
            "check interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

async fn wait_outcome(mut rx: OutcomeRx) -> CycleOutcome {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            // Sender gone without a value: the cycle task panicked.
            return rx.borrow().clone().unwrap_or(CycleOutcome::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bps_notify_core::{FetchResponse, NotificationKind, Priority};
    use tokio::sync::Notify;

    use crate::capability::{CapabilityError, DesktopNotifier, SoundPlayer};
    use crate::settings_store::MemoryStore;

    // ── Fakes ──

    /// Scripted backend. Optionally holds every fetch until the gate opens.
    #[derive(Default)]
    struct FakeApi {
        script: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
        alerts: Mutex<VecDeque<Result<Vec<Notification>, FetchError>>>,
        calls: Mutex<Vec<Option<DateTime<Utc>>>>,
        outstanding: AtomicUsize,
        max_outstanding: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail_writes: bool,
        marked: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn scripted(script: Vec<Result<FetchResponse, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl NotificationApi for FakeApi {
        async fn fetch_notifications(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<FetchResponse, FetchError> {
            self.calls.lock().push(since);
            let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_outstanding.fetch_max(now, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or(Ok(FetchResponse {
                notifications: Vec::new(),
                unread_count: 0,
            }))
        }

        async fn mark_read(&self, id: &str) -> Result<(), FetchError> {
            self.marked.lock().push(id.to_string());
            if self.fail_writes {
                Err(FetchError::Server { status: 500 })
            } else {
                Ok(())
            }
        }

        async fn mark_all_read(&self) -> Result<(), FetchError> {
            self.marked.lock().push("*".to_string());
            if self.fail_writes {
                Err(FetchError::Network("offline".to_string()))
            } else {
                Ok(())
            }
        }

        async fn fetch_alerts(&self, _feed: AlertFeed) -> Result<Vec<Notification>, FetchError> {
            self.alerts.lock().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        New(String),
        Count(u32),
        Error(FetchErrorKind),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
        /// Unwinds once when this id is delivered.
        panic_on: Mutex<Option<String>>,
    }

    impl RecordingSink {
        fn panicking_once_on(id: &str) -> Self {
            Self {
                panic_on: Mutex::new(Some(id.to_string())),
                ..Self::default()
            }
        }

        fn new_ids(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    Event::New(id) => Some(id.clone()),
                    _ => None,
                })
                .collect()
        }

        fn counts(&self) -> Vec<u32> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    Event::Count(c) => Some(*c),
                    _ => None,
                })
                .collect()
        }

        fn errors(&self) -> Vec<FetchErrorKind> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    Event::Error(k) => Some(*k),
                    _ => None,
                })
                .collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn on_new_notification(&self, notification: &Notification) {
            let mut armed = self.panic_on.lock();
            if armed.as_deref() == Some(notification.id.as_str()) {
                *armed = None;
                drop(armed);
                panic!("sink exploded on {}", notification.id);
            }
            self.events.lock().push(Event::New(notification.id.clone()));
        }

        fn on_count_changed(&self, unread: u32) {
            self.events.lock().push(Event::Count(unread));
        }

        fn on_fetch_error(&self, kind: FetchErrorKind) {
            self.events.lock().push(Event::Error(kind));
        }
    }

    #[derive(Default)]
    struct FakePlayer {
        played: Mutex<Vec<String>>,
    }

    impl SoundPlayer for FakePlayer {
        fn play(&self, sound: &str) -> Result<(), CapabilityError> {
            self.played.lock().push(sound.to_string());
            Ok(())
        }
    }

    struct FakeDesktop {
        permission: Mutex<Permission>,
        grant_on_request: bool,
        requests: AtomicUsize,
        shown: Mutex<Vec<DesktopAlert>>,
    }

    impl FakeDesktop {
        fn new(permission: Permission, grant_on_request: bool) -> Self {
            Self {
                permission: Mutex::new(permission),
                grant_on_request,
                requests: AtomicUsize::new(0),
                shown: Mutex::new(Vec::new()),
            }
        }
    }

    impl DesktopNotifier for FakeDesktop {
        fn permission(&self) -> Permission {
            *self.permission.lock()
        }

        fn request_permission(&self) -> Permission {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut p = self.permission.lock();
            *p = if self.grant_on_request {
                Permission::Granted
            } else {
                Permission::Denied
            };
            *p
        }

        fn show(&self, alert: &DesktopAlert) -> Result<(), CapabilityError> {
            self.shown.lock().push(alert.clone());
            Ok(())
        }
    }

    // ── Helpers ──

    fn note(id: &str) -> Notification {
        Notification::new(id, NotificationKind::NewAssignment, format!("title {id}"))
    }

    fn resp(ids: &[&str], unread: u32) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse {
            notifications: ids.iter().map(|id| note(id)).collect(),
            unread_count: unread,
        })
    }

    type TestPoller = NotificationPoller<Arc<FakeApi>, Arc<RecordingSink>>;

    fn poller_with(
        api: &Arc<FakeApi>,
        sink: &Arc<RecordingSink>,
        capabilities: Capabilities,
        store: Arc<MemoryStore>,
    ) -> TestPoller {
        NotificationPoller::new(Arc::clone(api), Arc::clone(sink), capabilities, store)
    }

    fn poller(api: &Arc<FakeApi>, sink: &Arc<RecordingSink>) -> TestPoller {
        poller_with(api, sink, Capabilities::none(), Arc::new(MemoryStore::new()))
    }

    /// Let every ready task run until all are blocked (time is paused).
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // ── Coalescing ──

    #[tokio::test(start_paused = true)]
    async fn check_now_joins_in_flight_cycle() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1)]).gated(Arc::clone(&gate)));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        let first = tokio::spawn({
            let p = p.clone();
            async move { p.check_now().await }
        });
        settle().await;
        assert_eq!(p.status(), PollerStatus::Fetching);

        let second = tokio::spawn({
            let p = p.clone();
            async move { p.check_now().await }
        });
        settle().await;
        assert_eq!(api.call_count(), 1, "second caller must not issue a request");

        gate.notify_one();
        let a = first.await.expect("first");
        let b = second.await.expect("second");

        assert_eq!(a, CycleOutcome::Delivered { fresh: 1, unread: 1 });
        assert_eq!(a, b, "both callers observe the same cycle");
        assert_eq!(api.max_outstanding.load(Ordering::SeqCst), 1);
        assert_eq!(sink.new_ids(), vec!["A"]);
        assert_eq!(p.status(), PollerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_tick_joins_manual_check() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1)]).gated(Arc::clone(&gate)));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        let manual = tokio::spawn({
            let p = p.clone();
            async move { p.check_now().await }
        });
        settle().await;

        // The timer's immediate tick lands while the manual fetch is held.
        p.start(1_000).expect("start");
        settle().await;
        assert_eq!(api.call_count(), 1);

        gate.notify_one();
        manual.await.expect("manual");
        assert_eq!(api.max_outstanding.load(Ordering::SeqCst), 1);
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn new_cycle_after_previous_finished() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1), resp(&["B"], 2)]));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.check_now().await;
        p.check_now().await;
        assert_eq!(api.call_count(), 2);
        assert_eq!(sink.new_ids(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sink_aborts_cycle_without_wedging_poller() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1), resp(&[], 1)]));
        let sink = Arc::new(RecordingSink::panicking_once_on("A"));
        let p = poller(&api, &sink);

        assert_eq!(p.check_now().await, CycleOutcome::Aborted);
        assert!(p.last_check().is_none(), "aborted cycle must not advance last_check");

        // Slot was released: the next check issues a fresh request.
        let out = p.check_now().await;
        assert_eq!(out, CycleOutcome::Delivered { fresh: 0, unread: 1 });
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn items_after_failed_dispatch_go_out_next_cycle() {
        let api = Arc::new(FakeApi::scripted(vec![
            resp(&["A", "B"], 2),
            resp(&["A", "B"], 2),
        ]));
        let sink = Arc::new(RecordingSink::panicking_once_on("A"));
        let p = poller(&api, &sink);

        assert_eq!(p.check_now().await, CycleOutcome::Aborted);
        assert_eq!(p.unread_count(), 0, "aborted cycle leaves the count alone");
        assert!(sink.counts().is_empty());

        let out = p.check_now().await;
        assert_eq!(out, CycleOutcome::Delivered { fresh: 1, unread: 2 });
        assert_eq!(sink.new_ids(), vec!["B"], "A was claimed, B still pending");
        assert_eq!(sink.counts(), vec![2]);
        assert!(p.last_check().is_some());
    }

    // ── Timer ──

    #[tokio::test(start_paused = true)]
    async fn start_fetches_immediately_then_on_interval() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        assert_eq!(api.call_count(), 1, "immediate fetch on start");
        assert_eq!(p.status(), PollerStatus::Polling);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(api.call_count(), 2);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(api.call_count(), 3);
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_fetches() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        p.stop();
        p.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.call_count(), 1);
        assert_eq!(p.status(), PollerStatus::Stopped);
        assert_eq!(p.check_now().await, CycleOutcome::Stopped);
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_fetch_still_applies_result() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A", "B"], 2)]).gated(Arc::clone(&gate)));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        assert_eq!(api.call_count(), 1);

        p.stop();
        gate.notify_one();
        settle().await;

        assert_eq!(sink.new_ids(), vec!["A", "B"]);
        assert_eq!(p.unread_count(), 2);
        assert!(p.last_check().is_some());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_zero_is_invalid_and_arms_nothing() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        let err = p.start(0).expect_err("zero interval");
        assert!(matches!(err, PollerError::InvalidConfig(_)));
        assert_eq!(p.status(), PollerStatus::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        p.stop();
        p.start(1_000).expect("restart");
        settle().await;
        assert_eq!(p.status(), PollerStatus::Polling);
        assert_eq!(api.call_count(), 2);
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_ends_the_timer() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        drop(p);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_check_interval_rearms_running_timer() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryStore::new());
        let p = poller_with(&api, &sink, Capabilities::none(), Arc::clone(&store));

        p.start(1_000).expect("start");
        settle().await;
        p.set_check_interval(5_000).expect("interval");
        assert_eq!(store.stored().map(|s| s.check_interval_ms), Some(5_000));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(api.call_count(), 1, "old 1s schedule is gone");
        tokio::time::sleep(Duration::from_millis(4_100)).await;
        assert_eq!(api.call_count(), 2);

        assert!(matches!(
            p.set_check_interval(0),
            Err(PollerError::InvalidConfig(_))
        ));
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn set_check_interval_after_stop_stays_stopped() {
        let api = Arc::new(FakeApi::default());
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start(1_000).expect("start");
        settle().await;
        p.stop();
        p.set_check_interval(500).expect("interval");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.call_count(), 1);
        assert_eq!(p.status(), PollerStatus::Stopped);
        assert_eq!(p.settings().check_interval_ms, 500);
    }

    // ── Read state ──

    #[tokio::test(start_paused = true)]
    async fn mark_read_is_optimistic_even_when_server_fails() {
        let api = Arc::new(FakeApi {
            fail_writes: true,
            ..FakeApi::scripted(vec![resp(&["A", "B"], 2)])
        });
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);
        p.check_now().await;

        let result = p.mark_read("A").await;
        assert_eq!(result, Err(FetchError::Server { status: 500 }));
        assert_eq!(p.unread_count(), 1, "local state is not rolled back");
        assert_eq!(sink.counts(), vec![2, 1]);
        assert_eq!(*api.marked.lock(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_all_read_zeroes_count() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A", "B"], 2)]));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);
        p.check_now().await;

        p.mark_all_read().await.expect("mark all");
        assert_eq!(p.unread_count(), 0);
        assert_eq!(sink.counts(), vec![2, 0]);
    }

    // ── Capabilities ──

    #[tokio::test(start_paused = true)]
    async fn sound_follows_setting() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1), resp(&["B"], 2)]));
        let sink = Arc::new(RecordingSink::default());
        let player = Arc::new(FakePlayer::default());
        let store = Arc::new(MemoryStore::with(NotifySettings {
            sound_enabled: false,
            check_interval_ms: 30_000,
        }));
        let caps = Capabilities::none().with_sound(Arc::clone(&player) as Arc<dyn SoundPlayer>);
        let p = poller_with(&api, &sink, caps, Arc::clone(&store));

        p.check_now().await;
        assert!(player.played.lock().is_empty(), "sound disabled");

        assert!(p.toggle_sound().expect("toggle"));
        assert_eq!(store.stored().map(|s| s.sound_enabled), Some(true));

        p.check_now().await;
        assert_eq!(*player.played.lock(), vec!["success.mp3"]);

        p.set_sound_enabled(false).expect("disable");
        assert!(!p.settings().sound_enabled);
        assert_eq!(store.stored().map(|s| s.sound_enabled), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn desktop_permission_requested_once_and_honoured() {
        let api = Arc::new(FakeApi::scripted(vec![Ok(FetchResponse {
            notifications: vec![note("A").with_priority(Priority::High)],
            unread_count: 1,
        })]));
        let sink = Arc::new(RecordingSink::default());
        let desktop = Arc::new(FakeDesktop::new(Permission::Default, true));
        let caps =
            Capabilities::none().with_desktop(Arc::clone(&desktop) as Arc<dyn DesktopNotifier>);
        let p = poller_with(&api, &sink, caps, Arc::new(MemoryStore::new()));

        p.start(1_000).expect("start");
        settle().await;
        p.start(2_000).expect("restart");
        p.stop();

        assert_eq!(desktop.requests.load(Ordering::SeqCst), 1);
        let shown = desktop.shown.lock();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].tag, "bps-A");
        assert!(shown[0].require_interaction);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_desktop_permission_degrades_silently() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["A"], 1)]));
        let sink = Arc::new(RecordingSink::default());
        let desktop = Arc::new(FakeDesktop::new(Permission::Denied, true));
        let caps =
            Capabilities::none().with_desktop(Arc::clone(&desktop) as Arc<dyn DesktopNotifier>);
        let p = poller_with(&api, &sink, caps, Arc::new(MemoryStore::new()));

        p.start(1_000).expect("start");
        settle().await;
        p.stop();

        assert_eq!(desktop.requests.load(Ordering::SeqCst), 0);
        assert!(desktop.shown.lock().is_empty());
        assert_eq!(sink.new_ids(), vec!["A"], "toast still delivered");
    }

    // ── Alert feeds ──

    #[tokio::test(start_paused = true)]
    async fn alert_items_are_deduplicated_with_main_feed() {
        let api = Arc::new(FakeApi::scripted(vec![resp(&["warranty_1"], 1)]));
        api.alerts.lock().extend([
            Ok(vec![note("warranty_1"), note("assignment_9")]),
            Ok(vec![note("assignment_9")]),
        ]);
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.check_now().await;
        let last_check = p.last_check();

        let out = p.check_alerts(AlertFeed::Warranty).await;
        assert_eq!(out, CycleOutcome::Delivered { fresh: 1, unread: 1 });
        let out = p.check_alerts(AlertFeed::Assignment).await;
        assert_eq!(out, CycleOutcome::Delivered { fresh: 0, unread: 1 });

        assert_eq!(sink.new_ids(), vec!["warranty_1", "assignment_9"]);
        assert_eq!(p.last_check(), last_check, "alert feeds leave last_check alone");
    }

    #[tokio::test(start_paused = true)]
    async fn alert_feed_runs_on_its_own_period() {
        let api = Arc::new(FakeApi::default());
        api.alerts.lock().push_back(Ok(vec![note("assignment_1")]));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start_alert_feed(AlertFeed::Assignment, 10_000)
            .expect("alert feed");
        tokio::time::sleep(Duration::from_millis(9_000)).await;
        assert!(sink.new_ids().is_empty(), "no immediate alert check");

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(sink.new_ids(), vec!["assignment_1"]);
        assert_eq!(api.call_count(), 0, "main feed untouched");
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_rearms_alert_feeds() {
        let api = Arc::new(FakeApi::default());
        api.alerts.lock().push_back(Ok(vec![note("assignment_1")]));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        p.start_alert_feed(AlertFeed::Assignment, 10_000)
            .expect("alert feed");
        p.start(60_000).expect("start");
        settle().await;
        p.stop();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sink.new_ids().is_empty(), "stopped poller checks no feeds");

        p.start(60_000).expect("restart");
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(sink.new_ids(), vec!["assignment_1"]);
        p.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_alert_check_reports_error() {
        let api = Arc::new(FakeApi::default());
        api.alerts
            .lock()
            .push_back(Err(FetchError::Server { status: 404 }));
        let sink = Arc::new(RecordingSink::default());
        let p = poller(&api, &sink);

        let out = p.check_alerts(AlertFeed::Warranty).await;
        let kind = FetchErrorKind::Server { status: Some(404) };
        assert_eq!(out, CycleOutcome::Failed(kind));
        assert_eq!(sink.errors(), vec![kind]);
    }
}
