use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::event::Event;

use super::commit::CommitCoordinator;
use super::event_handler::handle_overlay_event;
use super::state::OverlayState;

/// Last heartbeat seen on the bus, for the connection indicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Liveness {
    last_seen: Option<Instant>,
    last_ts: Option<f64>,
    link_up: bool,
}

impl Liveness {
    /// Returns true when this heartbeat brings the link up.
    pub fn record(&mut self, ts: Option<f64>) -> bool {
        self.last_seen = Some(Instant::now());
        self.last_ts = ts;
        !std::mem::replace(&mut self.link_up, true)
    }

    pub fn is_alive(&self, stale_after: Duration) -> bool {
        self.last_seen
            .map(|seen| seen.elapsed() <= stale_after)
            .unwrap_or(false)
    }

    /// Returns true when an up link has gone silent for longer than `stale_after`.
    pub fn expire(&mut self, stale_after: Duration) -> bool {
        if self.link_up && !self.is_alive(stale_after) {
            self.link_up = false;
            return true;
        }
        false
    }

    pub fn last_heartbeat(&self) -> Option<(Instant, Option<f64>)> {
        self.last_seen.map(|seen| (seen, self.last_ts))
    }
}

/// How long without a heartbeat before the link counts as down. The hub beats once a second.
pub const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(3);

const LIVENESS_CHECK_EVERY: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerCounters {
    pub accepted: u64,
    pub dropped: u64,
}

/// Parses raw bus records and dispatches them, in arrival order.
pub struct BusListener {
    overlay: Rc<RefCell<OverlayState>>,
    commits: CommitCoordinator,
    liveness: Liveness,
    counters: ListenerCounters,
}

impl BusListener {
    pub fn new(overlay: Rc<RefCell<OverlayState>>, commits: CommitCoordinator) -> Self {
        Self {
            overlay,
            commits,
            liveness: Liveness::default(),
            counters: ListenerCounters::default(),
        }
    }

    /// Handle one inbound record. Malformed records are dropped with a warning.
    pub fn on_message(&mut self, raw: &str) {
        let event = match Event::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                self.counters.dropped += 1;
                log::warn!("Dropping malformed bus message: {e}");
                return;
            }
        };
        self.counters.accepted += 1;
        log::trace!("Dispatching {} (ts={:?})", event.kind(), event.ts());
        self.dispatch(&event);
    }

    fn dispatch(&mut self, event: &Event) {
        // Overlay first so the commit marker is up before the commit goes out.
        handle_overlay_event(&self.overlay, event);

        match event {
            Event::GestureNod { .. } => {
                log::info!("Nod detected - committing text");
                self.commits.on_commit_trigger();
            }
            Event::Heartbeat { ts } => {
                if self.liveness.record(*ts) {
                    log::info!("Bus heartbeat received, link up");
                    self.overlay.borrow().show_link(true);
                } else {
                    log::debug!("Bus heartbeat");
                }
            }
            Event::AsrPartial { .. } | Event::AsrToggle { .. } => {}
        }
    }

    /// Mark the link down once heartbeats stop.
    pub fn check_liveness(&mut self) {
        if !self.liveness.expire(HEARTBEAT_STALE_AFTER) {
            return;
        }
        match self.liveness.last_heartbeat() {
            Some((seen, _)) => log::warn!(
                "No bus heartbeat for {:.1}s, link down",
                seen.elapsed().as_secs_f64()
            ),
            None => log::warn!("Bus link down"),
        }
        self.overlay.borrow().show_link(false);
    }

    /// Drain the channel until every sender is gone, checking liveness between records.
    pub async fn run(&mut self, receiver: async_channel::Receiver<String>) {
        let mut ticker = tokio::time::interval(LIVENESS_CHECK_EVERY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                raw = receiver.recv() => match raw {
                    Ok(raw) => self.on_message(&raw),
                    Err(_) => break,
                },
                _ = ticker.tick() => self.check_liveness(),
            }
        }
        log::info!("Bus channel closed");
    }

    #[cfg(test)]
    pub fn overlay(&self) -> &Rc<RefCell<OverlayState>> {
        &self.overlay
    }

    #[cfg(test)]
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn counters(&self) -> ListenerCounters {
        self.counters
    }

    pub fn commits(&self) -> &CommitCoordinator {
        &self.commits
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::LocalSet;

    use super::*;
    use crate::app::commit::testing::CountingCommit;
    use crate::app::state::testing::{RecordingView, ViewCall};
    use crate::app::state::COMMIT_MARKER;

    fn listener(target: Rc<CountingCommit>) -> (BusListener, RecordingView) {
        let view = RecordingView::default();
        let overlay = Rc::new(RefCell::new(OverlayState::new(
            Box::new(view.clone()),
            Duration::from_secs(2),
        )));
        let listener = BusListener::new(overlay, CommitCoordinator::new(target));
        (listener, view)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_records_are_dropped_and_processing_continues() {
        LocalSet::new()
            .run_until(async {
                let (mut l, _view) = listener(Rc::new(CountingCommit::default()));
                l.on_message(r#"{"event":"bogus","ts":1}"#);
                l.on_message(r#"{"event":"asr.partial","ts":2}"#);
                l.on_message("{not json");
                l.on_message(r#"{"event":"asr.partial","text":"still here","ts":3}"#);

                assert_eq!(
                    l.counters(),
                    ListenerCounters {
                        accepted: 1,
                        dropped: 3
                    }
                );
                assert_eq!(l.overlay().borrow().displayed_text, "still here");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn n_nods_yield_n_commits() {
        LocalSet::new()
            .run_until(async {
                let target = Rc::new(CountingCommit::default());
                let (mut l, _view) = listener(target.clone());
                for _ in 0..4 {
                    l.on_message(r#"{"event":"gesture.nod","ts":1}"#);
                }
                settle().await;
                assert_eq!(target.calls.get(), 4);
                assert_eq!(l.commits().stats().succeeded.get(), 4);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_shows_marker_before_commit_runs() {
        LocalSet::new()
            .run_until(async {
                let target = Rc::new(CountingCommit::default());
                let (mut l, view) = listener(target.clone());
                let seen = Rc::new(RefCell::new(None));
                {
                    let seen = seen.clone();
                    let view = view.clone();
                    *target.on_call.borrow_mut() = Some(Box::new(move || {
                        *seen.borrow_mut() = view.last_text();
                    }));
                }

                l.on_message(r#"{"event":"asr.partial","text":"ship it","ts":1}"#);
                l.on_message(r#"{"event":"gesture.nod","ts":2}"#);
                settle().await;

                assert_eq!(
                    seen.borrow().clone(),
                    Some(format!("ship it{COMMIT_MARKER}"))
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_keeps_marker() {
        LocalSet::new()
            .run_until(async {
                let (mut l, _view) = listener(CountingCommit::failing());
                l.on_message(r#"{"event":"asr.partial","text":"draft","ts":1}"#);
                l.on_message(r#"{"event":"gesture.nod","ts":2}"#);
                settle().await;

                assert_eq!(l.commits().stats().failed.get(), 1);
                assert_eq!(
                    l.overlay().borrow().displayed_text,
                    format!("draft{COMMIT_MARKER}")
                );
                l.on_message(r#"{"event":"asr.partial","text":"next","ts":3}"#);
                assert_eq!(l.overlay().borrow().displayed_text, "next");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_track_liveness_only() {
        LocalSet::new()
            .run_until(async {
                let (mut l, view) = listener(Rc::new(CountingCommit::default()));
                assert!(!l.liveness().is_alive(HEARTBEAT_STALE_AFTER));
                l.on_message(r#"{"event":"heartbeat","ts":1700000000.5}"#);
                l.on_message(r#"{"event":"heartbeat","ts":1700000000.5}"#);

                // Only the link indicator, and only once.
                assert_eq!(*view.calls.borrow(), vec![ViewCall::Link(true)]);
                assert!(l.liveness().is_alive(HEARTBEAT_STALE_AFTER));
                let (_, ts) = l.liveness().last_heartbeat().unwrap();
                assert_eq!(ts, Some(1700000000.5));
                assert!(l.overlay().borrow().displayed_text.is_empty());
                assert!(!l.overlay().borrow().visible);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_link_goes_down_and_comes_back() {
        LocalSet::new()
            .run_until(async {
                let (mut l, view) = listener(Rc::new(CountingCommit::default()));
                l.on_message(r#"{"event":"heartbeat","ts":1}"#);

                tokio::time::advance(HEARTBEAT_STALE_AFTER).await;
                l.check_liveness();
                assert_eq!(view.last_link(), Some(true));

                tokio::time::advance(Duration::from_millis(500)).await;
                l.check_liveness();
                l.check_liveness();
                assert_eq!(view.last_link(), Some(false));
                assert!(!l.liveness().is_alive(HEARTBEAT_STALE_AFTER));

                l.on_message(r#"{"event":"heartbeat","ts":5}"#);
                assert_eq!(
                    *view.calls.borrow(),
                    vec![
                        ViewCall::Link(true),
                        ViewCall::Link(false),
                        ViewCall::Link(true)
                    ]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_detects_stale_link_while_idle() {
        LocalSet::new()
            .run_until(async {
                let (mut l, view) = listener(Rc::new(CountingCommit::default()));
                let (tx, rx) = async_channel::unbounded();
                tx.send(r#"{"event":"heartbeat","ts":1}"#.to_string())
                    .await
                    .unwrap();

                tokio::select! {
                    _ = l.run(rx) => panic!("channel is still open"),
                    _ = tokio::time::sleep(HEARTBEAT_STALE_AFTER * 2) => {}
                }

                assert_eq!(
                    *view.calls.borrow(),
                    vec![ViewCall::Link(true), ViewCall::Link(false)]
                );
                drop(tx);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains_channel_in_order() {
        LocalSet::new()
            .run_until(async {
                let (mut l, _view) = listener(Rc::new(CountingCommit::default()));
                let (tx, rx) = async_channel::unbounded();
                for text in ["a", "b", "c"] {
                    tx.send(format!(r#"{{"event":"asr.partial","text":"{text}"}}"#))
                        .await
                        .unwrap();
                }
                drop(tx);
                l.run(rx).await;
                assert_eq!(l.overlay().borrow().displayed_text, "c");
                assert_eq!(l.counters().accepted, 3);
            })
            .await;
    }
}
