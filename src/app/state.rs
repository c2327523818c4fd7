use std::time::Duration;

use tokio::task::JoinHandle;

/// Marker appended to the caption when a nod commits it.
pub const COMMIT_MARKER: &str = " \u{2713}";

pub const LISTENING_STATUS: &str = "Listening\u{2026}";

/// Rendering capability the overlay drives. Implementations must not call back
/// into the overlay.
pub trait ViewSink {
    fn set_text(&self, text: &str);
    fn set_opacity(&self, opacity: f64);
    fn set_status(&self, status: &str);
    /// Bus connection indicator. Independent of the caption.
    fn set_link(&self, alive: bool);
}

/// Overlay lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Idle,
    Displaying,
    Committing,
    FadingOut,
}

/// Cancelable fade task. Dropping the handle does not cancel; call `cancel`.
#[derive(Debug)]
pub struct FadeHandle {
    pub generation: u64,
    pub task: JoinHandle<()>,
}

impl FadeHandle {
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// The single overlay. Lives on the event-loop thread inside Rc<RefCell<>>.
pub struct OverlayState {
    pub phase: OverlayPhase,
    pub displayed_text: String,
    pub visible: bool,
    pub status: String,
    pub pending_fade: Option<FadeHandle>,
    pub fade_delay: Duration,
    fade_generation: u64,
    view: Box<dyn ViewSink>,
}

impl OverlayState {
    pub fn new(view: Box<dyn ViewSink>, fade_delay: Duration) -> Self {
        Self {
            phase: OverlayPhase::Idle,
            displayed_text: String::new(),
            visible: false,
            status: String::new(),
            pending_fade: None,
            fade_delay,
            fade_generation: 0,
            view,
        }
    }

    /// New partial text always wins and un-fades the caption.
    pub fn show_partial(&mut self, text: &str) {
        self.cancel_fade();
        if self.displayed_text != text {
            self.displayed_text.clear();
            self.displayed_text.push_str(text);
            self.view.set_text(&self.displayed_text);
        }
        if !self.visible {
            self.visible = true;
            self.view.set_opacity(1.0);
        }
        self.phase = OverlayPhase::Displaying;
    }

    /// Append the commit marker and reserve a generation for the fade that
    /// must follow. The caller schedules the fade and attaches it.
    pub fn mark_committed(&mut self) -> u64 {
        self.cancel_fade();
        self.displayed_text.push_str(COMMIT_MARKER);
        self.view.set_text(&self.displayed_text);
        if !self.visible {
            self.visible = true;
            self.view.set_opacity(1.0);
        }
        self.phase = OverlayPhase::Committing;
        self.fade_generation += 1;
        self.fade_generation
    }

    pub fn attach_fade(&mut self, handle: FadeHandle) {
        if let Some(stale) = self.pending_fade.replace(handle) {
            stale.cancel();
        }
    }

    pub fn cancel_fade(&mut self) {
        if let Some(handle) = self.pending_fade.take() {
            log::debug!("Cancelling fade #{}", handle.generation);
            handle.cancel();
        }
    }

    /// Fade timer callback. Acts only if `generation` is still the outstanding
    /// fade; anything else was cancelled and is ignored.
    pub fn fade_elapsed(&mut self, generation: u64) -> bool {
        match self.pending_fade {
            Some(ref handle) if handle.generation == generation => {}
            _ => {
                log::debug!("Ignoring stale fade #{generation}");
                return false;
            }
        }
        self.pending_fade = None;
        self.phase = OverlayPhase::FadingOut;
        self.visible = false;
        self.view.set_opacity(0.0);

        self.displayed_text.clear();
        self.view.set_text("");
        self.phase = OverlayPhase::Idle;
        true
    }

    /// Optimistic status for a locally originated capture toggle.
    pub fn set_status(&mut self, status: &str) {
        if self.status != status {
            self.status = status.to_string();
            self.view.set_status(status);
        }
    }

    /// Render the bus link indicator. Leaves the caption state alone.
    pub fn show_link(&self, alive: bool) {
        self.view.set_link(alive);
    }

    #[cfg(test)]
    pub fn has_pending_fade(&self) -> bool {
        self.pending_fade.is_some()
    }
}
