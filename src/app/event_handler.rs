use std::cell::RefCell;
use std::rc::Rc;

use crate::event::{Event, ToggleAction, ToggleRecord};

use super::state::{FadeHandle, OverlayState, LISTENING_STATUS};

/// Apply one validated event to the overlay. This is the core state machine.
pub fn handle_overlay_event(state: &Rc<RefCell<OverlayState>>, event: &Event) {
    match event {
        Event::AsrPartial { text, .. } => {
            state.borrow_mut().show_partial(text);
        }
        Event::GestureNod { .. } => {
            let generation = state.borrow_mut().mark_committed();
            schedule_fade(state, generation);
        }
        Event::Heartbeat { .. } => {}
        Event::AsrToggle { action, .. } => {
            log::info!("Bus reported capture {}", action.as_str());
        }
    }
}

/// Hide the caption after the configured delay unless something cancels it first.
fn schedule_fade(state: &Rc<RefCell<OverlayState>>, generation: u64) {
    let delay = state.borrow().fade_delay;
    let weak = Rc::downgrade(state);
    let task = tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        if let Some(state) = weak.upgrade() {
            state.borrow_mut().fade_elapsed(generation);
        }
    });
    state
        .borrow_mut()
        .attach_fade(FadeHandle { generation, task });
}

/// Capture toggle requested from this side. Updates the status optimistically
/// and returns the record to publish; no acknowledgment is awaited.
pub fn request_toggle(state: &Rc<RefCell<OverlayState>>, action: ToggleAction) -> ToggleRecord {
    let status = match action {
        ToggleAction::Start => LISTENING_STATUS,
        ToggleAction::Stop => "",
    };
    state.borrow_mut().set_status(status);
    ToggleRecord::now(action)
}

/// Cancel any pending fade. Called on shutdown.
pub fn shutdown_overlay(state: &Rc<RefCell<OverlayState>>) {
    state.borrow_mut().cancel_fade();
}
