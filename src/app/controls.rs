use std::cell::RefCell;
use std::rc::Rc;

use crate::event::ToggleAction;

use super::event_handler::request_toggle;
use super::state::OverlayState;

/// Requests originating on this side of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Toggle(ToggleAction),
    Quit,
}

impl LocalCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" | "listen" => Some(LocalCommand::Toggle(ToggleAction::Start)),
            "stop" => Some(LocalCommand::Toggle(ToggleAction::Stop)),
            "quit" | "exit" | "q" => Some(LocalCommand::Quit),
            _ => None,
        }
    }
}

/// Apply local commands until `Quit`. Toggles update the overlay status and
/// are published without waiting for the bridge. If the command source goes
/// away this never returns.
pub async fn serve_controls(
    overlay: Rc<RefCell<OverlayState>>,
    commands: async_channel::Receiver<LocalCommand>,
    outbound: async_channel::Sender<String>,
) {
    while let Ok(command) = commands.recv().await {
        match command {
            LocalCommand::Toggle(action) => {
                log::info!("Requesting capture {}", action.as_str());
                let record = request_toggle(&overlay, action);
                match record.to_line() {
                    Ok(line) => {
                        if outbound.try_send(line).is_err() {
                            log::warn!("No bus publisher, toggle not sent");
                        }
                    }
                    Err(e) => log::error!("Failed to encode toggle: {e}"),
                }
            }
            LocalCommand::Quit => return,
        }
    }
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::state::testing::RecordingView;
    use crate::app::state::LISTENING_STATUS;

    #[test]
    fn parses_commands() {
        assert_eq!(
            LocalCommand::parse(" Start "),
            Some(LocalCommand::Toggle(ToggleAction::Start))
        );
        assert_eq!(
            LocalCommand::parse("stop"),
            Some(LocalCommand::Toggle(ToggleAction::Stop))
        );
        assert_eq!(LocalCommand::parse("q"), Some(LocalCommand::Quit));
        assert_eq!(LocalCommand::parse("nod"), None);
    }

    #[tokio::test]
    async fn toggle_is_published_and_status_set() {
        let overlay = Rc::new(RefCell::new(OverlayState::new(
            Box::new(RecordingView::default()),
            Duration::from_secs(1),
        )));
        let (cmd_tx, cmd_rx) = async_channel::unbounded();
        let (out_tx, out_rx) = async_channel::unbounded();

        cmd_tx
            .send(LocalCommand::Toggle(ToggleAction::Start))
            .await
            .unwrap();
        cmd_tx.send(LocalCommand::Quit).await.unwrap();
        serve_controls(overlay.clone(), cmd_rx, out_tx).await;

        assert_eq!(overlay.borrow().status, LISTENING_STATUS);
        let line = out_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "asr.toggle");
        assert_eq!(value["action"], "start");
    }
}
