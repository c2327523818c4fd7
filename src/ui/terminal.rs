use std::io::BufRead;

use crate::app::{LocalCommand, ViewSink};

/// Renders the caption as lines on stdout.
#[derive(Debug, Default)]
pub struct TerminalView;

impl ViewSink for TerminalView {
    fn set_text(&self, text: &str) {
        if !text.is_empty() {
            println!("\u{258c} {text}");
        }
    }

    fn set_opacity(&self, opacity: f64) {
        if opacity <= 0.0 {
            println!("\u{258c} \u{2026}");
        }
    }

    fn set_status(&self, status: &str) {
        if !status.is_empty() {
            println!("[{status}]");
        }
    }

    fn set_link(&self, alive: bool) {
        if alive {
            println!("[bus link up]");
        } else {
            println!("[bus link down]");
        }
    }
}

/// Read `start` / `stop` / `quit` from stdin on a dedicated OS thread.
pub fn start_control_listener(sender: async_channel::Sender<LocalCommand>) {
    let spawned = std::thread::Builder::new()
        .name("control-listener".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("Control input error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match LocalCommand::parse(&line) {
                    Some(command) => {
                        if sender.send_blocking(command).is_err() {
                            break;
                        }
                    }
                    None => println!("Commands: start, stop, quit"),
                }
            }
            log::debug!("Control listener exiting");
        });
    if let Err(e) = spawned {
        log::error!("Failed to spawn control listener: {e}");
    }
}
