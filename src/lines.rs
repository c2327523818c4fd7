use std::io::BufRead;

/// Read lines from a blocking source on a dedicated OS thread.
///
/// The channel closes at EOF or on a read error. The thread is detached, so a
/// read that never returns cannot hold up runtime shutdown or process exit.
pub fn spawn_line_reader<R>(name: &str, reader: R) -> async_channel::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = async_channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send_blocking(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Input read error: {e}");
                        break;
                    }
                }
            }
            log::debug!("Line reader exiting");
        });
    if let Err(e) = spawned {
        // The sender went down with the closure, so readers see EOF.
        log::error!("Failed to spawn {name}: {e}");
    }
    rx
}

/// Lines from the process stdin.
pub fn stdin_lines() -> async_channel::Receiver<String> {
    spawn_line_reader("stdin-reader", std::io::BufReader::new(std::io::stdin()))
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    /// A source whose read blocks until the test's sender is dropped.
    struct Stalled(mpsc::Receiver<()>);

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn forwards_lines_then_closes_at_eof() {
        let rx = spawn_line_reader("test-reader", Cursor::new("12\n\nen\n"));
        assert_eq!(rx.recv().await.unwrap(), "12");
        assert_eq!(rx.recv().await.unwrap(), "");
        assert_eq!(rx.recv().await.unwrap(), "en");
        assert!(rx.recv().await.is_err());
    }

    #[test]
    fn blocked_read_does_not_hold_up_runtime_shutdown() {
        let (_keep_blocked, gate) = mpsc::channel::<()>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let rx = spawn_line_reader("stalled-reader", BufReader::new(Stalled(gate)));
        let got = runtime.block_on(async {
            tokio::select! {
                line = rx.recv() => Some(line),
                _ = tokio::time::sleep(Duration::from_millis(20)) => None,
            }
        });
        assert!(got.is_none());

        // Returning at all is the assertion: the read is still parked.
        runtime.shutdown_background();
    }
}
