use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Why a bridge connection ended.
enum Disconnect {
    /// Peer closed or the socket failed; reconnect.
    Lost,
    /// Every local consumer is gone; stop for good.
    Shutdown,
}

/// Keep a connection to the bus bridge open. Inbound lines go to `inbound`;
/// anything on `outbound` is written back as one line. Messages sent while
/// disconnected are dropped.
pub async fn run_bridge(
    endpoint: String,
    inbound: async_channel::Sender<String>,
    outbound: async_channel::Receiver<String>,
) {
    loop {
        match TcpStream::connect(&endpoint).await {
            Ok(stream) => {
                log::info!("Connected to bus bridge at {endpoint}");
                match pump(stream, &inbound, &outbound).await {
                    Disconnect::Shutdown => return,
                    Disconnect::Lost => log::warn!("Bus bridge connection lost"),
                }
            }
            Err(e) => log::warn!("Bus bridge {endpoint} unreachable: {e}"),
        }

        if inbound.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
        while let Ok(dropped) = outbound.try_recv() {
            log::warn!("Bridge offline, dropping outbound message: {dropped}");
        }
    }
}

async fn pump(
    stream: TcpStream,
    inbound: &async_channel::Sender<String>,
    outbound: &async_channel::Receiver<String>,
) -> Disconnect {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if inbound.send(line).await.is_err() {
                        return Disconnect::Shutdown;
                    }
                }
                Ok(None) => return Disconnect::Lost,
                Err(e) => {
                    log::warn!("Bus read error: {e}");
                    return Disconnect::Lost;
                }
            },
            msg = outbound.recv() => match msg {
                Ok(mut msg) => {
                    msg.push('\n');
                    if let Err(e) = writer.write_all(msg.as_bytes()).await {
                        log::warn!("Bus write error: {e}");
                        return Disconnect::Lost;
                    }
                }
                // No more local publishers; keep reading.
                Err(_) => return read_only(lines, inbound).await,
            },
        }
    }
}

async fn read_only<R>(
    mut lines: tokio::io::Lines<R>,
    inbound: &async_channel::Sender<String>,
) -> Disconnect
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() && inbound.send(line).await.is_err() {
                    return Disconnect::Shutdown;
                }
            }
            Ok(None) => return Disconnect::Lost,
            Err(e) => {
                log::warn!("Bus read error: {e}");
                return Disconnect::Lost;
            }
        }
    }
}

/// Feed bus records, one JSON object per line, until the source closes.
pub async fn run_stdin(
    lines: async_channel::Receiver<String>,
    inbound: async_channel::Sender<String>,
) {
    while let Ok(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        if inbound.send(line).await.is_err() {
            break;
        }
    }
    log::info!("Input closed");
}
