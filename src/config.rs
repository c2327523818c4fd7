use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_BUS_ENDPOINT: &str = "127.0.0.1:5555";
pub const DEFAULT_FADE_MS: u64 = 2000;

#[derive(Debug, Parser)]
#[command(name = "gains-overlay", about = "Live caption overlay for the GAINS bus", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show live captions from the bus and commit them on nod
    Run(RunConfig),
    /// Edit the ASR settings shared with the speech service
    Settings(SettingsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunConfig {
    /// Bus bridge address (newline-delimited JSON over TCP)
    #[arg(long, env = "GAINS_BUS_ENDPOINT", default_value = DEFAULT_BUS_ENDPOINT)]
    pub endpoint: String,

    /// Read bus records from stdin instead of the TCP bridge
    #[arg(long, default_value_t = false)]
    pub stdin: bool,

    /// Delay before a committed caption fades out (ms)
    #[arg(long = "fade-ms", env = "GAINS_FADE_MS", default_value_t = DEFAULT_FADE_MS)]
    pub fade_ms: u64,

    /// Program (and arguments) to run for each commit
    #[arg(long = "commit-cmd", num_args = 1.., conflicts_with = "commit_url")]
    pub commit_cmd: Option<Vec<String>>,

    /// URL to POST to for each commit
    #[arg(long = "commit-url", env = "GAINS_COMMIT_URL")]
    pub commit_url: Option<String>,

    /// Show the caption in a GTK overlay window (needs the `gtk` build feature)
    #[arg(long, default_value_t = false)]
    pub gui: bool,
}

impl RunConfig {
    pub fn fade_delay(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

#[derive(Debug, Clone, Args)]
pub struct SettingsArgs {
    /// Settings file (defaults to the user config directory)
    #[arg(long, env = "GAINS_SETTINGS")]
    pub path: Option<PathBuf>,
}
