use std::fmt::Display;
use std::io::{self, Write};
use std::num::NonZeroU32;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use super::{SettingsConfig, SettingsError, SettingsStore};

pub const RESTART_NOTICE: &str =
    "Settings saved \u{2714}\u{fe0e}\n\nRestart the ASR service to load the new model/language.";

/// Attempts per field before the session gives up on invalid input.
const MAX_ATTEMPTS: usize = 3;

const TIMEOUT_LABEL: &str = "Silence timeout (seconds)";
const LANGUAGE_LABEL: &str = "ASR language (ISO-639-1 code: en, es, fr, de, \u{2026})";

/// Interactive surface for one edit session.
pub trait Prompter {
    /// Ask for a value, prefilled with `current`. `None` means the user cancelled.
    fn prompt<'a>(
        &'a mut self,
        label: &'a str,
        current: &'a str,
    ) -> LocalBoxFuture<'a, io::Result<Option<String>>>;

    fn notify(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Saved(SettingsConfig),
    Cancelled,
}

/// Fetch, edit both fields, persist once. Any cancel or error before the write
/// leaves the store untouched.
pub async fn edit_settings<S, P>(store: &S, prompter: &mut P) -> Result<EditOutcome, SettingsError>
where
    S: SettingsStore + ?Sized,
    P: Prompter + ?Sized,
{
    let mut cfg = store.fetch().await.map_err(SettingsError::Fetch)?;

    let Some(timeout) = ask(
        prompter,
        TIMEOUT_LABEL,
        &cfg.silence_timeout_sec,
        "silence timeout",
        parse_timeout,
    )
    .await?
    else {
        log::info!("Settings edit cancelled at timeout prompt");
        return Ok(EditOutcome::Cancelled);
    };

    let Some(language) = ask(
        prompter,
        LANGUAGE_LABEL,
        &cfg.asr_language,
        "ASR language",
        parse_language,
    )
    .await?
    else {
        log::info!("Settings edit cancelled at language prompt");
        return Ok(EditOutcome::Cancelled);
    };

    cfg.silence_timeout_sec = timeout;
    cfg.asr_language = language;
    store.persist(&cfg).await.map_err(SettingsError::Persist)?;

    prompter.notify(RESTART_NOTICE);
    Ok(EditOutcome::Saved(cfg))
}

/// Blank input keeps `current` as stored, without re-validating it.
async fn ask<P, T>(
    prompter: &mut P,
    label: &str,
    current: &T,
    field: &'static str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, SettingsError>
where
    P: Prompter + ?Sized,
    T: Clone + Display,
{
    let shown = current.to_string();
    let mut reason = String::new();
    for _ in 0..MAX_ATTEMPTS {
        let Some(input) = prompter.prompt(label, &shown).await? else {
            return Ok(None);
        };
        if input.trim().is_empty() {
            return Ok(Some(current.clone()));
        }
        match parse(&input) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                log::warn!("Rejected {field} {input:?}: {e}");
                prompter.notify(&format!("Invalid {field}: {e}"));
                reason = e;
            }
        }
    }
    Err(SettingsError::InvalidInput { field, reason })
}

fn parse_timeout(input: &str) -> Result<NonZeroU32, String> {
    input
        .trim()
        .parse::<NonZeroU32>()
        .map_err(|_| format!("{:?} is not a positive whole number of seconds", input.trim()))
}

fn parse_language(input: &str) -> Result<String, String> {
    let code = input.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_string())
    } else {
        Err(format!("{code:?} is not a two-letter ISO-639-1 code"))
    }
}

/// Line-based prompter on stdin/stdout. Blank line keeps the value, EOF cancels.
pub struct TerminalPrompter {
    lines: async_channel::Receiver<String>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::from_lines(crate::lines::stdin_lines())
    }

    pub fn from_lines(lines: async_channel::Receiver<String>) -> Self {
        Self { lines }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn prompt<'a>(
        &'a mut self,
        label: &'a str,
        current: &'a str,
    ) -> LocalBoxFuture<'a, io::Result<Option<String>>> {
        async move {
            let mut out = io::stdout();
            write!(out, "{label} [{current}]: ")?;
            out.flush()?;
            // A closed line source is EOF.
            Ok(self.lines.recv().await.ok())
        }
        .boxed_local()
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}
