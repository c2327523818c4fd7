mod app;
mod config;
mod event;
mod lines;
mod settings;
mod transport;
mod ui;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;

use app::{
    BusListener, CommandCommit, CommitCoordinator, CommitTarget, HttpCommit, LocalCommand,
    LogCommit, OverlayState, ViewSink,
};
use config::{Cli, Command, RunConfig, SettingsArgs};
use settings::{EditOutcome, JsonFileStore, TerminalPrompter};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(cfg) => run(cfg),
        Command::Settings(args) => edit_settings(args),
    };
    if let Err(e) = result {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cfg: RunConfig) -> anyhow::Result<()> {
    log::info!("GAINS overlay starting");

    #[cfg(feature = "gtk")]
    {
        if cfg.gui {
            return run_gui(cfg);
        }
    }
    #[cfg(not(feature = "gtk"))]
    {
        if cfg.gui {
            log::warn!("Built without the `gtk` feature, using the terminal view");
        }
    }

    let (control_tx, control_rx) = async_channel::unbounded::<LocalCommand>();
    if cfg.stdin {
        // stdin carries bus records; no local controls.
        drop(control_tx);
    } else {
        ui::terminal::start_control_listener(control_tx);
    }
    run_core(cfg, Box::new(ui::terminal::TerminalView), control_rx)
}

/// Run the event loop on a single-threaded runtime until input ends, `quit`, or Ctrl-C.
fn run_core(
    cfg: RunConfig,
    view: Box<dyn ViewSink>,
    controls: async_channel::Receiver<LocalCommand>,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_session(cfg, view, controls));
    drop(local);
    // Don't wait on in-flight commits or blocking I/O after the session ends.
    runtime.shutdown_background();
    Ok(())
}

async fn run_session(
    cfg: RunConfig,
    view: Box<dyn ViewSink>,
    controls: async_channel::Receiver<LocalCommand>,
) {
    let overlay = Rc::new(RefCell::new(OverlayState::new(view, cfg.fade_delay())));
    let commits = CommitCoordinator::new(commit_target(&cfg));
    let mut listener = BusListener::new(overlay.clone(), commits);

    let (inbound_tx, inbound_rx) = async_channel::unbounded::<String>();
    let (outbound_tx, outbound_rx) = async_channel::unbounded::<String>();

    if cfg.stdin {
        tokio::task::spawn_local(transport::run_stdin(lines::stdin_lines(), inbound_tx));
    } else {
        tokio::task::spawn_local(transport::run_bridge(
            cfg.endpoint.clone(),
            inbound_tx,
            outbound_rx,
        ));
    }

    tokio::select! {
        _ = listener.run(inbound_rx) => {}
        _ = app::serve_controls(overlay.clone(), controls, outbound_tx) => {
            log::info!("Quit requested");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted");
        }
    }

    app::shutdown_overlay(&overlay);
    let counters = listener.counters();
    let stats = listener.commits().stats();
    log::info!(
        "Session over: {} events accepted, {} dropped, {} commits ({} failed)",
        counters.accepted,
        counters.dropped,
        stats.issued.get(),
        stats.failed.get()
    );
}

fn commit_target(cfg: &RunConfig) -> Rc<dyn CommitTarget> {
    if let Some((program, args)) = cfg.commit_cmd.as_deref().and_then(<[String]>::split_first) {
        log::info!("Commits run `{program}`");
        return Rc::new(CommandCommit {
            program: program.clone(),
            args: args.to_vec(),
        });
    }
    if let Some(url) = &cfg.commit_url {
        log::info!("Commits POST to {url}");
        return Rc::new(HttpCommit::new(url.clone()));
    }
    Rc::new(LogCommit)
}

fn edit_settings(args: SettingsArgs) -> anyhow::Result<()> {
    let store = JsonFileStore::new(args.path.unwrap_or_else(JsonFileStore::default_path));
    log::info!("Editing settings at {}", store.path().display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(async {
        let mut prompter = TerminalPrompter::new();
        tokio::select! {
            outcome = settings::edit_settings(&store, &mut prompter) => {
                match outcome? {
                    EditOutcome::Saved(cfg) => log::info!(
                        "Saved silence_timeout_sec={} asr_language={}",
                        cfg.silence_timeout_sec,
                        cfg.asr_language
                    ),
                    EditOutcome::Cancelled => println!("Settings unchanged."),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Settings unchanged.");
            }
        }
        Ok::<(), anyhow::Error>(())
    });
    runtime.shutdown_background();
    result
}

#[cfg(feature = "gtk")]
fn run_gui(cfg: RunConfig) -> anyhow::Result<()> {
    use gtk4::prelude::*;

    let (view_tx, view_rx) = async_channel::unbounded::<ui::overlay::ViewCommand>();
    let (control_tx, control_rx) = async_channel::unbounded::<LocalCommand>();

    // The event loop keeps its own thread; the GTK side only renders.
    std::thread::Builder::new()
        .name("gains-core".into())
        .spawn(move || {
            let view = Box::new(ui::overlay::GtkView::new(view_tx));
            if let Err(e) = run_core(cfg, view, control_rx) {
                log::error!("Event loop failed: {e:#}");
            }
        })
        .context("Failed to spawn event loop thread")?;

    let application = libadwaita::Application::builder()
        .application_id("io.github.gains.overlay")
        .build();

    application.connect_activate(move |app| {
        let overlay = ui::overlay::build_overlay(app, control_tx.clone());
        overlay.window.present();

        let view_rx = view_rx.clone();
        gtk4::glib::spawn_future_local(async move {
            while let Ok(command) = view_rx.recv().await {
                ui::overlay::apply_view_command(&overlay, command);
            }
        });
    });
    // Our own flags were already parsed; keep GTK from seeing them.
    application.run_with_args::<&str>(&[]);
    Ok(())
}
