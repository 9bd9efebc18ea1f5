use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use dispatch_display::config;
use dispatch_display::display::console::ConsoleDisplay;
use dispatch_display::display::notify::NotificationDisplay;
use dispatch_display::display::{Device, run_coordinator, show_once};
use dispatch_display::handoff::{Handoff, Shutdown};
use dispatch_display::ledger::Ledger;
use dispatch_display::mail::imap_transport::ImapTransport;
use dispatch_display::watcher::{WatcherConfig, run_watcher};

#[derive(Parser)]
#[command(name = "dispatch-display")]
#[command(about = "Relay dispatch emails onto an alert display", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceKind {
    /// Scrolling marquee on the terminal
    Console,
    /// Desktop notifications
    Notify,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the mailbox and relay new dispatches to the display
    Run {
        #[arg(long, value_enum, default_value = "console")]
        device: DeviceKind,

        /// Override the processed-UID ledger file
        #[arg(long)]
        ledger: Option<PathBuf>,

        #[arg(long, default_value_t = config::DEFAULT_BACKOFF_SECS)]
        backoff_secs: u64,

        #[arg(long, default_value_t = config::DEFAULT_IDLE_SECS)]
        idle_secs: u64,

        /// Proactively reconnect after this many minutes even when healthy
        #[arg(long, default_value_t = config::DEFAULT_ROTATE_MINS)]
        rotate_mins: u64,
    },

    /// Show one message on the display and exit
    Show {
        text: String,

        #[arg(long, default_value_t = 30)]
        secs: u64,

        #[arg(long, value_enum, default_value = "console")]
        device: DeviceKind,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Show { text, secs, device } => {
            let mut device = build_device(device)?;
            show_once(&mut *device, &text, Duration::from_secs(secs))
        }

        Command::Run {
            device,
            ledger,
            backoff_secs,
            idle_secs,
            rotate_mins,
        } => run_relay(device, ledger, backoff_secs, idle_secs, rotate_mins),
    }
}

fn build_device(kind: DeviceKind) -> Result<Box<dyn Device>> {
    Ok(match kind {
        DeviceKind::Console => Box::new(ConsoleDisplay::new()?),
        DeviceKind::Notify => Box::new(NotificationDisplay::new()),
    })
}

fn run_relay(
    kind: DeviceKind,
    ledger_override: Option<PathBuf>,
    backoff_secs: u64,
    idle_secs: u64,
    rotate_mins: u64,
) -> Result<()> {
    let mut device = build_device(kind)?;

    let settings = match config::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            // the panel is the only operator-visible channel in deployment
            log::error!("configuration error: {e:#}");
            let _ = show_once(
                &mut *device,
                "Unable to load mail settings",
                Duration::from_secs(15),
            );
            return Err(e);
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let handoff = Arc::new(Handoff::new());
    {
        let shutdown = shutdown.clone();
        let handoff = handoff.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received; shutting down");
            shutdown.trigger();
            handoff.shutdown();
        })?;
    }

    let ledger = Ledger::new(match ledger_override {
        Some(path) => path,
        None => settings.ledger_path.clone(),
    });
    let transport = ImapTransport::new(&settings.host, &settings.address, &settings.password);
    let watcher_cfg = WatcherConfig {
        started_at: chrono::Utc::now(),
        sender: settings.sender.clone(),
        subject_prefix: settings.subject_prefix.clone(),
        display_time: settings.display_time,
        idle_timeout: Duration::from_secs(idle_secs),
        backoff: Duration::from_secs(backoff_secs),
        session_max_age: Duration::from_secs(rotate_mins * 60),
    };

    log::info!(
        "relaying dispatches for {} on {} (ledger {})",
        settings.address,
        settings.host,
        ledger.path().display()
    );

    {
        let handoff = handoff.clone();
        let shutdown = shutdown.clone();
        // not joined: process exit tears it down even if it is parked in a
        // blocking IMAP wait
        thread::Builder::new()
            .name("mailbox-watcher".to_string())
            .spawn(move || run_watcher(&transport, &ledger, &handoff, &watcher_cfg, &shutdown))?;
    }

    // render on the main thread so the final clear runs on every exit path
    run_coordinator(&handoff, &mut *device);
    Ok(())
}
