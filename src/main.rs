use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing_subscriber::EnvFilter;

use keyping::channel;
use keyping::config::Cli;
use keyping::control::Command;
use keyping::hook::HookThread;
use keyping::hook::x11::X11Keyboard;
use keyping::notification::NotificationController;
use keyping::presentation::{ConsolePresenter, Presentation};
use keyping::{HotkeyRegistry, ShortcutError};

/// Longest accepted control line.
const MAX_LINE: usize = 4096;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("keyping: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    // The stdin reader thread cannot be cancelled; don't wait for a newline.
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("keyping: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ShortcutError> {
    let registry = Arc::new(HotkeyRegistry::new());
    for binding in cli.all_bindings() {
        if let Err(e) = registry.add(binding.spec, binding.message) {
            tracing::warn!(error = %e, "skipping configured shortcut");
        }
    }

    // Without the hook there is nothing to notify about.
    let keyboard = X11Keyboard::install()?;

    let (sender, receiver) = channel::bounded(cli.queue_capacity);
    let hook = HookThread::spawn(keyboard, Arc::clone(&registry), sender, cli.hook())?;

    let notification = cli.notification();
    let mut presentation = Presentation::new(
        Arc::clone(&registry),
        receiver,
        NotificationController::new(notification),
        ConsolePresenter::new(std::io::stdout()),
    );

    let mut ticker = tokio::time::interval(notification.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new_with_max_length(MAX_LINE));
    let mut stdin_open = true;

    tracing::info!(
        shortcuts = registry.len(),
        tick_ms = notification.tick.as_millis() as u64,
        "listening for shortcuts"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                presentation.on_tick();
                if presentation.is_disconnected() {
                    tracing::error!("hook thread stopped unexpectedly");
                    break;
                }
            }
            line = lines.next(), if stdin_open => match line {
                Some(Ok(line)) => match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => println!("{}", command.execute(&registry)),
                    Ok(None) => {}
                    Err(e) => println!("error: {e}"),
                },
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "unreadable control line");
                    println!("error: {e}");
                }
                None => {
                    tracing::debug!("stdin closed, control commands disabled");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    hook.shutdown();
    tracing::info!("shut down");
    Ok(())
}
