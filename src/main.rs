//! Terminal kiosk driver.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create a current-thread [`tokio`] runtime.  The cpal stream lives on
//!    this thread; remote calls run as tasks on the same runtime.
//! 4. Build the HTTP order service and log the menu.
//! 5. Spawn the stdin reader thread (one command per line).
//! 6. Spawn the event printer.
//! 7. Run the [`KioskController`] until stdin closes or `q` is entered.
//!
//! # Keys
//!
//! | input          | command           |
//! |----------------|-------------------|
//! | Enter / `r`    | ToggleRecording   |
//! | `o`            | Open              |
//! | `c`            | Close             |
//! | `q`            | quit              |

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use voice_order_kiosk::{
    audio::CpalDevice,
    config::{AppConfig, AppPaths},
    kiosk::{KioskCommand, KioskController, KioskEvent},
    service::{HttpOrderService, OrderService},
    session::SessionStore,
};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

fn parse_command(line: &str) -> Option<KioskCommand> {
    match line.trim() {
        "" | "r" => Some(KioskCommand::ToggleRecording),
        "o" => Some(KioskCommand::Open),
        "c" => Some(KioskCommand::Close),
        _ => None,
    }
}

/// Blocking stdin loop.  Returning drops `tx`, which shuts the controller
/// down once in-flight work has drained.
fn read_commands(tx: mpsc::Sender<KioskCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim() == "q" {
            break;
        }
        match parse_command(&line) {
            Some(command) => {
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
            None => eprintln!("unknown input {line:?} (Enter/r = mic, o = open, c = close, q = quit)"),
        }
    }
    log::debug!("input: stdin closed");
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_event(event: &KioskEvent) {
    match event {
        KioskEvent::RecordingStarted => println!("[mic] recording"),
        KioskEvent::RecordingStopped { duration_secs } => {
            println!("[mic] stopped after {duration_secs:.1}s")
        }
        KioskEvent::Status { text } => println!("[status] {text}"),
        KioskEvent::SessionUpdated { session } => {
            if let Some(order) = session.current_order.as_ref().filter(|o| !o.is_empty()) {
                println!("[order]");
                for line in &order.items {
                    let options = line.unique_options().join(", ");
                    println!("  {} x{} [{}] {}", line.name, line.quantity, options, line.price);
                }
                if let Some(requests) = &order.special_requests {
                    println!("  ({requests})");
                }
                println!("  total {}", order.total_price);
            }
            if let Some(question) = &session.pending_clarification {
                println!("[question] {question}");
            }
        }
        KioskEvent::Speak { text } => println!("[speak] {text}"),
        KioskEvent::OrderCompleted(done) => println!(
            "[complete] {} line(s), total {}",
            done.order.items.len(),
            done.order.total_price
        ),
        KioskEvent::Failed { error } => println!("[error] {error}"),
        KioskEvent::CaptureFailed { error } => println!("[error] {error}"),
        KioskEvent::Rejected { reason } => println!("[busy] {reason}"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

async fn run(config: AppConfig, paths: AppPaths) -> anyhow::Result<()> {
    let service = Arc::new(HttpOrderService::from_config(&config.service));
    match service.menu().await {
        Ok(menu) => log::info!(
            "menu: {} categories, {} items",
            menu.len(),
            menu.iter().map(|c| c.items.len()).sum::<usize>()
        ),
        Err(e) => log::warn!("menu unavailable ({e}); continuing"),
    }

    let (command_tx, command_rx) = mpsc::channel::<KioskCommand>(16);
    let (event_tx, mut event_rx) = mpsc::channel::<KioskEvent>(64);

    std::thread::Builder::new()
        .name("kiosk-input".into())
        .spawn(move || read_commands(command_tx))?;

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let controller = KioskController::new(&config, CpalDevice::new(), service, event_tx)
        .with_store(SessionStore::at(paths.session_file));
    controller.run(command_rx).await;

    printer.await?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice order kiosk starting up");

    // 2. Configuration
    let paths = AppPaths::new();
    let config = AppConfig::load_from(&paths.settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    log::info!("order service at {}", config.service.base_url);

    // 3. Runtime
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(config, paths))
}
