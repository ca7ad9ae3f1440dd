//! Spindle Monitor - headless mirror of backend state
//!
//! Connects to the backend, starts a [`Session`] and logs what the
//! synchronized views look like every time they change.
//!
//! ## Command line flags
//!
//! - `--config <path>`: Read configuration from `<path>` instead of the default location
//! - `--address <host:port>`: Override `backend_address` from the config

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use spindle_core::color::color_for_tag;
use spindle_core::commands::Backend;
use spindle_core::config::{self, ClientConfig};
use spindle_core::ipc::IpcConnection;
use spindle_core::Session;

struct Args {
    config_path: Option<PathBuf>,
    address: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        address: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config needs a path")?;
                args.config_path = Some(PathBuf::from(value));
            }
            "--address" => {
                args.address = Some(iter.next().context("--address needs host:port")?);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn log_state(session: &Session) {
    for deck in session.player().controllers() {
        let title = deck
            .metadata()
            .map(|m| m.title.as_str())
            .unwrap_or("<empty>");
        let status = deck
            .status()
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| "idle".to_string());
        log::info!(
            "deck {}: {} [{}] {:.1}%",
            deck.id(),
            title,
            status,
            deck.progress()
        );
    }

    let tasks = session.tasks();
    if !tasks.is_empty() {
        let summary: Vec<String> = tasks
            .iter()
            .map(|t| format!("{}={}", t.id, t.status))
            .collect();
        log::info!("worker queue: {}", summary.join(", "));
    }

    let entries = session.entries();
    log::info!(
        "entries: {}{}",
        entries.entries().len(),
        if entries.is_loading() { " (loading)" } else { "" }
    );

    for (depth, node) in session.directory_tree().walk() {
        log::debug!(
            "{}{} {}",
            "  ".repeat(depth),
            node.title,
            color_for_tag(node.tag.as_ref()).to_hex()
        );
    }

    for section in session.tag_sections() {
        log::debug!("{}: {} tags", section.name().name, section.tags().len());
    }
}

fn main() -> Result<()> {
    let args = parse_args()?;

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("spindle-monitor starting up");

    let config_path = args
        .config_path
        .unwrap_or_else(config::default_config_path);
    let mut config = ClientConfig::load(&config_path);
    if let Some(address) = args.address {
        config.backend_address = address;
    }

    let connection = IpcConnection::connect(
        &config.backend_address,
        config.notification_queue_capacity,
    )
    .with_context(|| format!("Failed to connect to backend at {}", config.backend_address))?;
    let inbound = connection.notifications();
    let backend: Rc<dyn Backend> = Rc::new(connection);

    let mut session = Session::start(backend, config);
    session.run(&inbound, log_state);
    session.shutdown();

    log::info!("spindle-monitor stopped");
    Ok(())
}
