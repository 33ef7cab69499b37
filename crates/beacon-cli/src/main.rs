//! `beacon`: terminal dashboard driven by the live sync client.
//!
//! Prints the notification list and every live change. Reads commands from
//! stdin:
//!
//! ```text
//! list | read <id> | read-all | open <id> | state | reload | quit
//! ```
//!
//! A new deployment (or the `reload` command) tears the whole client down
//! and builds a fresh one, which is this shell's notion of a full reload.

mod logging;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use beacon_core::{Navigator, StoreEvent};
use beacon_sync::{NotificationStore, SyncClient, SyncConfig};

/// Navigation for a terminal: reloads are signalled to the main loop, routes
/// are printed.
struct ShellNavigator {
    reload_tx: mpsc::UnboundedSender<()>,
}

impl Navigator for ShellNavigator {
    fn reload(&self) {
        if self.reload_tx.send(()).is_err() {
            warn!("Reload requested after shutdown");
        }
    }

    fn navigate(&self, route: &str) {
        println!("-> {route}");
    }
}

enum Command {
    List,
    Read(i64),
    ReadAll,
    Open(i64),
    State,
    Reload,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = match (parts.next()?, parts.next()) {
            ("list" | "ls", None) => Self::List,
            ("read", Some(id)) => Self::Read(id.parse().ok()?),
            ("read-all", None) => Self::ReadAll,
            ("open", Some(id)) => Self::Open(id.parse().ok()?),
            ("state", None) => Self::State,
            ("reload", None) => Self::Reload,
            ("quit" | "exit" | "q", None) => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

enum Exit {
    Reload,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = logging::LogSettings::from_env();
    let _log_guard = logging::init(&settings);
    info!(
        log_format = %settings.format,
        log_file = settings.file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );

    let config = SyncConfig::from_env();
    info!(
        base_url = %config.base_url,
        hub_url = %config.hub_url(),
        retry_policy = ?config.retry_policy,
        version_poll_secs = config.version_poll_interval_secs,
        reconcile_secs = ?config.reconcile_interval_secs,
        "Configuration loaded"
    );

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let navigator: Arc<dyn Navigator> = Arc::new(ShellNavigator { reload_tx });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let mut client = SyncClient::new(config.clone(), navigator.clone())
            .context("Failed to build sync client")?;
        let mut events = client.store().subscribe();

        // The first push channel open can stall for as long as the hub does.
        let interrupted = tokio::select! {
            _ = client.start() => None,
            _ = tokio::signal::ctrl_c() => Some(Exit::Quit),
            Some(()) = reload_rx.recv() => Some(Exit::Reload),
        };
        let exit = match interrupted {
            Some(exit) => exit,
            None => run_session(&client, &mut events, &mut reload_rx, &mut lines).await?,
        };
        client.shutdown().await;

        match exit {
            Exit::Reload => {
                info!("Reloading client state");
                println!("== reloading ==");
            }
            Exit::Quit => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn run_session(
    client: &SyncClient,
    events: &mut broadcast::Receiver<StoreEvent>,
    reload_rx: &mut mpsc::UnboundedReceiver<()>,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<Exit> {
    let store = client.store();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(Exit::Quit),
            Some(()) = reload_rx.recv() => return Ok(Exit::Reload),
            event = events.recv() => match event {
                Ok(event) => print_event(store, &event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dashboard fell behind store events");
                    print_list(store).await;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(Exit::Quit),
            },
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    stdin_open = false;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Command::parse(line) {
                    Some(Command::List) => print_list(store).await,
                    Some(Command::Read(id)) => {
                        let outcome = store.mark_as_read(id).await;
                        println!("read {id}: {outcome:?}");
                    }
                    Some(Command::ReadAll) => {
                        let outcome = store.mark_all_as_read().await;
                        println!("read-all: {outcome:?}");
                    }
                    Some(Command::Open(id)) => {
                        if store.open(id, client.navigator().as_ref()).await.is_none() {
                            println!("notification {id} has no link");
                        }
                    }
                    Some(Command::State) => println!("connection: {}", client.connection().state()),
                    Some(Command::Reload) => return Ok(Exit::Reload),
                    Some(Command::Quit) => return Ok(Exit::Quit),
                    None => println!(
                        "commands: list | read <id> | read-all | open <id> | state | reload | quit"
                    ),
                }
            }
        }
    }
}

async fn print_list(store: &NotificationStore) {
    let notifications = store.notifications().await;
    println!(
        "{} notifications, {} unread",
        notifications.len(),
        store.unread_count().await
    );
    for n in &notifications {
        println!(
            "{} #{:<6} [{:<17}] {}  ({})",
            if n.is_read { ' ' } else { '*' },
            n.id,
            n.category.as_str(),
            n.title,
            NotificationStore::relative_time(n.created_at)
        );
    }
}

async fn print_event(store: &NotificationStore, event: &StoreEvent) {
    match event {
        StoreEvent::Loaded { .. } => print_list(store).await,
        StoreEvent::Received { id } => {
            if let Some(n) = store.get(*id).await {
                println!("new: #{} [{}] {} - {}", n.id, n.category, n.title, n.message);
            }
            println!("unread: {}", store.unread_count().await);
        }
        StoreEvent::MarkedRead { .. } | StoreEvent::MarkedAllRead => {
            println!("unread: {}", store.unread_count().await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert!(matches!(Command::parse("list"), Some(Command::List)));
        assert!(matches!(Command::parse("read 42"), Some(Command::Read(42))));
        assert!(matches!(Command::parse("open 7"), Some(Command::Open(7))));
        assert!(matches!(Command::parse("read-all"), Some(Command::ReadAll)));
        assert!(matches!(Command::parse("q"), Some(Command::Quit)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("").is_none());
        assert!(Command::parse("read").is_none());
        assert!(Command::parse("read abc").is_none());
        assert!(Command::parse("list extra").is_none());
    }

    #[test]
    fn test_navigator_reload_signals_main_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let navigator = ShellNavigator { reload_tx: tx };
        navigator.reload();
        assert!(rx.try_recv().is_ok());
    }
}
