//! keeperd - The focus keeper background service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - The focus keeper engine
//! - Host adapters (process table, hosts file)
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use keeper_api::{ErrorCode, ErrorInfo, Event, EventPayload, Response};
use keeper_config::load_config_or_default;
use keeper_core::{CoreEvent, FocusKeeper};
use keeper_host_linux::{HostsFileEnforcer, SysinfoInspector};
use keeper_ipc::{IpcServer, ServerMessage};
use keeper_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use keeper_util::{database_path, default_config_path, RateLimiter, KEEPER_DATA_DIR_ENV, KEEPER_SOCKET_ENV};
use keeperd::{handle_command, is_password_attempt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// keeperd - Focus sessions with app and website blocking
#[derive(Parser, Debug)]
#[command(name = "keeperd")]
#[command(about = "Focus sessions with app and website blocking", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/focus-keeper/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override
    #[arg(short, long, env = KEEPER_SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, env = KEEPER_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Hosts file override, for running unprivileged against a scratch file
    #[arg(long)]
    hosts_file: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

struct Limiters {
    requests: RateLimiter,
    /// Keyed by peer uid, shared across that user's connections
    passwords: RateLimiter<Option<u32>>,
}

/// Main service state
struct Service {
    keeper: Arc<FocusKeeper>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    limiters: Limiters,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let mut config = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if let Some(socket) = &args.socket {
            config.daemon.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            config.daemon.data_dir = data_dir.clone();
        }
        if let Some(hosts_file) = &args.hosts_file {
            config.enforcement.hosts_path = hosts_file.clone();
        }

        info!(
            config_path = %args.config.display(),
            hosts_path = %config.enforcement.hosts_path.display(),
            poll_interval_secs = config.monitor.poll_interval.as_secs(),
            "Configuration loaded"
        );

        let data_dir = &config.daemon.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let inspector = Arc::new(SysinfoInspector::new());
        let enforcer = Arc::new(HostsFileEnforcer::new(
            config.enforcement.hosts_path.clone(),
            config.enforcement.redirect_address,
        ));

        let keeper = FocusKeeper::new(&config, store.clone(), inspector, enforcer)
            .context("Failed to initialize focus keeper")?;

        let mut ipc = IpcServer::new(&config.daemon.socket_path);
        ipc.start().await?;

        info!(socket_path = %config.daemon.socket_path.display(), "IPC server started");

        Ok(Self {
            keeper: Arc::new(keeper),
            ipc: Arc::new(ipc),
            store,
            limiters: Limiters {
                requests: RateLimiter::new(30, Duration::from_secs(1)),
                passwords: RateLimiter::new(5, Duration::from_secs(60)),
            },
        })
    }

    async fn run(self) -> Result<()> {
        let keeper = self.keeper.clone();
        let ipc = self.ipc.clone();
        let store = self.store.clone();
        let limiters = Arc::new(Mutex::new(self.limiters));

        // Subscribe before startup so nothing it emits is missed
        let mut core_events = keeper.subscribe();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        keeper.startup().await.context("Startup failed")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Engine events fan out to subscribed clients
                event = core_events.recv() => match event {
                    Ok(event) => Self::handle_core_event(&ipc, event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dropped core events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Core event channel closed");
                        break;
                    }
                },

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&keeper, &ipc, &store, &limiters, msg).await;
                }
            }
        }

        info!("Shutting down keeperd");

        if let Err(e) = keeper.shutdown().await {
            warn!(error = %e, "Keeper shutdown failed");
        }
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(ipc: &Arc<IpcServer>, event: CoreEvent) {
        match &event {
            CoreEvent::FocusTick(_) => {}
            CoreEvent::FocusCompleted {
                session_id,
                duration,
            } => {
                info!(session_id = %session_id, duration, "Broadcasting focus completion");
            }
            other => debug!(event = ?other, "Broadcasting core event"),
        }
        ipc.broadcast_event(Event::new(event.into()));
    }

    async fn handle_ipc_message(
        keeper: &Arc<FocusKeeper>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        limiters: &Arc<Mutex<Limiters>>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let uid = if is_password_attempt(&request.command) {
                    ipc.get_client_info(&client_id).await.and_then(|info| info.uid)
                } else {
                    None
                };
                let limited = {
                    let mut limiters = limiters.lock().await;
                    if !limiters.requests.check(&client_id) {
                        Some("Too many requests".to_string())
                    } else if is_password_attempt(&request.command)
                        && !limiters.passwords.check(&uid)
                    {
                        let wait = limiters.passwords.retry_after(&uid);
                        Some(format!(
                            "Too many password attempts, retry in {}s",
                            wait.as_secs().max(1)
                        ))
                    } else {
                        None
                    }
                };
                if let Some(message) = limited {
                    warn!(client_id = %client_id, "Request rate limited");
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, message),
                    );
                    let _ = ipc.send_response(&client_id, response).await;
                    return;
                }

                // Handlers may await enforcement; run them off the loop
                let keeper = keeper.clone();
                let ipc = ipc.clone();
                tokio::spawn(async move {
                    let result = handle_command(&keeper, client_id, request.command).await;
                    if let Err(e) = &result {
                        debug!(client_id = %client_id, request_id = request.request_id, error = %e, "Command failed");
                    }
                    let response = Response::from_result(request.request_id, result);
                    let _ = ipc.send_response(&client_id, response).await;
                });
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    uid: info.uid,
                }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                }));

                let mut limiters = limiters.lock().await;
                limiters.requests.remove_client(&client_id);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "keeperd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
