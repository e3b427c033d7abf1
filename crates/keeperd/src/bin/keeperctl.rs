//! keeperctl - command line client for keeperd

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keeper_api::{BlockCategory, Command, EventPayload, ResponsePayload, ResponseResult};
use keeper_ipc::IpcClient;
use keeper_util::{default_socket_path, format_duration};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "keeperctl")]
#[command(about = "Control the keeperd focus service", long_about = None)]
struct Cli {
    /// Socket path (default: $KEEPER_SOCKET or the runtime directory)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the full daemon state
    Status,
    /// Start a focus session
    Start {
        /// Length in minutes (default from config)
        #[arg(short, long)]
        minutes: Option<u32>,
        /// Refuse pause and stop while the lock holds
        #[arg(long)]
        strict: bool,
    },
    Pause,
    Resume,
    Stop,
    /// Block a website
    BlockSite { domain: String },
    /// Unblock a website
    UnblockSite { domain: String },
    /// Remove every website block
    UnblockAll,
    /// Block an application by name
    BlockApp { name: String },
    /// Unblock an application
    UnblockApp { name: String },
    /// List running processes matching a name
    Ps { name: String },
    /// Terminate processes by pid
    Kill { pids: Vec<u32> },
    /// Start or stop the app monitor
    Monitor {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Set the lock password
    SetPassword { password: String },
    /// Lock both blocklists
    Lock { minutes: u64 },
    /// Unlock with the password
    Unlock { password: String },
    /// Show statistics
    Stats {
        /// Also show this many days of history
        #[arg(long)]
        history: Option<u32>,
    },
    /// Reset statistics
    ResetStats,
    /// Record a block manually
    AddBlock {
        #[arg(value_parser = ["website", "app"])]
        category: String,
    },
    /// Stream events until interrupted
    Watch,
}

impl Cmd {
    fn into_command(self) -> Result<Command> {
        Ok(match self {
            Cmd::Status => Command::GetState,
            Cmd::Start { minutes, strict } => Command::StartFocus {
                target_minutes: minutes,
                strict_mode: strict,
            },
            Cmd::Pause => Command::PauseFocus,
            Cmd::Resume => Command::ResumeFocus,
            Cmd::Stop => Command::StopFocus,
            Cmd::BlockSite { domain } => Command::AddWebsite { domain },
            Cmd::UnblockSite { domain } => Command::RemoveWebsite { domain },
            Cmd::UnblockAll => Command::UnblockAll,
            Cmd::BlockApp { name } => Command::AddApp { name },
            Cmd::UnblockApp { name } => Command::RemoveApp { name },
            Cmd::Ps { name } => Command::FindProcesses { name },
            Cmd::Kill { pids } => Command::KillProcesses { pids },
            Cmd::Monitor { state } if state == "on" => Command::StartMonitoring,
            Cmd::Monitor { .. } => Command::StopMonitoring,
            Cmd::SetPassword { password } => Command::SetPassword { password },
            Cmd::Lock { minutes } => Command::LockFocus { minutes },
            Cmd::Unlock { password } => Command::Unlock { password },
            Cmd::Stats { history: Some(days) } => Command::GetHistory { days },
            Cmd::Stats { history: None } => Command::GetStats,
            Cmd::ResetStats => Command::ResetStats,
            Cmd::AddBlock { category } => Command::AddBlock {
                category: if category == "app" {
                    BlockCategory::App
                } else {
                    BlockCategory::Website
                },
            },
            Cmd::Watch => bail!("watch is not a single command"),
        })
    }
}

fn print_payload(payload: &ResponsePayload) -> Result<()> {
    match payload {
        ResponsePayload::Focus(state) => {
            println!(
                "{:?}: {} / {}{}",
                state.phase,
                format_duration(Duration::from_secs(state.elapsed)),
                format_duration(Duration::from_secs(state.target)),
                if state.is_strict_mode { " (strict)" } else { "" }
            );
        }
        ResponsePayload::Stats(stats) => {
            println!(
                "Today:    {} focused, {} blocks ({} websites, {} apps)",
                format_duration(Duration::from_secs(stats.today.focus_duration_seconds)),
                stats.today.block_count,
                stats.today.websites_blocked,
                stats.today.apps_blocked
            );
            println!(
                "Lifetime: {} focused, {} blocks",
                format_duration(Duration::from_secs(stats.total_focus_seconds)),
                stats.total_blocks
            );
        }
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

async fn watch(client: IpcClient) -> Result<()> {
    let mut events = client.subscribe().await?;
    loop {
        let event = events.next().await?;
        match event.payload {
            EventPayload::FocusTick(state) => {
                println!(
                    "tick {} / {}",
                    format_duration(Duration::from_secs(state.elapsed)),
                    format_duration(Duration::from_secs(state.target))
                );
            }
            EventPayload::Shutdown => {
                println!("keeperd shut down");
                return Ok(());
            }
            other => println!("{}", serde_json::to_string(&other)?),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(default_socket_path);

    let mut client = IpcClient::connect(&socket)
        .await
        .with_context(|| format!("Failed to connect to keeperd at {}", socket.display()))?;

    if matches!(cli.command, Cmd::Watch) {
        return watch(client).await;
    }

    let response = client.send(cli.command.into_command()?).await?;
    match response.result {
        ResponseResult::Ok(payload) => print_payload(&payload),
        ResponseResult::Err(e) => {
            eprintln!("Error ({:?}): {}", e.code, e.message);
            std::process::exit(1);
        }
    }
}
