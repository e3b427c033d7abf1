//! keeperd command dispatch
//!
//! Maps protocol commands onto the [`FocusKeeper`]. Kept apart from the
//! binary so the mapping can be exercised without a socket.

use keeper_api::{Command, KillReport, ResponsePayload};
use keeper_core::FocusKeeper;
use keeper_util::{ClientId, Result};

/// Commands that carry a password and count against the attempt limit
pub fn is_password_attempt(command: &Command) -> bool {
    matches!(
        command,
        Command::Unlock { .. } | Command::VerifyPassword { .. } | Command::ChangePassword { .. }
    )
}

/// Execute one command against the keeper
pub async fn handle_command(
    keeper: &FocusKeeper,
    client_id: ClientId,
    command: Command,
) -> Result<ResponsePayload> {
    let now = keeper_util::now();

    let payload = match command {
        Command::GetState => ResponsePayload::State(keeper.snapshot(now)?),

        // Focus session
        Command::StartFocus {
            target_minutes,
            strict_mode,
        } => ResponsePayload::Focus(keeper.start_focus(target_minutes, strict_mode, now)?),
        Command::PauseFocus => ResponsePayload::Focus(keeper.focus().pause(now)?),
        Command::ResumeFocus => ResponsePayload::Focus(keeper.focus().resume()?),
        Command::StopFocus => ResponsePayload::Focus(keeper.focus().stop(now)?),
        Command::GetFocusState => ResponsePayload::Focus(keeper.focus().state()?),
        Command::RunFocusTimer => ResponsePayload::TimerRunning {
            spawned: keeper.focus().run_timer()?,
        },

        // Websites
        Command::AddWebsite { domain } => ResponsePayload::WebsiteAdded {
            domain: keeper.websites().add(&domain, now).await?,
        },
        Command::RemoveWebsite { domain } => ResponsePayload::WebsiteRemoved {
            domain: keeper.websites().remove(&domain, now).await?,
        },
        Command::BlockWebsites { domains } => ResponsePayload::WebsitesBlocked {
            outcomes: keeper.websites().add_many(&domains, now).await,
        },
        Command::UnblockAll => ResponsePayload::Unblocked(keeper.websites().unblock_all(now).await?),
        Command::GetBlockedWebsites => ResponsePayload::Websites {
            domains: keeper.websites().list()?,
        },

        // Apps
        Command::AddApp { name } => ResponsePayload::AppAdded {
            name: keeper.apps().add(&name, now)?,
        },
        Command::RemoveApp { name } => ResponsePayload::AppRemoved {
            name: keeper.apps().remove(&name, now)?,
        },
        Command::GetBlockedApps => ResponsePayload::Apps {
            names: keeper.apps().list()?,
        },
        Command::CheckProcesses { names } => ResponsePayload::Processes {
            processes: keeper.monitor().check_running(&names)?,
        },
        Command::FindProcesses { name } => ResponsePayload::Processes {
            processes: keeper.monitor().find_processes(&name)?,
        },
        Command::IsAppRunning { name } => {
            let running = keeper.monitor().is_app_running(&name)?;
            ResponsePayload::AppRunning { name, running }
        }
        Command::KillAppProcesses { name } => {
            ResponsePayload::Killed(keeper.monitor().kill_app(&name, now)?)
        }
        Command::KillProcess { pid } => {
            keeper.monitor().kill_process(pid, now)?;
            ResponsePayload::Killed(KillReport {
                killed: vec![pid],
                failures: Vec::new(),
            })
        }
        Command::KillProcesses { pids } => {
            ResponsePayload::Killed(keeper.monitor().kill_processes(&pids, now))
        }
        Command::StartMonitoring => {
            keeper.monitor().start_monitoring()?;
            ResponsePayload::Monitoring { active: true }
        }
        Command::StopMonitoring => {
            keeper.monitor().stop_monitoring().await?;
            ResponsePayload::Monitoring { active: false }
        }

        // Password lock
        Command::SetPassword { password } => {
            keeper.lock().set_password(&password, now)?;
            ResponsePayload::PasswordSet
        }
        Command::HasPassword => ResponsePayload::HasPassword {
            has_password: keeper.lock().has_password()?,
        },
        Command::VerifyPassword { password } => {
            keeper.lock().verify_password(&password)?;
            ResponsePayload::PasswordVerified
        }
        Command::ChangePassword {
            old_password,
            new_password,
        } => {
            keeper.lock().change_password(&old_password, &new_password)?;
            ResponsePayload::PasswordChanged
        }
        Command::LockFocus { minutes } => ResponsePayload::LockState(keeper.lock().lock(minutes, now)?),
        Command::Unlock { password } => {
            ResponsePayload::LockState(keeper.lock().unlock(&password, now)?)
        }
        Command::GetLockState => ResponsePayload::LockState(keeper.lock().state(now)?),

        // Statistics
        Command::AddFocusTime { seconds } => {
            keeper.stats().add_focus_seconds(seconds, now)?;
            ResponsePayload::Stats(keeper.stats().get_stats(now)?)
        }
        Command::AddBlock { category } => {
            keeper.stats().add_block_event(category, now)?;
            ResponsePayload::Stats(keeper.stats().get_stats(now)?)
        }
        Command::GetStats => ResponsePayload::Stats(keeper.stats().get_stats(now)?),
        Command::ResetStats => ResponsePayload::Stats(keeper.stats().reset_stats(now)?),
        Command::GetFocusDuration => ResponsePayload::FocusDuration {
            seconds: keeper.stats().focus_duration_today(now)?,
        },
        Command::GetBlockCount => ResponsePayload::BlockCount {
            count: keeper.stats().block_count_today(now)?,
        },
        Command::GetHistory { days } => ResponsePayload::History {
            days: keeper.stats().history(days)?,
        },

        // The IPC layer tracks the subscription flag itself
        Command::SubscribeEvents => ResponsePayload::Subscribed { client_id },
        Command::UnsubscribeEvents => ResponsePayload::Unsubscribed,
        Command::GetHealth => ResponsePayload::Health(keeper.health()),
        Command::Ping => ResponsePayload::Pong,
    };

    Ok(payload)
}
