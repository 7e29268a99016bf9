use std::sync::Arc;

use clap::Subcommand;
use focusroom_core::timer::{now_ms, TICK_PERIOD};
use focusroom_core::{
    spawn_session, Config, Database, Event, Identity, NoopNotifier, Notifier, SessionCommand,
    SessionEngine, TerminalBell,
};

use super::print_json;

type CliNotifier = Arc<dyn Notifier + Send + Sync>;
type CliEngine = SessionEngine<Database, CliNotifier>;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print current timer state as JSON
    Status,
    /// Start the countdown if paused, pause it if running
    Toggle,
    /// Start the countdown (no-op if already running)
    Start,
    /// Pause the countdown (no-op if already paused)
    Pause,
    /// Back to a paused, full-length work phase
    Reset,
    /// End the current break early
    SkipBreak,
    /// Delete the stored session for this user
    Clear {
        /// Also delete the completed-phase history
        #[arg(long)]
        history: bool,
    },
    /// Count down in the foreground until the phase ends or Ctrl-C
    Run,
}

fn open_engine(
    identity: Identity,
) -> Result<(CliEngine, Option<Event>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let session_config = config.session_config()?;
    let notifier: CliNotifier = if config.notifications.enabled {
        Arc::new(TerminalBell)
    } else {
        Arc::new(NoopNotifier)
    };
    let db = Database::open()?;
    Ok(SessionEngine::open(identity, session_config, db, notifier, now_ms())?)
}

pub fn run(action: TimerAction, identity: Identity) -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, lapsed) = open_engine(identity)?;
    if let Some(event) = &lapsed {
        print_json(event)?;
    }

    let command = match action {
        TimerAction::Status => SessionCommand::Status,
        TimerAction::Toggle => SessionCommand::ToggleRun,
        TimerAction::Start => SessionCommand::Start,
        TimerAction::Pause => SessionCommand::Pause,
        TimerAction::Reset => SessionCommand::Reset,
        TimerAction::SkipBreak => SessionCommand::SkipBreak,
        TimerAction::Clear { history } => {
            if history {
                let removed = engine.store().clear_history(engine.identity())?;
                tracing::info!(removed, "Cleared phase history");
            }
            SessionCommand::Clear
        }
        TimerAction::Run => return run_foreground(engine),
    };

    // No-op commands print the unchanged state.
    let now = now_ms();
    let event = match engine.apply(command, now)? {
        Some(event) => event,
        None => engine.status(now),
    };
    print_json(&event)?;
    Ok(())
}

/// Drive the session on a tokio runtime, streaming events as JSON lines.
///
/// Stops after the running phase completes. Ctrl-C exits without pausing;
/// the stored snapshot keeps running and the next invocation reconciles it.
fn run_foreground(engine: CliEngine) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(stream_session(engine))
}

async fn stream_session(engine: CliEngine) -> Result<(), Box<dyn std::error::Error>> {
    let (handle, mut events) = spawn_session(engine, TICK_PERIOD);
    handle.send(SessionCommand::Start).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_json(&event)?;
                if event.is_phase_completed() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted; leaving the timer running");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
