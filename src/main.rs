//! # gst - team task workflow client
//!
//! Command line and terminal board for a task tracker backed by a REST
//! service. Tasks move `Pending → In Progress → Done → Closed`; employees
//! move the tasks they belong to, administrators manage tasks and users and
//! close finished work.
//!
//! ## Quick Start
//!
//! ```bash
//! # Try it without a server
//! gst --offline board
//! gst --offline --as bruno@gestora.test list
//!
//! # Against a server
//! gst login ana@example.com
//! gst list --status in-progress
//! gst advance "Prepare quarterly report"
//! gst board
//! ```
//!
//! Settings, the stored session and the activity echo live in `~/.gestora`
//! (or `--dir`). See `gestora::config` for the settings file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gestora::backend::memory::{DEMO_ADMIN_EMAIL, DEMO_PASSWORD};
use gestora::backend::{Backend, HttpBackend, MemoryBackend};
use gestora::clock::{Clock, SystemClock};
use gestora::config::{self, Settings};
use gestora::error::WorkflowError;
use gestora::session::Session;

pub mod cli;
pub mod cmd;
pub mod tui {
    pub mod colors;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
    pub mod workflow;
}

use cli::Cli;
use cmd::*;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-v` is debug, `-vv` trace, default warn.
/// The board logs to a file so the alternate screen stays clean.
fn init_tracing(verbose: u8, log_file: Option<PathBuf>) -> Result<()> {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(());
    }

    let data_dir = config::data_dir(cli.dir.as_deref())?;
    let mut settings = Settings::load(&data_dir)?;
    if cli.offline {
        settings.offline = true;
    }
    if let Some(lang) = cli.lang {
        settings.language = lang;
    }
    let board = matches!(cli.command, Commands::Board);
    init_tracing(cli.verbose, board.then(|| data_dir.join("gst.log")))?;
    debug!(dir = %data_dir.display(), offline = settings.offline, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend: Arc<dyn Backend> = if settings.offline {
        Arc::new(MemoryBackend::demo(clock.clone()))
    } else {
        Arc::new(HttpBackend::new(&settings.api_url, settings.timeout(), settings.status_dialect)?)
    };
    let mut session = Session::new(backend, clock)
        .with_language(settings.language)
        .with_notification_windows(settings.notifications.cooldown(), settings.notifications.recency());
    if !settings.offline {
        session = session.with_storage(&data_dir);
    }
    let lang = settings.language;

    if !cli.command.is_public() {
        let user = if settings.offline {
            let email = cli.act_as.as_deref().unwrap_or(DEMO_ADMIN_EMAIL);
            Some(runtime.block_on(session.login(email, DEMO_PASSWORD)).shown(lang)?)
        } else {
            runtime.block_on(session.restore()).shown(lang)?
        };
        if user.is_none() {
            return Err(anyhow!(
                "{} Run `gst login` first.",
                WorkflowError::NotSignedIn.user_message(lang)
            ));
        }
    }

    if board {
        tui::run::run_board(&mut session, &runtime)?;
        return Ok(());
    }
    runtime.block_on(dispatch(&mut session, cli.command))?;
    print_notifications(&session);
    Ok(())
}

async fn dispatch(session: &mut Session, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => cmd_login(session, email, password).await,
        Commands::Logout => {
            cmd_logout(session);
            Ok(())
        }
        Commands::Whoami => cmd_whoami(session),
        Commands::Register { name, email, password } => cmd_register(session, name, email, password).await,
        Commands::ForgotPassword { email } => cmd_forgot_password(session, email).await,
        Commands::SetupPassword { token, password } => cmd_set_password(session, token, password, false).await,
        Commands::ResetPassword { token, password } => cmd_set_password(session, token, password, true).await,

        Commands::List { status, search } => {
            cmd_list(session, status, search);
            Ok(())
        }
        Commands::View { id } => cmd_view(session, id),
        Commands::Add { title, responsible, participants, desc, start, days, hours } => {
            cmd_add(session, title, responsible, participants, desc, start, days, hours).await
        }
        Commands::Edit {
            id, title, desc, responsible, participants, clear_participants, start, days, hours,
        } => {
            cmd_edit(session, id, title, desc, responsible, participants, clear_participants, start, days, hours).await
        }
        Commands::Delete { id } => cmd_delete(session, id).await,
        Commands::Advance { id } => cmd_move(session, id, true).await,
        Commands::Regress { id } => cmd_move(session, id, false).await,
        Commands::Comment { id, text } => cmd_comment(session, id, text).await,
        Commands::Users { action } => cmd_users(session, action).await,

        Commands::Dashboard => {
            cmd_dashboard(session);
            Ok(())
        }
        Commands::Report => cmd_report(session),
        Commands::Activity { limit } => {
            cmd_activity(session, limit);
            Ok(())
        }

        Commands::Board => unreachable!("board is handled before dispatch"),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}
