use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::cmd::Commands;
use gestora::fields::Language;

/// Team task workflow client.
/// Settings, the session token and the activity echo live in ~/.gestora
/// or the directory passed via --dir.
#[derive(Parser)]
#[command(name = "gst", version, about = "Team task workflow client")]
pub struct Cli {
    /// Directory for config.toml, session.json and activities.json.
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Use the in-process demo backend (nothing is kept between runs).
    #[arg(long, global = true)]
    pub offline: bool,

    /// Demo account to act as in offline mode.
    #[arg(long = "as", global = true, value_name = "EMAIL")]
    pub act_as: Option<String>,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Language for messages.
    #[arg(long, global = true, value_enum)]
    pub lang: Option<Language>,

    #[command(subcommand)]
    pub command: Commands,
}
