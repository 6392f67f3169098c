// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;

/// A pocket-sized multi-channel AI assistant.
#[derive(Parser, Debug)]
#[command(name = "pocketd", version, about, long_about = None)]
pub struct Cli {
    /// Path to an additional YAML config file, layered on top of the
    /// standard search path (highest priority).
    #[arg(long, short = 'c', global = true, env = "POCKETD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory the file and `exec` tools are sandboxed to. Overrides
    /// `tools.workspace_root` from configuration.
    #[arg(long, short = 'w', global = true, env = "POCKETD_WORKSPACE")]
    pub workspace_root: Option<PathBuf>,

    /// Root directory for session history, the memory store, and the cron
    /// job store (`<memory-dir>/.pocketrb/...`).
    #[arg(long, global = true, env = "POCKETD_MEMORY_DIR")]
    pub memory_dir: Option<PathBuf>,

    /// Model name, overriding `model.name` from configuration.
    #[arg(long, short = 'M', global = true, env = "POCKETD_MODEL")]
    pub model: Option<String>,

    /// Provider identifier, overriding `model.provider` from configuration.
    #[arg(long, global = true, env = "POCKETD_PROVIDER")]
    pub provider: Option<String>,

    /// Maximum model/tool round trips per turn, overriding
    /// `agent.max_iterations`.
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// Scheduler tick cadence in milliseconds, overriding
    /// `scheduler.tick_interval_ms`.
    #[arg(long, global = true)]
    pub heartbeat_interval_ms: Option<u64>,

    /// Run without any tool-permission gate: every `exec` call that would
    /// otherwise be asked about is executed immediately instead of denied.
    #[arg(long, short = 'A', global = true)]
    pub autonomous: bool,

    /// Increase log verbosity (-v debug, -vv trace). Respects `RUST_LOG` if
    /// set, which always takes priority.
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a single channel adapter, driving the agent loop and (if
    /// `--with-scheduler` is set) the cron scheduler alongside it.
    Channel {
        /// Channel tag to start. Only `cli` (stdin/stdout) ships with this
        /// binary; other adapters are external collaborators.
        #[arg(default_value = "cli")]
        name: String,
        /// Also start the cron scheduler's tick loop in this process.
        #[arg(long)]
        with_scheduler: bool,
    },

    /// Start every configured channel plus the cron scheduler in one
    /// process, sharing a single agent and tool registry.
    Gateway,

    /// Inspect and edit scheduled jobs.
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },

    /// Print the fully resolved configuration as YAML and exit.
    ShowConfig,

    /// Print shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum CronCommands {
    /// List scheduled jobs.
    List {
        /// Include disabled jobs.
        #[arg(long)]
        include_disabled: bool,
    },
    /// Add a new scheduled job.
    Add {
        /// Human-readable name for the job.
        name: String,
        /// Message content delivered when the job fires.
        content: String,
        /// Fire once at this RFC 3339 instant, e.g. `2026-08-01T09:00:00Z`.
        #[arg(long, group = "when")]
        at: Option<String>,
        /// Fire repeatedly on this interval, e.g. `10m`, `1h` (minimum 60s).
        #[arg(long, group = "when")]
        every: Option<String>,
        /// Fire on a standard 5-field cron expression, evaluated in UTC.
        #[arg(long, group = "when")]
        cron: Option<String>,
        /// Deliver directly as an outbound message instead of a synthetic
        /// inbound turn. Requires `--channel` and `--chat-id`.
        #[arg(long)]
        deliver: bool,
        /// Target channel when `--deliver` is set.
        #[arg(long)]
        channel: Option<String>,
        /// Target chat id when `--deliver` is set.
        #[arg(long)]
        chat_id: Option<String>,
        /// Create the job disabled.
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a job by id.
    Remove { id: String },
    /// Enable a disabled job.
    Enable { id: String },
    /// Disable an enabled job without removing it.
    Disable { id: String },
}

impl Cli {
    pub fn print_completions(shell: Shell) {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    }
}
