// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod cli_channel;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, CronCommands};
use cli_channel::ReplChannel;
use pocket_bus::Bus;
use pocket_channels::Channel;
use pocket_config::Config;
use pocket_core::Agent;
use pocket_memory::InMemoryMemoryStore;
use pocket_scheduler::{JobPayload, Schedule, Scheduler};
use pocket_session::SessionStore;
use pocket_tools::ToolRegistry;

/// Exit code for an interrupted run (SIGINT/Ctrl-C), matching the shell
/// convention of 128 + signal number (SIGINT = 2).
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) if err.is::<Interrupted>() => EXIT_INTERRUPTED,
        Err(err) => {
            error!(%err, "pocketd exited with an error");
            1
        }
    };
    std::process::exit(code);
}

/// Sentinel error used to unwind to `main` on SIGINT/SIGTERM without treating
/// a clean shutdown request as a runtime failure.
#[derive(Debug)]
struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interrupted")
    }
}
impl std::error::Error for Interrupted {}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Completions { shell } => {
            Cli::print_completions(*shell);
            Ok(())
        }
        Commands::ShowConfig => {
            let config = load_config(&cli)?;
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Cron { command } => run_cron_command(&cli, command).await,
        Commands::Channel { name, with_scheduler } => {
            run_daemon(&cli, &[name.clone()], *with_scheduler).await
        }
        Commands::Gateway => run_daemon(&cli, &["cli".to_string()], true).await,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info,pocketd=debug,pocket_core=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = pocket_config::load(cli.config.as_deref())?;
    if let Some(name) = &cli.model {
        config.model.name = name.clone();
    }
    if let Some(provider) = &cli.provider {
        config.model.provider = provider.clone();
    }
    if let Some(root) = &cli.workspace_root {
        config.tools.workspace_root = Some(root.display().to_string());
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.agent.max_iterations = max_iterations;
    }
    if let Some(heartbeat_ms) = cli.heartbeat_interval_ms {
        config.scheduler.tick_interval_ms = heartbeat_ms;
    }
    if cli.autonomous {
        // The agent loop already resolves `Ask` to immediate execution (no
        // interactive gate exists yet at this layer), so this currently only
        // documents operator intent; it is the hook a future interactive
        // front-end would check before prompting.
        info!("autonomous mode requested; tool calls run without a permission prompt");
    }
    Ok(config)
}

fn memory_dir(cli: &Cli) -> PathBuf {
    cli.memory_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("pocketd"))
            .unwrap_or_else(|| PathBuf::from(".pocketd"))
    })
}

fn job_store_path(config: &Config, memory_dir: &Path) -> PathBuf {
    config
        .scheduler
        .job_store_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| memory_dir.join(".pocketrb/data/cron/jobs.json"))
}

async fn build_scheduler(cli: &Cli, config: &Config, bus: Arc<Bus>) -> anyhow::Result<Scheduler> {
    let mem_dir = memory_dir(cli);
    let path = job_store_path(config, &mem_dir);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    Scheduler::new(path, bus, config.scheduler.tick_interval_ms)
        .await
        .context("failed to load cron job store")
}

/// Start the chosen channels, the agent loop, and (if requested) the
/// scheduler as concurrent tasks, and block until interrupted.
async fn run_daemon(cli: &Cli, channel_names: &[String], with_scheduler: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let mem_dir = memory_dir(cli);
    tokio::fs::create_dir_all(&mem_dir).await.ok();

    let model = pocket_model::from_config(&config.model).context("failed to build model provider")?;
    let bus = Arc::new(Bus::new());
    let sessions = Arc::new(SessionStore::new(mem_dir.join("sessions")));
    let memory: Arc<dyn pocket_memory::MemoryStore> = Arc::new(InMemoryMemoryStore::default());
    let scheduler = Arc::new(build_scheduler(cli, &config, Arc::clone(&bus)).await?);

    let mut registry = ToolRegistry::new();
    registry.register_defaults(&config.tools, Arc::clone(&bus), Arc::clone(&memory), Arc::clone(&scheduler));
    let tools = Arc::new(registry);

    let agent = Arc::new(Agent::new(
        Arc::from(model),
        Arc::clone(&tools),
        Arc::clone(&sessions),
        Arc::clone(&bus),
        memory,
        &config.agent,
        &config.tools,
        None,
    ));

    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    for name in channel_names {
        match name.as_str() {
            "cli" => channels.push(Arc::new(ReplChannel::new("local"))),
            other => anyhow::bail!(
                "unknown channel {other:?}: concrete adapters besides \"cli\" are external \
                 collaborators and are not shipped in this binary"
            ),
        }
    }

    let agent_task = tokio::spawn(Arc::clone(&agent).run());

    let mut channel_tasks = Vec::new();
    for channel in &channels {
        let channel = Arc::clone(channel);
        let bus = Arc::clone(&bus);
        channel_tasks.push(tokio::spawn(async move { channel.run(bus).await }));
    }

    if with_scheduler {
        scheduler.start().await;
    }

    info!(channels = ?channel_names, with_scheduler, "pocketd running, press Ctrl-C to stop");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    for channel in &channels {
        let _ = channel.stop().await;
    }
    if with_scheduler {
        scheduler.stop().await;
    }
    agent_task.abort();
    for task in channel_tasks {
        task.abort();
    }

    Err(Interrupted.into())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run_cron_command(cli: &Cli, command: &CronCommands) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let bus = Arc::new(Bus::new());
    let scheduler = build_scheduler(cli, &config, bus).await?;

    match command {
        CronCommands::List { include_disabled } => {
            let jobs = scheduler.list_jobs(*include_disabled).await;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        CronCommands::Add {
            name,
            content,
            at,
            every,
            cron,
            deliver,
            channel,
            chat_id,
            disabled,
        } => {
            let schedule = parse_schedule(at.as_deref(), every.as_deref(), cron.as_deref())?;
            if *deliver && (channel.is_none() || chat_id.is_none()) {
                anyhow::bail!("--deliver requires both --channel and --chat-id");
            }
            let payload = JobPayload {
                content: content.clone(),
                deliver: *deliver,
                channel: channel.clone(),
                chat_id: chat_id.clone(),
            };
            let job = scheduler
                .add_job(schedule, payload, name.clone(), Some(!disabled), None)
                .await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        CronCommands::Remove { id } => {
            scheduler.remove_job(id).await?;
            println!("removed {id}");
        }
        CronCommands::Enable { id } => {
            scheduler.enable_job(id, true).await?;
            println!("enabled {id}");
        }
        CronCommands::Disable { id } => {
            scheduler.enable_job(id, false).await?;
            println!("disabled {id}");
        }
    }
    Ok(())
}

fn parse_schedule(at: Option<&str>, every: Option<&str>, cron: Option<&str>) -> anyhow::Result<Schedule> {
    match (at, every, cron) {
        (Some(at), None, None) => {
            let at = chrono::DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("invalid --at timestamp {at:?}, expected RFC 3339"))?
                .with_timezone(&chrono::Utc);
            Ok(Schedule::At { at })
        }
        (None, Some(every), None) => {
            let dur = humantime::parse_duration(every)
                .with_context(|| format!("invalid --every duration {every:?}"))?;
            Ok(Schedule::Every { every_ms: dur.as_millis() as u64 })
        }
        (None, None, Some(expr)) => Ok(Schedule::Cron { expression: expr.to_string() }),
        (None, None, None) => anyhow::bail!("one of --at, --every, or --cron is required"),
        _ => anyhow::bail!("--at, --every, and --cron are mutually exclusive"),
    }
}
