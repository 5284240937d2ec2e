//! slacktap CLI - command-line Slack access without OAuth
//!
//! Credentials come from the Slack desktop client (`slacktap extract`) or
//! straight from SLACK_TOKEN/SLACK_COOKIE in the environment. Data commands
//! print JSON with short refs (@c1, @m2, ...) merged in, so a driving agent
//! can name entities without retyping opaque ids.
//!
//! Usage:
//!   slacktap extract             - Recover credentials from the desktop app
//!   slacktap channels            - List channels in the current workspace
//!   slacktap history <channel>   - Fetch a channel's message history
//!   slacktap snapshot            - Dump every channel's history to JSON

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use slacktap_core::{
    CredentialStore, Error, HistoryOptions, Message, RefManager, SlackClient, StoreOutcome,
    TokenExtractor, WorkspaceCredentials,
};
use std::path::{Path, PathBuf};

/// slacktap - command-line Slack access without OAuth
#[derive(Parser)]
#[command(name = "slacktap")]
#[command(about = "Command-line Slack access without OAuth", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace id to use (defaults to the current workspace)
    #[arg(short, long, global = true)]
    workspace: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the ref map on stderr after the command, for later replay
    #[arg(long, global = true)]
    show_refs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover credentials from the Slack desktop client
    Extract {
        /// Platform to scan (macos, linux, windows; defaults to this one)
        #[arg(short, long)]
        platform: Option<String>,

        /// Save without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// List, switch or remove stored workspaces
    Workspaces {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    /// Validate the active credentials against the API
    AuthTest,

    /// List channels visible to the token
    Channels {
        /// Conversation types to include
        #[arg(long, default_value = "public_channel,private_channel")]
        types: String,
    },

    /// Fetch message history for a channel
    History {
        channel: String,

        /// Maximum number of messages
        #[arg(short, long)]
        limit: Option<u64>,

        /// Only messages after this timestamp
        #[arg(long)]
        oldest: Option<String>,

        /// Only messages before this timestamp
        #[arg(long)]
        latest: Option<String>,
    },

    /// Fetch a thread's replies
    Replies { channel: String, ts: String },

    /// Post a message
    Send {
        channel: String,
        text: String,

        /// Reply in the thread rooted at this timestamp
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Search messages
    Search {
        query: String,

        /// Maximum number of matches
        #[arg(short, long, default_value = "20")]
        count: u64,
    },

    /// List workspace users
    Users,

    /// Show one user
    User { id: String },

    /// List files
    Files {
        /// Only files shared in this channel
        #[arg(long)]
        channel: Option<String>,

        /// Maximum number of files
        #[arg(long, default_value = "100")]
        count: u64,
    },

    /// Snapshot every channel's history to JSON files
    Snapshot {
        /// Output directory
        #[arg(short, long, default_value = "slack-snapshot")]
        output: PathBuf,
    },

    /// Show stored workspaces and credential sources
    Status,
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// List stored workspaces
    List,
    /// Make a workspace the current one
    Use { id: String },
    /// Remove a stored workspace
    Remove { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("slacktap={}", log_level).parse().unwrap())
                .add_directive(format!("slacktap_core={}", log_level).parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CommandContext {
        workspace: cli.workspace,
        show_refs: cli.show_refs,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Extract { platform, yes } => cmd_extract(&ctx, platform.as_deref(), yes),
        Commands::Workspaces { action } => cmd_workspaces(action),
        Commands::AuthTest => cmd_auth_test(&ctx),
        Commands::Channels { types } => cmd_channels(&ctx, &types),
        Commands::History {
            channel,
            limit,
            oldest,
            latest,
        } => cmd_history(&ctx, &channel, limit, oldest, latest),
        Commands::Replies { channel, ts } => cmd_replies(&ctx, &channel, &ts),
        Commands::Send {
            channel,
            text,
            thread,
        } => cmd_send(&ctx, &channel, &text, thread.as_deref()),
        Commands::Search { query, count } => cmd_search(&ctx, &query, count),
        Commands::Users => cmd_users(&ctx),
        Commands::User { id } => cmd_user(&ctx, &id),
        Commands::Files { channel, count } => cmd_files(&ctx, channel.as_deref(), count),
        Commands::Snapshot { output } => cmd_snapshot(&ctx, &output),
        Commands::Status => cmd_status(),
    }
}

/// Global options every data command needs.
struct CommandContext {
    workspace: Option<String>,
    show_refs: bool,
    verbose: bool,
}

impl CommandContext {
    fn client(&self) -> Result<SlackClient> {
        let creds = self.credentials()?;
        Ok(SlackClient::new(&creds)?)
    }

    /// Active credentials: explicit --workspace first, then the environment,
    /// then the stored current workspace.
    fn credentials(&self) -> Result<WorkspaceCredentials> {
        let store = CredentialStore::open_default();
        if let Some(id) = self.workspace.as_deref() {
            return store.get_workspace(Some(id))?.with_context(|| {
                format!("workspace '{}' is not stored; run 'slacktap extract'", id)
            });
        }
        if let Some(creds) = WorkspaceCredentials::from_env() {
            return Ok(creds);
        }
        store
            .get_workspace(None)?
            .context("no workspace configured; run 'slacktap extract' or set SLACK_TOKEN")
    }

    /// Refs do not survive the process; print the map so the caller can
    /// replay it in a later invocation if it wants continuity.
    fn finish(&self, refs: &RefManager) {
        if self.show_refs {
            eprintln!("{}", refs.serialize());
        }
    }
}

/// Merge a ref into an entity's JSON representation.
fn tag_ref<T: Serialize>(r: &str, entity: &T) -> serde_json::Value {
    let mut value = serde_json::to_value(entity).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("ref".to_string(), serde_json::Value::String(r.to_string()));
    }
    value
}

/// Human-readable time for a Slack timestamp ("1700000000.000100").
fn format_ts(ts: &str) -> Option<String> {
    let secs: i64 = ts.split('.').next()?.parse().ok()?;
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Messages render with a ref and a readable time column merged in.
fn tag_message(refs: &mut RefManager, message: &Message) -> serde_json::Value {
    let r = refs.assign_message_ref(message);
    let mut value = tag_ref(&r, message);
    if let (Some(obj), Some(time)) = (value.as_object_mut(), format_ts(&message.ts)) {
        obj.insert("time".to_string(), serde_json::Value::String(time));
    }
    value
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============ EXTRACT COMMAND ============

fn cmd_extract(ctx: &CommandContext, platform: Option<&str>, yes: bool) -> Result<()> {
    println!("{}", "Scanning Slack desktop storage".bold().cyan());

    let extractor = match platform {
        Some(p) => TokenExtractor::new(p)?,
        None => TokenExtractor::for_current_platform()?,
    };
    println!(
        "App data: {}",
        extractor.store_dir().display().to_string().dimmed()
    );
    println!();

    let extraction = extractor.extract()?;

    if ctx.verbose {
        for (path, outcome) in &extraction.outcomes {
            match outcome {
                StoreOutcome::Scanned { tokens } => println!(
                    "  {} {} ({} tokens)",
                    "scanned".green(),
                    path.display(),
                    tokens
                ),
                StoreOutcome::Skipped { reason } => println!(
                    "  {} {} ({})",
                    "skipped".yellow(),
                    path.display(),
                    reason
                ),
            }
        }
        println!();
    }

    if extraction.credentials.is_empty() {
        return Err(Error::ExtractionEmpty.into());
    }

    if extraction.cookie.is_empty() {
        println!(
            "{}",
            "⚠ No readable session cookie (it may be OS-encrypted); API calls may be rejected."
                .yellow()
        );
    }

    println!(
        "Found {} workspace(s):",
        extraction.credentials.len().to_string().green()
    );
    for creds in &extraction.credentials {
        println!(
            "  {} {} ({})",
            "•".cyan(),
            creds.workspace_name.bold(),
            creds.workspace_id.dimmed()
        );
    }
    println!();

    let store = CredentialStore::open_default();
    let existing = store.load()?;
    if !yes && !existing.workspaces.is_empty() {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Credentials file already holds {} workspace(s); update it?",
                existing.workspaces.len()
            ))
            .default(true)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    for creds in extraction.credentials {
        store.set_workspace(creds)?;
    }
    println!("{} Saved to {}", "✓".green(), store.path().display());

    Ok(())
}

// ============ WORKSPACE COMMANDS ============

fn cmd_workspaces(action: WorkspaceAction) -> Result<()> {
    let store = CredentialStore::open_default();
    match action {
        WorkspaceAction::List => {
            let file = store.load()?;
            if file.workspaces.is_empty() {
                println!("No stored workspaces. Run {} first.", "slacktap extract".cyan());
                return Ok(());
            }
            for (id, creds) in &file.workspaces {
                let marker = if file.current_workspace.as_deref() == Some(id) {
                    "*".green().to_string()
                } else {
                    " ".to_string()
                };
                let cookie_state = if creds.cookie.is_empty() {
                    "no cookie".yellow().to_string()
                } else {
                    "cookie ok".green().to_string()
                };
                println!(
                    "{} {} {} [{}]",
                    marker,
                    id.bold(),
                    creds.workspace_name,
                    cookie_state
                );
            }
        }
        WorkspaceAction::Use { id } => {
            if store.set_current_workspace(&id)? {
                println!("{} Current workspace is now {}", "✓".green(), id.bold());
            } else {
                println!("{} Workspace {} is not stored", "✗".red(), id);
            }
        }
        WorkspaceAction::Remove { id } => {
            if store.remove_workspace(&id)? {
                println!("{} Removed {}", "✓".green(), id.bold());
            } else {
                println!("{} Workspace {} is not stored", "✗".red(), id);
            }
        }
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    println!("{}", "slacktap status".bold().cyan());
    println!();

    let store = CredentialStore::open_default();
    let file = store.load()?;

    if WorkspaceCredentials::from_env().is_some() {
        println!(
            "{} SLACK_TOKEN set in the environment (overrides the stored current workspace)",
            "•".cyan()
        );
    }

    println!(
        "Credentials file: {} ({} workspace(s))",
        store.path().display().to_string().dimmed(),
        file.workspaces.len()
    );
    match &file.current_workspace {
        Some(id) => println!("Current workspace: {}", id.bold()),
        None => println!("Current workspace: {}", "none".dimmed()),
    }

    Ok(())
}

// ============ API COMMANDS ============

fn cmd_auth_test(ctx: &CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let info = client.auth_test()?;
    println!(
        "{} Authenticated as {} in {} ({})",
        "✓".green(),
        info.user.bold(),
        info.team.bold(),
        info.team_id.dimmed()
    );
    print_json(&serde_json::to_value(&info)?)
}

fn cmd_channels(ctx: &CommandContext, types: &str) -> Result<()> {
    let client = ctx.client()?;
    let channels = client.list_channels(types)?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = channels
        .iter()
        .map(|ch| {
            let r = refs.assign_channel_ref(ch);
            tag_ref(&r, ch)
        })
        .collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_history(
    ctx: &CommandContext,
    channel: &str,
    limit: Option<u64>,
    oldest: Option<String>,
    latest: Option<String>,
) -> Result<()> {
    let client = ctx.client()?;
    let opts = HistoryOptions {
        limit,
        oldest,
        latest,
    };
    let messages = client.channel_history(channel, &opts)?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = messages.iter().map(|m| tag_message(&mut refs, m)).collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_replies(ctx: &CommandContext, channel: &str, ts: &str) -> Result<()> {
    let client = ctx.client()?;
    let messages = client.thread_replies(channel, ts)?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = messages.iter().map(|m| tag_message(&mut refs, m)).collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_send(ctx: &CommandContext, channel: &str, text: &str, thread: Option<&str>) -> Result<()> {
    let client = ctx.client()?;
    let message = client.post_message(channel, text, thread)?;

    let mut refs = RefManager::new();
    let tagged = tag_message(&mut refs, &message);

    println!("{} Sent to {}", "✓".green(), channel.bold());
    print_json(&tagged)?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_search(ctx: &CommandContext, query: &str, count: u64) -> Result<()> {
    let client = ctx.client()?;
    let matches = client.search_messages(query, count)?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = matches.iter().map(|m| tag_message(&mut refs, m)).collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_users(ctx: &CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let users = client.list_users()?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = users
        .iter()
        .map(|u| {
            let r = refs.assign_user_ref(u);
            tag_ref(&r, u)
        })
        .collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_user(ctx: &CommandContext, id: &str) -> Result<()> {
    let client = ctx.client()?;
    let user = client.user_info(id)?;

    let mut refs = RefManager::new();
    let r = refs.assign_user_ref(&user);

    print_json(&tag_ref(&r, &user))?;
    ctx.finish(&refs);
    Ok(())
}

fn cmd_files(ctx: &CommandContext, channel: Option<&str>, count: u64) -> Result<()> {
    let client = ctx.client()?;
    let files = client.list_files(channel, None, count)?;

    let mut refs = RefManager::new();
    let tagged: Vec<_> = files
        .iter()
        .map(|f| {
            let r = refs.assign_file_ref(f);
            tag_ref(&r, f)
        })
        .collect();

    print_json(&serde_json::Value::Array(tagged))?;
    ctx.finish(&refs);
    Ok(())
}

// ============ SNAPSHOT COMMAND ============

fn cmd_snapshot(ctx: &CommandContext, output: &Path) -> Result<()> {
    let client = ctx.client()?;

    println!("{}", "Snapshotting workspace".bold().cyan());
    let channels = client.list_channels("public_channel,private_channel")?;
    std::fs::create_dir_all(output)
        .with_context(|| format!("Cannot create output directory {}", output.display()))?;

    let pb = ProgressBar::new(channels.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    // One channel at a time: fanning out would multiply rate-limit pressure
    // for no benefit on a bulk dump.
    let mut total_messages = 0usize;
    let mut skipped = 0usize;
    for channel in &channels {
        pb.set_message(channel.name.clone());
        match client.channel_history(&channel.id, &HistoryOptions::default()) {
            Ok(messages) => {
                total_messages += messages.len();
                let stem = if channel.name.is_empty() {
                    &channel.id
                } else {
                    &channel.name
                };
                let file = output.join(format!("{}.json", stem));
                std::fs::write(&file, serde_json::to_string_pretty(&messages)?)?;
            }
            Err(e) => {
                // One unreadable channel (not_in_channel and friends) should
                // not sink the whole snapshot.
                skipped += 1;
                pb.println(format!(
                    "  {} {}: {}",
                    "skipped".yellow(),
                    channel.name,
                    e
                ));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "{} {} messages across {} channel(s) -> {} ({} skipped)",
        "✓".green(),
        total_messages,
        channels.len() - skipped,
        output.display(),
        skipped
    );
    Ok(())
}
