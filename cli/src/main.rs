//! Onpoint CLI: assistant feedback for files in a workspace.
//!
//! Every subcommand drives the same [`FeedbackEngine`] the editor uses, with
//! an in-memory [`BufferSurface`] standing in for the editor widget.
//!
//! ```text
//! onpoint analyze <FILE> [--apply]    diagnostics from /analyze
//! onpoint check <FILE> [--apply]      diagnostics from /check
//! onpoint suggest <FILE> [--accept]   completion from /ai/suggest/
//! onpoint watch <FILE>                re-analyze on every save
//! onpoint chat [--dir DIR]            conversational assistant
//! onpoint tree                        workspace listing
//! ```
//!
//! Logs go to `~/.onpoint/logs/onpoint.log` so stdout carries only results.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use onpoint_config::{OnpointConfig, Settings, config_path};
use onpoint_engine::onpoint_gateway::{AssistantClient, GatewayConfig, RetryConfig};
use onpoint_engine::onpoint_types::{AnalysisKind, DocumentPath, Pipeline, SuggestionEdit};
use onpoint_engine::{
    AcceptOutcome, BufferSurface, ChatSession, DocumentSession, EditorSurface, EngineOptions,
    EventOutcome, FeedbackEngine, GREETING, NodeKind, RecordOutcome, TreeNode, Workspace,
};
use onpoint_utils::diff_stats;

/// Lines of directory listing sent as chat context.
const CHAT_LISTING_ENTRIES: usize = 50;

type Engine = FeedbackEngine<AssistantClient, BufferSurface>;

#[derive(Parser, Debug)]
#[command(name = "onpoint")]
#[command(about = "AI code feedback for your workspace")]
#[command(version)]
struct Cli {
    /// Workspace root (overrides config and ONPOINT_WORKSPACE)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Assistant base URL (overrides config and ONPOINT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look for unfinished code and missing imports
    Analyze {
        /// File, relative to the workspace root
        file: String,
        /// Write the proposed fix back to the file
        #[arg(long)]
        apply: bool,
    },
    /// Look for correctness, syntax and style problems
    Check {
        file: String,
        #[arg(long)]
        apply: bool,
    },
    /// Ask for a continuation of the file
    Suggest {
        file: String,
        /// Append the suggestion to the file
        #[arg(long)]
        accept: bool,
    },
    /// Re-analyze whenever the file changes on disk
    Watch {
        file: String,
        /// How often to poll the file
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Chat with the assistant
    Chat {
        /// Directory whose listing is sent as context
        #[arg(long, default_value = ".")]
        dir: String,
    },
    /// Print the workspace tree
    Tree,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stderr keeps stdout clean for command output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("onpoint.log"));
    }
    candidates.push(PathBuf::from(".onpoint").join("logs").join("onpoint.log"));

    candidates
}

fn load_settings(cli: &Cli) -> Settings {
    let config = match OnpointConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            eprintln!("warning: {err}; using defaults");
            OnpointConfig::default()
        }
    };
    let mut settings = config.resolve();
    if let Some(root) = &cli.workspace {
        settings.workspace.root.clone_from(root);
    }
    if let Some(url) = &cli.api_url {
        settings.assistant.base_url.clone_from(url);
    }
    settings
}

fn gateway_config(settings: &Settings) -> GatewayConfig {
    GatewayConfig {
        base_url: settings.assistant.base_url.clone(),
        request_timeout: settings.assistant.request_timeout,
        retry: RetryConfig {
            max_retries: settings.assistant.max_retries,
            ..RetryConfig::default()
        },
        ..GatewayConfig::default()
    }
}

fn engine_options(settings: &Settings) -> EngineOptions {
    EngineOptions {
        debounce: settings.editor.debounce,
        auto_analyze: settings.editor.auto_analyze,
        auto_suggest: settings.editor.auto_suggest,
        request_timeout: settings.assistant.request_timeout,
    }
}

fn open_workspace(settings: &Settings) -> Result<Workspace> {
    let workspace = Workspace::open(&settings.workspace.root).with_context(|| {
        format!(
            "cannot open workspace {}",
            settings.workspace.root.display()
        )
    })?;
    Ok(workspace.with_versions(settings.workspace.keep_versions))
}

fn build_engine(settings: &Settings, options: EngineOptions) -> Result<Engine> {
    let client =
        AssistantClient::new(gateway_config(settings)).context("invalid assistant settings")?;
    Ok(FeedbackEngine::new(
        Arc::new(client),
        BufferSurface::default(),
        options,
    ))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let settings = load_settings(&cli);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Analyze { file, apply } => {
                run_analysis(&settings, &file, AnalysisKind::Analyze, apply).await
            }
            Command::Check { file, apply } => {
                run_analysis(&settings, &file, AnalysisKind::Check, apply).await
            }
            Command::Suggest { file, accept } => run_suggest(&settings, &file, accept).await,
            Command::Watch { file, interval_ms } => {
                run_watch(&settings, &file, Duration::from_millis(interval_ms)).await
            }
            Command::Chat { dir } => run_chat(&settings, &dir).await,
            Command::Tree => run_tree(&settings),
        }
    })
}

/// Handle events until `pipeline` records a response.
async fn wait_for(engine: &mut Engine, pipeline: Pipeline) -> Result<RecordOutcome> {
    while let Some(event) = engine.next_event().await {
        if let EventOutcome::Recorded {
            pipeline: recorded,
            outcome,
            ..
        } = engine.handle_event(event)
            && recorded == pipeline
        {
            return Ok(outcome);
        }
    }
    bail!("engine stopped before a response arrived")
}

fn print_report(session: &DocumentSession) {
    let Some(report) = session.report() else {
        return;
    };
    if session.diagnostics().is_empty() {
        let text = report.text().trim();
        println!("{}", if text.is_empty() { "No issues found." } else { text });
        return;
    }
    for diag in session.diagnostics() {
        println!(
            "Line {} [{}]: {}",
            diag.line_number(),
            diag.category(),
            diag.message()
        );
    }
}

async fn run_analysis(
    settings: &Settings,
    file: &str,
    kind: AnalysisKind,
    apply: bool,
) -> Result<()> {
    let workspace = open_workspace(settings)?;
    let content = workspace.read(file)?;
    let mut engine = build_engine(
        settings,
        EngineOptions {
            auto_analyze: false,
            auto_suggest: false,
            ..engine_options(settings)
        },
    )?;
    let path = DocumentPath::new(file);
    engine.open_document(&path, &content);
    engine.request_analysis(&path, kind);
    wait_for(&mut engine, Pipeline::Analysis).await?;

    let session = engine
        .session(&path)
        .context("document closed unexpectedly")?;
    if let Some(error) = session.analysis_error() {
        bail!("{} ({})", error.user_message(), error.detail());
    }
    print_report(session);

    let Some(id) = engine.propose_document_fix(&path) else {
        if apply {
            println!("No fix proposed.");
        }
        return Ok(());
    };
    if let Some(SuggestionEdit::ReplaceDocument { text: fix, diff }) = engine
        .session(&path)
        .and_then(DocumentSession::pending_suggestion)
        .map(|s| s.edit())
    {
        if diff.is_empty() {
            println!("\nProposed fix matches the file.");
        } else {
            let (added, removed) = diff_stats(&content, fix);
            println!("\nProposed fix (+{added} -{removed}):\n{diff}");
        }
    }

    if apply && let AcceptOutcome::Applied { .. } = engine.accept_suggestion(&path, id) {
        engine.save_document(&path, &workspace)?;
        println!("Applied fix to {file}");
    }
    engine.shutdown();
    Ok(())
}

async fn run_suggest(settings: &Settings, file: &str, accept: bool) -> Result<()> {
    let workspace = open_workspace(settings)?;
    let content = workspace.read(file)?;
    let mut engine = build_engine(
        settings,
        EngineOptions {
            auto_analyze: false,
            auto_suggest: false,
            ..engine_options(settings)
        },
    )?;
    let path = DocumentPath::new(file);
    engine.open_document(&path, &content);
    engine.request_suggestion(&path);
    wait_for(&mut engine, Pipeline::Suggestion).await?;

    let session = engine
        .session(&path)
        .context("document closed unexpectedly")?;
    if let Some(error) = session.suggestion_error() {
        bail!("{} ({})", error.user_message(), error.detail());
    }
    let Some(suggestion) = session.pending_suggestion() else {
        println!("No suggestion.");
        return Ok(());
    };
    println!("{}", suggestion.text());

    if accept {
        let id = suggestion.id();
        engine.accept_suggestion(&path, id);
        engine.save_document(&path, &workspace)?;
        println!("Appended suggestion to {file}");
    }
    engine.shutdown();
    Ok(())
}

async fn run_watch(settings: &Settings, file: &str, interval: Duration) -> Result<()> {
    let workspace = open_workspace(settings)?;
    let mut engine = build_engine(settings, engine_options(settings))?;
    eprintln!("Watching {file} (Ctrl+C to stop)");

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl+C listener failed: {err}");
        }
    };
    watch_until(&mut engine, &workspace, file, interval, ctrl_c).await
}

/// Poll `file` every `interval`, feeding changes through the engine, until
/// `shutdown` completes.
async fn watch_until(
    engine: &mut Engine,
    workspace: &Workspace,
    file: &str,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut last = workspace.read(file)?;
    let path = DocumentPath::new(file);
    engine.open_document(&path, &last);
    engine.request_analysis(&path, AnalysisKind::Analyze);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                match workspace.read(file) {
                    Ok(content) if content != last => {
                        engine.surface_mut().set_value(content.clone());
                        engine.on_content_change(&path, content.clone());
                        last = content;
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(path = file, "Watch read failed: {err}"),
                }
            }
            Some(event) = engine.next_event() => {
                if let EventOutcome::Recorded { pipeline, outcome, .. } = engine.handle_event(event)
                    && outcome.changed()
                    && let Some(session) = engine.session(&path)
                {
                    print_update(session, pipeline);
                }
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn print_update(session: &DocumentSession, pipeline: Pipeline) {
    match pipeline {
        Pipeline::Analysis => {
            println!("--- generation {} ---", session.generation().value());
            match session.analysis_error() {
                Some(error) => println!("{}", error.user_message()),
                None => print_report(session),
            }
        }
        Pipeline::Suggestion => match (session.suggestion_error(), session.pending_suggestion()) {
            (Some(error), _) => println!("suggestion: {}", error.user_message()),
            (None, Some(suggestion)) => println!("suggestion:\n{}", suggestion.text()),
            (None, None) => {}
        },
    }
}

async fn run_chat(settings: &Settings, dir: &str) -> Result<()> {
    let workspace = open_workspace(settings)?;
    let listing = workspace.listing(dir, CHAT_LISTING_ENTRIES)?;
    let context = format!("{dir}\n{listing}");
    let client =
        AssistantClient::new(gateway_config(settings)).context("invalid assistant settings")?;
    let mut chat = ChatSession::new();

    println!("{GREETING}");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if matches!(input, "exit" | "quit") {
            break;
        }
        if let Some(reply) = chat.send(&client, input, &context).await {
            println!("{reply}");
        }
    }
    Ok(())
}

fn run_tree(settings: &Settings) -> Result<()> {
    let workspace = open_workspace(settings)?;
    println!("{}", workspace.root().display());
    print_nodes(&workspace.tree()?, 1);
    Ok(())
}

fn print_nodes(nodes: &[TreeNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        match node.kind {
            NodeKind::Directory => {
                println!("{indent}{}/", node.name);
                print_nodes(&node.children, depth + 1);
            }
            NodeKind::File => println!("{indent}{}", node.name),
        }
    }
}
