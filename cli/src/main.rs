// wearsync: command-line driver for the handheld/wearable sync protocol
//
// Runs a handheld and a wearable against each other over the in-memory
// transport, lists the path vocabulary and manages the shared settings file.

mod config;
mod fixtures;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wearsync_core::api::{ApiRoute, Comment, MemoryTokenStore};
use wearsync_core::protocol::{Outcome, Path, RequestPath};
use wearsync_core::{
    ActionKind, DispatchStats, HandheldNode, LaunchError, Launcher, LoopbackTransport, NotificationId,
    NotificationSink, RenderedNotification, Selection, SyncSettings, WearableNode,
};

#[derive(Parser)]
#[command(name = "wearsync")]
#[command(about = "WearSync: handheld/wearable sync protocol tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Settings file to use instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario between a simulated handheld and wearable
    Simulate {
        scenario: Scenario,
        /// Text sent by the reply scenarios
        #[arg(short, long, default_value = "Sent from my wrist")]
        text: String,
        /// Make the remote call (or the launcher) fail
        #[arg(long)]
        fail: bool,
    },
    /// List every path either peer sends or watches
    Paths,
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Write default settings
    Init {
        #[arg(short, long)]
        force: bool,
    },
    /// Set the order of notification actions, e.g. `reply upvote open`
    SetOrder {
        #[arg(required = true)]
        actions: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Refresh,
    Vote,
    Reply,
    Dm,
    Comments,
    Open,
    Save,
}

impl Scenario {
    fn action(&self) -> Option<ActionKind> {
        match self {
            Scenario::Refresh => None,
            Scenario::Vote => Some(ActionKind::Upvote),
            Scenario::Reply | Scenario::Dm => Some(ActionKind::Reply),
            Scenario::Comments => Some(ActionKind::ViewComments),
            Scenario::Open => Some(ActionKind::OpenOnPhone),
            Scenario::Save => Some(ActionKind::SaveToService),
        }
    }

    /// Remote endpoint whose failure `--fail` simulates. Open and save fail
    /// in the launcher instead.
    fn remote_route(&self) -> Option<ApiRoute> {
        match self {
            Scenario::Refresh => Some(ApiRoute::LatestPosts),
            Scenario::Vote => Some(ApiRoute::Vote),
            Scenario::Reply => Some(ApiRoute::Comment),
            Scenario::Dm => Some(ApiRoute::Compose),
            Scenario::Comments => Some(ApiRoute::Comments),
            Scenario::Open | Scenario::Save => None,
        }
    }
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().context("Log file needs a file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_ref())?;

    let store = match cli.config {
        Some(path) => config::ConfigStore::at(path),
        None => config::ConfigStore::user()?,
    };

    match cli.command {
        Commands::Simulate {
            scenario,
            text,
            fail,
        } => cmd_simulate(&store, scenario, &text, fail).await,
        Commands::Paths => cmd_paths(),
        Commands::Config { action } => cmd_config(&store, action),
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Prints what the wearable would show and remembers it for the scenario.
#[derive(Default)]
struct ConsoleSink {
    shown: Mutex<Vec<RenderedNotification>>,
}

impl ConsoleSink {
    fn shown(&self) -> Vec<RenderedNotification> {
        self.shown.lock().clone()
    }
}

impl NotificationSink for ConsoleSink {
    fn show(&self, notification: &RenderedNotification) {
        println!(
            "  {} #{} {}",
            "notify".bright_blue().bold(),
            notification.id,
            notification.title.bold()
        );
        if !notification.body.is_empty() {
            println!("         {}", notification.body.dimmed());
        }
        if let Some(image) = &notification.image {
            println!("         image: {}", image.display().to_string().bright_cyan());
        }
        let labels: Vec<_> = notification.actions.iter().map(|a| a.label.as_str()).collect();
        println!("         [{}]", labels.join(" | "));
        self.shown.lock().push(notification.clone());
    }

    fn cancel(&self, id: NotificationId) {
        println!("  {} #{}", "cancel".yellow(), id);
    }

    fn toast(&self, message: &str) {
        println!("  {} {}", "toast".bright_green().bold(), message);
    }

    fn show_comments(&self, comments: &[Comment]) {
        println!("  {} {} comments", "comments".bright_magenta().bold(), comments.len());
        for comment in comments {
            let indent = "  ".repeat(comment.level as usize);
            println!(
                "         {}{} {}",
                indent,
                format!("{}:", comment.author).bright_yellow(),
                comment.body
            );
        }
    }
}

struct ConsoleLauncher {
    fail: bool,
}

impl ConsoleLauncher {
    fn launch(&self, what: &str, url: &str) -> Result<(), LaunchError> {
        if self.fail {
            return Err(LaunchError("simulated launcher failure".to_string()));
        }
        println!("  {} {} {}", "phone".bright_cyan().bold(), what, url);
        Ok(())
    }
}

impl Launcher for ConsoleLauncher {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        self.launch("opening", url)
    }

    fn save_to_service(&self, url: &str) -> Result<(), LaunchError> {
        self.launch("saving", url)
    }
}

async fn wait_for(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(limit, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

async fn cmd_simulate(
    store: &config::ConfigStore,
    scenario: Scenario,
    text: &str,
    fail: bool,
) -> Result<()> {
    let settings: SyncSettings = store.load()?;
    tracing::debug!("Settings from {} (exists: {})", store.path().display(), store.exists());
    let reply_wait = settings.reply_timeout() + Duration::from_secs(1);

    println!("{}", format!("Simulating {:?}", scenario).bold());
    println!();

    let api = Arc::new(fixtures::remote(if fail { scenario.remote_route() } else { None }));
    let (handheld_transport, wearable_transport) = LoopbackTransport::pair("handheld", "wearable");
    let sink = Arc::new(ConsoleSink::default());

    let handheld = HandheldNode::new(
        Arc::new(handheld_transport),
        api.clone(),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(ConsoleLauncher { fail }),
        settings.clone(),
    );
    let wearable = WearableNode::new(Arc::new(wearable_transport), sink.clone(), settings.clone());

    futures::try_join!(handheld.start(), wearable.start()).context("Pair failed to start")?;

    println!("{}", "Refreshing:".bold());
    wearable.refresh().await?.await?;

    let expected = if fail && scenario == Scenario::Refresh {
        0
    } else {
        2 + usize::from(settings.include_direct_messages)
    };
    if !wait_for(reply_wait, || sink.shown().len() >= expected).await {
        anyhow::bail!("Only {} of {} notifications arrived", sink.shown().len(), expected);
    }

    if let Some(kind) = scenario.action() {
        let want_dm = scenario == Scenario::Dm;
        let target = sink
            .shown()
            .into_iter()
            .map(|n| n.id)
            .find(|id| {
                wearable
                    .model()
                    .content(*id)
                    .map(|c| c.post.is_direct_message == want_dm)
                    .unwrap_or(false)
            })
            .context("No notification to act on (is include_direct_messages off?)")?;

        println!();
        println!("{} #{}:", format!("Selecting {}", kind).bold(), target);

        let before = handheld.dispatch_stats();
        let reply_text = (kind == ActionKind::Reply).then_some(text);
        let selection = wearable.select(target, kind, reply_text).await?;

        if let Selection::Request { request, .. } = selection {
            let path = request.path();
            wait_for(reply_wait, || {
                let handled = |s: &DispatchStats| s.succeeded + s.failed + s.unsent_replies;
                handled(&handheld.dispatch_stats()) > handled(&before)
            })
            .await;
            wait_for(reply_wait, || !wearable.correlator().is_pending(path)).await;
        }
    }

    println!();
    println!("{}", "Remote calls:".bold());
    for call in api.calls() {
        println!("  {} {}", "→".bright_black(), call.route());
    }

    let remote_log = handheld.remote_log();
    if !remote_log.is_empty() {
        println!();
        println!("{}", "Wearable log:".bold());
        for line in remote_log {
            println!("  {}", line);
        }
    }

    let diagnostics = handheld.diagnostics();
    if !diagnostics.is_empty() {
        println!();
        println!("{}", "Handheld diagnostics:".bold());
        for line in diagnostics {
            println!("  {}", line.yellow());
        }
    }

    let stats = handheld.dispatch_stats();
    println!();
    println!(
        "{} {} succeeded, {} failed, {} replies unsent",
        "Handheld:".bold(),
        stats.succeeded.to_string().green(),
        stats.failed.to_string().red(),
        stats.unsent_replies
    );
    Ok(())
}

// ============================================================================
// PATHS / CONFIG
// ============================================================================

fn cmd_paths() -> Result<()> {
    println!("{}", "Path vocabulary".bold());
    println!();
    for path in Path::all() {
        let (direction, note) = match path {
            Path::Request(RequestPath::Refresh) => ("wearable → handheld", "message"),
            Path::Request(_) => ("wearable → handheld", "data item"),
            Path::Result(_, Outcome::Success) => ("handheld → wearable", "reply, success"),
            Path::Result(_, Outcome::Failed) => ("handheld → wearable", "reply, failure"),
            Path::Content(_) => ("handheld → wearable", "data item"),
            Path::Logging => ("wearable → handheld", "data item"),
            Path::NoNewContent => ("handheld → wearable", "message"),
        };
        println!(
            "  {:<32} {:<20} {}",
            path.as_str().bright_cyan(),
            direction,
            note.dimmed()
        );
    }
    Ok(())
}

fn cmd_config(store: &config::ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = store.load()?;
            let source = if store.exists() {
                store.path().display().to_string()
            } else {
                "(defaults)".to_string()
            };
            println!("{} {}", "Settings".bold(), source.dimmed());
            for (key, value) in config::list(&settings) {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }
        }
        ConfigAction::Init { force } => {
            if store.init(force)? {
                println!("{} Wrote {}", "✓".green(), store.path().display());
            } else {
                println!(
                    "{} {} already exists (use --force to overwrite)",
                    "!".yellow(),
                    store.path().display()
                );
            }
        }
        ConfigAction::SetOrder { actions } => {
            let settings = store.set_action_order(&actions)?;
            let order: Vec<_> = settings
                .action_order
                .iter()
                .map(|kind| config::action_name(*kind))
                .collect();
            println!("{} action_order = {}", "✓".green(), order.join(", "));
        }
    }
    Ok(())
}
