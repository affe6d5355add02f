mod app;
mod config;
mod demo;
mod error;
mod serve;

use std::collections::HashSet;
use std::time::Duration;

use approval::{ApprovalRequestId, Decision, Error as ApprovalError, RecordDecision};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use runtime::{LoopOutcome, ResumeKind, Resumed};
use storage::CheckpointStore;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app::App;
use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "lockkeeper")]
#[command(about = "Agent runs that park on approval and resume later", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run from a prompt
    Run {
        prompt: String,
        /// Block until pending approvals are decided instead of exiting
        #[arg(short, long)]
        wait: bool,
    },
    /// List parked runs
    Pending,
    /// Approve or reject a pending request
    Decide {
        /// Approval request id
        request_id: String,
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,
        #[arg(long)]
        reject: bool,
        /// Reason shown to the model on rejection
        #[arg(short, long)]
        feedback: Option<String>,
    },
    /// Answer a contact_human question
    Respond {
        /// Approval request id
        request_id: String,
        message: String,
    },
    /// Resume the run behind a decided request
    Resume {
        /// Approval request id
        request_id: String,
    },
    /// Poll parked runs and resume each as its decision lands
    Watch {
        /// Poll interval; defaults to approval.poll_interval_ms
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },
    /// Receive decisions over HTTP and resume runs
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        bind: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = Config::discover()?;
    init_tracing(&config.log.level);
    if let Some(path) = config_path {
        tracing::debug!(path = %path.display(), "config loaded");
    }

    let app = App::open(config)?;
    match cli.command {
        Commands::Run { prompt, wait } => cmd_run(&app, prompt, wait).await,
        Commands::Pending => cmd_pending(&app),
        Commands::Decide {
            request_id,
            approve,
            feedback,
            ..
        } => cmd_decide(&app, request_id, approve, feedback),
        Commands::Respond {
            request_id,
            message,
        } => cmd_decide(&app, request_id, true, Some(message)),
        Commands::Resume { request_id } => cmd_resume(&app, request_id).await,
        Commands::Watch { interval_ms } => cmd_watch(&app, interval_ms).await,
        Commands::Serve { bind } => cmd_serve(&app, &bind).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn cmd_run(app: &App, prompt: String, wait: bool) -> Result<()> {
    let agent = app.agent(false)?;
    let (run_id, mut outcome) = agent.start(prompt).await?;
    println!("Run: {run_id}");

    loop {
        print_outcome(&outcome);
        let LoopOutcome::Suspended { pending, .. } = &outcome else {
            return Ok(());
        };
        if !wait {
            println!(
                "Decide with: lockkeeper decide {} --approve",
                pending.approval_request_id
            );
            return Ok(());
        }

        app.coordinator.track(pending);
        println!("Waiting for a decision...");
        let resumed = app
            .coordinator
            .wait_for_decision(
                app.gateway.as_ref(),
                &pending.approval_request_id,
                app.config.approval.poll_interval(),
            )
            .await?;
        print_resumed(&resumed);
        outcome = agent.resume(resumed).await?;
    }
}

fn cmd_pending(app: &App) -> Result<()> {
    let checkpoints = app.store.pending()?;
    if checkpoints.is_empty() {
        println!("No parked runs.");
        return Ok(());
    }

    let undecided: HashSet<String> = if app.uses_ledger() {
        app.ledger
            .pending()?
            .into_iter()
            .map(|entry| entry.id.to_string())
            .collect()
    } else {
        HashSet::new()
    };

    println!(
        "{:<36}  {:<36}  {:<16}  {:<16}  STATUS",
        "REQUEST ID", "CHECKPOINT", "TOOL", "PARKED"
    );
    println!("{}", "-".repeat(120));

    for summary in checkpoints {
        let parked = Local
            .from_utc_datetime(&summary.created_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let request = app.ledger.request_for_checkpoint(summary.id.as_str())?;
        let (request, status) = match request {
            Some(id) if undecided.contains(id.as_str()) => (id.to_string(), "awaiting decision"),
            Some(id) => (id.to_string(), "decided"),
            None => ("-".to_string(), "remote"),
        };
        println!(
            "{:<36}  {:<36}  {:<16}  {:<16}  {status}",
            request, summary.id, summary.tool_name, parked
        );
    }

    Ok(())
}

fn cmd_decide(
    app: &App,
    request_id: String,
    approved: bool,
    feedback: Option<String>,
) -> Result<()> {
    if !app.uses_ledger() {
        return Err(Error::Unsupported(
            "decisions for the http gateway are made on the approval service".into(),
        ));
    }

    let id = ApprovalRequestId::from(request_id);
    let decision = match app.ledger.record(&id, approved, feedback) {
        Err(ApprovalError::NotFound(_)) => return Err(Error::NothingPending(id.to_string())),
        other => other?,
    };
    let verb = if decision.approved { "Approved" } else { "Rejected" };
    println!("{verb} {id}");
    println!("Resume with: lockkeeper resume {id}");
    Ok(())
}

async fn cmd_resume(app: &App, request_id: String) -> Result<()> {
    let id = ApprovalRequestId::from(request_id);
    match app.coordinator.poll(app.gateway.as_ref(), &id).await {
        Ok(Some(resumed)) => continue_run(app, resumed).await,
        Ok(None) => {
            println!("{id} is still waiting for a decision.");
            Ok(())
        }
        Err(runtime::Error::CheckpointNotFound(_)) => Err(Error::NothingPending(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

async fn cmd_watch(app: &App, interval_ms: Option<u64>) -> Result<()> {
    if !app.uses_ledger() {
        return Err(Error::Unsupported(
            "watch polls the local ledger; use `lockkeeper serve` for the http gateway".into(),
        ));
    }

    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| app.config.approval.poll_interval());
    println!("Watching for decisions. Ctrl+C to stop.");

    loop {
        for summary in app.store.pending()? {
            let Some(id) = app.ledger.request_for_checkpoint(summary.id.as_str())? else {
                continue;
            };
            match app.coordinator.poll(app.gateway.as_ref(), &id).await {
                Ok(Some(resumed)) => {
                    if let Err(e) = continue_run(app, resumed).await {
                        tracing::error!(approval_request_id = %id, error = %e, "resumed run failed");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(approval_request_id = %id, error = %e, "resume failed");
                }
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

async fn cmd_serve(app: &App, bind: &str) -> Result<()> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let listener = tokio::net::TcpListener::bind(bind).await?;
    println!("Listening on http://{bind}");
    println!("  POST /decisions");
    println!("  POST /webhooks/function_call");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, serve::build_router(sender)).await {
            tracing::error!(error = %e, "decision server stopped");
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            decision = receiver.recv() => {
                let Some(decision) = decision else { break };
                apply_pushed(app, decision).await;
            }
        }
    }

    server.abort();
    Ok(())
}

/// Apply a decision that arrived over HTTP.
async fn apply_pushed(app: &App, decision: Decision) {
    let id = decision.approval_request_id.clone();
    match app.apply_pushed(decision).await {
        Ok(Some(resumed)) => {
            if let Err(e) = continue_run(app, resumed).await {
                tracing::error!(approval_request_id = %id, error = %e, "resumed run failed");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(approval_request_id = %id, error = %e, "resume failed"),
    }
}

async fn continue_run(app: &App, resumed: Resumed) -> Result<()> {
    print_resumed(&resumed);
    let outcome = app.agent(true)?.resume(resumed).await?;
    print_outcome(&outcome);
    if let LoopOutcome::Suspended { pending, .. } = &outcome {
        println!(
            "Decide with: lockkeeper decide {} --approve",
            pending.approval_request_id
        );
    }
    Ok(())
}

fn print_resumed(resumed: &Resumed) {
    let verdict = match resumed.kind {
        ResumeKind::Executed => "approved, tool ran",
        ResumeKind::ExecutionFailed => "approved, tool failed",
        ResumeKind::Rejected => "rejected",
    };
    println!("Resumed run {} ({verdict})", resumed.run_id);
    if let Some(outcome) = resumed.outcome() {
        println!("  result: {}", outcome.content());
    }
}

fn print_outcome(outcome: &LoopOutcome) {
    match outcome {
        LoopOutcome::Final { answer, .. } => println!("\n{answer}\n"),
        LoopOutcome::Suspended { pending, .. } => {
            println!("Parked: {} {}", pending.tool_name, pending.arguments);
            println!("  request:    {}", pending.approval_request_id);
            println!("  checkpoint: {}", pending.checkpoint_id);
        }
        LoopOutcome::Continue(_) => {}
    }
}
