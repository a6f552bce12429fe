//! NextGCore MB-SMF Session Consumer CLI
//!
//! Front-end to the `ogs-mbsmf` consumer library (TS 29.532):
//! - Plans the Nmbsmf_MBSSession requests a set of sessions needs
//! - Optionally simulates successful answers until nothing is left to send
//! - Prints the JSON Patch between two versions of a resource

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ogs_mbsmf::{
    diff, Context, Diff, MbsMediaComp, MbsQosReq, MbsSession, MbsSessionSubscription, MbsmfConfig,
    PatchOp,
};
use serde::de::DeserializeOwned;

mod scenario;
mod transport;

use scenario::Scenario;
use transport::{Request, Simulator};

/// Upper bound on push/answer rounds in `plan --ack`
const MAX_ROUNDS: usize = 16;

/// NextGCore MB-SMF session consumer
#[derive(Parser, Debug)]
#[command(name = "nextgcore-mbsmf-cli")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MB-SMF Nmbsmf_MBSSession consumer planner (TS 29.532)", long_about = None)]
struct Args {
    /// Configuration file path; overrides the scenario's client section
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the requests needed to bring a scenario's sessions up
    Plan {
        /// Scenario file (YAML)
        scenario: PathBuf,

        /// Answer every request successfully and keep pushing
        #[arg(long)]
        ack: bool,
    },
    /// Print the patch between two JSON documents
    Diff {
        old: PathBuf,
        new: PathBuf,

        #[arg(long, value_enum, default_value_t = DiffKind::Session)]
        kind: DiffKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DiffKind {
    Session,
    Subscription,
    MediaComponent,
    Qos,
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    log::debug!("NextGCore MB-SMF consumer CLI v{}", env!("CARGO_PKG_VERSION"));

    match &args.command {
        Command::Plan { scenario, ack } => run_plan(args.config.as_deref(), scenario, *ack),
        Command::Diff { old, new, kind } => {
            for op in diff_files(old, new, *kind)? {
                println!("{}", serde_json::to_string(&op)?);
            }
            Ok(())
        }
    }
}

fn run_plan(config: Option<&Path>, path: &Path, ack: bool) -> Result<()> {
    let scenario = Scenario::from_file(path)?;
    let config = match config {
        Some(file) => MbsmfConfig::from_file(file)
            .with_context(|| format!("Failed to load configuration {}", file.display()))?,
        None => scenario.config()?,
    };

    let mut ctx = Context::new(config);
    let keys = scenario.load(&mut ctx)?;
    log::info!("Loaded {} session(s) from {}", keys.len(), path.display());

    let rounds = plan(&mut ctx, ack, |round, request| {
        println!("# round {round}");
        println!("{request}");
    });

    for (name, key) in &keys {
        if let Some(session) = ctx.session(*key) {
            println!(
                "# {name}: {} resource={}",
                session.state(),
                session.resource_id().unwrap_or("-")
            );
        }
    }
    log::info!("Plan finished after {rounds} round(s)");

    ctx.close();
    Ok(())
}

/// Push every session and hand the resulting requests to `emit`. With `ack`
/// the requests are answered and the sessions pushed again until no request
/// is produced. Returns the number of rounds that produced requests.
fn plan<F>(ctx: &mut Context, ack: bool, mut emit: F) -> usize
where
    F: FnMut(usize, &Request),
{
    let mut simulator = Simulator::new();
    let mut rounds = 0;

    while rounds < MAX_ROUNDS {
        ctx.push_all();
        let intents = ctx.take_intents();
        if intents.is_empty() {
            break;
        }
        rounds += 1;

        for intent in &intents {
            log::debug!("{intent}");
            emit(rounds, &Request::from_intent(intent));
        }
        if !ack {
            break;
        }
        for intent in &intents {
            if let Some(event) = simulator.answer(intent) {
                ctx.handle_event(event);
            }
        }
    }

    if rounds == MAX_ROUNDS {
        log::warn!("Sessions still produce requests after {MAX_ROUNDS} rounds");
    }
    rounds
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid document {}", path.display()))
}

fn diff_typed<T: Diff + DeserializeOwned>(old: &Path, new: &Path) -> Result<Vec<PatchOp>> {
    let old: Option<T> = read_document(old)?;
    let new: Option<T> = read_document(new)?;
    Ok(diff(old.as_ref(), new.as_ref()))
}

/// Patch between two JSON files; a file holding `null` stands for absence
fn diff_files(old: &Path, new: &Path, kind: DiffKind) -> Result<Vec<PatchOp>> {
    match kind {
        DiffKind::Session => diff_typed::<MbsSession>(old, new),
        DiffKind::Subscription => diff_typed::<MbsSessionSubscription>(old, new),
        DiffKind::MediaComponent => diff_typed::<MbsMediaComp>(old, new),
        DiffKind::Qos => diff_typed::<MbsQosReq>(old, new),
    }
}
