use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "kinetex", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expand a timeline notation file into per-step style records.
    Timeline(TimelineArgs),
    /// Diff two vector snapshot JSON files into an animation plan.
    Diff(DiffArgs),
    /// List the animation records stored in a records JSON file.
    Records(RecordsArgs),
    /// Print the annotated (start, end) pair a record produces.
    Annotate(AnnotateArgs),
}

#[derive(Parser, Debug)]
struct TimelineArgs {
    /// Input notation file.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct DiffArgs {
    /// Snapshot JSON for the current state.
    #[arg(long)]
    before: PathBuf,

    /// Snapshot JSON for the target state.
    #[arg(long)]
    after: PathBuf,

    /// Swap synchronously instead of animating.
    #[arg(long)]
    immediate: bool,

    /// Animation duration in seconds.
    #[arg(long, default_value_t = kinetex::DEFAULT_TIMING_S)]
    duration: f64,
}

#[derive(Parser, Debug)]
struct RecordsArgs {
    /// Records JSON file (the persisted record array).
    #[arg(long)]
    store: PathBuf,
}

#[derive(Parser, Debug)]
struct AnnotateArgs {
    /// Records JSON file (the persisted record array).
    #[arg(long)]
    store: PathBuf,

    /// Start-side content.
    #[arg(long)]
    start: String,

    /// End-side content.
    #[arg(long)]
    end: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Timeline(args) => cmd_timeline(args),
        Command::Diff(args) => cmd_diff(args),
        Command::Records(args) => cmd_records(args),
        Command::Annotate(args) => cmd_annotate(args),
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<kinetex::VectorSnapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read snapshot '{}'", path.display()))?;
    let snapshot: kinetex::VectorSnapshot =
        serde_json::from_str(&raw).with_context(|| "parse snapshot JSON")?;
    snapshot.validate()?;
    Ok(snapshot)
}

fn read_store(path: &Path) -> anyhow::Result<kinetex::GroupStore<kinetex::MemoryStore>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read records '{}'", path.display()))?;
    let backing = kinetex::MemoryStore::with_entry(kinetex::STORE_KEY, raw);
    Ok(kinetex::GroupStore::load(backing)?)
}

fn cmd_timeline(args: TimelineArgs) -> anyhow::Result<()> {
    let notation = fs::read_to_string(&args.in_path)
        .with_context(|| format!("read notation '{}'", args.in_path.display()))?;
    let steps = kinetex::compile(&notation)?;
    println!("{}", serde_json::to_string_pretty(&steps)?);
    Ok(())
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<()> {
    let before = read_snapshot(&args.before)?;
    let after = read_snapshot(&args.after)?;

    let before_ids: BTreeSet<kinetex::GroupId> = before.groups.keys().cloned().collect();
    let timing = if args.immediate {
        kinetex::Timing::Immediate
    } else {
        kinetex::Timing::Animate {
            duration_s: args.duration,
        }
    };
    let plan = kinetex::AnimationPlan {
        ops: kinetex::diff(&before_ids, &after),
        timing,
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn cmd_records(args: RecordsArgs) -> anyhow::Result<()> {
    let store = read_store(&args.store)?;
    println!("{}", serde_json::to_string_pretty(store.records())?);
    Ok(())
}

fn cmd_annotate(args: AnnotateArgs) -> anyhow::Result<()> {
    let store = read_store(&args.store)?;
    let (start, end) = store.lookup(&args.start, &args.end);
    println!("{start}");
    println!("{end}");
    Ok(())
}
