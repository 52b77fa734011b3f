use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "crossfade", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the crossfade with one backend and print its timing.
    Run(RunArgs),
    /// Render with every backend and check that all of them wrote identical frames.
    Compare(CompareArgs),
    /// Worker rank of a distributed run. Started by the owner; speaks the replication protocol
    /// on stdin/stdout.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// JSON run configuration. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source color image.
    #[arg(long = "in", visible_alias = "input")]
    input: Option<PathBuf>,

    /// Output root; each backend writes under `<out>/<backend>/`.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Number of frames (>= 2).
    #[arg(long)]
    frames: Option<u64>,

    /// Shared-memory pool size.
    #[arg(long)]
    threads: Option<usize>,

    /// Shared-memory schedule.
    #[arg(long, value_enum)]
    schedule: Option<ScheduleChoice>,

    /// Distributed rank count.
    #[arg(long, env = "CROSSFADE_WORKERS")]
    workers: Option<usize>,

    /// Where distributed ranks run.
    #[arg(long, value_enum)]
    launch: Option<LaunchChoice>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Backend to use.
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    #[arg(long)]
    rank: usize,

    #[arg(long)]
    size: usize,

    #[arg(long)]
    frames: u64,

    /// Backend root the rank namespaces are created under.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Sequential,
    #[value(alias = "shared-memory")]
    Shared,
    Distributed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScheduleChoice {
    Static,
    Dynamic,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LaunchChoice {
    Processes,
    Threads,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Compare(args) => cmd_compare(args),
        Command::Worker(args) => cmd_worker(args),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(common: &CommonArgs) -> anyhow::Result<crossfade::RunConfig> {
    let mut cfg = match &common.config {
        Some(path) => crossfade::RunConfig::from_json_file(path)?,
        None => crossfade::RunConfig::default(),
    };
    if let Some(input) = &common.input {
        cfg.input = input.clone();
    }
    if let Some(out) = &common.out {
        cfg.output_root = out.clone();
    }
    if let Some(frames) = common.frames {
        cfg.total_frames = frames;
    }
    if common.threads.is_some() {
        cfg.threads = common.threads;
    }
    if let Some(schedule) = common.schedule {
        cfg.schedule = match schedule {
            ScheduleChoice::Static => crossfade::Schedule::Static,
            ScheduleChoice::Dynamic => crossfade::Schedule::Dynamic,
        };
    }
    if common.workers.is_some() {
        cfg.workers = common.workers;
    }
    if let Some(launch) = common.launch {
        cfg.launch = match launch {
            LaunchChoice::Processes => crossfade::LaunchMode::Processes,
            LaunchChoice::Threads => crossfade::LaunchMode::Threads,
        };
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(backend) = args.backend {
        cfg.backend = match backend {
            BackendChoice::Sequential => crossfade::BackendKind::Sequential,
            BackendChoice::Shared => crossfade::BackendKind::Shared,
            BackendChoice::Distributed => crossfade::BackendKind::Distributed,
        };
    }

    let report = crossfade::run(&cfg)
        .with_context(|| format!("{} run of '{}'", cfg.backend, cfg.input.display()))?;
    if args.common.json {
        println!("{}", crossfade::report::to_json(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn cmd_compare(args: CompareArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.common)?;
    let report = crossfade::compare(&cfg)
        .with_context(|| format!("compare backends on '{}'", cfg.input.display()))?;
    if args.common.json {
        println!("{}", crossfade::report::to_json(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn cmd_worker(args: WorkerArgs) -> anyhow::Result<()> {
    crossfade::backend::distributed::run_worker_process(
        crossfade::WorkerId(args.rank),
        args.size,
        args.frames,
        &args.out,
    )
    .with_context(|| format!("worker rank {}", args.rank))?;
    Ok(())
}
