mod policy;
mod reports;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use skull_game::{
    Catalog, Clock, EngineConfig, FileCache, GameEngine, LocalCache, ManualClock, MemoryCache,
    MemoryProfileStore, SystemClock, TokioClock,
};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;
use tokio::task::LocalSet;

use policy::Strategy;
use session::{RunMode, SessionPlan, SessionReport};

#[derive(Debug, Parser)]
#[command(name = "skull-tester", version)]
#[command(about = "Headless Skull Clicker sessions - simulated game time or live engine timers")]
struct Args {
    /// Simulate game time on a stepped clock, or run the live timers
    #[arg(long, value_enum, default_value_t = RunMode::Simulate)]
    mode: RunMode,

    /// Seconds of game time (simulate) or wall time (live) per session
    #[arg(long, default_value_t = 60)]
    seconds: u64,

    /// Player behaviour
    #[arg(long, value_enum, default_value_t = Strategy::Shopper)]
    strategy: Strategy,

    /// Manual clicks per second for clicking strategies
    #[arg(long, default_value_t = 5)]
    clicks_per_second: u32,

    /// Seeds to run, one session each (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Directory for the file cache; sessions resume from it
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Sign in as this user against an in-memory profile store
    #[arg(long)]
    user: Option<String>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "console"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;
    LocalSet::new().block_on(&runtime, run(args))
}

async fn run(args: Args) -> Result<()> {
    if args.report == "console" {
        announce_banner();
    }

    let start_time = Instant::now();
    let seeds = parse_seeds(&args.seeds)?;
    let remote = MemoryProfileStore::new();
    let plan = SessionPlan {
        strategy: args.strategy,
        seconds: args.seconds,
        clicks_per_second: args.clicks_per_second,
    };

    let mut reports = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let report = run_session(&args, &plan, seed, &remote)
            .await
            .with_context(|| format!("session for seed {seed} failed"))?;
        reports.push(report);
    }

    write_reports(&args, &reports, start_time)
}

fn announce_banner() {
    println!("{}", "💀 Skull Clicker Session Tester".bright_cyan().bold());
    println!("{}", "===============================".cyan());
}

fn split_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_seeds(input: &str) -> Result<Vec<u64>> {
    split_csv(input)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .with_context(|| format!("invalid seed `{token}`"))
        })
        .collect()
}

fn open_cache(args: &Args) -> Result<Rc<dyn LocalCache>> {
    match &args.cache {
        Some(dir) => {
            let cache = FileCache::open(dir)
                .with_context(|| format!("failed to open cache at {}", dir.display()))?;
            Ok(Rc::new(cache))
        }
        None => Ok(Rc::new(MemoryCache::new())),
    }
}

async fn run_session(
    args: &Args,
    plan: &SessionPlan,
    seed: u64,
    remote: &MemoryProfileStore,
) -> Result<SessionReport> {
    let cache = open_cache(args)?;
    let config = EngineConfig::default().with_seed(seed);
    let manual = Rc::new(ManualClock::new(SystemClock.now_ms()));
    let clock: Rc<dyn Clock> = match args.mode {
        RunMode::Simulate => manual.clone(),
        RunMode::Live => Rc::new(TokioClock::new()),
    };
    let engine = GameEngine::new(
        config,
        Catalog::standard(),
        clock,
        cache,
        Rc::new(remote.clone()),
    )
    .context("failed to build the engine")?;
    log::info!("seed {seed}: starting from {:?}", engine.load_source());

    let sign_in = match &args.user {
        Some(user) => Some(engine.sign_in(user).await),
        None => None,
    };
    let writes_before = remote.writes().len();

    let tally = match args.mode {
        RunMode::Simulate => {
            let _sync = engine.start_sync();
            let tally = session::simulate(&engine, &manual, plan).await;
            engine.flush().await;
            tally
        }
        RunMode::Live => session::run_live(&engine, plan).await,
    };

    let report = SessionReport::capture(&engine, seed, args.mode, plan, tally);
    Ok(match sign_in {
        Some(outcome) => report.with_remote(outcome, remote.writes().len() - writes_before),
        None => report,
    })
}

fn write_reports(args: &Args, reports: &[SessionReport], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, reports)?,
        _ => {
            let duration = start_time.elapsed();
            if reports.is_empty() {
                writeln!(&mut output_target, "No sessions executed.")?;
            } else {
                reports::generate_console_report(&mut output_target, reports, duration)?;
            }
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
