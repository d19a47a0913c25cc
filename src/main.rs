// src/main.rs
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rx_miner_rs::cli::{Action, BenchmarkOptions, Commands, ConfigOptions, MineOptions};
use rx_miner_rs::miner::algorithm::mock::MockBackend;
#[cfg(feature = "rust-randomx")]
use rx_miner_rs::miner::algorithm::randomx::RustRandomX;
use rx_miner_rs::utils::hugepages;
use rx_miner_rs::utils::logging::init_bench_logging;
use rx_miner_rs::{
    BackendKind, Config, Job, MinerError, RandomXBackend, RxEngine, Scheduler, Share, StatsReporter,
    StopFlag, Worker, config, init_logging, stats,
};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Seed hashed by the benchmark
const BENCH_SEED: &[u8] = b"rx-miner-rs benchmark seed";

/// Blob size of a typical Monero hashing blob
const BENCH_BLOB_SIZE: usize = 76;

/// Main entry point for the RandomX miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = Commands::parse();

    match cli.action {
        Action::Mine(opts) => start_mining(opts),
        Action::Benchmark(opts) => run_benchmark(opts),
        Action::Config(opts) => generate_config(opts),
    }
}

/// Mines jobs read from a file or stdin until the input ends
///
/// # Operations
/// 1. Loads configuration and applies CLI overrides
/// 2. Initializes logging and reserves huge pages
/// 3. Starts the job reader, the share printer and the stats reporter
/// 4. Runs the scheduler until the job stream closes
fn start_mining(opts: MineOptions) -> Result<(), MinerError> {
    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(threads) = opts.threads {
        config.threads = threads;
    }
    if let Some(backend) = opts.backend {
        config.backend = backend;
    }
    config.validate()?;
    init_logging(config.verbose);

    match config.backend {
        BackendKind::Mock => mine_with(MockBackend::new(), &config, opts.jobs),
        #[cfg(feature = "rust-randomx")]
        BackendKind::RandomX => mine_with(RustRandomX::default(), &config, opts.jobs),
        #[cfg(not(feature = "rust-randomx"))]
        BackendKind::RandomX => Err(randomx_unavailable()),
    }
}

fn mine_with<B: RandomXBackend>(
    backend: B,
    config: &Config,
    jobs: Option<PathBuf>,
) -> Result<(), MinerError> {
    let threads = config.worker_threads();
    if config.hugepages {
        hugepages::reserve(threads);
    }

    // Communication channels
    let (job_sender, job_receiver) = unbounded();
    let (share_sender, share_receiver) = unbounded();

    let reader = spawn_job_reader(jobs, job_sender)?;
    let printer = spawn_share_printer(share_receiver);

    // Statistics reporting
    let reporter = StatsReporter::new(Duration::from_secs(config.print_interval));
    reporter.start_reporting();

    // Mining setup
    let mut scheduler = Scheduler::new(
        RxEngine::new(backend),
        config.dataset_threads(),
        share_sender,
        reporter.clone(),
    );
    scheduler.initialize(threads)?;
    let mined = scheduler.run(&job_receiver);
    // Closes the share channel so the printer drains and exits.
    drop(scheduler);

    join(printer, "share printer")??;
    // On failure the reader may still be blocked on stdin; leave it behind.
    let mined = mined?;
    join(reader, "job reader")??;

    let totals = reporter.get_stats();
    log::info!(
        "Mined {} jobs: {} hashes, {} shares",
        mined,
        totals.hashes_total,
        totals.shares_found
    );
    Ok(())
}

/// Reads JSON job lines and forwards them to the scheduler
///
/// Malformed lines are logged and skipped; the channel closes at end of input.
fn spawn_job_reader(
    path: Option<PathBuf>,
    jobs: Sender<Job>,
) -> Result<JoinHandle<Result<(), MinerError>>, MinerError> {
    let input: Box<dyn BufRead + Send> = match path {
        Some(path) => Box::new(BufReader::new(File::open(&path).map_err(|e| {
            MinerError::InputError(format!("Failed to open jobs at {}: {}", path.display(), e))
        })?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    Ok(std::thread::spawn(move || {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match Job::from_json_line(&line) {
                Ok(job) => {
                    if jobs.send(job).is_err() {
                        // Scheduler is gone; nothing left to feed.
                        break;
                    }
                }
                Err(e) => log::warn!("Skipping job line: {}", e),
            }
        }
        log::debug!("Job input closed");
        Ok(())
    }))
}

/// Prints every share as a JSON line on stdout
fn spawn_share_printer(shares: Receiver<Share>) -> JoinHandle<Result<(), MinerError>> {
    std::thread::spawn(move || {
        let stdout = std::io::stdout();
        for share in shares {
            let line = share.to_json_line()?;
            let mut out = stdout.lock();
            writeln!(out, "{}", line)?;
            out.flush()?;
        }
        Ok(())
    })
}

/// Runs a fixed-duration benchmark of a backend
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Builds an engine and seeds a fixed seed
/// 3. Searches on every slot until a timer raises the stop flag
/// 4. Reports total hashes and hashrate
fn run_benchmark(opts: BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    match opts.backend {
        BackendKind::Mock => bench_with(MockBackend::new(), &opts),
        #[cfg(feature = "rust-randomx")]
        BackendKind::RandomX => bench_with(RustRandomX::default(), &opts),
        #[cfg(not(feature = "rust-randomx"))]
        BackendKind::RandomX => Err(randomx_unavailable()),
    }
}

fn bench_with<B: RandomXBackend>(backend: B, opts: &BenchmarkOptions) -> Result<(), MinerError> {
    if opts.difficulty == 0 {
        return Err(MinerError::InputError("Difficulty must be non-zero".into()));
    }

    let mut engine = RxEngine::new(backend);
    engine.initialize(opts.threads.max(1))?;
    engine.seed(BENCH_SEED, num_cpus::get())?;

    let job = Job {
        job_id: "benchmark".into(),
        blob: vec![0u8; BENCH_BLOB_SIZE],
        difficulty: opts.difficulty,
        seed_hash: BENCH_SEED.to_vec(),
    };
    let reporter = StatsReporter::new(Duration::from_secs(5));
    reporter.start_reporting();
    let stop = StopFlag::new();
    let duration = Duration::from_secs(opts.duration);

    log::info!(
        "Starting {} benchmark for {} seconds on {} threads",
        opts.backend,
        opts.duration,
        engine.pool_size()
    );

    let started = Instant::now();
    let slots = engine.search_slots()?;
    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = slots
            .into_iter()
            .map(|slot| {
                let worker = Worker::counting_only(slot, &job, &stop, reporter.clone());
                scope.spawn(move || worker.run())
            })
            .collect();

        // Workers only return once the flag is up.
        while started.elapsed() < duration {
            std::thread::sleep(Duration::from_millis(50).min(duration));
        }
        stop.raise();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| MinerError::TaskError("Benchmark thread panicked".into()))
            })
            .collect()
    });
    let elapsed = started.elapsed();
    let mut shares = 0;
    for outcome in outcomes {
        shares += outcome??;
    }

    // Report final results
    let totals = reporter.get_stats();
    let hashrate = totals.hashes_total as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", totals.hashes_total);
    log::info!("Shares at difficulty {}: {}", opts.difficulty, shares);
    log::info!("Average hashrate: {}", stats::fmt_hashrate(hashrate));
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Writes the configuration template to the requested path
fn generate_config(opts: ConfigOptions) -> Result<(), MinerError> {
    std::fs::write(&opts.output, config::generate_template())?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}

fn join<T>(handle: JoinHandle<T>, name: &str) -> Result<T, MinerError> {
    handle
        .join()
        .map_err(|_| MinerError::TaskError(format!("{} thread panicked", name)))
}

#[cfg(not(feature = "rust-randomx"))]
fn randomx_unavailable() -> MinerError {
    MinerError::ConfigError(
        "The randomx backend requires building with `--features rust-randomx`".into(),
    )
}
