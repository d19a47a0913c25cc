// src/cli/commands.rs
use crate::types::BackendKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RX Miner CLI - multi-threaded RandomX search engine
#[derive(Parser, Debug)]
#[command(name = "rx-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (mine jobs, run a benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Mine newline-delimited JSON jobs and print found shares
    Mine(MineOptions),

    /// Measure the hashrate of a backend
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for mining jobs
#[derive(Parser, Debug)]
pub struct MineOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of search threads to use (overrides config)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Hashing backend to use (overrides config)
    #[arg(short, long)]
    pub backend: Option<BackendKind>,

    /// File of JSON jobs, one per line (default: stdin)
    #[arg(short, long)]
    pub jobs: Option<PathBuf>,
}

/// Options for running benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Backend to benchmark
    #[arg(short, long, default_value = "mock")]
    pub backend: BackendKind,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Difficulty searched for; shares are counted but not printed
    #[arg(long, default_value_t = 1_000_000)]
    pub difficulty: u64,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
