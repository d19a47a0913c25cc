// src/config/config.rs
use crate::types::BackendKind;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Most VMs a single engine will run
pub const MAX_THREADS: usize = 65535;

/// Main configuration structure for the mining application
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hashing backend (`mock` or `randomx`)
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Number of search threads, one VM each (0 = number of CPU cores)
    #[serde(default)]
    pub threads: usize,

    /// Threads used to build the dataset after a seed change
    /// (0 = number of CPU cores)
    #[serde(default)]
    pub init_threads: usize,

    /// Seconds between hashrate reports
    #[serde(default = "default_print_interval")]
    pub print_interval: u64,

    /// Try to reserve huge pages before allocating the dataset
    #[serde(default = "default_true")]
    pub hugepages: bool,

    /// Log at debug level
    #[serde(default)]
    pub verbose: bool,
}

fn default_backend() -> BackendKind {
    BackendKind::RandomX
}

fn default_print_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: default_backend(),
            threads: 0,
            init_threads: 0,
            print_interval: default_print_interval(),
            hugepages: true,
            verbose: false,
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&config_str)
    }

    /// Parses and validates a TOML configuration string
    pub fn parse(config_str: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    ///
    /// # Errors
    /// `MinerError::ConfigError` for a zero `print_interval` or more than
    /// [`MAX_THREADS`] threads.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.print_interval == 0 {
            return Err(MinerError::ConfigError(
                "print_interval must be at least 1 second".into(),
            ));
        }
        if self.threads > MAX_THREADS {
            return Err(MinerError::ConfigError(format!(
                "threads must be at most {}, got {}",
                MAX_THREADS, self.threads
            )));
        }
        if self.init_threads > MAX_THREADS {
            return Err(MinerError::ConfigError(format!(
                "init_threads must be at most {}, got {}",
                MAX_THREADS, self.init_threads
            )));
        }
        Ok(())
    }

    /// Search thread count with 0 resolved to the CPU count
    pub fn worker_threads(&self) -> usize {
        resolve_threads(self.threads)
    }

    /// Dataset init thread count with 0 resolved to the CPU count
    pub fn dataset_threads(&self) -> usize {
        resolve_threads(self.init_threads)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# RandomX Miner Configuration\n\n");
        template.push_str("# Hashing backend: randomx, mock\n");
        template.push_str("backend = \"randomx\"\n");
        template.push_str("# Number of search threads, one VM each (0 = auto-detect)\n");
        template.push_str("threads = 0\n");
        template.push_str("# Threads used to build the dataset (0 = auto-detect)\n");
        template.push_str("init_threads = 0\n");
        template.push_str("# Seconds between hashrate reports\n");
        template.push_str("print_interval = 60\n");
        template.push_str("# Reserve huge pages before allocating (Linux, needs root)\n");
        template.push_str("hugepages = true\n");
        template.push_str("# Debug logging\n");
        template.push_str("verbose = false\n");
        template
    }
}

fn resolve_threads(threads: usize) -> usize {
    if threads == 0 { num_cpus::get() } else { threads }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.backend, BackendKind::RandomX);
        assert_eq!(config.print_interval, 60);
        assert!(config.hugepages);
    }

    #[test]
    fn template_round_trips() {
        let config = Config::parse(&Config::generate_template()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parses_fields() {
        let config = Config::parse(
            "backend = \"mock\"\nthreads = 3\ninit_threads = 8\nprint_interval = 5\nhugepages = false\nverbose = true\n",
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.worker_threads(), 3);
        assert_eq!(config.dataset_threads(), 8);
        assert_eq!(config.print_interval, 5);
        assert!(!config.hugepages);
        assert!(config.verbose);
    }

    #[test]
    fn zero_threads_means_all_cores() {
        let config = Config::default();
        assert_eq!(config.worker_threads(), num_cpus::get());
        assert_eq!(config.dataset_threads(), num_cpus::get());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::parse("print_interval = 0"),
            Err(MinerError::ConfigError(_))
        ));
        assert!(matches!(
            Config::parse("threads = 70000"),
            Err(MinerError::ConfigError(_))
        ));
        assert!(matches!(
            Config::parse("backend = \"cryptonight\""),
            Err(MinerError::ConfigError(_))
        ));
    }
}
