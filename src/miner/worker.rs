// src/miner/worker.rs
//! Worker thread implementation
//!
//! A worker owns one VM slot for the duration of a job. It keeps calling the
//! search loop, reporting every share it finds, until the scheduler raises the
//! stop flag.

use crate::miner::algorithm::RandomXBackend;
use crate::miner::engine::SearchSlot;
use crate::miner::search::SearchOutcome;
use crate::miner::stop::StopFlag;
use crate::stats::StatsReporter;
use crate::types::{Job, Share};
use crate::utils::error::MinerError;
use crossbeam_channel::Sender;

/// Searches one job on one VM slot
pub struct Worker<'a, B: RandomXBackend> {
    /// The VM lent out of the engine's pool
    slot: SearchSlot<'a, B>,
    /// Job being searched
    job: &'a Job,
    /// Raised by the scheduler when the job is replaced
    stop: &'a StopFlag,
    /// Channel for sending found shares; `None` only counts them
    share_sender: Option<Sender<Share>>,
    /// Shared hash and share counters
    stats: StatsReporter,
}

impl<'a, B: RandomXBackend> Worker<'a, B> {
    /// Creates a new Worker instance
    ///
    /// # Arguments
    /// * `slot` - The VM to search with
    /// * `job` - Blob, difficulty and id of the job
    /// * `stop` - Flag that ends the search
    /// * `share_sender` - Channel for sending found shares
    /// * `stats` - Counters to tally hashes and shares into
    pub fn new(
        slot: SearchSlot<'a, B>,
        job: &'a Job,
        stop: &'a StopFlag,
        share_sender: Sender<Share>,
        stats: StatsReporter,
    ) -> Self {
        Worker {
            slot,
            job,
            stop,
            share_sender: Some(share_sender),
            stats,
        }
    }

    /// Creates a Worker that tallies shares into `stats` and discards them
    pub fn counting_only(slot: SearchSlot<'a, B>, job: &'a Job, stop: &'a StopFlag, stats: StatsReporter) -> Self {
        Worker {
            slot,
            job,
            stop,
            share_sender: None,
            stats,
        }
    }

    /// Searches until the stop flag is raised
    ///
    /// # Returns
    /// The number of shares found.
    ///
    /// # Errors
    /// Input errors from the search loop, and `MinerError::ChannelError` if
    /// the share receiver has gone away.
    pub fn run(mut self) -> Result<u64, MinerError> {
        let mut found = 0;
        loop {
            match self
                .slot
                .hash_until(&self.job.blob, self.job.difficulty, self.stop)?
            {
                SearchOutcome::Found {
                    hashes,
                    nonce,
                    hash,
                } => {
                    self.stats.tally_hashes(hashes);
                    self.stats.record_share(self.job.difficulty);
                    found += 1;
                    log::info!(
                        "Share found for job {} on slot {}: nonce {:08x}",
                        self.job.job_id,
                        self.slot.slot(),
                        nonce
                    );
                    if let Some(sender) = &self.share_sender {
                        sender.send(Share {
                            job_id: self.job.job_id.clone(),
                            nonce,
                            hash,
                            difficulty: self.job.difficulty,
                        })?;
                    }
                    if self.stop.is_raised() {
                        return Ok(found);
                    }
                }
                SearchOutcome::Stopped { hashes } => {
                    self.stats.tally_hashes(hashes);
                    log::debug!(
                        "Slot {} stopped on job {} ({} shares)",
                        self.slot.slot(),
                        self.job.job_id,
                        found
                    );
                    return Ok(found);
                }
            }
        }
    }
}
