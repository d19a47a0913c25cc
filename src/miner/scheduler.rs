// src/miner/scheduler.rs
//! Mining job scheduler implementation
//!
//! Drives an [`RxEngine`] from a stream of jobs. Each job runs as an epoch:
//! one scoped worker thread per VM slot, all searching the same blob with
//! nonces from the shared sequencer. A new job, a closed job channel or a
//! failed worker ends the epoch; every worker is joined before the engine is
//! touched again, so reseeding never races a search.

use crate::miner::algorithm::RandomXBackend;
use crate::miner::dataset::InitStatus;
use crate::miner::engine::RxEngine;
use crate::miner::stop::StopFlag;
use crate::miner::worker::Worker;
use crate::stats::StatsReporter;
use crate::types::{Job, Share};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender};

/// Coordinates jobs across worker threads
pub struct Scheduler<B: RandomXBackend> {
    engine: RxEngine<B>,
    /// Threads used when rebuilding the dataset
    init_threads: usize,
    /// Channel for sending found shares
    share_sender: Sender<Share>,
    stats: StatsReporter,
}

/// Signals the scheduler when a worker thread exits, including by panic
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

impl<B: RandomXBackend> Scheduler<B> {
    /// Creates a new Scheduler instance
    ///
    /// # Arguments
    /// * `engine` - Engine to search with
    /// * `init_threads` - Threads used for dataset rebuilds
    /// * `share_sender` - Channel for sending found shares
    /// * `stats` - Counters shared with the workers
    pub fn new(
        engine: RxEngine<B>,
        init_threads: usize,
        share_sender: Sender<Share>,
        stats: StatsReporter,
    ) -> Self {
        Scheduler {
            engine,
            init_threads: init_threads.max(1),
            share_sender,
            stats,
        }
    }

    /// The engine, for inspection between runs
    pub fn engine(&self) -> &RxEngine<B> {
        &self.engine
    }

    /// Creates `threads` VMs and logs the large-page status
    ///
    /// # Errors
    /// Allocation errors from [`RxEngine::initialize`].
    pub fn initialize(&mut self, threads: usize) -> Result<InitStatus, MinerError> {
        let status = self.engine.initialize(threads)?;
        if status == InitStatus::NoLargePages {
            log::warn!("Large pages unavailable, hashrate will be lower");
        }
        Ok(status)
    }

    /// Mines jobs from `jobs` until the channel is closed
    ///
    /// # Returns
    /// The number of jobs mined.
    ///
    /// # Errors
    /// * `MinerError::NotInitialized` - [`initialize`](Self::initialize) was not called
    /// * `MinerError::AllocationError` - a reseed could not allocate its cache
    /// * `MinerError::TaskError` - a worker panicked
    /// * Any error a worker returned, e.g. `MinerError::ChannelError`
    pub fn run(&mut self, jobs: &Receiver<Job>) -> Result<u64, MinerError> {
        if self.engine.pool_size() == 0 {
            return Err(MinerError::NotInitialized(
                "Scheduler started before initialize".into(),
            ));
        }

        let mut mined = 0;
        let mut next = jobs.recv().ok();
        while let Some(job) = next.take() {
            self.prepare(&job)?;
            log::info!(
                "New job {} (difficulty {}, {} workers)",
                job.job_id,
                job.difficulty,
                self.engine.pool_size()
            );
            next = self.run_epoch(&job, jobs)?;
            mined += 1;
        }

        log::info!("Job channel closed after {} jobs", mined);
        Ok(mined)
    }

    /// Reseeds when the job's seed differs from the current one
    fn prepare(&mut self, job: &Job) -> Result<(), MinerError> {
        if self.engine.seed_bytes() == Some(job.seed_hash.as_slice()) {
            return Ok(());
        }
        self.engine.seed(&job.seed_hash, self.init_threads)?;
        self.stats.reset_recent();
        Ok(())
    }

    /// Searches `job` on every slot until the next job arrives
    ///
    /// Returns the job that ended the epoch, or `None` when the channel closed.
    fn run_epoch(&mut self, job: &Job, jobs: &Receiver<Job>) -> Result<Option<Job>, MinerError> {
        let stop = StopFlag::new();
        let (exit_tx, exit_rx) = crossbeam_channel::unbounded();
        let slots = self.engine.search_slots()?;
        let share_sender = &self.share_sender;
        let stats = &self.stats;

        std::thread::scope(|scope| {
            let handles: Vec<_> = slots
                .into_iter()
                .map(|slot| {
                    let worker = Worker::new(slot, job, &stop, share_sender.clone(), stats.clone());
                    let exit = ExitSignal(exit_tx.clone());
                    scope.spawn(move || {
                        let _exit = exit;
                        worker.run()
                    })
                })
                .collect();

            let next = crossbeam_channel::select! {
                recv(jobs) -> next => next.ok(),
                recv(exit_rx) -> _ => None,
            };
            stop.raise();

            let mut result = Ok(());
            for handle in handles {
                let outcome = match handle.join() {
                    Ok(outcome) => outcome.map(|_| ()),
                    Err(_) => Err(MinerError::TaskError("Worker thread panicked".into())),
                };
                if let Err(e) = outcome {
                    log::error!("Worker failed on job {}: {}", job.job_id, e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
            result.map(|()| next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::mock::MockBackend;
    use std::time::Duration;

    fn job(id: &str, seed: &[u8], difficulty: u64) -> Job {
        Job {
            job_id: id.into(),
            blob: vec![7u8; 76],
            difficulty,
            seed_hash: seed.to_vec(),
        }
    }

    fn scheduler(threads: usize) -> (Scheduler<MockBackend>, Receiver<Share>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let engine = RxEngine::new(MockBackend::new().with_items(256));
        let mut scheduler = Scheduler::new(engine, 2, tx, StatsReporter::new(Duration::from_secs(60)));
        scheduler.initialize(threads).unwrap();
        (scheduler, rx)
    }

    #[test]
    fn requires_initialize() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let engine = RxEngine::new(MockBackend::new().with_items(64));
        let mut scheduler = Scheduler::new(engine, 1, tx, StatsReporter::new(Duration::from_secs(60)));
        let (_jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        assert!(matches!(scheduler.run(&jobs_rx), Err(MinerError::NotInitialized(_))));
    }

    #[test]
    fn mines_until_channel_closes() {
        let (mut scheduler, shares) = scheduler(2);
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();

        let mined = std::thread::scope(|s| {
            let handle = s.spawn(|| scheduler.run(&jobs_rx));

            jobs_tx.send(job("a", b"seed-1", 1)).unwrap();
            let first = shares.recv_timeout(Duration::from_secs(10)).unwrap();
            assert_eq!(first.job_id, "a");

            jobs_tx.send(job("b", b"seed-2", 1)).unwrap();
            // Shares of the first job may still be queued ahead of the switch.
            loop {
                let share = shares
                    .recv_timeout(Duration::from_secs(10))
                    .expect("no share for the second job");
                if share.job_id == "b" {
                    break;
                }
            }

            drop(jobs_tx);
            handle.join().unwrap().unwrap()
        });

        assert_eq!(mined, 2);
        assert_eq!(scheduler.engine().seed_bytes(), Some(&b"seed-2"[..]));
    }

    #[test]
    fn same_seed_is_not_rebuilt() {
        let (mut scheduler, shares) = scheduler(2);
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();

        let mined = std::thread::scope(|s| {
            let handle = s.spawn(|| scheduler.run(&jobs_rx));

            for (id, seed) in [("a", &b"seed-1"[..]), ("b", b"seed-1"), ("c", b"seed-2")] {
                jobs_tx.send(job(id, seed, 1)).unwrap();
                loop {
                    let share = shares
                        .recv_timeout(Duration::from_secs(10))
                        .expect("no share for the current job");
                    if share.job_id == id {
                        break;
                    }
                }
            }

            drop(jobs_tx);
            handle.join().unwrap().unwrap()
        });

        assert_eq!(mined, 3);
        // "b" reuses the dataset built for "a"; only "c" triggers a rebuild.
        assert_eq!(scheduler.engine().backend().cache_inits(), 2);
    }

    #[test]
    fn closed_share_channel_fails_the_run() {
        let (mut scheduler, shares) = scheduler(1);
        drop(shares);
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        jobs_tx.send(job("a", b"seed", 1)).unwrap();

        // The worker fails on its first share and the epoch ends without a new job.
        let err = scheduler.run(&jobs_rx);
        assert!(matches!(err, Err(MinerError::ChannelError(_))));
    }
}
