// src/types.rs
use crate::miner::algorithm::Hash;
use crate::miner::difficulty::difficulty_from_target;
use crate::miner::nonce::{NONCE_OFFSET, NONCE_SIZE};
use crate::utils::error::MinerError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hashing backends the miner can drive
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic in-memory stand-in with a small dataset
    ///
    /// Produces well-distributed but non-RandomX hashes. Useful for
    /// benchmarking the search machinery and for tests.
    #[value(name = "mock")]
    Mock,

    /// RandomX through the `rust-randomx` crate
    ///
    /// Requires the `rust-randomx` cargo feature.
    #[value(name = "randomx")]
    RandomX,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mock => write!(f, "mock"),
            BackendKind::RandomX => write!(f, "randomx"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(BackendKind::Mock),
            "randomx" | "rx" | "rx/0" => Ok(BackendKind::RandomX),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// A unit of work: one blob to search, its difficulty and the seed it hashes under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Identifier echoed back in shares
    pub job_id: String,
    /// Hashing blob; the nonce lives at bytes 39..43
    pub blob: Vec<u8>,
    /// Required difficulty
    pub difficulty: u64,
    /// Seed the dataset must be built from
    pub seed_hash: Vec<u8>,
}

/// Wire form of a job: hex strings as pools send them
#[derive(Debug, Deserialize)]
struct JobMessage {
    job_id: String,
    blob: String,
    target: String,
    seed_hash: String,
}

impl Job {
    /// Parses one line of newline-delimited JSON job input
    ///
    /// # Errors
    /// * `MinerError::JsonError` - malformed JSON or missing fields
    /// * `MinerError::InputError` - bad hex, a blob too short to carry a nonce,
    ///   an unsupported or zero target, or an empty seed hash
    pub fn from_json_line(line: &str) -> Result<Self, MinerError> {
        let msg: JobMessage = serde_json::from_str(line)?;

        let blob = hex::decode(msg.blob.trim())?;
        if blob.len() < NONCE_OFFSET + NONCE_SIZE {
            return Err(MinerError::InputError(format!(
                "Job {} blob is {} bytes, need at least {}",
                msg.job_id,
                blob.len(),
                NONCE_OFFSET + NONCE_SIZE
            )));
        }

        let target = hex::decode(msg.target.trim())?;
        let difficulty = difficulty_from_target(&target)?;

        let seed_hash = hex::decode(msg.seed_hash.trim())?;
        if seed_hash.is_empty() {
            return Err(MinerError::InputError(format!(
                "Job {} has an empty seed hash",
                msg.job_id
            )));
        }

        Ok(Job {
            job_id: msg.job_id,
            blob,
            difficulty,
            seed_hash,
        })
    }
}

/// A nonce whose hash met the job difficulty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Job ID this share belongs to
    pub job_id: String,
    /// Nonce that produced the hash
    pub nonce: u32,
    /// Resulting hash
    pub hash: Hash,
    /// Difficulty the hash was checked against
    pub difficulty: u64,
}

#[derive(Serialize)]
struct ShareMessage<'a> {
    job_id: &'a str,
    nonce: String,
    result: String,
}

impl Share {
    /// Nonce as submitted to pools: the four blob bytes in hex
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce.to_le_bytes())
    }

    /// Hash in hex
    pub fn result_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Serializes the share as one JSON line (without the trailing newline)
    pub fn to_json_line(&self) -> Result<String, MinerError> {
        let msg = ShareMessage {
            job_id: &self.job_id,
            nonce: self.nonce_hex(),
            result: self.result_hex(),
        };
        Ok(serde_json::to_string(&msg)?)
    }
}
