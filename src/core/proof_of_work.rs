use crate::core::difficulty::target_from_weight;
use crate::core::{MiningResult, Transaction};
use crate::error::{Result, SendError};
use crate::utils::{current_timestamp, finish_sha256d};
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::BigUint;
use ring::digest::{Context, SHA256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const MAX_NONCE: u32 = u32::MAX;

/// Seconds a timestamp may age before the search restarts with a new one.
pub const DEFAULT_REFRESH_SECS: u32 = 2;

/// Clock used by the miner, swappable so timestamp refresh can be tested.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Result<u32>;
}

pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Result<u32> {
        current_timestamp()
    }
}

/// Terminal state of one nonce search.
#[derive(Debug, Clone, PartialEq)]
pub enum MiningOutcome {
    Found(MiningResult),
    Exhausted,
    Cancelled,
}

#[derive(Clone)]
pub struct Miner {
    max_nonce: u32,
    refresh_secs: u32,
    clock: Arc<dyn TimeSource>,
}

impl Default for Miner {
    fn default() -> Self {
        Miner::new()
    }
}

impl Miner {
    pub fn new() -> Miner {
        Miner {
            max_nonce: MAX_NONCE,
            refresh_secs: DEFAULT_REFRESH_SECS,
            clock: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_max_nonce(mut self, max_nonce: u32) -> Miner {
        self.max_nonce = max_nonce;
        self
    }

    pub fn with_refresh_secs(mut self, refresh_secs: u32) -> Miner {
        self.refresh_secs = refresh_secs;
        self
    }

    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Miner {
        self.clock = clock;
        self
    }

    pub fn get_max_nonce(&self) -> u32 {
        self.max_nonce
    }

    /// Search for a nonce whose hash falls below the target for the
    /// transaction's weight. The transaction itself is not modified; the
    /// winning nonce and timestamp come back in the outcome.
    ///
    /// `cancel` is polled on every nonce.
    pub fn mine(&self, tx: &Transaction, cancel: &AtomicBool) -> Result<MiningOutcome> {
        let target = target_bytes(&target_from_weight(tx.get_weight())?)?;
        info!(
            "Mining at weight {:.4}, target {}",
            tx.get_weight(),
            HEXLOWER.encode(&target)
        );

        let started = Instant::now();
        let mut candidate = tx.clone();
        let mut last_refresh = self.clock.now()?;
        candidate.set_timestamp(last_refresh);
        let mut midstate = prefix_midstate(&candidate)?;

        let mut nonce: u32 = 0;
        while nonce < self.max_nonce {
            if cancel.load(Ordering::Relaxed) {
                info!("Mining cancelled at nonce {nonce}");
                return Ok(MiningOutcome::Cancelled);
            }

            let now = self.clock.now()?;
            if now.saturating_sub(last_refresh) > self.refresh_secs {
                debug!("Refreshing timestamp {last_refresh} -> {now}, restarting nonce search");
                last_refresh = now;
                candidate.set_timestamp(now);
                midstate = prefix_midstate(&candidate)?;
                nonce = 0;
            }

            let hash = hash_from_midstate(&midstate, nonce);
            if hash < target {
                info!(
                    "Found nonce {nonce} after {:.2?}: {}",
                    started.elapsed(),
                    HEXLOWER.encode(&hash)
                );
                return Ok(MiningOutcome::Found(MiningResult {
                    hash,
                    nonce,
                    timestamp: last_refresh,
                }));
            }
            nonce += 1;
        }

        info!(
            "Nonce space of {} exhausted after {:.2?}",
            self.max_nonce,
            started.elapsed()
        );
        Ok(MiningOutcome::Exhausted)
    }

    /// Run a search to completion on the calling thread.
    pub fn run(&self, tx: &Transaction) -> Result<MiningResult> {
        match self.mine(tx, &AtomicBool::new(false))? {
            MiningOutcome::Found(result) => Ok(result),
            MiningOutcome::Exhausted => Err(SendError::ProofOfWorkExhausted {
                max_nonce: self.max_nonce,
            }),
            MiningOutcome::Cancelled => Err(SendError::Mining("Mining cancelled".to_string())),
        }
    }
}

/// Check a mined transaction's nonce against the target for its weight.
pub fn validate(tx: &Transaction) -> Result<bool> {
    let target = target_from_weight(tx.get_weight())?;
    let hash = crate::core::pow_hash(&tx.pow_prefix()?, tx.get_nonce());
    Ok(crate::core::difficulty::hash_meets_target(&hash, &target))
}

// Hashing state after absorbing the prefix, cloned for every nonce.
fn prefix_midstate(tx: &Transaction) -> Result<Context> {
    let mut context = Context::new(&SHA256);
    context.update(&tx.pow_prefix()?);
    Ok(context)
}

fn hash_from_midstate(midstate: &Context, nonce: u32) -> [u8; 32] {
    let mut context = midstate.clone();
    context.update(&nonce.to_be_bytes());
    finish_sha256d(context.finish().as_ref())
}

// Fixed-width big-endian form of the target, so a byte-wise comparison of
// two 32-byte arrays is the integer comparison.
fn target_bytes(target: &BigUint) -> Result<[u8; 32]> {
    let raw = target.to_bytes_be();
    if raw.len() > 32 {
        return Err(SendError::Mining(format!(
            "Target does not fit in 256 bits: {} bytes",
            raw.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    Ok(out)
}
