use crate::config::Config;
use crate::core::{
    calculate_tx_weight, sign_tx, Credentials, Miner, MiningOutcome, Transaction,
    TransactionAssembler, WeightConstants,
};
use crate::error::{Result, SendError};
use crate::network::{SubmissionGateway, SubmissionReceipt};
use crate::worker::MiningWorker;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Knobs of the send pipeline that are not part of the miner itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SendSettings {
    pub weight: WeightConstants,
    pub fixed_weight: Option<f64>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl SendSettings {
    pub fn from_config(config: &Config) -> SendSettings {
        SendSettings {
            weight: config.weight.clone(),
            fixed_weight: config.mining.fixed_weight,
            max_attempts: config.mining.max_attempts,
            retry_backoff: Duration::from_millis(config.mining.retry_backoff_ms),
        }
    }
}

/// A signed and mined transaction ready to be broadcast.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub attempt_id: Uuid,
    pub tx: Transaction,
    pub tx_hex: String,
    pub hash: [u8; 32],
}

impl PreparedTransaction {
    pub fn hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub prepared: PreparedTransaction,
    pub receipt: SubmissionReceipt,
}

/// Drives a send from user forms to the node:
/// assemble, sighash, sign, weigh, mine, serialize, submit.
///
/// Each step only runs once the previous one succeeded, so nothing is
/// signed for an invalid form and nothing is submitted unless mined.
pub struct SendTokens {
    settings: SendSettings,
    max_nonce: u32,
    worker: MiningWorker,
    credentials: Box<dyn Credentials>,
    gateway: Box<dyn SubmissionGateway>,
}

impl SendTokens {
    pub fn new(
        settings: SendSettings,
        miner: Miner,
        credentials: Box<dyn Credentials>,
        gateway: Box<dyn SubmissionGateway>,
    ) -> Result<SendTokens> {
        if settings.max_attempts == 0 {
            return Err(SendError::Config(
                "At least one mining attempt is required".to_string(),
            ));
        }
        let max_nonce = miner.get_max_nonce();
        let worker = MiningWorker::spawn(miner)?;
        Ok(SendTokens {
            settings,
            max_nonce,
            worker,
            credentials,
            gateway,
        })
    }

    pub fn from_config(
        config: &Config,
        credentials: Box<dyn Credentials>,
        gateway: Box<dyn SubmissionGateway>,
    ) -> Result<SendTokens> {
        let miner = Miner::new()
            .with_max_nonce(config.mining.max_nonce)
            .with_refresh_secs(config.mining.refresh_secs);
        SendTokens::new(SendSettings::from_config(config), miner, credentials, gateway)
    }

    /// Build, sign and mine the transaction described by `assembler`
    /// without submitting it.
    pub fn prepare(
        &mut self,
        assembler: &TransactionAssembler,
        pin: &str,
    ) -> Result<PreparedTransaction> {
        let attempt_id = Uuid::new_v4();
        info!("[{attempt_id}] Preparing transaction");

        let mut tx = assembler.assemble()?;
        let digest = tx.sighash()?;
        debug!("[{attempt_id}] Sighash {}", HEXLOWER.encode(&digest));

        sign_tx(&mut tx, &digest, self.credentials.as_ref(), pin)?;
        info!("[{attempt_id}] Signed {} inputs", tx.get_inputs().len());

        let weight = match self.settings.fixed_weight {
            Some(weight) => weight,
            None => calculate_tx_weight(&tx, &self.settings.weight)?,
        };
        tx.set_weight(weight);

        self.mine(attempt_id, &mut tx)?;

        let tx_hex = tx.to_hex()?;
        let hash = tx.hash()?;
        info!(
            "[{attempt_id}] Transaction {} ready, {} bytes",
            HEXLOWER.encode(&hash),
            tx_hex.len() / 2
        );
        Ok(PreparedTransaction {
            attempt_id,
            tx,
            tx_hex,
            hash,
        })
    }

    /// Hand a prepared transaction to the gateway.
    pub fn submit(&self, prepared: &PreparedTransaction) -> Result<SubmissionReceipt> {
        info!("[{}] Submitting transaction", prepared.attempt_id);
        self.gateway.submit(&prepared.tx_hex).map_err(|e| {
            warn!("[{}] Submission failed: {e}", prepared.attempt_id);
            e
        })
    }

    pub fn send(&mut self, assembler: &TransactionAssembler, pin: &str) -> Result<SendOutcome> {
        let prepared = self.prepare(assembler, pin)?;
        let receipt = self.submit(&prepared)?;
        Ok(SendOutcome { prepared, receipt })
    }

    // Each attempt reads a fresh timestamp, so a retry searches a new space.
    fn mine(&mut self, attempt_id: Uuid, tx: &mut Transaction) -> Result<()> {
        for attempt in 1..=self.settings.max_attempts {
            debug!(
                "[{attempt_id}] Mining attempt {attempt}/{} at weight {:.4}",
                self.settings.max_attempts,
                tx.get_weight()
            );
            match self.worker.mine(tx.clone())? {
                MiningOutcome::Found(result) => {
                    tx.apply_mining_result(&result);
                    return Ok(());
                }
                MiningOutcome::Exhausted if attempt < self.settings.max_attempts => {
                    let delay = retry_delay(self.settings.retry_backoff, attempt);
                    warn!(
                        "[{attempt_id}] Nonce space exhausted on attempt {attempt}, \
                         retrying in {delay:?}"
                    );
                    thread::sleep(delay);
                }
                MiningOutcome::Exhausted => break,
                MiningOutcome::Cancelled => {
                    return Err(SendError::Mining("Mining was cancelled".to_string()))
                }
            }
        }
        Err(SendError::ProofOfWorkExhausted {
            max_nonce: self.max_nonce,
        })
    }
}

fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << (attempt - 1).min(16))
}
