use crate::core::{Miner, MiningOutcome, Transaction};
use crate::error::{Result, SendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "pow-miner";

/// Cooperative cancellation flag shared between the caller and the miner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// A snapshot of the transaction to mine plus its cancellation token.
pub struct MiningJob {
    pub tx: Transaction,
    pub cancel: CancelToken,
}

/// Runs nonce searches on a dedicated thread, one job at a time.
pub struct MiningWorker {
    requests: Option<SyncSender<MiningJob>>,
    outcomes: Receiver<Result<MiningOutcome>>,
    in_flight: Option<CancelToken>,
    handle: Option<JoinHandle<()>>,
}

impl MiningWorker {
    pub fn spawn(miner: Miner) -> Result<MiningWorker> {
        let (request_tx, request_rx) = mpsc::sync_channel::<MiningJob>(1);
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                for job in request_rx {
                    let outcome = miner.mine(&job.tx, job.cancel.flag());
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!("Mining worker stopped");
            })?;

        info!("Started mining worker thread");
        Ok(MiningWorker {
            requests: Some(request_tx),
            outcomes: outcome_rx,
            in_flight: None,
            handle: Some(handle),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hand a transaction to the worker. Fails if a job is already running.
    pub fn submit(&mut self, tx: Transaction) -> Result<CancelToken> {
        if self.in_flight.is_some() {
            return Err(SendError::Mining(
                "A mining job is already in flight".to_string(),
            ));
        }
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| SendError::Mining("Mining worker is shut down".to_string()))?;

        let cancel = CancelToken::new();
        requests
            .send(MiningJob {
                tx,
                cancel: cancel.clone(),
            })
            .map_err(|_| SendError::Mining("Mining worker has stopped".to_string()))?;

        self.in_flight = Some(cancel.clone());
        Ok(cancel)
    }

    /// Block until the in-flight job reports its outcome.
    pub fn wait(&mut self) -> Result<MiningOutcome> {
        if self.in_flight.is_none() {
            return Err(SendError::Mining("No mining job in flight".to_string()));
        }
        let outcome = self
            .outcomes
            .recv()
            .map_err(|_| SendError::Mining("Mining worker has stopped".to_string()));
        self.in_flight = None;
        outcome?
    }

    /// Outcome of the in-flight job if it has finished.
    pub fn try_outcome(&mut self) -> Option<Result<MiningOutcome>> {
        self.in_flight.as_ref()?;
        let outcome = match self.outcomes.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(SendError::Mining("Mining worker has stopped".to_string()))
            }
        };
        self.in_flight = None;
        Some(outcome)
    }

    /// Convenience for submit followed by wait.
    pub fn mine(&mut self, tx: Transaction) -> Result<MiningOutcome> {
        self.submit(tx)?;
        self.wait()
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
        // closing the request channel ends the worker loop
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Mining worker thread panicked");
            }
        }
    }
}
