//! A fixed set of minion workers draining one shared request queue.
//!
//! Every worker task owns exactly one minion, so runs on a minion are
//! sequential while different minions proceed in parallel. Results travel
//! back on a per-request oneshot channel.

use crate::error::{FriendbotError, Result};
use crate::minion::{Minion, SubmitResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One funding request waiting for a free minion.
#[derive(Debug)]
pub struct FundRequest {
    pub destination: String,
    pub reply: oneshot::Sender<SubmitResult>,
}

type RequestQueue = Arc<Mutex<mpsc::Receiver<FundRequest>>>;

pub struct MinionPool {
    sender: Option<mpsc::Sender<FundRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl MinionPool {
    /// Spawns one worker per minion. Must be called inside a tokio runtime.
    pub fn start(minions: Vec<Minion>, queue_capacity: usize) -> Result<Self> {
        if minions.is_empty() {
            return Err(FriendbotError::ConfigError(
                "minion pool needs at least one minion".to_string(),
            ));
        }
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let queue: RequestQueue = Arc::new(Mutex::new(receiver));

        let workers = minions
            .into_iter()
            .enumerate()
            .map(|(index, minion)| tokio::spawn(worker(index, minion, Arc::clone(&queue))))
            .collect::<Vec<_>>();

        info!(workers = workers.len(), "minion pool started");
        Ok(MinionPool {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a request and returns the channel its result will arrive on.
    pub async fn submit(&self, destination: &str) -> Result<oneshot::Receiver<SubmitResult>> {
        let sender = self.sender.as_ref().ok_or(FriendbotError::PoolClosed)?;
        let (reply, receiver) = oneshot::channel();
        sender
            .send(FundRequest {
                destination: destination.to_string(),
                reply,
            })
            .await
            .map_err(|_| FriendbotError::PoolClosed)?;
        Ok(receiver)
    }

    /// Funds `destination` and waits for the outcome. Never retries; the
    /// caller decides whether a failure is worth another request.
    pub async fn pay(&self, destination: &str) -> Result<SubmitResult> {
        let receiver = self.submit(destination).await?;
        receiver.await.map_err(|_| FriendbotError::PoolClosed)
    }

    /// Stops accepting requests, lets queued ones finish and joins workers.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!("minion worker failed: {}", e);
            }
        }
        info!("minion pool stopped");
    }
}

async fn worker(index: usize, mut minion: Minion, queue: RequestQueue) {
    debug!(worker = index, minion = %minion.account_id(), "worker started");
    loop {
        let request = { queue.lock().await.recv().await };
        match request {
            Some(request) => minion.run(&request.destination, request.reply).await,
            None => break,
        }
    }
    debug!(worker = index, "worker stopped");
}
