//! In-process job queue.
//!
//! Each job is named after the procedure to run (`introspect` is reserved for
//! introspection), carries the call argument as its data, and is finished with
//! the raw result envelope. Producers await a [`JobHandle`]; workers pull jobs
//! with [`JobQueue::next_job`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::protocol::{codes, CallError};

/// Queue name used when none is configured.
pub const DEFAULT_QUEUE_NAME: &str = "Allserver";

/// Job name reserved for introspection.
pub const INTROSPECT_JOB: &str = "introspect";

/// Maximum serialized size of a job's data (512 KiB).
pub const DEFAULT_SIZE_LIMIT: usize = 524_288;

/// A unit of work waiting for a worker.
#[derive(Debug)]
pub struct Job {
    pub name: String,
    pub data: Value,
    responder: oneshot::Sender<Value>,
}

impl Job {
    /// Completes the job with its return value.
    ///
    /// Returns `false` when the producer stopped waiting.
    pub fn finish(self, value: Value) -> bool {
        self.responder.send(value).is_ok()
    }
}

/// Awaitable completion of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    receiver: oneshot::Receiver<Value>,
}

impl JobHandle {
    /// Waits for a worker to finish the job.
    pub async fn wait_until_finished(self) -> Result<Value, CallError> {
        self.receiver
            .await
            .map_err(|_| CallError::new("Job was dropped before it finished").no_net_to_server())
    }
}

/// A named multi-producer, multi-consumer job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    name: String,
    size_limit: usize,
    sender: mpsc::UnboundedSender<Job>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
}

impl JobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            size_limit: DEFAULT_SIZE_LIMIT,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Submits a job.
    ///
    /// Data whose JSON encoding exceeds the size limit is rejected with
    /// `ALLSERVER_QUEUE_JOB_TOO_LARGE`.
    pub fn add(&self, name: impl Into<String>, data: Value) -> Result<JobHandle, CallError> {
        let name = name.into();
        let size = serde_json::to_vec(&data)?.len();
        if size > self.size_limit {
            return Err(CallError::coded(
                codes::ALLSERVER_QUEUE_JOB_TOO_LARGE,
                format!(
                    "Job '{}' data is {} bytes, over the {} bytes limit of queue '{}'",
                    name, size, self.size_limit, self.name
                ),
            ));
        }

        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Job {
                name,
                data,
                responder,
            })
            .map_err(|_| CallError::new(format!("Queue '{}' is closed", self.name)).no_net_to_server())?;

        Ok(JobHandle { receiver })
    }

    /// Takes the next job, waiting until one is available.
    pub async fn next_job(&self) -> Option<Job> {
        self.receiver.lock().await.recv().await
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_NAME)
    }
}
