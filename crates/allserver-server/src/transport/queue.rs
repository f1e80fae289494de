//! Job queue worker transport.
//!
//! Starting the server spawns a worker that takes jobs off a [`JobQueue`]
//! and runs each one as a call: the job name is the procedure name
//! (`introspect` is the introspection call), the job data is the argument,
//! and the job is finished with the raw result envelope. Jobs run
//! concurrently, one task each.

use std::sync::Arc;

use allserver_common::transport::{JobQueue, INTROSPECT_JOB};
use allserver_common::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

/// The job a call was created from.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub queue: String,
    pub name: String,
}

/// The value a job is finished with.
#[derive(Debug, Clone)]
pub struct QueueReply(pub Value);

pub struct QueueTransport {
    queue: JobQueue,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueTransport {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            worker: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }
}

#[async_trait]
impl Transport for QueueTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        let queue = self.queue.clone();
        tracing::info!("Queue worker consuming '{}'", queue.name());

        let worker = tokio::spawn(async move {
            while let Some(mut job) = queue.next_job().await {
                let server = server.clone();
                let info = QueueJob {
                    queue: queue.name().to_string(),
                    name: job.name.clone(),
                };

                tokio::spawn(async move {
                    let data = std::mem::take(&mut job.data);
                    let mut ctx = CallContext::new(server.clone(), data).with_extension(info);
                    server.handle_call(&mut ctx).await;

                    let reply = ctx
                        .extensions
                        .remove::<QueueReply>()
                        .map_or(Value::Null, |reply| reply.0);
                    if !job.finish(reply) {
                        tracing::debug!("Job '{}' finished after its producer gave up", ctx.procedure_name);
                    }
                });
            }
        });

        if let Some(previous) = self.worker.lock().replace(worker) {
            previous.abort();
        }
        Ok(Started::Worker)
    }

    async fn stop_server(&self) -> Result<()> {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
            tracing::info!("Queue worker for '{}' stopped", self.queue.name());
        }
        Ok(())
    }

    fn procedure_name(&self, ctx: &CallContext) -> String {
        ctx.extensions
            .get::<QueueJob>()
            .map(|job| job.name.clone())
            .unwrap_or_default()
    }

    fn is_introspection(&self, ctx: &CallContext) -> bool {
        ctx.procedure_name == INTROSPECT_JOB
    }

    fn reply(&self, ctx: &mut CallContext) {
        let reply = ctx
            .result
            .as_ref()
            .map_or(Value::Null, |result| result.to_value());
        ctx.extensions.insert(QueueReply(reply));
    }
}
