//! Job queue client transport.
//!
//! Each call becomes a job named after the procedure, with the argument as its
//! data; the call completes when a worker finishes the job. Introspection uses
//! the reserved `introspect` job name.

use allserver_common::transport::{JobQueue, INTROSPECT_JOB};
use allserver_common::{codes, CallError, Envelope};
use async_trait::async_trait;
use serde_json::Value;

use super::ClientTransport;
use crate::context::ClientCallContext;

pub struct QueueClientTransport {
    uri: String,
    queue: JobQueue,
}

impl QueueClientTransport {
    /// Creates a transport submitting jobs to `queue`. Its URI is `queue://<name>`.
    pub fn new(queue: JobQueue) -> Self {
        Self {
            uri: format!("queue://{}", queue.name()),
            queue,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    async fn submit(&self, name: &str, data: Value) -> Result<Value, CallError> {
        let handle = self.queue.add(name, data)?;
        handle.wait_until_finished().await
    }
}

#[async_trait]
impl ClientTransport for QueueClientTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn call(&self, ctx: &mut ClientCallContext) -> Result<Envelope, CallError> {
        let value = self.submit(&ctx.procedure_name, ctx.arg.clone()).await?;
        if value.is_null() {
            return Err(CallError::coded(
                codes::ALLSERVER_RPC_RESPONSE_IS_EMPTY_OBJECT,
                format!("Job '{}' returned nothing", ctx.procedure_name),
            ));
        }
        Envelope::from_value(value).map_err(|_| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT, "Bad response payload")
        })
    }

    async fn introspect(&self, ctx: &mut ClientCallContext) -> Result<Envelope, CallError> {
        let value = self.submit(INTROSPECT_JOB, ctx.arg.clone()).await?;
        // Workers with introspection disabled finish the job without a value
        if value.is_null() {
            return Err(CallError::new("The queue introspection job returned nothing"));
        }
        Envelope::from_value(value).map_err(|_| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT, "Bad response payload")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn spawn_worker(queue: JobQueue, reply: Value) -> tokio::task::JoinHandle<Option<(String, Value)>> {
        tokio::spawn(async move {
            let job = queue.next_job().await?;
            let seen = (job.name.clone(), job.data.clone());
            job.finish(reply);
            Some(seen)
        })
    }

    #[tokio::test]
    async fn test_call_submits_named_job() {
        let queue = JobQueue::new("orders");
        let transport = QueueClientTransport::new(queue.clone());
        assert_eq!(transport.uri(), "queue://orders");

        let client = crate::ClientFactory::default()
            .auto_introspect(false)
            .with_transport(Arc::new(transport));
        let worker = spawn_worker(queue, json!({"success": true, "code": "OK", "message": "done"}));

        let result = client.call("placeOrder", json!({"id": 7})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "done");

        let (name, data) = worker.await.unwrap().unwrap();
        assert_eq!(name, "placeOrder");
        assert_eq!(data["id"], 7);
    }

    #[tokio::test]
    async fn test_introspection_without_value_fails() {
        let queue = JobQueue::new("orders");
        let client = crate::ClientFactory::default()
            .with_transport(Arc::new(QueueClientTransport::new(queue.clone())));
        let worker = spawn_worker(queue, Value::Null);

        let result = client.introspect().await.unwrap();
        assert_eq!(result.code, codes::ALLSERVER_CLIENT_INTROSPECTION_FAILED);

        let (name, _) = worker.await.unwrap().unwrap();
        assert_eq!(name, INTROSPECT_JOB);
    }

    #[tokio::test]
    async fn test_oversized_job_is_rejected() {
        let queue = JobQueue::new("orders").with_size_limit(16);
        let client = crate::ClientFactory::default()
            .auto_introspect(false)
            .with_transport(Arc::new(QueueClientTransport::new(queue)));

        let result = client
            .call("placeOrder", json!({"note": "far more than sixteen bytes"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.code, codes::ALLSERVER_QUEUE_JOB_TOO_LARGE);
    }
}
