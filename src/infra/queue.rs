use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;

/// Background work dispatched from request handlers. The payload travels as
/// tagged JSON so the worker can be deployed independently of the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum Job {
    SendWelcomeEmail { username: String, email: String },
    NotifyFollowers { post_title: String, author_id: Uuid },
}

/// Fire-and-forget job submission. Request correctness never depends on a
/// job reaching the queue: implementations log failures and return normally,
/// and the caller gets no completion signal.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, job: Job);
}

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

#[derive(Debug)]
pub struct ReceivedJob {
    pub job: Job,
    pub receipt_handle: String,
}

impl SqsQueue {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider =
            RegionProviderChain::first_try(Region::new(config.queue_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.queue_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            sqs_builder = sqs_builder.credentials_provider(provider);
        }
        let sqs_config = sqs_builder.build();

        let client = Client::from_conf(sqs_config);
        let queue_url = match client
            .get_queue_url()
            .queue_name(&config.queue_name)
            .send()
            .await
        {
            Ok(response) => response
                .queue_url()
                .ok_or_else(|| anyhow!("missing queue url"))?
                .to_string(),
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_queue_does_not_exist() =>
            {
                let created = client
                    .create_queue()
                    .queue_name(&config.queue_name)
                    .send()
                    .await?;
                created
                    .queue_url()
                    .ok_or_else(|| anyhow!("missing queue url"))?
                    .to_string()
            }
            Err(err) => return Err(anyhow!(err)),
        };

        Ok(Self { client, queue_url })
    }

    pub async fn receive(&self, wait_time_seconds: i32) -> Result<Option<ReceivedJob>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await?;

        let message = match response.messages().first() {
            Some(message) => message,
            None => return Ok(None),
        };

        let receipt_handle = match message.receipt_handle() {
            Some(handle) => handle.to_string(),
            None => {
                warn!("queue message missing receipt handle");
                return Ok(None);
            }
        };

        let body = match message.body() {
            Some(body) => body,
            None => {
                warn!("queue message missing body, deleting");
                let _ = self.delete_message(&receipt_handle).await;
                return Ok(None);
            }
        };

        let job: Job = match serde_json::from_str(body) {
            Ok(job) => job,
            Err(err) => {
                warn!(error = ?err, "failed to parse queue message body, deleting");
                let _ = self.delete_message(&receipt_handle).await;
                return Ok(None);
            }
        };

        debug!(?job, "received job");
        Ok(Some(ReceivedJob {
            job,
            receipt_handle,
        }))
    }

    pub async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqsQueue {
    async fn submit(&self, job: Job) {
        let body = match serde_json::to_string(&job) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = ?err, ?job, "failed to serialize job, dropping");
                return;
            }
        };
        if let Err(err) = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
        {
            warn!(error = ?err, ?job, "failed to enqueue job, dropping");
        }
    }
}

/// Queue that only records what was submitted, in order. Lets tests assert
/// the job contract without a broker and without executing anything.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<Job>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<Job> {
        self.jobs.lock().expect("queue mutex poisoned").clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn submit(&self, job: Job) {
        self.jobs.lock().expect("queue mutex poisoned").push(job);
    }
}
