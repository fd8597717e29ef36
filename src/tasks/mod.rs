//! Background task enqueueing.
//!
//! # Data Flow
//! ```text
//! Handler / notifier
//!     → Task::new(path, form values)
//!     → TaskQueue::enqueue(queue, task)
//!     → ChannelTaskQueue → unbounded channel → embedding application
//! ```
//!
//! # Design Decisions
//! - Enqueueing never blocks, so it is safe from the synchronous pipeline
//! - Delivery, retries and scheduling belong to the consumer

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::mpsc;

/// Asks the task runner not to retry a failed delivery.
pub const FAIL_FAST_HEADER: HeaderName = HeaderName::from_static("x-task-failfast");

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("queue name must not be empty")]
    EmptyQueue,

    #[error("task queue is closed")]
    Closed,
}

/// A unit of deferred work addressed to an application path.
#[derive(Debug, Clone)]
pub struct Task {
    pub path: String,
    pub headers: HeaderMap,
    pub payload: Vec<u8>,
}

impl Task {
    /// Form-encoded task with fail-fast delivery.
    pub fn new<I, K, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        headers.insert(FAIL_FAST_HEADER, HeaderValue::from_static("1"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));

        let payload = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(values)
            .finish()
            .into_bytes();

        Self {
            path: path.into(),
            headers,
            payload,
        }
    }

    /// Decoded form pairs of the payload.
    pub fn form_values(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.payload)
            .into_owned()
            .collect()
    }
}

/// A task together with the queue it was sent to.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub queue: String,
    pub task: Task,
}

pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, queue: &str, task: Task) -> Result<(), TaskError>;
}

/// Queue backed by a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
}

impl ChannelTaskQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, queue: &str, task: Task) -> Result<(), TaskError> {
        if queue.is_empty() {
            return Err(TaskError::EmptyQueue);
        }
        tracing::debug!(queue = %queue, path = %task.path, "Enqueued task");
        self.tx
            .send(QueuedTask {
                queue: queue.to_string(),
                task,
            })
            .map_err(|_| TaskError::Closed)
    }
}
