//! Operator failure alerts.
//!
//! Each classified failure is rendered through the notification template once
//! per operator address and handed to the task queue as a mail-delivery task.
//! Delivery itself happens out of band; a failure here never reaches the
//! client.

use std::sync::Arc;

use serde_json::json;

use crate::config::{AppConfig, NotificationConfig};
use crate::resilience::StructuredFailure;
use crate::tasks::{Task, TaskError, TaskQueue};
use crate::templates::{RenderError, Renderer};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("cannot prepare alert for {admin}: {source}")]
    Render {
        admin: String,
        #[source]
        source: RenderError,
    },

    #[error("cannot enqueue alert for {admin}: {source}")]
    Enqueue {
        admin: String,
        #[source]
        source: TaskError,
    },

    #[error("{failed} of {total} alerts were not enqueued")]
    Partial { failed: usize, total: usize },
}

/// Receives every classified failure outside notification delivery itself.
pub trait Notifier: Send + Sync {
    fn notify(&self, failure: &StructuredFailure) -> Result<(), NotifyError>;
}

/// Queues one alert mail per operator address.
pub struct MailAlertNotifier {
    renderer: Arc<dyn Renderer>,
    tasks: Arc<dyn TaskQueue>,
    admins: Vec<String>,
    app_id: String,
    sender: String,
    subject: String,
    task_path: String,
    queue: String,
    template: String,
}

impl MailAlertNotifier {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        tasks: Arc<dyn TaskQueue>,
        app_id: impl Into<String>,
        config: &NotificationConfig,
    ) -> Self {
        let app_id = app_id.into();
        let sender = config
            .sender
            .clone()
            .unwrap_or_else(|| format!("errors@{}", app_id));
        Self {
            renderer,
            tasks,
            admins: config.admin_emails.clone(),
            app_id,
            sender,
            subject: config.subject.clone(),
            task_path: config.task_path.clone(),
            queue: config.queue.clone(),
            template: config.template.clone(),
        }
    }

    /// A notifier when alerts are enabled and the app is not in development.
    pub fn from_config(
        renderer: Arc<dyn Renderer>,
        tasks: Arc<dyn TaskQueue>,
        config: &AppConfig,
    ) -> Option<Self> {
        if !config.notifications.enabled || config.app.development {
            return None;
        }
        Some(Self::new(renderer, tasks, config.app.app_id.as_str(), &config.notifications))
    }

    fn alert_one(&self, admin: &str, report: &str) -> Result<(), NotifyError> {
        let data = json!({
            "Error": report,
            "UserMail": admin,
            "AppId": self.app_id,
        });
        let html = self
            .renderer
            .render(&[self.template.as_str()], &data)
            .map_err(|source| NotifyError::Render {
                admin: admin.to_string(),
                source,
            })?;
        let html = String::from_utf8_lossy(&html);

        let task = Task::new(
            self.task_path.as_str(),
            [
                ("to", admin),
                ("toName", "Administrator"),
                ("from", self.sender.as_str()),
                ("fromName", "Error alerts"),
                ("subject", self.subject.as_str()),
                ("html", &*html),
            ],
        );
        self.tasks
            .enqueue(&self.queue, task)
            .map_err(|source| NotifyError::Enqueue {
                admin: admin.to_string(),
                source,
            })
    }
}

impl Notifier for MailAlertNotifier {
    fn notify(&self, failure: &StructuredFailure) -> Result<(), NotifyError> {
        let report = failure.render();
        let mut failed = 0;
        for admin in &self.admins {
            if let Err(err) = self.alert_one(admin, &report) {
                tracing::error!(error = %err, "Failed to queue failure alert");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifyError::Partial {
                failed,
                total: self.admins.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MailAlertNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAlertNotifier")
            .field("admins", &self.admins)
            .field("queue", &self.queue)
            .field("task_path", &self.task_path)
            .finish()
    }
}
