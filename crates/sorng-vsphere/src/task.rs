//! Server-side `Task` objects and the poller that waits them out.

use crate::entity::Entity;
use crate::error::{SoapFault, VsphereError, VsphereResult};
use crate::types::{ManagedObjectReference, VimValue};

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Message used when a failed task carries no error detail.
pub const NO_ERROR_DETAIL: &str = "no error detail available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl FromStr for TaskState {
    type Err = VsphereError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(VsphereError::parse(format!("Unknown task state '{other}'"))),
        }
    }
}

/// Decoded `TaskInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub key: String,
    pub task: Option<ManagedObjectReference>,
    pub name: Option<String>,
    pub description_id: Option<String>,
    pub entity: Option<ManagedObjectReference>,
    pub entity_name: Option<String>,
    pub state: TaskState,
    pub cancelled: bool,
    pub progress: Option<i64>,
    pub result: Option<VimValue>,
    /// `LocalizedMethodFault`, set in the error state
    pub error: Option<VimValue>,
    pub queue_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
}

impl TaskInfo {
    pub fn from_value(value: &VimValue) -> VsphereResult<Self> {
        let state = value
            .field("state")
            .and_then(VimValue::as_str)
            .ok_or_else(|| VsphereError::parse("TaskInfo has no state"))?
            .parse::<TaskState>()?;
        let text = |name: &str| value.field(name).and_then(VimValue::as_str).map(str::to_string);
        let time = |name: &str| match value.field(name) {
            Some(VimValue::DateTime(dt)) => Some(*dt),
            _ => None,
        };
        let present = |name: &str| value.field(name).filter(|v| !v.is_null()).cloned();

        Ok(Self {
            key: text("key").unwrap_or_default(),
            task: value.field("task").and_then(VimValue::as_moref).cloned(),
            name: text("name"),
            description_id: text("descriptionId"),
            entity: value.field("entity").and_then(VimValue::as_moref).cloned(),
            entity_name: text("entityName"),
            state,
            cancelled: value.field("cancelled").and_then(VimValue::as_bool).unwrap_or(false),
            progress: value.field("progress").and_then(VimValue::as_i64),
            result: present("result"),
            error: present("error"),
            queue_time: time("queueTime"),
            start_time: time("startTime"),
            complete_time: time("completeTime"),
        })
    }

    /// The error's localized message, or [`NO_ERROR_DETAIL`].
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.field("localizedMessage"))
            .and_then(VimValue::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| NO_ERROR_DETAIL.to_string())
    }

    /// Type name of the underlying fault (e.g. `InvalidPowerState`).
    pub fn fault_type(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(|e| e.field("fault"))
            .and_then(VimValue::as_object)
            .and_then(|f| f.type_name.clone())
    }
}

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Give up with `Timeout` after this long; unset waits forever
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: None,
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A server-side task. Its only property of interest is `info`.
#[derive(Debug, Clone)]
pub struct Task {
    entity: Entity,
    poll: PollConfig,
}

impl Task {
    pub fn new(entity: Entity, poll: PollConfig) -> VsphereResult<Self> {
        if !entity.client().catalog().is_a(entity.type_name(), "Task") {
            return Err(VsphereError::invalid_argument(format!(
                "{} is not a Task",
                entity.moref()
            )));
        }
        Ok(Self { entity, poll })
    }

    pub fn moref(&self) -> &ManagedObjectReference {
        self.entity.moref()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Last fetched `info`, without contacting the server.
    pub fn cached_info(&self) -> Option<TaskInfo> {
        self.entity
            .cached("info")
            .filter(|v| !v.is_null())
            .and_then(|v| TaskInfo::from_value(v).ok())
    }

    /// Re-read `info` from the server.
    pub async fn refresh_info(&mut self) -> VsphereResult<TaskInfo> {
        self.entity.refresh(Some(&["info"][..])).await?;
        match self.entity.cached("info") {
            Some(v) if !v.is_null() => TaskInfo::from_value(v),
            _ => Err(VsphereError::parse(format!("{} returned no info", self.moref()))),
        }
    }

    /// Poll until the task reaches a terminal state.
    ///
    /// `info` is read once right away, then once per interval. `success`
    /// yields the final info; `error` fails with `RemoteOperationFailed`.
    pub async fn wait(&mut self, cancel: Option<&CancellationToken>) -> VsphereResult<TaskInfo> {
        let started = Instant::now();
        let label = self.moref().to_string();
        let mut info = self.poll_info(started, cancel, &label).await?;

        loop {
            match info.state {
                TaskState::Success => {
                    info!("{label} completed");
                    return Ok(info);
                }
                TaskState::Error => return Err(failure(&label, &info)),
                TaskState::Queued | TaskState::Running => {}
            }

            let mut nap = self.poll.interval;
            if let Some(limit) = self.poll.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(VsphereError::timeout(format!(
                        "{label} still {:?} after {:?}",
                        info.state, limit
                    )));
                }
                nap = nap.min(limit - elapsed);
            }
            debug!("{label} is {:?} ({}%), next poll in {nap:?}", info.state, info.progress.unwrap_or(0));

            with_cancel(cancel, &label, async {
                tokio::time::sleep(nap).await;
                Ok(())
            })
            .await?;
            info = self.poll_info(started, cancel, &label).await?;
        }
    }

    /// One `info` read, bounded by whatever is left of the timeout.
    async fn poll_info(
        &mut self,
        started: Instant,
        cancel: Option<&CancellationToken>,
        label: &str,
    ) -> VsphereResult<TaskInfo> {
        let Some(limit) = self.poll.timeout else {
            return with_cancel(cancel, label, self.refresh_info()).await;
        };
        let remaining = limit.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, with_cancel(cancel, label, self.refresh_info())).await {
            Ok(result) => result,
            Err(_) => Err(VsphereError::timeout(format!(
                "{label} did not report its state within {limit:?}"
            ))),
        }
    }

    /// [`Task::wait`], returning only the operation result.
    pub async fn wait_for_result(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> VsphereResult<Option<VimValue>> {
        Ok(self.wait(cancel).await?.result)
    }

    /// Ask the server to cancel the task.
    pub async fn cancel(&self) -> VsphereResult<()> {
        self.entity
            .client()
            .invoke("CancelTask", self.moref(), &[])
            .await
            .map(|_| ())
    }
}

fn failure(label: &str, info: &TaskInfo) -> VsphereError {
    let message = info.error_message();
    let err = VsphereError::task_failed(format!("{label} failed: {message}"));
    match info.fault_type() {
        Some(fault_type) => err.with_fault(SoapFault {
            code: "TaskError".into(),
            message,
            fault_type: Some(fault_type),
            ..SoapFault::default()
        }),
        None => err,
    }
}

async fn with_cancel<T, F>(cancel: Option<&CancellationToken>, label: &str, fut: F) -> VsphereResult<T>
where
    F: Future<Output = VsphereResult<T>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(VsphereError::cancelled(format!("Stopped waiting for {label}"))),
            result = fut => result,
        },
        None => fut.await,
    }
}
