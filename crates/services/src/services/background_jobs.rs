//! In-memory job map. Jobs start running as soon as they are submitted.

use std::{any::Any, collections::HashMap, fmt::Display, future::Future, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::{error, info};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    SourceEmbedding,
    CaseGeneration,
    Grading,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    /// Row the job works on: a source, assessment or attempt id
    pub subject_id: Uuid,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job and spawn `work` immediately. Returns the record as submitted.
    pub async fn submit<F, E>(&self, kind: JobKind, subject_id: Uuid, work: F) -> JobRecord
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let record = JobRecord {
            id: Uuid::new_v4(),
            kind,
            subject_id,
            status: JobStatus::Pending,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        self.jobs.write().await.insert(record.id, record.clone());

        let jobs = self.jobs.clone();
        let job_id = record.id;
        tokio::spawn(async move {
            if let Some(job) = jobs.write().await.get_mut(&job_id) {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
            }

            // Panics in `work` arrive as a JoinError
            let outcome = match tokio::spawn(work).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) if e.is_panic() => Err(format!("job panicked: {}", panic_message(e.into_panic()))),
                Err(e) => Err(format!("job aborted: {e}")),
            };

            let mut jobs = jobs.write().await;
            let Some(job) = jobs.get_mut(&job_id) else {
                return;
            };
            job.finished_at = Some(Utc::now());
            match outcome {
                Ok(()) => {
                    job.status = JobStatus::Completed;
                    info!(job_id = %job_id, kind = %kind, subject_id = %subject_id, "Job completed");
                }
                Err(e) => {
                    error!(job_id = %job_id, kind = %kind, subject_id = %subject_id, error = %e, "Job failed");
                    job.status = JobStatus::Failed;
                    job.error = Some(e);
                }
            }
        });

        record
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, newest first, optionally restricted to one subject
    pub async fn list(&self, subject_id: Option<Uuid>) -> Vec<JobRecord> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| subject_id.is_none_or(|s| j.subject_id == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Drop finished jobs older than `older_than`. Returns how many were removed.
    pub async fn prune(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_finished() && job.finished_at.is_some_and(|f| f < cutoff)));
        before - jobs.len()
    }

    /// Poll until the job finishes or `timeout` passes
    pub async fn wait(&self, id: Uuid, timeout: std::time::Duration) -> Option<JobRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.get(id).await?;
            if job.status.is_finished() || tokio::time::Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let queue = JobQueue::new();
        let (tx, rx) = oneshot::channel::<()>();
        let subject = Uuid::new_v4();

        let job = queue
            .submit(JobKind::Grading, subject, async move {
                rx.await.map_err(|e| e.to_string())
            })
            .await;
        assert_eq!(job.status, JobStatus::Pending);

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Running);

        tx.send(()).unwrap();
        let done = queue.wait(job.id, StdDuration::from_secs(1)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.started_at.is_some() && done.finished_at.is_some());
        assert_eq!(queue.list(Some(subject)).await.len(), 1);
        assert!(queue.list(Some(Uuid::new_v4())).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error_and_prunes() {
        let queue = JobQueue::new();
        let job = queue
            .submit(JobKind::SourceEmbedding, Uuid::new_v4(), async { Err::<(), _>("boom") })
            .await;

        let done = queue.wait(job.id, StdDuration::from_secs(1)).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("boom"));

        assert_eq!(queue.prune(Duration::hours(1)).await, 0);
        assert_eq!(queue.prune(Duration::zero() - Duration::seconds(1)).await, 1);
        assert!(queue.get(job.id).await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_job_is_marked_failed() {
        let queue = JobQueue::new();
        let job = queue
            .submit(JobKind::Grading, Uuid::new_v4(), async {
                if true {
                    panic!("grader crashed");
                }
                Ok::<(), String>(())
            })
            .await;

        let finished = queue.wait(job.id, StdDuration::from_secs(5)).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("job panicked: grader crashed"));
        assert!(finished.finished_at.is_some());
    }
}
