use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{run_job, Job, JobContext, JobResult};
use crate::error::{PushError, PushResult};

/// Queued job capacity before `submit` waits.
const JOB_QUEUE_CAPACITY: usize = 100;

struct QueuedJob {
    job: Job,
    reply: Option<oneshot::Sender<JobResult>>,
}

/// Receiving half of the job queue, consumed by [`JobRunner::new`].
pub struct JobQueue {
    job_rx: mpsc::Receiver<QueuedJob>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for submitting jobs to a [`JobRunner`].
#[derive(Clone)]
pub struct JobHandle {
    job_tx: mpsc::Sender<QueuedJob>,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobHandle {
    /// Creates a job queue. The handle can be cloned into anything that
    /// schedules work before the runner exists.
    pub fn channel() -> (JobHandle, JobQueue) {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            JobHandle {
                job_tx,
                shutdown_tx,
            },
            JobQueue {
                job_rx,
                shutdown_rx,
            },
        )
    }

    /// Queues a job without waiting for it to run.
    pub async fn submit(&self, job: Job) -> PushResult<()> {
        self.job_tx
            .send(QueuedJob { job, reply: None })
            .await
            .map_err(|_| PushError::ShuttingDown)
    }

    /// Queues a job and waits for its result.
    pub async fn run(&self, job: Job) -> PushResult<JobResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.job_tx
            .send(QueuedJob {
                job,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| PushError::ShuttingDown)?;

        reply_rx
            .await
            .map_err(|_| PushError::ChannelError("Job runner dropped the result".into()))
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> PushResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| PushError::ChannelError("Shutdown channel closed".into()))
    }
}

/// Runs queued jobs one at a time.
///
/// ## Usage
/// ```rust,ignore
/// let (handle, queue) = JobHandle::channel();
/// tokio::spawn(JobRunner::new(ctx, queue).run());
///
/// handle.submit(Job::PrepareDatabase).await?;
/// let result = handle.run(Job::SendEvents).await?;
/// ```
pub struct JobRunner {
    ctx: JobContext,
    queue: JobQueue,
}

impl JobRunner {
    pub fn new(ctx: JobContext, queue: JobQueue) -> Self {
        JobRunner { ctx, queue }
    }

    /// Runs the job loop until shutdown or until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Job runner starting");

        loop {
            tokio::select! {
                queued = self.queue.job_rx.recv() => {
                    let Some(QueuedJob { job, reply }) = queued else {
                        debug!("All job handles dropped");
                        break;
                    };

                    let result = run_job(&job, &self.ctx).await;
                    if let Some(reply) = reply {
                        if reply.send(result).is_err() {
                            warn!(job = job.name(), "Job result receiver dropped");
                        }
                    }
                }

                _ = self.queue.shutdown_rx.recv() => {
                    info!("Job runner shutting down");
                    break;
                }
            }
        }

        info!("Job runner stopped");
    }
}
