//! Job status polling.
//!
//! [`PollMachine`] is the pure state machine: it consumes poll outcomes and
//! says whether to schedule another poll and when. [`JobWatch`] drives it on
//! a tokio task and hands back a [`PollHandle`] that owns the task.
//!
//! States: `Running -> Completed`, `Running -> Expired`, `Running -> Running`.
//! Terminal states are absorbing.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::client::PredictionBackend;
use crate::context::JobContext;
use crate::models::{JobState, PredictionJob};
use crate::status::PollOutcome;

/// What to do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Schedule(Duration),
    Stop,
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    job: PredictionJob,
    policy: BackoffPolicy,
    attempt: u32,
    polls: u32,
    last_error: Option<String>,
}

impl PollMachine {
    pub fn new(job_id: &str, policy: BackoffPolicy) -> Self {
        Self {
            job: PredictionJob::new(job_id),
            policy,
            attempt: 0,
            polls: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.job.state
    }

    pub fn job(&self) -> &PredictionJob {
        &self.job
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of outcomes applied so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Applies one poll outcome. Once terminal, every call is a no-op
    /// returning [`Step::Stop`].
    pub fn observe(&mut self, outcome: PollOutcome) -> Step {
        if self.job.state.is_terminal() {
            return Step::Stop;
        }
        self.polls += 1;

        match outcome {
            PollOutcome::Status(resp) => {
                let state = resp.state();
                self.last_error = None;
                if state == JobState::Expired {
                    let message = resp.message.unwrap_or_else(|| "Job expired".to_string());
                    self.set_expired(&message);
                    return Step::Stop;
                }
                self.job.message = resp.message;
                self.job.expires_at = resp.expires_at.as_deref().and_then(parse_timestamp);
                if state == JobState::Completed {
                    self.job.predictions = resp.predictions;
                    self.job.output_files = resp.output_files;
                }
                if state != self.job.state {
                    info!("Job {} is now {:?}", self.job.job_id, state);
                }
                self.job.state = state;
            }
            PollOutcome::NotFound(message) => {
                self.expire(&message);
            }
            PollOutcome::Transient(message) => {
                warn!("Failed to fetch status for job {}: {}", self.job.job_id, message);
                self.last_error = Some(message);
            }
        }

        if self.job.state.is_terminal() {
            return Step::Stop;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        debug!("Next poll for job {} in {:?}", self.job.job_id, delay);
        Step::Schedule(delay)
    }

    /// Forces `Expired` while still running. Ignored once terminal.
    pub fn expire(&mut self, message: &str) {
        if self.job.state.is_terminal() {
            return;
        }
        self.set_expired(message);
    }

    /// The archive of a finished job is gone: `Completed -> Expired`.
    /// Polling has already stopped, so no poll is ever scheduled again.
    pub fn results_gone(&mut self, message: &str) {
        if self.job.state == JobState::Expired {
            return;
        }
        self.set_expired(message);
    }

    fn set_expired(&mut self, message: &str) {
        info!("Job {} expired or not found: {}", self.job.job_id, message);
        self.job.state = JobState::Expired;
        self.job.message = Some(message.to_string());
        self.job.predictions.clear();
        self.job.output_files.clear();
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub job: PredictionJob,
    pub polls: u32,
    /// Latest transient failure; cleared by the next good response.
    pub last_error: Option<String>,
    /// Delay of the currently scheduled poll, if any.
    pub next_poll_in: Option<Duration>,
}

impl JobSnapshot {
    fn of(machine: &PollMachine, next_poll_in: Option<Duration>) -> Self {
        Self {
            state: machine.state(),
            job: machine.job().clone(),
            polls: machine.polls(),
            last_error: machine.last_error.clone(),
            next_poll_in,
        }
    }
}

struct Shared {
    machine: Mutex<PollMachine>,
    snapshot: watch::Sender<JobSnapshot>,
    cancel: watch::Sender<bool>,
    refresh: Notify,
}

impl Shared {
    fn new(machine: PollMachine) -> (Arc<Self>, watch::Receiver<JobSnapshot>) {
        let (snapshot, snapshot_rx) = watch::channel(JobSnapshot::of(&machine, None));
        let (cancel, _) = watch::channel(false);
        let shared = Arc::new(Self {
            machine: Mutex::new(machine),
            snapshot,
            cancel,
            refresh: Notify::new(),
        });
        (shared, snapshot_rx)
    }

    fn lock(&self) -> MutexGuard<'_, PollMachine> {
        // The machine holds no invariants a panicking holder could break halfway.
        self.machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Applies `outcome` unless the session was cancelled. The cancel flag
    /// is read under the machine lock, the same lock [`Shared::cancel`]
    /// takes, so a torn-down session is never updated.
    fn observe(&self, outcome: PollOutcome) -> Option<Step> {
        let mut machine = self.lock();
        if self.is_cancelled() {
            return None;
        }
        let step = machine.observe(outcome);
        let next = match step {
            Step::Schedule(d) => Some(d),
            Step::Stop => None,
        };
        self.snapshot.send_replace(JobSnapshot::of(&machine, next));
        Some(step)
    }

    fn cancel(&self) -> bool {
        let _machine = self.lock();
        !self.cancel.send_replace(true)
    }

    fn results_gone(&self, message: &str) {
        let mut machine = self.lock();
        machine.results_gone(message);
        self.snapshot.send_replace(JobSnapshot::of(&machine, None));
    }
}

/// Starts watch sessions.
pub struct JobWatch;

impl JobWatch {
    /// Spawns the poll loop for `context` and returns its owning handle.
    /// The first poll happens immediately. Must be called inside a tokio
    /// runtime.
    pub fn start<B>(context: JobContext, backend: Arc<B>, policy: BackoffPolicy) -> PollHandle<B>
    where
        B: PredictionBackend + ?Sized + 'static,
    {
        let (shared, snapshot_rx) = Shared::new(PollMachine::new(context.job_id(), policy));

        info!("Watching prediction job {}", context.job_id());
        let task = tokio::spawn(poll_loop(
            context.job_id().to_string(),
            Arc::clone(&shared),
            Arc::clone(&backend),
        ));

        PollHandle {
            context,
            backend,
            shared,
            snapshot_rx,
            task: Some(task),
        }
    }
}

async fn poll_loop<B>(job_id: String, shared: Arc<Shared>, backend: Arc<B>)
where
    B: PredictionBackend + ?Sized,
{
    let mut cancel_rx = shared.cancel.subscribe();
    loop {
        if shared.is_cancelled() || shared.lock().state().is_terminal() {
            break;
        }

        let result = backend.fetch_status(&job_id).await;

        // A fetch that outlived teardown must not touch the session.
        let delay = match shared.observe(PollOutcome::from_result(result)) {
            None => {
                debug!("Discarding status for job {} after cancellation", job_id);
                break;
            }
            Some(Step::Stop) => break,
            Some(Step::Schedule(delay)) => delay,
        };

        // The only pending timer for this job; dropped when pre-empted.
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.refresh.notified() => {
                debug!("Early poll requested for job {}", job_id);
            }
            _ = cancel_rx.changed() => break,
        }
    }
    debug!("Poll loop for job {} finished", job_id);
}

/// Owner of one watch session. Dropping it cancels polling.
pub struct PollHandle<B: PredictionBackend + ?Sized> {
    context: JobContext,
    backend: Arc<B>,
    shared: Arc<Shared>,
    snapshot_rx: watch::Receiver<JobSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl<B: PredictionBackend + ?Sized> PollHandle<B> {
    pub fn job_id(&self) -> &str {
        self.context.job_id()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn state(&self) -> JobState {
        self.snapshot_rx.borrow().state
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Polls now instead of waiting for the pending timer. Returns false,
    /// and does nothing, once the job is terminal or the session cancelled.
    pub fn poll_now(&self) -> bool {
        if self.shared.is_cancelled() || self.state().is_terminal() {
            return false;
        }
        self.shared.refresh.notify_one();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Stops polling. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.shared.cancel() {
            debug!("Cancelling watch for job {}", self.job_id());
        }
    }

    /// Resolves with the terminal snapshot, or `None` if the session is
    /// cancelled first.
    pub async fn wait_terminal(&self) -> Option<JobSnapshot> {
        let mut rx = self.snapshot_rx.clone();
        let mut cancel_rx = self.shared.cancel.subscribe();
        loop {
            {
                let snap = rx.borrow_and_update();
                if snap.state.is_terminal() {
                    return Some(snap.clone());
                }
            }
            if *cancel_rx.borrow_and_update() {
                return None;
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = cancel_rx.changed() => {}
            }
        }
    }

    /// Marks the job expired (404 on download) and stops the loop.
    pub(crate) fn mark_expired(&self, message: &str) {
        self.shared.results_gone(message);
        self.shared.refresh.notify_one();
    }

    /// Cancels and waits for the poll task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Poll task for job {} ended abnormally: {}", self.job_id(), e);
            }
        }
    }
}

impl<B: PredictionBackend + ?Sized> Drop for PollHandle<B> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::JobStatusResponse;

    fn status(s: &str) -> PollOutcome {
        PollOutcome::Status(JobStatusResponse { status: Some(s.to_string()), ..Default::default() })
    }

    #[test]
    fn test_running_polls_follow_backoff() {
        let policy = BackoffPolicy::default();
        let mut m = PollMachine::new("job", policy);
        for k in 0..12 {
            assert_eq!(m.observe(status("processing")), Step::Schedule(policy.delay(k)));
        }
        assert_eq!(m.state(), JobState::Running);
    }

    #[test]
    fn test_transient_errors_keep_the_schedule() {
        let policy = BackoffPolicy::default();
        let mut m = PollMachine::new("job", policy);
        assert_eq!(m.observe(status("processing")), Step::Schedule(Duration::from_millis(40_000)));
        assert_eq!(
            m.observe(PollOutcome::Transient("connection reset".into())),
            Step::Schedule(Duration::from_millis(60_000))
        );
        assert_eq!(m.last_error(), Some("connection reset"));
        assert_eq!(m.observe(status("processing")), Step::Schedule(Duration::from_millis(90_000)));
        assert_eq!(m.last_error(), None);
    }

    #[test]
    fn test_not_found_expires_at_any_stage() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        for _ in 0..7 {
            m.observe(status("processing"));
        }
        assert_eq!(m.observe(PollOutcome::NotFound("Job not found".into())), Step::Stop);
        assert_eq!(m.state(), JobState::Expired);
    }

    #[test]
    fn test_terminal_states_absorb_everything() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        let done = PollOutcome::Status(JobStatusResponse {
            status: Some("finished".into()),
            output_files: vec!["output/Prediction_Output.csv".into()],
            ..Default::default()
        });
        assert_eq!(m.observe(done), Step::Stop);
        assert_eq!(m.state(), JobState::Completed);
        let polls = m.polls();

        assert_eq!(m.observe(status("processing")), Step::Stop);
        assert_eq!(m.observe(PollOutcome::NotFound("gone".into())), Step::Stop);
        m.expire("gone");
        assert_eq!(m.state(), JobState::Completed);
        assert_eq!(m.polls(), polls);
        assert_eq!(m.job().output_files.len(), 1);
    }

    #[test]
    fn test_missing_results_expire_completed_job() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        m.observe(status("finished"));
        m.results_gone("Results not found or have expired");
        assert_eq!(m.state(), JobState::Expired);
        assert_eq!(m.observe(status("finished")), Step::Stop);
        assert_eq!(m.state(), JobState::Expired);
    }

    #[test]
    fn test_expired_status_clears_job_like_not_found() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        m.observe(PollOutcome::Transient("timeout".into()));
        let expired = PollOutcome::Status(JobStatusResponse {
            status: Some("expired".into()),
            output_files: vec!["output/Prediction_Output.csv".into()],
            predictions: vec![Default::default()],
            ..Default::default()
        });
        assert_eq!(m.observe(expired), Step::Stop);
        assert_eq!(m.state(), JobState::Expired);
        assert!(m.job().predictions.is_empty());
        assert!(m.job().output_files.is_empty());
        assert_eq!(m.job().message.as_deref(), Some("Job expired"));
        assert_eq!(m.observe(status("finished")), Step::Stop);
    }

    #[test]
    fn test_cancelled_session_ignores_late_outcome() {
        let (shared, rx) = Shared::new(PollMachine::new("job", BackoffPolicy::default()));
        assert!(shared.cancel());
        assert!(!shared.cancel());

        assert_eq!(shared.observe(status("finished")), None);
        assert_eq!(shared.lock().polls(), 0);
        assert_eq!(rx.borrow().state, JobState::Running);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_unknown_status_keeps_running() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        assert!(matches!(m.observe(status("queued_for_gpu")), Step::Schedule(_)));
        assert_eq!(m.state(), JobState::Running);
    }

    #[test]
    fn test_predictions_only_kept_when_completed() {
        let mut m = PollMachine::new("job", BackoffPolicy::default());
        let running = PollOutcome::Status(JobStatusResponse {
            status: Some("processing".into()),
            output_files: vec!["partial.log".into()],
            expires_at: Some("2026-10-26T00:00:00Z".into()),
            ..Default::default()
        });
        m.observe(running);
        assert!(m.job().output_files.is_empty());
        assert!(m.job().expires_at.is_some());
    }
}
