//! Poll scheduling against a scripted backend on tokio's paused clock.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use evolf_common::{EvolfError, Result};
use evolf_predict::{
    download_results, BackoffPolicy, DownloadRoute, JobContext, JobState, JobStatusResponse, JobSubmitter,
    JobWatch, PredictionBackend, PredictionRow, RequestBuilder, SubmitBody, SubmitResponse,
};

#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<Result<JobStatusResponse>>>,
    fetches: Mutex<Vec<Instant>>,
    fetch_delay: Duration,
    archive_missing: bool,
    submitted: Mutex<Vec<SubmitBody>>,
}

impl ScriptedBackend {
    fn with_script(script: Vec<Result<JobStatusResponse>>) -> Self {
        Self { script: Mutex::new(script.into()), ..Default::default() }
    }

    fn fetch_offsets(&self, start: Instant) -> Vec<u64> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start).as_millis() as u64)
            .collect()
    }

    fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl PredictionBackend for ScriptedBackend {
    async fn submit_pair(&self, body: &SubmitBody) -> Result<SubmitResponse> {
        self.submitted.lock().unwrap().push(body.clone());
        Ok(SubmitResponse {
            job_id: Some("abc-123".into()),
            message: Some("Job submitted to pipeline asynchronously.".into()),
        })
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<JobStatusResponse> {
        self.fetches.lock().unwrap().push(Instant::now());
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(processing()))
    }

    async fn download_archive(&self, job_id: &str, _route: DownloadRoute) -> Result<Vec<u8>> {
        if self.archive_missing {
            return Err(EvolfError::NotFound { message: "Output not found for job".into() });
        }
        Ok(format!("zip for {job_id}").into_bytes())
    }
}

fn processing() -> JobStatusResponse {
    JobStatusResponse {
        status: Some("processing".into()),
        message: Some("Job started but no output files yet".into()),
        ..Default::default()
    }
}

fn finished() -> JobStatusResponse {
    JobStatusResponse {
        job_id: Some("abc-123".into()),
        status: Some("finished".into()),
        output_files: vec!["output/Prediction_Output.csv".into()],
        predictions: vec![PredictionRow {
            id: "1".into(),
            smiles: "NCCc1c[nH]c2ccc(O)cc12".into(),
            predicted_label: "Agonist (1)".into(),
            p1: "0.8532".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

async fn wait_for_polls(handle_rx: &mut tokio::sync::watch::Receiver<evolf_predict::JobSnapshot>, n: u32) {
    while handle_rx.borrow_and_update().polls < n {
        handle_rx.changed().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_submit_poll_complete_download() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![Ok(processing()), Ok(finished())]));

    let mut builder = RequestBuilder::new();
    builder.set_receptor_text("MDVLSPGQGNNTTSPPAPFETGGNTTGISDVTVSYQVITSLLLGTLIFCAVLGNACVVAAIALERSLQNVANYLIGSLAVTDLMVSVLVLPMAALYQVLNKWTLGQVTCDLFIALDVLCCTSSILHLCAIALDRYWAITDPIDYVNKRTPRRAAALISLTWLIGFLISIPPMLGWRTPEDRSDPDACTISKDHGYTIYSTFGAFYIPLLLMLVLYGRIFRAARFRIRKTVKKVEKTGADTRHGASPAPQPKKSVNGESGSRNWRLGVESKAGGALCANGAVRQGDDGAALEVIEVHRVGNSKEHLPLPSEAGPTPCAPASFERKNERNAEAKRKMALARERKTVKTLGIIMGTFILCWLPFFIVALVLPFCESSCHMPTLLGAIINWLGYSNSLLNPVIYAYFNKDFQNAFKKIIKCKFCRQ");
    let first = builder.ligand_fields()[0].id;
    builder.set_ligand(first, "NCCc1c[nH]c2ccc(O)cc12", "serotonin").unwrap();
    let request = builder.build().unwrap();

    let receipts = JobSubmitter::new(Arc::clone(&backend)).submit(&request).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].job_id, "abc-123");
    assert_eq!(backend.submitted.lock().unwrap()[0].temp_ligand_id.as_deref(), Some("serotonin"));

    let start = Instant::now();
    let context = JobContext::new(&receipts[0].job_id).unwrap();
    let handle = JobWatch::start(context, Arc::clone(&backend), BackoffPolicy::default());
    assert_eq!(handle.state(), JobState::Running);

    let done = handle.wait_terminal().await.expect("job should finish");
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.job.predictions.len(), 1);
    assert_eq!(done.job.predictions[0].score_display(), "0.8532");
    assert_eq!(backend.fetch_offsets(start), vec![0, 40_000]);

    // Nothing more is ever scheduled, whatever the caller does.
    assert!(!handle.poll_now());
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(backend.fetch_count(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = download_results(&handle, dir.path(), DownloadRoute::JobQuery).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "prediction_abc-123.zip");
}

#[tokio::test(start_paused = true)]
async fn test_running_polls_back_off() {
    let backend = Arc::new(ScriptedBackend::default());
    let start = Instant::now();
    let handle = JobWatch::start(JobContext::new("slow").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    let mut rx = handle.subscribe();
    wait_for_polls(&mut rx, 10).await;
    handle.cancel();

    let offsets = backend.fetch_offsets(start);
    let expected: Vec<u64> = vec![0, 40_000, 100_000, 190_000, 325_000, 527_500, 831_250, 1_286_875, 1_970_312, 2_870_312];
    assert_eq!(offsets, expected);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_expires_without_waiting_out_backoff() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![
        Ok(processing()),
        Ok(processing()),
        Err(EvolfError::NotFound { message: "Job not found".into() }),
    ]));
    let start = Instant::now();
    let handle = JobWatch::start(JobContext::new("gone").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    let done = handle.wait_terminal().await.unwrap();
    assert_eq!(done.state, JobState::Expired);
    assert_eq!(backend.fetch_offsets(start), vec![0, 40_000, 100_000]);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(backend.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_do_not_reset_backoff() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![
        Ok(processing()),
        Err(EvolfError::Api { status: 502, message: "Bad gateway".into() }),
        Ok(processing()),
        Ok(finished()),
    ]));
    let start = Instant::now();
    let handle = JobWatch::start(JobContext::new("flaky").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    let done = handle.wait_terminal().await.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.last_error, None);
    assert_eq!(backend.fetch_offsets(start), vec![0, 40_000, 100_000, 190_000]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_now_preempts_pending_timer() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![Ok(processing()), Ok(finished())]));
    let start = Instant::now();
    let handle = JobWatch::start(JobContext::new("eager").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    let mut rx = handle.subscribe();
    wait_for_polls(&mut rx, 1).await;
    assert_eq!(rx.borrow().next_poll_in, Some(Duration::from_millis(40_000)));
    assert!(handle.poll_now());

    let done = handle.wait_terminal().await.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(backend.fetch_offsets(start), vec![0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_polling() {
    let backend = Arc::new(ScriptedBackend::default());
    let handle = JobWatch::start(JobContext::new("left").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    let mut rx = handle.subscribe();
    wait_for_polls(&mut rx, 1).await;
    drop(handle);

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_result_is_discarded_after_cancel() {
    let backend = Arc::new(ScriptedBackend {
        script: Mutex::new(vec![Ok(finished())].into()),
        fetch_delay: Duration::from_secs(5),
        ..Default::default()
    });
    let handle = JobWatch::start(JobContext::new("late").unwrap(), Arc::clone(&backend), BackoffPolicy::default());

    while backend.fetch_count() == 0 {
        tokio::task::yield_now().await;
    }
    handle.cancel();
    assert!(handle.wait_terminal().await.is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let snap = handle.snapshot();
    assert_eq!(snap.state, JobState::Running);
    assert_eq!(snap.polls, 0);
    assert!(!handle.poll_now());
}

#[tokio::test(start_paused = true)]
async fn test_download_not_found_expires_job() {
    let backend = Arc::new(ScriptedBackend {
        script: Mutex::new(vec![Ok(finished())].into()),
        archive_missing: true,
        ..Default::default()
    });
    let handle = JobWatch::start(JobContext::new("abc-123").unwrap(), Arc::clone(&backend), BackoffPolicy::default());
    handle.wait_terminal().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let err = download_results(&handle, dir.path(), DownloadRoute::DownloadEndpoint).await.unwrap_err();
    assert!(matches!(err, EvolfError::ResultsExpired));
    assert_eq!(handle.state(), JobState::Expired);
    assert!(!handle.poll_now());
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_download_refused_while_running() {
    let backend = Arc::new(ScriptedBackend::default());
    let handle = JobWatch::start(JobContext::new("busy").unwrap(), Arc::clone(&backend), BackoffPolicy::default());
    let mut rx = handle.subscribe();
    wait_for_polls(&mut rx, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let err = download_results(&handle, dir.path(), DownloadRoute::JobQuery).await.unwrap_err();
    assert!(matches!(err, EvolfError::ResultsNotReady));
}
