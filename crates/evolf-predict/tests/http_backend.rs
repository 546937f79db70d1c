//! `PredictionClient` against an in-process mock of the EvOlf backend.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use evolf_common::{ApiConfig, EvolfError};
use evolf_predict::{
    BackoffPolicy, DownloadRoute, JobContext, JobState, JobSubmitter, JobWatch, PredictionBackend,
    PredictionClient, RequestBuilder, ResultRetriever, SubmitBody,
};

const ZIP_BYTES: &[u8] = b"PK\x03\x04mock-archive";

#[derive(Clone, Default)]
struct MockState {
    submissions: Arc<Mutex<Vec<Value>>>,
}

async fn submit(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.submissions.lock().unwrap().push(body.clone());
    if body["smiles"] == "not-a-smiles" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid SMILES string"}))).into_response();
    }
    let n = state.submissions.lock().unwrap().len();
    Json(json!({
        "job_id": format!("job-{n}"),
        "message": "Job submitted to pipeline asynchronously.",
    }))
    .into_response()
}

async fn job(Path(job_id): Path<String>, Query(query): Query<HashMap<String, String>>) -> Response {
    if job_id == "gone" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Job not found"}))).into_response();
    }
    if query.get("download").map(String::as_str) == Some("output") {
        return archive(&job_id);
    }
    match job_id.as_str() {
        "slow" => Json(json!({
            "status": "processing",
            "message": "Job started but no output files yet",
        }))
        .into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        _ => Json(json!({
            "job_id": job_id,
            "status": "finished",
            "output_files": ["output/Prediction_Output.csv"],
            "predictions": [{
                "id": 1,
                "temp_ligand_id": "serotonin",
                "smiles": "NCCc1c[nH]c2ccc(O)cc12",
                "mutated_sequence": "MDVLS",
                "temp_rec_id": "l249a",
                "predicted_label": "Agonist (1)",
                "p1": 0.853217,
            }],
        }))
        .into_response(),
    }
}

async fn download(Path(job_id): Path<String>) -> Response {
    if job_id == "no-output" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Output not found for job"}))).into_response();
    }
    archive(&job_id)
}

fn archive(job_id: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={job_id}_output.zip")),
        ],
        ZIP_BYTES,
    )
        .into_response()
}

async fn spawn_backend() -> (PredictionClient, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/api/predict/smiles/", post(submit))
        .route("/api/predict/job/{job_id}/", get(job))
        .route("/api/predict/download/{job_id}/", get(download))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = PredictionClient::new(&ApiConfig {
        base_url: format!("http://{addr}/api"),
        timeout_secs: 5,
    })
    .unwrap();
    (client, state)
}

fn body(smiles: &str) -> SubmitBody {
    SubmitBody {
        smiles: smiles.into(),
        sequence: "MDVLSPGQGNNTTSPPAPFETGGNTTGISDVTVSYQVITSLLLGTLIFCAVLGNACVVAAIALERSLQNVANYLIGSLAVTDLMVSVLVLPMAALYQVLNKWTLGQVTCDLFIALDVLCCTSSILHLCAIALDRYWAITDPIDYVNKRTPRRAAALISLTWLIGFLISIPPMLGWRTPEDRSDPDACTISKDHGYTIYSTFGAFYIPLLLMLVLYGRIFRAARFRIRKTVKKVEKTGADTRHGASPAPQPKKSVNGESGSRNWRLGVESKAGGALCANGAVRQGDDGAALEVIEVHRVGNSKEHLPLPSEAGPTPCAPASFERKNERNAEAKRKMALARERKTVKTLGIIMGTFILCWLPFFIVALVLPFCESSCHMPTLLGAIINWLGYSNSLLNPVIYAYFNKDFQNAFKKIIKCKFCRQ".into(),
        temp_ligand_id: Some("serotonin".into()),
        temp_rec_id: None,
        id: Some("1".into()),
    }
}

#[tokio::test]
async fn test_submit_pair_returns_job_id() {
    let (client, state) = spawn_backend().await;

    let resp = client.submit_pair(&body("NCCc1c[nH]c2ccc(O)cc12")).await.unwrap();
    assert_eq!(resp.job_id.as_deref(), Some("job-1"));
    assert_eq!(resp.message.as_deref(), Some("Job submitted to pipeline asynchronously."));

    let sent = state.submissions.lock().unwrap()[0].clone();
    assert_eq!(sent["temp_ligand_id"], "serotonin");
    assert_eq!(sent["id"], "1");
    assert!(sent.get("temp_rec_id").is_none());
}

#[tokio::test]
async fn test_rejected_submission_keeps_backend_message() {
    let (client, _) = spawn_backend().await;

    let err = client.submit_pair(&body("not-a-smiles")).await.unwrap_err();
    match err {
        EvolfError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid SMILES string");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_submitter_sends_one_job_per_ligand_and_stops_on_failure() {
    let (client, state) = spawn_backend().await;
    let backend = Arc::new(client);

    let mut builder = RequestBuilder::new();
    builder.set_receptor_text("MDVLSPGQ");
    builder.set_mutation(Some("L249A"));
    builder
        .parse_ligands_from_csv("name,smiles\nserotonin,NCCc1c[nH]c2ccc(O)cc12\nethanol,CCO\n")
        .unwrap();
    let request = builder.build().unwrap();

    let receipts = JobSubmitter::new(Arc::clone(&backend)).submit(&request).await.unwrap();
    let ids: Vec<&str> = receipts.iter().map(|r| r.job_id.as_str()).collect();
    assert_eq!(ids, ["job-1", "job-2"]);
    {
        let sent = state.submissions.lock().unwrap();
        assert_eq!(sent[1]["temp_ligand_id"], "ethanol");
        assert_eq!(sent[1]["temp_rec_id"], "l249a");
    }

    let mut builder = RequestBuilder::new();
    builder.set_receptor_text("MDVLSPGQ");
    builder
        .parse_ligands_from_csv("smiles\nCCO\nnot-a-smiles\nCCN\n")
        .unwrap();
    let err = JobSubmitter::new(Arc::clone(&backend))
        .submit(&builder.build().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, EvolfError::Api { status: 400, .. }));
    assert_eq!(state.submissions.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_fetch_status_parses_finished_job() {
    let (client, _) = spawn_backend().await;

    let status = client.fetch_status("abc-123").await.unwrap();
    assert_eq!(status.state(), JobState::Completed);
    assert_eq!(status.predictions.len(), 1);
    let row = &status.predictions[0];
    assert_eq!(row.id, "1");
    assert_eq!(row.temp_ligand_id, "serotonin");
    assert_eq!(row.label().to_string(), "Agonist");
    assert_eq!(row.score_display(), "0.8532");
}

#[tokio::test]
async fn test_fetch_status_maps_errors() {
    let (client, _) = spawn_backend().await;

    assert_eq!(client.fetch_status("slow").await.unwrap().state(), JobState::Running);

    let err = client.fetch_status("gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, EvolfError::NotFound { ref message } if message == "Job not found"));

    let err = client.fetch_status("broken").await.unwrap_err();
    assert!(!err.is_not_found());
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_both_download_routes_return_archive() {
    let (client, _) = spawn_backend().await;

    for route in [DownloadRoute::JobQuery, DownloadRoute::DownloadEndpoint] {
        let bytes = client.download_archive("abc-123", route).await.unwrap();
        assert_eq!(bytes, ZIP_BYTES);
    }
}

#[tokio::test]
async fn test_watch_then_download_over_http() {
    let (client, _) = spawn_backend().await;
    let handle = JobWatch::start(
        JobContext::from_navigation("https://evolf.example.org/prediction-result?job-id=abc-123").unwrap(),
        Arc::new(client),
        BackoffPolicy::default(),
    );

    let done = handle.wait_terminal().await.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.polls, 1);

    let dir = tempfile::tempdir().unwrap();
    let path = evolf_predict::download_results(&handle, dir.path(), DownloadRoute::DownloadEndpoint)
        .await
        .unwrap();
    assert_eq!(path, dir.path().join("prediction_abc-123.zip"));
    assert_eq!(std::fs::read(path).unwrap(), ZIP_BYTES);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_retriever_reports_not_ready_and_expired() {
    let (client, _) = spawn_backend().await;
    let retriever = ResultRetriever::new(Arc::new(client));
    let dir = tempfile::tempdir().unwrap();

    let err = retriever.retrieve("slow", dir.path(), DownloadRoute::JobQuery).await.unwrap_err();
    assert!(matches!(err, EvolfError::ResultsNotReady));

    let err = retriever.retrieve("gone", dir.path(), DownloadRoute::JobQuery).await.unwrap_err();
    assert!(matches!(err, EvolfError::ResultsExpired));

    let err = retriever
        .retrieve("no-output", dir.path(), DownloadRoute::DownloadEndpoint)
        .await
        .unwrap_err();
    assert!(matches!(err, EvolfError::ResultsExpired));

    let path = retriever.retrieve("abc-123", dir.path(), DownloadRoute::JobQuery).await.unwrap();
    assert!(path.ends_with("prediction_abc-123.zip"));
}
