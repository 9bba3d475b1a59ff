//! End-to-end route tests against an in-process router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use dtiscope_catalog::Catalog;
use dtiscope_predict::{JobManager, ManagerConfig};
use dtiscope_test_utils::{MockLoader, MockScorer, TestData};
use dtiscope_web::router::build_router;
use dtiscope_web::state::AppState;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "dtiscope-test-boundary";

fn fixture() -> TestData {
    TestData::new()
        .with_reference(&[("CYP3A4", "CYP3A4 CYP3A"), ("PTGS2", "PTGS2 COX2")])
        .with_panel(&[
            ("Cytochrome P450 3A4", "CYP3A4", "MALIPDLAMETWLLLAVSLVLLYLYGTHSHGLFKKLGIPGPTPLPFLGNILSYHKGF"),
            ("Prostaglandin G/H synthase 2", "PTGS2", "MLARALLLCAVLALSHTANPCCSHPCQNRGVCMSVGFDQYKCDCTRTGFYGENCST"),
        ])
        .with_partition("sterol", "zaichun")
        .with_predictions("sterol", "1", &[("CYP3A", "0.91"), ("COX2", "0.42")])
        .with_compounds(
            &["global_id", "id", "chinese_name", "Name", "compound_type", "Molecular_Formula", "SMILES"],
            &[
                vec!["1", "1", "豆甾醇", "Stigmasterol", "sterol", "C29H48O", "CCC"],
                vec!["2", "2", "谷甾醇", "beta-Sitosterol", "sterol", "C29H50O", ""],
            ],
        )
}

fn app_for(data: &TestData, scorer: MockScorer) -> Router {
    let settings = data.settings();
    let loader = Arc::new(MockLoader::new(Arc::new(scorer)));
    let jobs = Arc::new(JobManager::new(ManagerConfig::from_settings(&settings), loader));
    let catalog = Catalog::load(&settings).unwrap();
    build_router(AppState::new(settings, jobs, catalog))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn multipart_body(csv: &str, fields: &[(&str, &str)]) -> Body {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"batch.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n"
    );
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

async fn post_batch(app: &Router, csv: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
    let request = Request::post("/api/predict/batch")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart_body(csv, fields))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn wait_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..1000 {
        let (status, body) = get_json(app, &format!("/api/predict/status/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        let state = body["data"]["status"].as_str().unwrap().to_string();
        if matches!(state.as_str(), "completed" | "failed" | "cancelled") {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn health_reports_catalog_size() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.5));

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["compounds"], 2);
}

#[tokio::test]
async fn target_routes() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.5));

    let (status, body) = get_json(&app, "/api/targets?sort_by=gene_symbol&sort_order=asc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["items"][0]["gene_symbol"], "CYP3A4");

    let (status, body) = get_json(&app, "/api/targets/COX2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mapped_symbol"], "PTGS2");
    assert_eq!(body["data"]["associated_compounds_count"], 1);

    let (status, body) = get_json(&app, "/api/targets/NOTAGENE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "error", "message": "Target not found" }));

    let (_, body) = post_json(&app, "/api/targets/search", json!({ "query": "cyp" })).await;
    assert_eq!(body["total"], 1);

    let (_, body) = get_json(&app, "/api/targets/statistics").await;
    assert_eq!(body["data"]["total_targets"], 2);
}

#[tokio::test]
async fn compound_routes() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.5));

    let (status, body) = get_json(&app, "/api/compounds?compound_type=sterol&page_size=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total_pages"], 2);
    assert_eq!(body["data"]["items"][0]["Name"], "Stigmasterol");

    let (status, body) = get_json(&app, "/api/compounds/1/targets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["statistics"]["total"], 2);
    assert_eq!(body["data"]["targets"][0]["gene_symbol"], "CYP3A4");

    let (status, _) = get_json(&app, "/api/compounds/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&app, "/api/compounds/search", json!({ "query": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get_json(&app, "/api/compounds/statistics").await;
    assert_eq!(body["data"]["with_smiles"], 1);
}

#[tokio::test]
async fn single_prediction_round_trip() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.97));

    let (status, body) = post_json(&app, "/api/predict/single", json!({ "smiles": "CCO" })).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let final_status = wait_terminal(&app, &job_id).await;
    assert_eq!(final_status["status"], "completed");
    assert_eq!(final_status["success_count"], 2);

    let (_, body) = get_json(&app, &format!("/api/predict/results/{job_id}")).await;
    assert_eq!(body["data"]["summary"]["total_targets"], 2);
    assert_eq!(body["data"]["summary"]["high_confidence_count"], 2);

    let (status, csv) = send(
        &app,
        Request::get(format!("/api/predict/download/{job_id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 3);

    let (status, _) = post_json(&app, &format!("/api/predict/cancel/{job_id}"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = get_json(&app, "/api/predict/jobs").await;
    assert_eq!(body["data"]["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn job_event_stream_ends_with_finished_frame() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.8));

    let (status, _) = send(&app, Request::get("/api/events?job_id=nope").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = post_json(&app, "/api/predict/single", json!({ "smiles": "CCO" })).await;
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let request = Request::get(format!("/api/events?job_id={job_id}")).body(Body::empty()).unwrap();
    let (status, stream) = tokio::time::timeout(Duration::from_secs(10), send(&app, request))
        .await
        .expect("event stream should close after the job finishes");
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(stream).unwrap();
    let last_event = text.lines().filter(|l| l.starts_with("event:")).last().unwrap();
    assert_eq!(last_event, "event: finished");
    assert!(text.contains(&format!("id: {job_id}")));
    assert!(text.contains("\"status\":\"completed\""));

    // Once finished, a new subscriber gets the final frame straight away.
    let request = Request::get(format!("/api/events?job_id={job_id}")).body(Body::empty()).unwrap();
    let (_, again) = send(&app, request).await;
    assert!(String::from_utf8(again).unwrap().contains("event: finished"));
}

#[tokio::test]
async fn rejected_submissions() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.5));

    let (status, body) = post_json(&app, "/api/predict/single", json!({ "smiles": "C1CC" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid SMILES string"));

    let (status, body) = post_json(&app, "/api/predict/single", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "SMILES string required");

    let (status, body) = get_json(&app, "/api/predict/status/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn batch_upload() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.6));
    let csv = "name,smiles\naspirin,CC(=O)OC1=CC=CC=C1C(=O)O\nethanol,CCO\n";

    let (status, body) = post_batch(&app, csv, &[("smiles_column", "structure")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Column \"structure\" not found");

    let (status, body) = post_batch(&app, csv, &[("smiles_column", "smiles"), ("id_column", "name")]).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let final_status = wait_terminal(&app, &job_id).await;
    assert_eq!(final_status["status"], "completed");
    assert_eq!(final_status["total"], 4);

    let (_, body) = get_json(&app, &format!("/api/predict/results/{job_id}")).await;
    assert_eq!(body["data"]["summary"]["total_compounds"], 2);
    assert_eq!(body["data"]["interactions"][0]["compound_id"], "aspirin");

    // Both the rejected and the finished upload are gone from disk.
    let upload_dir = data.settings().server.upload_dir;
    let mut remaining = usize::MAX;
    for _ in 0..200 {
        remaining = std::fs::read_dir(&upload_dir).map(|d| d.count()).unwrap_or(0);
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn validate_smiles_route() {
    let data = fixture();
    let app = app_for(&data, MockScorer::new(0.5));

    let (_, body) = post_json(&app, "/api/predict/validate/smiles", json!({ "smiles": "c1ccccc1O" })).await;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["summary"]["atoms"], 7);

    let (_, body) = post_json(&app, "/api/predict/validate/smiles", json!({ "smiles": "C(C" })).await;
    assert_eq!(body["data"]["valid"], false);

    let (status, body) = post_json(&app, "/api/predict/validate/smiles", json!({ "smiles": "[cé]" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);

    let (status, _) = post_json(&app, "/api/predict/single", json!({ "smiles": "[cé]" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
