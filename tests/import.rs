use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use fitlog_import::pipeline::import::BatchReport;
use fitlog_import::types::tour::FinishedTour;
use fitlog_import::{config::Config, routes, state::AppState};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "X-BOUNDARY-TEST";

fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::import::router())
        .merge(routes::tours::router())
        .with_state(state)
}

fn sample_fitlog() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<FitnessWorkbook>
  <AthleteLog>
    <Activity StartTime="2021-06-05T07:30:00Z">
      <Name>Lunch run</Name>
      <Category Name="Running"/>
      <Track>
        <pt tm="0" lat="47.3769" lon="8.5417" hr="120"/>
        <pt tm="10" lat="47.3772" lon="8.5420" hr="125"/>
      </Track>
    </Activity>
    <Activity StartTime="2021-06-06T18:00:00Z">
      <Distance TotalMeters="5000"/>
      <Duration TotalSeconds="1800"/>
    </Activity>
  </AthleteLog>
</FitnessWorkbook>"#
}

fn multipart_body(files: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (file_name, file_body) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/xml\r\n\r\n{file_body}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn import_request(files: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .uri("/api/import")
        .method("POST")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(files)))
        .expect("request")
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes")
        .to_vec()
}

#[tokio::test]
async fn import_returns_batch_report() {
    let state = AppState::new(Config::from_env());

    let response = app(state.clone())
        .oneshot(import_request(&[("log.fitlog", sample_fitlog())]))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let report: BatchReport = serde_json::from_slice(&body_bytes(response).await).expect("report");
    assert_eq!(report.new_tours, 2);
    assert_eq!(report.duplicate_tours, 0);
    assert_eq!(report.files[0].imported.len(), 2);
    assert_eq!(state.tour_count(), 2);
}

#[tokio::test]
async fn second_import_only_finds_duplicates() {
    let state = AppState::new(Config::from_env());

    let first = app(state.clone())
        .oneshot(import_request(&[("log.fitlog", sample_fitlog())]))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app(state.clone())
        .oneshot(import_request(&[
            ("log.fitlog", sample_fitlog()),
            ("broken.fitlogex", "<FitnessWorkbook><Activity></FitnessWorkbook>"),
        ]))
        .await
        .expect("response");

    assert_eq!(second.status(), StatusCode::OK);
    let report: BatchReport = serde_json::from_slice(&body_bytes(second).await).expect("report");
    assert_eq!(report.new_tours, 0);
    assert_eq!(report.duplicate_tours, 2);
    assert_eq!(report.failed_files, 1);
    assert!(report.files[1].error.is_some());
    assert_eq!(state.tour_count(), 2);

    let catalog = state.catalog();
    assert_eq!(catalog.tour_types().len(), 1);
}

#[tokio::test]
async fn import_rejects_unsupported_extension() {
    let state = AppState::new(Config::from_env());

    let response = app(state)
        .oneshot(import_request(&[("ride.gpx", "<gpx/>")]))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn imported_tours_can_be_listed_and_fetched() {
    let state = AppState::new(Config::from_env());

    app(state.clone())
        .oneshot(import_request(&[("log.fitlog", sample_fitlog())]))
        .await
        .expect("response");

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/tours")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let list: Value = serde_json::from_slice(&body_bytes(response).await).expect("json");
    let list = list.as_array().expect("array");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["title"], "Lunch run");
    assert_eq!(list[1]["device_id"], "manual");

    let id = list[0]["tour_id"].as_i64().expect("tour id");
    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/tours/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let tour: FinishedTour = serde_json::from_slice(&body_bytes(response).await).expect("tour");
    assert_eq!(tour.tour_id, id);
    assert_eq!(tour.time_series.len(), 2);
    assert_eq!(tour.tour_type.map(|t| t.name), Some("Running".to_string()));
}

#[tokio::test]
async fn unknown_tour_is_not_found() {
    let state = AppState::new(Config::from_env());

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri("/api/tours/42")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_range_times_do_not_break_later_imports() {
    let state = AppState::new(Config::from_env());
    let crafted = r#"<FitnessWorkbook><AthleteLog>
    <Activity StartTime="2021-06-07T07:30:00Z">
      <Track>
        <pt tm="0" dist="0"/>
        <pt tm="99999999999999999" dist="10"/>
        <pt tm="20" dist="20"/>
      </Track>
      <Laps><Lap StartTime="2021-06-07T07:30:00Z" DurationSeconds="1e300"/></Laps>
    </Activity>
  </AthleteLog></FitnessWorkbook>"#;

    let first = app(state.clone())
        .oneshot(import_request(&[("crafted.fitlog", crafted)]))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let report: BatchReport = serde_json::from_slice(&body_bytes(first).await).expect("report");
    assert_eq!(report.new_tours, 1);

    let second = app(state.clone())
        .oneshot(import_request(&[("log.fitlog", sample_fitlog())]))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let report: BatchReport = serde_json::from_slice(&body_bytes(second).await).expect("report");
    assert_eq!(report.new_tours, 2);
    assert_eq!(state.tour_count(), 3);
}
