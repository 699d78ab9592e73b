#![cfg(feature = "http_api")]

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    response::Response,
};
use common::demo_engine;
use lecture_scheduler::http_api::{self, AppState, CACHE_HEADER};
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn new_router() -> axum::Router {
    let (engine, _) = demo_engine();
    http_api::router(AppState::new(engine))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn lab_one_monday() -> Value {
    json!({
        "dayOfWeek": "MONDAY",
        "startTime": "09:00",
        "endTime": "10:00",
        "courseId": "cs2012",
        "lecturerId": "lec-1",
        "hallId": "lab-1",
        "groupId": "cs-2024-a"
    })
}

#[tokio::test]
async fn entry_lifecycle_via_http_api() {
    let app = new_router();

    // Create
    let response = send(&app, "POST", "/timetable", Some(lab_one_monday())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["startTime"], "09:00");

    // Same slot again
    let response = send(&app, "POST", "/timetable", Some(lab_one_monday())).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 3);
    assert_eq!(body["conflicts"][0]["kind"], "HALL");

    // Joined read
    let response = send(&app, "GET", &format!("/timetable/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let slot = json_body(response).await;
    assert_eq!(slot["hall"]["name"], "Lab 1");
    assert_eq!(slot["lecturer"]["firstName"], "Kumara");

    // Move
    let response = send(
        &app,
        "PUT",
        &format!("/timetable/{id}"),
        Some(json!({ "startTime": "10:00", "endTime": "11:00" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["endTime"], "11:00");

    // Listing with search
    let response = send(&app, "GET", "/timetable?search=kumara&limit=5", None).await;
    let page = json_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 5);

    // Delete then 404
    let response = send(&app, "DELETE", &format!("/timetable/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&app, "GET", &format!("/timetable/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn invalid_payloads_map_to_bad_request() {
    let app = new_router();
    let mut inverted = lab_one_monday();
    inverted["startTime"] = json!("11:00");
    let response = send(&app, "POST", "/timetable", Some(inverted)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");

    let mut unknown_hall = lab_one_monday();
    unknown_hall["hallId"] = json!("hall-z");
    let response = send(&app, "POST", "/timetable", Some(unknown_hall)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/lecturers/lec-1/availability/2026-13-40", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conflict_preview_does_not_write() {
    let app = new_router();
    send(&app, "POST", "/timetable", Some(lab_one_monday())).await;
    let check = json!({
        "dayOfWeek": "monday",
        "startTime": "09:30",
        "endTime": "10:30",
        "hallId": "lab-1",
        "lecturerId": "lec-2",
        "groupId": "it-2024-a"
    });
    let response = send(&app, "POST", "/timetable/check", Some(check)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["hasConflicts"], true);
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);

    let page = json_body(send(&app, "GET", "/timetable", None).await).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn timetable_reads_report_cache_status() {
    let app = new_router();
    let uri = "/students/stu-1/timetable";

    let response = send(&app, "GET", uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_HEADER], "MISS");
    let response = send(&app, "GET", uri, None).await;
    assert_eq!(response.headers()[CACHE_HEADER], "HIT");

    send(&app, "POST", "/timetable", Some(lab_one_monday())).await;
    let response = send(&app, "GET", uri, None).await;
    assert_eq!(response.headers()[CACHE_HEADER], "MISS");
    let body = json_body(response).await;
    assert_eq!(body["weekly"]["MONDAY"].as_array().unwrap().len(), 1);

    let response = send(&app, "GET", "/lecturers/ghost/timetable", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "DELETE", "/cache", None).await;
    assert_eq!(json_body(response).await["size"], 0);
}

#[tokio::test]
async fn hall_queries_via_http_api() {
    let app = new_router();
    send(&app, "POST", "/timetable", Some(lab_one_monday())).await;

    let response = send(
        &app,
        "GET",
        "/halls/available?day=MONDAY&startTime=08:30&endTime=09:30&equipment=computers",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["halls"][0]["hall"]["id"], "lab-2");

    let schedule = json_body(send(&app, "GET", "/halls/lab-1/schedule?day=MONDAY", None).await).await;
    assert_eq!(
        schedule["freeSlots"],
        json!([
            { "startTime": "08:00", "endTime": "09:00", "durationMinutes": 60 },
            { "startTime": "10:00", "endTime": "18:00", "durationMinutes": 480 }
        ])
    );

    let filters = json_body(send(&app, "GET", "/halls/filters", None).await).await;
    assert_eq!(filters["buildings"].as_array().unwrap().len(), 3);

    let response = send(&app, "GET", "/halls/missing/schedule", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn csv_import_via_http_api() {
    let app = new_router();
    let csv = "dayOfWeek,startTime,endTime,courseCode,lecturerEmail,hallName,groupName\n\
               MONDAY,09:00,10:00,CS2012,lecturer1@lecstu.edu,Lab 1,CS-2024-A\n\
               MONDAY,09:00,10:00,CS2023,lecturer2@lecstu.edu,Lab 1,IT-2024-A\n";
    let request = Request::builder()
        .method("POST")
        .uri("/timetable/import")
        .header("content-type", "text/csv")
        .body(Body::from(csv))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "import_rejected");
    assert_eq!(body["report"]["conflicts"][0]["row"], 3);

    let week = json_body(send(&app, "GET", "/lecturers/lec-1/availability", None).await).await;
    assert_eq!(week["days"]["MONDAY"]["teaching"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn patch_applies_partial_update_like_put() {
    let app = new_router();
    let created = json_body(send(&app, "POST", "/timetable", Some(lab_one_monday())).await).await;
    let uri = format!("/timetable/{}", created["id"].as_str().unwrap());

    let response = send(
        &app,
        "PATCH",
        &uri,
        Some(json!({ "startTime": "11:00", "endTime": "12:00" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let patched = json_body(response).await;
    assert_eq!(patched["startTime"], "11:00");
    assert_eq!(patched["hallId"], "lab-1");

    let response = send(&app, "PATCH", "/timetable/ghost", Some(json!({ "startTime": "11:00" }))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_returns_active_entries_as_csv() {
    let app = new_router();
    send(&app, "POST", "/timetable", Some(lab_one_monday())).await;

    let response = send(&app, "GET", "/timetable/export", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("dayOfWeek,startTime,endTime,courseCode"));
    assert!(
        lines
            .next()
            .unwrap()
            .starts_with("MONDAY,09:00,10:00,CS2012,lecturer1@lecstu.edu,Lab 1,CS-2024-A,")
    );
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn subject_cache_clear_leaves_other_subjects_cached() {
    let app = new_router();
    let student = "/students/stu-1/timetable";
    let lecturer = "/lecturers/lec-1/timetable";
    send(&app, "GET", student, None).await;
    send(&app, "GET", lecturer, None).await;

    let response = send(&app, "DELETE", "/cache/stu-1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["size"], 1);

    let response = send(&app, "GET", student, None).await;
    assert_eq!(response.headers()[CACHE_HEADER], "MISS");
    let response = send(&app, "GET", lecturer, None).await;
    assert_eq!(response.headers()[CACHE_HEADER], "HIT");
}
