use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::availability::{
    AvailableNow, FilterOptions, HallAvailability, HallDaySchedule, HallSearchParams, LecturerDay,
    LecturerWeek,
};
use crate::cache::{CacheStats, Role};
use crate::calendar::DayOfWeek;
use crate::conflict::Conflict;
use crate::error::{ResourceKind, SchedulingError};
use crate::model::{CandidateSlot, EntryDraft, TimetableEntry, TimetableSlot};
use crate::time::TimeInterval;
use crate::timetable::{UserTimetable, join_slot};
use crate::writer::{EntryPage, EntryQuery, ImportReport, ImportSummary};
use crate::SchedulingEngine;

pub const CACHE_HEADER: &str = "x-cache";

#[derive(Clone)]
pub struct AppState {
    engine: SchedulingEngine,
}

impl AppState {
    pub fn new(engine: SchedulingEngine) -> Self {
        Self { engine }
    }

    fn engine(&self) -> &SchedulingEngine {
        &self.engine
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<Vec<Conflict>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ImportReport>,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String, Vec<Conflict>),
    Invalid(String),
    ImportRejected(String, ImportReport),
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<SchedulingError> for ApiError {
    fn from(value: SchedulingError) -> Self {
        let message = value.to_string();
        match value {
            SchedulingError::NotFound { .. } => ApiError::NotFound(message),
            SchedulingError::Conflict(conflicts) => ApiError::Conflict(message, conflicts),
            SchedulingError::InvalidInterval { .. } | SchedulingError::MalformedInput(_) => {
                ApiError::Invalid(message)
            }
            SchedulingError::Import(report) => ApiError::ImportRejected(message, report),
            SchedulingError::Store(err) => {
                tracing::error!(error = %err, "store failure");
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, conflicts, report) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, None, None),
            ApiError::Conflict(message, conflicts) => {
                (StatusCode::CONFLICT, "conflict", message, Some(conflicts), None)
            }
            ApiError::Invalid(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message, None, None)
            }
            ApiError::ImportRejected(message, report) => {
                (StatusCode::BAD_REQUEST, "import_rejected", message, None, Some(report))
            }
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                None,
                None,
            ),
        };
        let body = Json(ErrorBody {
            error,
            message,
            conflicts,
            report,
        });
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/timetable", get(list_entries).post(create_entry))
        .route("/timetable/check", post(check_conflicts))
        .route("/timetable/import", post(import_entries))
        .route("/timetable/export", get(export_entries))
        .route(
            "/timetable/:id",
            get(get_entry)
                .put(update_entry)
                .patch(update_entry)
                .delete(delete_entry),
        )
        .route("/halls/available", get(available_halls))
        .route("/halls/available-now", get(available_now))
        .route("/halls/filters", get(filter_options))
        .route("/halls/:id/schedule", get(hall_schedule))
        .route("/lecturers/:id/availability", get(lecturer_week))
        .route("/lecturers/:id/availability/:date", get(lecturer_date))
        .route("/lecturers/:id/timetable", get(lecturer_timetable))
        .route("/students/:id/timetable", get(student_timetable))
        .route("/cache", delete(clear_cache))
        .route("/cache/:subject", delete(clear_subject_cache))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, engine: SchedulingEngine) -> std::io::Result<()> {
    let app = router(AppState::new(engine));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<EntryPage>, ApiError> {
    Ok(Json(state.engine().writer().list_entries(&query)?))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TimetableSlot>, ApiError> {
    let store = state.engine().store();
    let entry = store
        .entry(&id)
        .map_err(SchedulingError::from)?
        .ok_or_else(|| SchedulingError::not_found(ResourceKind::Entry, &id))?;
    Ok(Json(join_slot(store.as_ref(), &entry)?))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(draft): Json<EntryDraft>,
) -> Result<(StatusCode, Json<TimetableEntry>), ApiError> {
    let created = state.engine().writer().create_entry(&draft)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<EntryDraft>,
) -> Result<Json<TimetableEntry>, ApiError> {
    Ok(Json(state.engine().writer().update_entry(&id, &draft)?))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine().writer().delete_entry(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckPayload {
    day_of_week: String,
    start_time: String,
    end_time: String,
    hall_id: String,
    lecturer_id: String,
    group_id: String,
    #[serde(default)]
    exclude_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    has_conflicts: bool,
    conflicts: Vec<Conflict>,
}

async fn check_conflicts(
    State(state): State<AppState>,
    Json(payload): Json<CheckPayload>,
) -> Result<Json<CheckResponse>, ApiError> {
    let day: DayOfWeek = payload
        .day_of_week
        .parse()
        .map_err(SchedulingError::from)?;
    let interval = TimeInterval::parse(payload.start_time.trim(), payload.end_time.trim())
        .map_err(SchedulingError::from)?;
    let candidate = CandidateSlot {
        day,
        interval,
        hall_id: payload.hall_id,
        lecturer_id: payload.lecturer_id,
        group_id: payload.group_id,
    };
    let conflicts = state
        .engine()
        .writer()
        .check_conflicts(&candidate, payload.exclude_id.as_deref())?;
    Ok(Json(CheckResponse {
        has_conflicts: !conflicts.is_empty(),
        conflicts,
    }))
}

async fn import_entries(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let summary = state.engine().writer().import_csv(body.as_bytes())?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn export_entries(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut body = Vec::new();
    state.engine().writer().export_csv(&mut body)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HallSearchResponse {
    day: DayOfWeek,
    count: usize,
    halls: Vec<HallAvailability>,
}

async fn available_halls(
    State(state): State<AppState>,
    Query(params): Query<HallSearchParams>,
) -> Result<Json<HallSearchResponse>, ApiError> {
    let availability = state.engine().availability();
    let query = params.into_query(availability.today());
    let halls = availability.find_available_halls(&query)?;
    Ok(Json(HallSearchResponse {
        day: query.day,
        count: halls.len(),
        halls,
    }))
}

async fn available_now(State(state): State<AppState>) -> Result<Json<AvailableNow>, ApiError> {
    Ok(Json(state.engine().availability().find_available_now()?))
}

async fn filter_options(State(state): State<AppState>) -> Result<Json<FilterOptions>, ApiError> {
    Ok(Json(state.engine().availability().filter_options()?))
}

#[derive(Debug, Default, Deserialize)]
struct DayParam {
    day: Option<String>,
}

async fn hall_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(param): Query<DayParam>,
) -> Result<Json<HallDaySchedule>, ApiError> {
    let availability = state.engine().availability();
    let day = param
        .day
        .as_deref()
        .and_then(|day| day.parse().ok())
        .unwrap_or_else(|| availability.today());
    Ok(Json(availability.hall_day_schedule(&id, day)?))
}

async fn lecturer_week(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LecturerWeek>, ApiError> {
    Ok(Json(
        state.engine().availability().lecturer_weekly_availability(&id)?,
    ))
}

async fn lecturer_date(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<LecturerDay>, ApiError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|err| ApiError::invalid(format!("invalid date '{date}': {err}")))?;
    Ok(Json(
        state
            .engine()
            .availability()
            .lecturer_date_availability(&id, date)?,
    ))
}

async fn student_timetable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    cached_timetable(&state, Role::Student, &id)
}

async fn lecturer_timetable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    cached_timetable(&state, Role::Lecturer, &id)
}

fn cached_timetable(state: &AppState, role: Role, id: &str) -> Result<Response, ApiError> {
    let (timetable, status): (UserTimetable, _) =
        state.engine().timetables().timetable_for(role, id)?;
    Ok(([(CACHE_HEADER, status.as_str())], Json(timetable)).into_response())
}

async fn clear_cache(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine().clear_cache())
}

async fn clear_subject_cache(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Json<CacheStats> {
    Json(state.engine().clear_cache_for(&subject))
}
