//! HTTP surface for the relay operations and the daily dashboard.

use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api_connection::ChatBackend;
use crate::metrics::{workout_calories, BmrFormula, DailySummary, WorkoutKind};
use crate::profile::{DailyStats, UserGoals, UserProfile};
use crate::relay::coaching::{coaching_tips, CoachingRequest, CoachingTips};
use crate::relay::food_image::{analyze_food_image, FoodImageAnalysis, FoodImageRequest};
use crate::relay::food_search::{search_food, FoodSearchResults};
use crate::relay::meal_plan::{generate_meal_plan, MealPlan, MealPlanRequest};
use crate::relay::progress::{analyze_progress, ProgressAnalysis, ProgressRequest};
use crate::relay::voice::{interpret_voice_command, VoiceCommandRequest, VoiceCommandResult};
use crate::relay::RelayError;
use crate::storage::{Storage, StorageError};

/// Request body cap for photo uploads; base64 inflates images by a third.
const FOOD_IMAGE_BODY_LIMIT: usize = 15 * 1024 * 1024;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    pub storage: Arc<dyn Storage>,
    pub formula: BmrFormula,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, storage: Arc<dyn Storage>, formula: BmrFormula) -> Self {
        Self {
            backend,
            storage,
            formula,
        }
    }
}

/// Error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RelayError> for HttpError {
    fn from(err: RelayError) -> Self {
        if err.is_input_validation() {
            return Self::bad_request(err.to_string());
        }
        error!(error = %err, "relay operation failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for HttpError {
    fn from(err: StorageError) -> Self {
        let status = match err {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::Backend(_) => {
                error!(error = %err, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

type HttpResult<T> = Result<Json<T>, HttpError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/analyze-food",
            post(analyze_food).layer(DefaultBodyLimit::max(FOOD_IMAGE_BODY_LIMIT)),
        )
        .route("/api/generate-meal-plan", post(meal_plan))
        .route("/api/analyze-progress", post(progress))
        .route("/api/coaching-tips", post(coaching))
        .route("/api/search-food", get(search))
        .route("/api/voice-command", post(voice))
        .route("/api/dashboard/:user_id", get(dashboard))
        .route("/api/goals/:user_id", get(get_goals).put(save_goals))
        .route("/api/log/:user_id/water", post(log_water))
        .route("/api/log/:user_id/activity", post(log_activity))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves until the process is stopped.
pub async fn run(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn analyze_food(
    State(state): State<AppState>,
    payload: Result<Json<FoodImageRequest>, JsonRejection>,
) -> HttpResult<FoodImageAnalysis> {
    let Json(request) = payload?;
    Ok(Json(analyze_food_image(state.backend.as_ref(), &request).await?))
}

async fn meal_plan(
    State(state): State<AppState>,
    payload: Result<Json<MealPlanRequest>, JsonRejection>,
) -> HttpResult<MealPlan> {
    let Json(request) = payload?;
    Ok(Json(generate_meal_plan(state.backend.as_ref(), &request).await?))
}

async fn progress(
    State(state): State<AppState>,
    payload: Result<Json<ProgressRequest>, JsonRejection>,
) -> HttpResult<ProgressAnalysis> {
    let Json(request) = payload?;
    Ok(Json(analyze_progress(state.backend.as_ref(), &request).await?))
}

async fn coaching(
    State(state): State<AppState>,
    payload: Result<Json<CoachingRequest>, JsonRejection>,
) -> HttpResult<CoachingTips> {
    let Json(request) = payload?;
    Ok(Json(
        coaching_tips(state.backend.as_ref(), &request, state.formula).await,
    ))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> HttpResult<FoodSearchResults> {
    let Query(params) = params?;
    Ok(Json(search_food(state.backend.as_ref(), params.q.as_deref()).await?))
}

async fn voice(
    State(state): State<AppState>,
    payload: Result<Json<VoiceCommandRequest>, JsonRejection>,
) -> HttpResult<VoiceCommandResult> {
    let Json(request) = payload?;
    Ok(Json(
        interpret_voice_command(state.backend.as_ref(), &request).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct DashboardParams {
    date: Option<NaiveDate>,
    hour: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    user_id: String,
    date: NaiveDate,
    stats: DailyStats,
    #[serde(flatten)]
    summary: DailySummary,
}

/// Maps a missing record to `None`, keeping every other error.
fn optional<T>(result: Result<T, StorageError>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StorageError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Today's summary for one user, computed from stored records.
///
/// Profile, goals, day log, meals and the trailing week are fetched
/// concurrently. A day with no log yet counts as all zeros. A stored calorie
/// goal takes precedence over one derived from the profile.
async fn dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    params: Result<Query<DashboardParams>, QueryRejection>,
) -> HttpResult<Dashboard> {
    let Query(params) = params?;
    let now = Local::now();
    let date = params.date.unwrap_or_else(|| now.date_naive());
    let hour = params.hour.unwrap_or_else(|| now.hour());
    if hour > 23 {
        return Err(HttpError::bad_request(format!("hour {} is out of range", hour)));
    }

    let week_start = date
        .checked_sub_signed(Duration::days(6))
        .ok_or_else(|| HttpError::bad_request(format!("date {} is out of range", date)))?;

    let storage = state.storage.as_ref();
    let day_log = async {
        optional(storage.get_daily_log(&user_id, date).await)
            .map(|log| log.unwrap_or_else(|| DailyStats::empty(date)))
    };
    let goals = async { optional(storage.get_goals(&user_id).await) };
    let (profile, goals, stats, meals, week) = tokio::try_join!(
        storage.get_profile(&user_id),
        goals,
        day_log,
        storage.get_meals(&user_id, date),
        storage.get_daily_logs(&user_id, week_start, date),
    )?;

    let weekly_weights: Vec<f64> = week.iter().filter_map(|log| log.weight).collect();
    let summary = match goals {
        Some(goals) => DailySummary::compute_with_goal(
            &profile,
            &stats,
            &meals,
            &weekly_weights,
            hour,
            state.formula,
            goals.daily_calories,
        ),
        None => DailySummary::compute(&profile, &stats, &meals, &weekly_weights, hour, state.formula),
    };
    Ok(Json(Dashboard {
        user_id,
        date,
        stats,
        summary,
    }))
}

async fn get_goals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> HttpResult<UserGoals> {
    Ok(Json(state.storage.get_goals(&user_id).await?))
}

/// Stores the profile and the Mifflin-St Jeor calorie goal derived from it.
async fn save_goals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserProfile>, JsonRejection>,
) -> HttpResult<UserGoals> {
    let Json(profile) = payload?;
    let goals = UserGoals::for_profile(profile, BmrFormula::MifflinStJeor);
    state
        .storage
        .save_profile(&user_id, goals.profile.clone())
        .await?;
    state.storage.save_goals(&user_id, goals).await?;
    Ok(Json(state.storage.get_goals(&user_id).await?))
}

fn require_amount(field: &str, value: f64) -> Result<f64, HttpError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(HttpError::bad_request(format!("{} must be a non-negative number", field)))
    }
}

#[derive(Debug, Deserialize)]
struct WaterLog {
    amount: f64,
    #[serde(default)]
    date: Option<NaiveDate>,
}

/// Sets the day's water total in ml.
async fn log_water(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<WaterLog>, JsonRejection>,
) -> HttpResult<DailyStats> {
    let Json(entry) = payload?;
    let amount = require_amount("amount", entry.amount)?;
    let date = entry.date.unwrap_or_else(|| Local::now().date_naive());
    Ok(Json(
        state
            .storage
            .update_water_intake(&user_id, date, amount)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityLog {
    activity_type: WorkoutKind,
    duration: f64,
    #[serde(default)]
    date: Option<NaiveDate>,
}

/// Adds a workout and its estimated kcal to the day's log.
async fn log_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<ActivityLog>, JsonRejection>,
) -> HttpResult<DailyStats> {
    let Json(entry) = payload?;
    let minutes = require_amount("duration", entry.duration)?;
    let date = entry.date.unwrap_or_else(|| Local::now().date_naive());
    let calories = workout_calories(entry.activity_type, minutes);
    Ok(Json(
        state
            .storage
            .record_activity(&user_id, date, minutes, calories)
            .await?,
    ))
}
