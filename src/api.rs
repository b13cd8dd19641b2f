use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::dashboard::{build_dashboard, DashboardInput};
use crate::db;
use crate::ksb;
use crate::models::{EvidenceStatus, User};
use crate::otj;
use crate::validation::{self, EvidenceForm, OtjEntryForm, ValidationErrors};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or unknown session token")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("submission failed validation")]
    Validation(ValidationErrors),
    #[error(transparent)]
    InvalidWindow(#[from] otj::WindowError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) | ApiError::InvalidWindow(_) => "bad_request",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::Validation(errors) => json!(errors),
            _ => json!({}),
        };
        let message = match &self {
            ApiError::Internal(err) => {
                error!(error = ?err, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": {"code": self.code(), "message": message, "details": details}
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthContext> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(ApiError::Unauthorized)?;

    db::fetch_session(&state.pool, token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

fn require_view(ctx: &AuthContext, learner_id: Uuid) -> ApiResult<()> {
    if ctx.can_view_learner(learner_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("not permitted to view this learner"))
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn me_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let ctx = authenticate(&state, &headers).await?;
    let user = db::fetch_user(&state.pool, ctx.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user))
}

async fn learner_profile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    require_view(&ctx, user_id)?;
    let profile = db::fetch_profile(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("learner profile"))?;
    Ok(Json(profile))
}

async fn standard_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(standard_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    authenticate(&state, &headers).await?;
    let standard = db::fetch_standard(&state.pool, standard_id)
        .await?
        .ok_or(ApiError::NotFound("apprenticeship standard"))?;
    Ok(Json(standard))
}

#[derive(Debug, Deserialize)]
struct LearnerQuery {
    learner_id: Option<Uuid>,
}

async fn list_otj_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LearnerQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    let learner_id = query.learner_id.unwrap_or(ctx.user_id);
    require_view(&ctx, learner_id)?;
    Ok(Json(db::fetch_otj_logs(&state.pool, learner_id).await?))
}

async fn create_otj_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<OtjEntryForm>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    if !ctx.can_submit_for(ctx.user_id) {
        return Err(ApiError::Forbidden("only learners log OTJ hours"));
    }
    let entry = validation::validate_otj_entry(&form, Utc::now().date_naive())
        .map_err(ApiError::Validation)?;
    let created = db::insert_otj_log(&state.pool, ctx.user_id, &entry).await?;
    info!(learner_id = %ctx.user_id, minutes = created.duration_minutes, "OTJ entry logged");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_evidence_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LearnerQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    let learner_id = query.learner_id.unwrap_or(ctx.user_id);
    require_view(&ctx, learner_id)?;
    Ok(Json(db::fetch_evidence(&state.pool, learner_id).await?))
}

async fn create_evidence_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<EvidenceForm>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    if !ctx.can_submit_for(ctx.user_id) {
        return Err(ApiError::Forbidden("only learners submit evidence"));
    }
    let evidence = validation::validate_evidence(&form).map_err(ApiError::Validation)?;

    let records = db::load_learner_records(&state.pool, ctx.user_id).await?;
    let unknown = evidence
        .ksb_ids
        .iter()
        .filter(|id| !records.ksbs.iter().any(|ksb| ksb.id == **id))
        .count();
    if unknown > 0 {
        let mut errors = ValidationErrors::default();
        errors.fields.push(validation::FieldError {
            field: "ksbIds",
            message: format!("{unknown} selected KSB(s) are not part of your standard"),
        });
        return Err(ApiError::Validation(errors));
    }

    let created = db::insert_evidence(&state.pool, ctx.user_id, &evidence).await?;
    info!(learner_id = %ctx.user_id, evidence_id = %created.id, "evidence submitted");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    status: EvidenceStatus,
}

async fn review_evidence_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(evidence_id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    if !ctx.can_review_evidence() {
        return Err(ApiError::Forbidden("not permitted to review evidence"));
    }
    if !matches!(
        body.status,
        EvidenceStatus::Approved | EvidenceStatus::NeedsRevision
    ) {
        return Err(ApiError::BadRequest(format!(
            "reviews may only set approved or needs_revision, not {}",
            body.status
        )));
    }
    if !db::update_evidence_status(&state.pool, evidence_id, body.status).await? {
        return Err(ApiError::NotFound("evidence"));
    }
    info!(reviewer = %ctx.user_id, %evidence_id, status = %body.status, "evidence reviewed");
    let item = db::fetch_evidence_item(&state.pool, evidence_id)
        .await?
        .ok_or(ApiError::NotFound("evidence"))?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
struct WeeklyQuery {
    weeks: Option<usize>,
    anchor: Option<NaiveDate>,
}

async fn weekly_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(learner_id): Path<Uuid>,
    Query(query): Query<WeeklyQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    require_view(&ctx, learner_id)?;
    let weeks = query
        .weeks
        .unwrap_or(state.config.lookback_weeks)
        .clamp(1, otj::MAX_LOOKBACK_WEEKS);
    let anchor = query.anchor.unwrap_or_else(|| Utc::now().date_naive());

    let records = db::load_learner_records(&state.pool, learner_id).await?;
    let minimum_hours = otj::resolve_minimum_hours(records.standard.as_ref());
    let tracker = otj::aggregate_weeks(&records.entries, anchor, minimum_hours, weeks)?;
    Ok(Json(json!({
        "status": tracker.status(),
        "complianceRate": tracker.compliance_rate(),
        "tracker": tracker,
    })))
}

async fn ksb_progress_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(learner_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    require_view(&ctx, learner_id)?;
    let records = db::load_learner_records(&state.pool, learner_id).await?;
    let progress = ksb::compute_progress(&records.ksbs, &records.evidence, state.config.focus_limit);
    let percents: Value = progress
        .items
        .iter()
        .map(|item| (item.ksb_type.to_string(), json!(item.percent())))
        .collect::<serde_json::Map<_, _>>()
        .into();
    Ok(Json(json!({"progress": progress, "percent": percents})))
}

async fn dashboard_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(learner_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let ctx = authenticate(&state, &headers).await?;
    require_view(&ctx, learner_id)?;
    let user = db::fetch_user(&state.pool, learner_id)
        .await?
        .ok_or(ApiError::NotFound("learner"))?;
    let records = db::load_learner_records(&state.pool, learner_id).await?;
    let dashboard = build_dashboard(
        DashboardInput {
            user: &user,
            profile: records.profile.as_ref(),
            standard: records.standard.as_ref(),
            entries: &records.entries,
            ksbs: &records.ksbs,
            evidence: &records.evidence,
            anchor: Utc::now().date_naive(),
        },
        &state.config,
    )?;
    Ok(Json(dashboard))
}

#[cfg(feature = "dev-login")]
mod dev {
    use super::*;
    use crate::auth::Role;

    #[derive(Debug, Deserialize)]
    pub(super) struct DevLoginBody {
        role: Role,
    }

    pub(super) async fn dev_login_handler(
        State(state): State<AppState>,
        Json(body): Json<DevLoginBody>,
    ) -> ApiResult<impl IntoResponse> {
        if !state.config.enable_dev_login {
            return Err(ApiError::NotFound("route"));
        }
        let user = db::find_user_by_role(&state.pool, body.role)
            .await?
            .ok_or(ApiError::NotFound("user with that role"))?;
        let token = db::create_session(&state.pool, user.id).await?;
        tracing::warn!(user_id = %user.id, role = %body.role, "dev login issued a session");
        Ok(Json(json!({"token": token, "user": user})))
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/me", get(me_handler))
        .route("/api/learner-profile/:user_id", get(learner_profile_handler))
        .route(
            "/api/apprenticeship-standard/:standard_id",
            get(standard_handler),
        )
        .route("/api/otj-logs", get(list_otj_handler).post(create_otj_handler))
        .route(
            "/api/evidence",
            get(list_evidence_handler).post(create_evidence_handler),
        )
        .route(
            "/api/evidence/:evidence_id/review",
            post(review_evidence_handler),
        )
        .route("/api/learners/:learner_id/otj-weekly", get(weekly_handler))
        .route(
            "/api/learners/:learner_id/ksb-progress",
            get(ksb_progress_handler),
        )
        .route(
            "/api/learners/:learner_id/dashboard",
            get(dashboard_handler),
        );

    #[cfg(feature = "dev-login")]
    let router = router.route("/dev-login", post(dev::dev_login_handler));

    router
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}
