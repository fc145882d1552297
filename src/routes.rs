//! Route handlers.
//!
//! `/checkin` is the orchestrator the rest of the crate exists for: rate
//! limit first (cheap, no store round-trip), then code verification, then
//! appointment matching, then the record write. The remaining routes are
//! the thin boundary the external CRUD, scheduling, and review
//! collaborators call. Staff authorization for the review and boundary
//! routes is enforced by the fronting reverse proxy, not here.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    checkin::{self, Appointment, AttendanceRecord, AttendanceStatus, VerificationMethod},
    database,
    error::AppError,
    exceptions::{Exception, ExceptionStatus},
    state::AppState,
    totp,
    utils::{validate_appointments, validate_identifier},
};

const ISSUER: &str = "rollcall";

#[derive(Deserialize)]
pub struct CheckinRequest {
    pub identifier: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct CheckinResponse {
    pub status: AttendanceStatus,
    pub appointment: Option<u32>,
    pub needs_review: bool,
}

pub async fn totp_checkin_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckinRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.identifier)?;

    if !state.checkin_limiter.check(&payload.identifier) {
        warn!("Rate limited check-in attempt for {}", payload.identifier);
        return Err(AppError::RateLimited);
    }

    let mut conn = state.redis_connection.clone();

    let Some(group) = database::get_member_group(&mut conn, &payload.identifier).await? else {
        return Err(AppError::UnknownMember);
    };
    let Some(secret) = database::get_secret(&mut conn, &payload.identifier).await? else {
        return Err(AppError::NoSecretEnrolled);
    };

    let now = Utc::now();
    if !totp::verify(
        &secret,
        &payload.code,
        now.timestamp() as u64,
        &state.config.totp(),
    ) {
        return Err(AppError::InvalidCode);
    }

    let appointments = database::get_appointments(&mut conn, &group).await?;
    let exceptions = database::get_exceptions(&mut conn, &payload.identifier).await?;

    let record = checkin::resolve(
        &payload.identifier,
        &appointments,
        &exceptions,
        now,
        Duration::hours(state.config.tolerance_hours),
    );

    let stored = database::record_attendance(&mut conn, &record).await?;
    if !stored {
        info!(
            "Duplicate check-in for {} at appointment {:?}",
            record.member, record.appointment
        );
    }

    #[cfg(feature = "verbose")]
    info!(
        "Check-in for {} resolved to {:?}",
        record.member, record.appointment
    );

    Ok(Json(CheckinResponse {
        status: record.status,
        appointment: record.appointment,
        needs_review: record.needs_review,
    }))
}

#[derive(Deserialize)]
pub struct MemberRequest {
    pub member: String,
}

/// Enrolls or rotates a member's secret. Codes derived from the previous
/// secret stop verifying immediately.
pub async fn regenerate_token_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.member)?;

    if !state.general_limiter.check(&payload.member) {
        return Err(AppError::RateLimited);
    }

    let mut conn = state.redis_connection.clone();
    if database::get_member_group(&mut conn, &payload.member)
        .await?
        .is_none()
    {
        return Err(AppError::UnknownMember);
    }

    let secret = totp::generate_secret(state.config.secret_length);
    database::set_secret(&mut conn, &payload.member, &secret).await?;
    info!("Rotated secret for {}", payload.member);

    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub struct QrResponse {
    pub otpauth: String,
}

/// Hands out the provisioning payload exactly once per generated secret.
pub async fn qr_verification_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&query.member)?;

    if !state.general_limiter.check(&query.member) {
        return Err(AppError::RateLimited);
    }

    let mut conn = state.redis_connection.clone();
    let Some(secret) = database::get_secret(&mut conn, &query.member).await? else {
        return Err(AppError::NoSecretEnrolled);
    };

    if !database::try_expose_secret(&mut conn, &query.member).await? {
        return Err(AppError::SecretAlreadyViewed);
    }

    Ok(Json(QrResponse {
        otpauth: totp::provisioning_uri(&secret, &query.member, ISSUER, &state.config.totp()),
    }))
}

#[derive(Deserialize)]
pub struct FileExceptionRequest {
    pub member: String,
    pub appointment: u32,
}

pub async fn file_exception_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FileExceptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.member)?;

    let mut conn = state.redis_connection.clone();
    if database::get_member_group(&mut conn, &payload.member)
        .await?
        .is_none()
    {
        return Err(AppError::UnknownMember);
    }

    let exception =
        database::file_exception(&mut conn, &payload.member, payload.appointment).await?;
    Ok(Json(exception))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub member: String,
    pub exception_id: u32,
    pub action: ReviewAction,
}

pub async fn review_exception_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.member)?;

    let mut conn = state.redis_connection.clone();
    let mut exceptions = database::get_exceptions(&mut conn, &payload.member).await?;

    let Some(exception) = exceptions
        .iter_mut()
        .find(|exception| exception.id == payload.exception_id)
    else {
        return Err(AppError::UnknownException);
    };

    let was_pending = exception.status == ExceptionStatus::Pending;
    match payload.action {
        ReviewAction::Approve => exception.approve()?,
        ReviewAction::Reject => exception.reject()?,
    }
    let reviewed: Exception = exception.clone();

    database::put_exceptions(&mut conn, &payload.member, &exceptions).await?;

    // A fresh approval leaves an excused record so reporting sees the
    // absence without re-reading the exception list. Idempotent re-reviews
    // skip this, the record already exists.
    if was_pending && reviewed.status == ExceptionStatus::Approved {
        let record = AttendanceRecord {
            member: reviewed.member.clone(),
            appointment: Some(reviewed.appointment),
            timestamp: Utc::now(),
            status: AttendanceStatus::Excused,
            method: VerificationMethod::Staff,
            needs_review: false,
        };
        database::record_attendance(&mut conn, &record).await?;
    }

    Ok(Json(reviewed))
}

#[derive(Deserialize)]
pub struct CreateMemberRequest {
    pub member: String,
    pub group: String,
}

pub async fn create_member_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.member)?;
    validate_identifier(&payload.group)?;

    let mut conn = state.redis_connection.clone();
    database::put_member(&mut conn, &payload.member, &payload.group).await?;

    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct PutAppointmentsRequest {
    pub group: String,
    pub appointments: Vec<Appointment>,
}

pub async fn put_appointments_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PutAppointmentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_identifier(&payload.group)?;
    validate_appointments(&payload.appointments)?;

    let mut conn = state.redis_connection.clone();
    database::put_appointments(&mut conn, &payload.group, &payload.appointments).await?;

    Ok(StatusCode::OK)
}
