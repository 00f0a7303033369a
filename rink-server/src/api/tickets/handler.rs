//! Ticket API Handlers

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::ticket as ticket_repo;
use crate::tickets::{factory, ledger, refund, sweeper};
use crate::utils::time;
use crate::utils::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, MAX_SHORT_TEXT_LEN, validate_optional_text,
    validate_required_text,
};
use crate::utils::{AppError, AppResult};
use shared::models::{
    ExtraTimeAdd, ExtraTimeSummary, PartialRefundRequest, RefundRequest, Ticket,
    TicketCreate, TicketStatusUpdate,
};

/// Query params for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn default_limit() -> i32 {
    50
}

/// POST /api/tickets - 售票
pub async fn create(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<TicketCreate>,
) -> AppResult<Json<Ticket>> {
    // Name may be empty when player names are supplied; length still capped
    if !payload.customer_name.trim().is_empty() {
        validate_required_text(&payload.customer_name, "customer_name", MAX_NAME_LEN)?;
    }
    validate_optional_text(&payload.player_names, "player_names", MAX_NOTE_LEN)?;
    validate_optional_text(&payload.branch_id, "branch_id", MAX_SHORT_TEXT_LEN)?;

    let ticket = factory::create_ticket(
        &state.pool,
        state.clock.as_ref(),
        state.calendar.as_ref(),
        state.config.timezone,
        payload,
        &current_user.name,
    )
    .await?;

    Ok(Json(ticket))
}

/// GET /api/tickets - 票据列表 (按日期或分页)
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Ticket>>> {
    let tz = state.config.timezone;
    let tickets = if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        let start_date = time::parse_date(&start)?;
        let end_date = time::parse_date(&end)?;
        ticket_repo::find_by_date_range(
            &state.pool,
            time::day_start_millis(start_date, tz),
            time::day_end_millis(end_date, tz),
        )
        .await
    } else {
        ticket_repo::find_all(&state.pool, query.limit, query.offset).await
    }?;

    Ok(Json(tickets))
}

/// GET /api/tickets/:id - 获取单张票
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Ticket>> {
    let ticket = ticket_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {} not found", id)))?;
    Ok(Json(ticket))
}

/// GET /api/tickets/number/:ticket_no - 按票号查询
pub async fn get_by_number(
    State(state): State<ServerState>,
    Path(ticket_no): Path<String>,
) -> AppResult<Json<Ticket>> {
    let ticket = ticket_repo::find_by_ticket_no(&state.pool, &ticket_no)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {} not found", ticket_no)))?;
    Ok(Json(ticket))
}

/// PUT /api/tickets/:id/status - 状态流转 (开玩 / 完成 / 取消)
pub async fn update_status(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TicketStatusUpdate>,
) -> AppResult<Json<Ticket>> {
    let mut ticket = ticket_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {} not found", id)))?;

    if !ticket.status.can_transition(payload.status) {
        return Err(AppError::conflict(format!(
            "Ticket {} cannot move from {} to {}",
            ticket.ticket_no,
            ticket.status.as_str(),
            payload.status.as_str()
        )));
    }

    let expected = ticket.updated_at;
    ticket.status = payload.status;
    ticket.updated_at = state.clock.now_millis();

    let updated = ticket_repo::update(&state.pool, &ticket, expected).await?;
    tracing::info!(
        ticket_no = %updated.ticket_no,
        status = updated.status.as_str(),
        operator = %current_user.name,
        "Ticket status updated"
    );
    Ok(Json(updated))
}

/// POST /api/tickets/:id/extra-time - 加时
pub async fn add_extra_time(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ExtraTimeAdd>,
) -> AppResult<Json<ExtraTimeSummary>> {
    validate_optional_text(&payload.label, "label", MAX_NAME_LEN)?;
    validate_optional_text(&payload.note, "note", MAX_NOTE_LEN)?;

    let (_ticket, summary) = ledger::add_extra_time(
        &state.pool,
        state.clock.as_ref(),
        id,
        payload,
        &current_user.name,
    )
    .await?;

    Ok(Json(summary))
}

/// GET /api/tickets/:id/extra-time - 加时分录列表
pub async fn list_extra_time(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ExtraTimeSummary>> {
    let ticket = ticket_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {} not found", id)))?;
    Ok(Json(ledger::summary(&ticket)))
}

/// POST /api/tickets/:id/refund - 全额退款
pub async fn refund_full(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<RefundRequest>,
) -> AppResult<Json<Ticket>> {
    validate_required_text(&payload.reason, "reason", MAX_NOTE_LEN)?;
    validate_optional_text(&payload.method, "method", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(&payload.reference, "reference", MAX_SHORT_TEXT_LEN)?;

    let ticket = refund::full_refund(
        &state.pool,
        state.clock.as_ref(),
        id,
        payload,
        &current_user.name,
    )
    .await?;

    Ok(Json(ticket))
}

/// POST /api/tickets/:id/refund/partial - 按人头部分退款
pub async fn refund_partial(
    State(state): State<ServerState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PartialRefundRequest>,
) -> AppResult<Json<Ticket>> {
    validate_required_text(&payload.reason, "reason", MAX_NOTE_LEN)?;
    validate_optional_text(&payload.method, "method", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(&payload.reference, "reference", MAX_SHORT_TEXT_LEN)?;

    let ticket = refund::partial_refund(
        &state.pool,
        state.clock.as_ref(),
        id,
        payload,
        &current_user.name,
    )
    .await?;

    Ok(Json(ticket))
}

/// POST /api/tickets/sweep - 按需触发过期扫描
pub async fn sweep(State(state): State<ServerState>) -> AppResult<Json<Vec<Ticket>>> {
    let expired = sweeper::sweep(
        &state.pool,
        state.clock.as_ref(),
        state.config.base_session_minutes,
    )
    .await?;
    Ok(Json(expired))
}
