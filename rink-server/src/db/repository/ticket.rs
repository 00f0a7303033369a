//! Ticket Repository
//!
//! 行结构 (TicketRow) 与实体 (Ticket) 之间的映射在这里完成：
//! JSON 列 (player_names / extra_entries / refunded_players / group_info)
//! 在读取时解析，写入时重新序列化。

use super::{RepoError, RepoResult};
use shared::models::{ExtraTimeEntry, GroupInfo, PlayerStatus, Ticket, TicketStatus};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, ticket_no, customer_name, player_names, group_info, per_person_fee, \
     discount, total_fee, status, total_players, played, waiting, refunded, is_refunded, \
     refund_reason, refund_amount, refund_method, refund_reference, refunded_by, \
     refunded_players, extra_entries, total_extra_minutes, branch_id, created_by, created_at, \
     calendar_date, entry_time, updated_at";

/// Raw ticket row — JSON columns still serialized
#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: i64,
    ticket_no: String,
    customer_name: String,
    player_names: String,
    group_info: Option<String>,
    per_person_fee: f64,
    discount: f64,
    total_fee: f64,
    status: String,
    total_players: i64,
    played: i64,
    waiting: i64,
    refunded: i64,
    is_refunded: bool,
    refund_reason: Option<String>,
    refund_amount: f64,
    refund_method: Option<String>,
    refund_reference: Option<String>,
    refunded_by: Option<String>,
    refunded_players: String,
    extra_entries: String,
    total_extra_minutes: i64,
    branch_id: Option<String>,
    created_by: String,
    created_at: i64,
    calendar_date: String,
    entry_time: String,
    updated_at: i64,
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> RepoResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| RepoError::Database(format!("Corrupt {column} column: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|e| RepoError::Database(format!("Failed to serialize {column}: {e}")))
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepoError;

    fn try_from(row: TicketRow) -> RepoResult<Ticket> {
        let status: TicketStatus = row
            .status
            .parse()
            .map_err(|e: shared::models::ParseTicketStatusError| {
                RepoError::Database(e.to_string())
            })?;
        let group_info: Option<GroupInfo> = match &row.group_info {
            Some(raw) => Some(parse_json(raw, "group_info")?),
            None => None,
        };
        Ok(Ticket {
            id: Some(row.id),
            ticket_no: row.ticket_no,
            customer_name: row.customer_name,
            player_names: parse_json(&row.player_names, "player_names")?,
            group_info,
            per_person_fee: row.per_person_fee,
            discount: row.discount,
            total_fee: row.total_fee,
            status,
            player_status: PlayerStatus {
                total: row.total_players,
                played: row.played,
                waiting: row.waiting,
                refunded: row.refunded,
            },
            is_refunded: row.is_refunded,
            refund_reason: row.refund_reason,
            refund_amount: row.refund_amount,
            refund_method: row.refund_method,
            refund_reference: row.refund_reference,
            refunded_by: row.refunded_by,
            refunded_players: parse_json(&row.refunded_players, "refunded_players")?,
            extra_entries: parse_json::<Vec<ExtraTimeEntry>>(&row.extra_entries, "extra_entries")?,
            total_extra_minutes: row.total_extra_minutes,
            branch_id: row.branch_id,
            created_by: row.created_by,
            created_at: row.created_at,
            calendar_date: row.calendar_date,
            entry_time: row.entry_time,
            updated_at: row.updated_at,
        })
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {COLUMNS} FROM ticket WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(Ticket::try_from).transpose()
}

pub async fn find_by_ticket_no(pool: &SqlitePool, ticket_no: &str) -> RepoResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {COLUMNS} FROM ticket WHERE ticket_no = ?"
    ))
    .bind(ticket_no)
    .fetch_optional(pool)
    .await?;
    row.map(Ticket::try_from).transpose()
}

/// Existence pre-check used by the number-allocation loop. The UNIQUE
/// constraint on insert remains the authoritative guard.
pub async fn ticket_no_exists(pool: &SqlitePool, ticket_no: &str) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticket WHERE ticket_no = ?")
        .bind(ticket_no)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert a fresh ticket. A `ticket_no` collision surfaces as
/// [`RepoError::Duplicate`] so the factory's retry loop can regenerate.
pub async fn insert(pool: &SqlitePool, ticket: &Ticket) -> RepoResult<Ticket> {
    let id = ticket.id.unwrap_or_else(shared::util::snowflake_id);
    let player_names = to_json(&ticket.player_names, "player_names")?;
    let group_info = match &ticket.group_info {
        Some(g) => Some(to_json(g, "group_info")?),
        None => None,
    };
    let refunded_players = to_json(&ticket.refunded_players, "refunded_players")?;
    let extra_entries = to_json(&ticket.extra_entries, "extra_entries")?;

    sqlx::query(
        "INSERT INTO ticket (id, ticket_no, customer_name, player_names, group_info, \
         per_person_fee, discount, total_fee, status, total_players, played, waiting, refunded, \
         is_refunded, refund_reason, refund_amount, refund_method, refund_reference, refunded_by, \
         refunded_players, extra_entries, total_extra_minutes, branch_id, created_by, created_at, \
         calendar_date, entry_time, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&ticket.ticket_no)
    .bind(&ticket.customer_name)
    .bind(&player_names)
    .bind(&group_info)
    .bind(ticket.per_person_fee)
    .bind(ticket.discount)
    .bind(ticket.total_fee)
    .bind(ticket.status.as_str())
    .bind(ticket.player_status.total)
    .bind(ticket.player_status.played)
    .bind(ticket.player_status.waiting)
    .bind(ticket.player_status.refunded)
    .bind(ticket.is_refunded)
    .bind(&ticket.refund_reason)
    .bind(ticket.refund_amount)
    .bind(&ticket.refund_method)
    .bind(&ticket.refund_reference)
    .bind(&ticket.refunded_by)
    .bind(&refunded_players)
    .bind(&extra_entries)
    .bind(ticket.total_extra_minutes)
    .bind(&ticket.branch_id)
    .bind(&ticket.created_by)
    .bind(ticket.created_at)
    .bind(&ticket.calendar_date)
    .bind(&ticket.entry_time)
    .bind(ticket.updated_at)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create ticket".into()))
}

pub async fn find_all(pool: &SqlitePool, limit: i32, offset: i32) -> RepoResult<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {COLUMNS} FROM ticket ORDER BY created_at DESC LIMIT ? OFFSET ?"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Ticket::try_from).collect()
}

pub async fn find_by_date_range(
    pool: &SqlitePool,
    start_millis: i64,
    end_millis: i64,
) -> RepoResult<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {COLUMNS} FROM ticket WHERE created_at >= ? AND created_at < ? \
         ORDER BY created_at DESC"
    ))
    .bind(start_millis)
    .bind(end_millis)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Ticket::try_from).collect()
}

/// All tickets the sweeper cares about (BOOKED or PLAYING)
pub async fn find_active(pool: &SqlitePool) -> RepoResult<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {COLUMNS} FROM ticket WHERE status IN ('BOOKED', 'PLAYING') \
         ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Ticket::try_from).collect()
}

/// Persist a mutated ticket under an optimistic check on `updated_at`.
///
/// The caller passes the `updated_at` it read; a concurrent writer having
/// advanced it maps to [`RepoError::Conflict`] (lost-update guard).
pub async fn update(
    pool: &SqlitePool,
    ticket: &Ticket,
    expected_updated_at: i64,
) -> RepoResult<Ticket> {
    let id = ticket
        .id
        .ok_or_else(|| RepoError::Validation("Ticket has no id".into()))?;
    let refunded_players = to_json(&ticket.refunded_players, "refunded_players")?;
    let extra_entries = to_json(&ticket.extra_entries, "extra_entries")?;

    let rows = sqlx::query(
        "UPDATE ticket SET status = ?, total_fee = ?, played = ?, waiting = ?, refunded = ?, \
         is_refunded = ?, refund_reason = ?, refund_amount = ?, refund_method = ?, \
         refund_reference = ?, refunded_by = ?, refunded_players = ?, extra_entries = ?, \
         total_extra_minutes = ?, updated_at = ? \
         WHERE id = ? AND updated_at = ?",
    )
    .bind(ticket.status.as_str())
    .bind(ticket.total_fee)
    .bind(ticket.player_status.played)
    .bind(ticket.player_status.waiting)
    .bind(ticket.player_status.refunded)
    .bind(ticket.is_refunded)
    .bind(&ticket.refund_reason)
    .bind(ticket.refund_amount)
    .bind(&ticket.refund_method)
    .bind(&ticket.refund_reference)
    .bind(&ticket.refunded_by)
    .bind(&refunded_players)
    .bind(&extra_entries)
    .bind(ticket.total_extra_minutes)
    .bind(ticket.updated_at)
    .bind(id)
    .bind(expected_updated_at)
    .execute(pool)
    .await?;

    if rows.rows_affected() == 0 {
        return if find_by_id(pool, id).await?.is_some() {
            Err(RepoError::Conflict(format!(
                "Ticket {id} was modified concurrently"
            )))
        } else {
            Err(RepoError::NotFound(format!("Ticket {id} not found")))
        };
    }

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Ticket {id} not found")))
}

/// Sweeper transition: BOOKED/PLAYING -> EXPIRED, financials untouched.
///
/// Status-guarded in SQL, so re-running on an already-expired ticket is a
/// no-op. Returns whether the row transitioned.
pub async fn mark_expired(pool: &SqlitePool, id: i64, now_millis: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE ticket SET status = 'EXPIRED', updated_at = ? \
         WHERE id = ? AND status IN ('BOOKED', 'PLAYING')",
    )
    .bind(now_millis)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}
