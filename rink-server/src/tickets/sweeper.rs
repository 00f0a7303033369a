//! Expiry Sweeper
//!
//! 过期扫描：活跃票 (BOOKED/PLAYING) 超过计时上限后转为 EXPIRED。
//! 截止时间 = 最后一条加时分录的时间戳 + 其分钟数；没有加时分录时
//! = 创建时间 + 基础时长 (默认 60 分钟)。只改状态，不动任何金额。

use sqlx::SqlitePool;

use crate::db::repository::ticket as ticket_repo;
use crate::utils::AppResult;
use crate::utils::time::Clock;
use shared::models::{Ticket, TicketStatus};

/// Base allotment when no extra time was granted
pub const DEFAULT_BASE_MINUTES: i64 = 60;

const MILLIS_PER_MINUTE: i64 = 60 * 1000;

/// The instant the ticket's allotted time runs out (Unix millis).
///
/// Each extra-time grant restarts the clock from its own timestamp: only
/// the last entry matters, regardless of the original creation time.
/// Saturating arithmetic: out-of-range stored minutes push the deadline
/// to the far future instead of wrapping.
pub fn expiry_deadline(ticket: &Ticket, base_minutes: i64) -> i64 {
    match ticket.extra_entries.last() {
        Some(entry) => entry
            .created_at
            .saturating_add(entry.minutes.saturating_mul(MILLIS_PER_MINUTE)),
        None => ticket
            .created_at
            .saturating_add(base_minutes.saturating_mul(MILLIS_PER_MINUTE)),
    }
}

/// Strictly past the deadline
pub fn is_expired(ticket: &Ticket, base_minutes: i64, now_millis: i64) -> bool {
    now_millis > expiry_deadline(ticket, base_minutes)
}

/// One idempotent sweep over all active tickets.
///
/// Returns the tickets that transitioned in this run. Already-expired
/// tickets are excluded by the status filter, so a second run right after
/// the first changes nothing.
pub async fn sweep(
    pool: &SqlitePool,
    clock: &dyn Clock,
    base_minutes: i64,
) -> AppResult<Vec<Ticket>> {
    let now = clock.now_millis();
    let active = ticket_repo::find_active(pool).await?;

    let mut expired = Vec::new();
    for mut ticket in active {
        if !is_expired(&ticket, base_minutes, now) {
            continue;
        }
        let Some(id) = ticket.id else { continue };
        // Status-guarded in SQL; a concurrent sweep transitioning the same
        // ticket first simply makes this a no-op.
        if ticket_repo::mark_expired(pool, id, now).await? {
            ticket.status = TicketStatus::Expired;
            ticket.updated_at = now;
            expired.push(ticket);
        }
    }

    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Expired tickets deactivated");
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ExtraTimeEntry, PlayerStatus};

    const MINUTE: i64 = MILLIS_PER_MINUTE;

    fn test_ticket(created_at: i64) -> Ticket {
        Ticket {
            id: Some(1),
            ticket_no: "123456".into(),
            customer_name: "Asha".into(),
            player_names: vec!["Asha".into()],
            group_info: None,
            per_person_fee: 100.0,
            discount: 0.0,
            total_fee: 100.0,
            status: TicketStatus::Booked,
            player_status: PlayerStatus::new(1),
            is_refunded: false,
            refund_reason: None,
            refund_amount: 0.0,
            refund_method: None,
            refund_reference: None,
            refunded_by: None,
            refunded_players: vec![],
            extra_entries: vec![],
            total_extra_minutes: 0,
            branch_id: None,
            created_by: "staff-1".into(),
            created_at,
            calendar_date: "2023-11-15".into(),
            entry_time: "10:00:00".into(),
            updated_at: created_at,
        }
    }

    #[test]
    fn base_allotment_expires_after_sixty_minutes() {
        let t0 = 1_700_000_000_000;
        let ticket = test_ticket(t0);
        assert!(!is_expired(&ticket, DEFAULT_BASE_MINUTES, t0 + 59 * MINUTE));
        assert!(!is_expired(&ticket, DEFAULT_BASE_MINUTES, t0 + 60 * MINUTE));
        assert!(is_expired(&ticket, DEFAULT_BASE_MINUTES, t0 + 61 * MINUTE));
    }

    #[test]
    fn last_extra_entry_restarts_the_clock() {
        let t0 = 1_700_000_000_000;
        let t2 = t0 + 90 * MINUTE;
        let mut ticket = test_ticket(t0);
        ticket.extra_entries.push(ExtraTimeEntry {
            minutes: 30,
            amount: 50.0,
            label: "30 minutes".into(),
            note: None,
            created_at: t0 + 50 * MINUTE,
            actor: "staff-1".into(),
        });
        ticket.extra_entries.push(ExtraTimeEntry {
            minutes: 60,
            amount: 100.0,
            label: "60 minutes".into(),
            note: None,
            created_at: t2,
            actor: "staff-1".into(),
        });

        assert_eq!(expiry_deadline(&ticket, DEFAULT_BASE_MINUTES), t2 + 60 * MINUTE);
        assert!(!is_expired(&ticket, DEFAULT_BASE_MINUTES, t2 + 59 * MINUTE));
        assert!(is_expired(&ticket, DEFAULT_BASE_MINUTES, t2 + 61 * MINUTE));
    }

    #[test]
    fn oversized_stored_minutes_saturate_instead_of_wrapping() {
        let t0 = 1_700_000_000_000;
        let mut ticket = test_ticket(t0);
        ticket.extra_entries.push(ExtraTimeEntry {
            minutes: i64::MAX / 1000,
            amount: 50.0,
            label: "bad import".into(),
            note: None,
            created_at: t0,
            actor: "staff-1".into(),
        });

        assert_eq!(expiry_deadline(&ticket, DEFAULT_BASE_MINUTES), i64::MAX);
        assert!(!is_expired(&ticket, DEFAULT_BASE_MINUTES, i64::MAX - 1));
    }
}
