//! Extra-Time Ledger
//!
//! 追加计时分录：每条分录带分钟数、净收费和时间戳。这是创建后唯一
//! 会抬高票面应付金额的操作。`total_extra_minutes` 是缓存，分录列表
//! 才是事实来源，每次变更都从列表重算。

use sqlx::SqlitePool;

use crate::db::repository::ticket as ticket_repo;
use crate::tickets::money::{dec, to_money};
use crate::utils::time::Clock;
use crate::utils::validation::validate_money;
use crate::utils::{AppError, AppResult};
use shared::models::{ExtraTimeAdd, ExtraTimeEntry, ExtraTimeSummary, Ticket};

/// Upper bound on a single grant; the venue never sells more than a day
pub const MAX_EXTRA_MINUTES: i64 = 24 * 60;

/// Append one ledger entry to an in-memory ticket.
///
/// Pure with respect to the store: validates, appends in arrival order,
/// recomputes `total_extra_minutes` from the list, and raises `total_fee`
/// by the net charge.
pub fn append_extra_time(
    ticket: &mut Ticket,
    req: &ExtraTimeAdd,
    actor: &str,
    now_millis: i64,
) -> AppResult<ExtraTimeEntry> {
    if ticket.status.is_terminal() {
        return Err(AppError::conflict(format!(
            "Ticket {} is {}; extra time cannot be added",
            ticket.ticket_no,
            ticket.status.as_str()
        )));
    }
    if ticket.is_refunded {
        return Err(AppError::conflict(format!(
            "Ticket {} is fully refunded; extra time cannot be added",
            ticket.ticket_no
        )));
    }
    if req.minutes <= 0 || req.minutes > MAX_EXTRA_MINUTES {
        return Err(AppError::validation(format!(
            "minutes must be between 1 and {MAX_EXTRA_MINUTES}, got {}",
            req.minutes
        )));
    }
    if !req.charge.is_finite() || req.charge <= 0.0 {
        return Err(AppError::validation(format!(
            "charge must be a positive number, got {}",
            req.charge
        )));
    }
    let discount = req.discount.unwrap_or(0.0);
    validate_money(discount, "discount")?;

    let net = to_money((dec(req.charge) - dec(discount)).max(rust_decimal::Decimal::ZERO));

    let entry = ExtraTimeEntry {
        minutes: req.minutes,
        amount: net,
        label: req
            .label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| format!("{} minutes", req.minutes)),
        note: req.note.clone(),
        created_at: now_millis,
        actor: actor.to_string(),
    };

    ticket.extra_entries.push(entry.clone());
    ticket.total_extra_minutes = ticket.extra_entries.iter().map(|e| e.minutes).sum();
    ticket.total_fee = to_money(dec(ticket.total_fee) + dec(net));
    ticket.updated_at = now_millis;

    Ok(entry)
}

/// Ledger read-back: the full ordered list plus recomputed totals
pub fn summary(ticket: &Ticket) -> ExtraTimeSummary {
    ExtraTimeSummary {
        entries: ticket.extra_entries.clone(),
        total_extra_minutes: ticket.extra_entries.iter().map(|e| e.minutes).sum(),
        total_fee: ticket.total_fee,
    }
}

/// Load, append, persist. Optimistic check on `updated_at` guards the
/// read-modify-write against concurrent mutation.
pub async fn add_extra_time(
    pool: &SqlitePool,
    clock: &dyn Clock,
    ticket_id: i64,
    req: ExtraTimeAdd,
    actor: &str,
) -> AppResult<(Ticket, ExtraTimeSummary)> {
    let mut ticket = ticket_repo::find_by_id(pool, ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {ticket_id} not found")))?;

    let expected = ticket.updated_at;
    let entry = append_extra_time(&mut ticket, &req, actor, clock.now_millis())?;

    let updated = ticket_repo::update(pool, &ticket, expected).await?;
    tracing::info!(
        ticket_no = %updated.ticket_no,
        minutes = entry.minutes,
        amount = entry.amount,
        total_extra_minutes = updated.total_extra_minutes,
        "Extra time added"
    );
    let summary = summary(&updated);
    Ok((updated, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{PlayerStatus, TicketStatus};

    fn test_ticket() -> Ticket {
        Ticket {
            id: Some(1),
            ticket_no: "123456".into(),
            customer_name: "Asha".into(),
            player_names: vec!["Asha".into()],
            group_info: None,
            per_person_fee: 100.0,
            discount: 0.0,
            total_fee: 100.0,
            status: TicketStatus::Playing,
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
            created_at: 1_700_000_000_000,
            calendar_date: "2023-11-15".into(),
            entry_time: "10:00:00".into(),
            updated_at: 1_700_000_000_000,
        }
    }

    fn add(minutes: i64, charge: f64) -> ExtraTimeAdd {
        ExtraTimeAdd {
            minutes,
            charge,
            discount: None,
            label: None,
            note: None,
        }
    }

    #[test]
    fn total_minutes_equals_sum_over_entries() {
        let mut t = test_ticket();
        for (m, c) in [(30, 50.0), (15, 25.0), (60, 100.0)] {
            append_extra_time(&mut t, &add(m, c), "staff-1", 1_700_000_100_000).unwrap();
        }
        assert_eq!(t.total_extra_minutes, 105);
        assert_eq!(
            t.total_extra_minutes,
            t.extra_entries.iter().map(|e| e.minutes).sum::<i64>()
        );
        assert_eq!(t.total_fee, 275.0);
        // Arrival order preserved
        let minutes: Vec<i64> = t.extra_entries.iter().map(|e| e.minutes).collect();
        assert_eq!(minutes, vec![30, 15, 60]);
    }

    #[test]
    fn net_charge_subtracts_discount_and_clamps() {
        let mut t = test_ticket();
        let req = ExtraTimeAdd {
            minutes: 30,
            charge: 50.0,
            discount: Some(10.0),
            label: None,
            note: None,
        };
        let entry = append_extra_time(&mut t, &req, "staff-1", 0).unwrap();
        assert_eq!(entry.amount, 40.0);
        assert_eq!(t.total_fee, 140.0);

        let req = ExtraTimeAdd {
            minutes: 10,
            charge: 5.0,
            discount: Some(50.0),
            label: None,
            note: None,
        };
        let entry = append_extra_time(&mut t, &req, "staff-1", 0).unwrap();
        assert_eq!(entry.amount, 0.0);
        assert_eq!(t.total_fee, 140.0);
    }

    #[test]
    fn label_defaults_to_minutes() {
        let mut t = test_ticket();
        let entry = append_extra_time(&mut t, &add(45, 10.0), "staff-1", 0).unwrap();
        assert_eq!(entry.label, "45 minutes");
    }

    #[test]
    fn rejects_non_positive_minutes_and_charge() {
        let mut t = test_ticket();
        assert!(append_extra_time(&mut t, &add(0, 10.0), "s", 0).is_err());
        assert!(append_extra_time(&mut t, &add(-5, 10.0), "s", 0).is_err());
        assert!(append_extra_time(&mut t, &add(30, 0.0), "s", 0).is_err());
        assert!(append_extra_time(&mut t, &add(30, -1.0), "s", 0).is_err());
        assert!(append_extra_time(&mut t, &add(30, f64::NAN), "s", 0).is_err());
        assert!(t.extra_entries.is_empty());
    }

    #[test]
    fn rejects_minutes_above_the_daily_cap() {
        let mut t = test_ticket();
        assert!(append_extra_time(&mut t, &add(MAX_EXTRA_MINUTES + 1, 10.0), "s", 0).is_err());
        assert!(append_extra_time(&mut t, &add(i64::MAX / 1000, 10.0), "s", 0).is_err());
        assert!(t.extra_entries.is_empty());

        append_extra_time(&mut t, &add(MAX_EXTRA_MINUTES, 10.0), "s", 0).unwrap();
        assert_eq!(t.total_extra_minutes, MAX_EXTRA_MINUTES);
    }

    #[test]
    fn rejects_terminal_and_refunded_tickets() {
        let mut t = test_ticket();
        t.status = TicketStatus::Cancelled;
        assert!(append_extra_time(&mut t, &add(30, 10.0), "s", 0).is_err());

        let mut t = test_ticket();
        t.is_refunded = true;
        assert!(append_extra_time(&mut t, &add(30, 10.0), "s", 0).is_err());
    }
}
