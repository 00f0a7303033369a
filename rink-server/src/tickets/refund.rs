//! Refund Calculator
//!
//! 全额与部分退款。部分退款按人头均摊 (proration)：
//! `per_player = total_fee / total_players`，退款金额和已退玩家名单
//! 跨多次调用累计；当累计退款人数达到总人数时晋升为全额退款。

use rust_decimal::Decimal;
use sqlx::SqlitePool;

use crate::db::repository::ticket as ticket_repo;
use crate::tickets::money::{dec, to_money};
use crate::utils::time::Clock;
use crate::utils::validation::validate_money;
use crate::utils::{AppError, AppResult};
use shared::models::{PartialRefundRequest, RefundRequest, Ticket};

/// Prorated refund amount, optionally net of a cancellation fee.
///
/// `players_to_refund = None` means a full refund of the amount paid.
/// Pure and persistence-free; the UI-level refund calculator and the
/// partial-refund path both rely on exactly this rule.
pub fn refund_amount(
    amount_paid: f64,
    total_players: i64,
    players_to_refund: Option<i64>,
    cancellation_fee: f64,
) -> f64 {
    let total = total_players.max(1);
    let base = match players_to_refund {
        None => dec(amount_paid),
        Some(n) => dec(amount_paid) / Decimal::from(total) * Decimal::from(n.clamp(0, total)),
    };
    to_money((base - dec(cancellation_fee)).max(Decimal::ZERO))
}

fn require_reason(reason: &str) -> AppResult<()> {
    if reason.trim().is_empty() {
        return Err(AppError::validation("refund reason is required"));
    }
    Ok(())
}

fn require_not_refunded(ticket: &Ticket) -> AppResult<()> {
    if ticket.is_refunded {
        return Err(AppError::conflict(format!(
            "Ticket {} is already fully refunded",
            ticket.ticket_no
        )));
    }
    Ok(())
}

/// Apply a full refund to an in-memory ticket. Returns the refunded amount.
pub fn apply_full_refund(
    ticket: &mut Ticket,
    req: &RefundRequest,
    actor: &str,
    now_millis: i64,
) -> AppResult<f64> {
    require_not_refunded(ticket)?;
    require_reason(&req.reason)?;
    if let Some(amount) = req.amount {
        validate_money(amount, "refund amount")?;
    }

    let amount = to_money(dec(req.amount.unwrap_or(ticket.total_fee)));

    let ps = &mut ticket.player_status;
    match &req.players {
        Some(players) if !players.is_empty() => {
            let count = players.len() as i64;
            let waiting = (ps.waiting - count).max(0);
            ps.settle(waiting, count);
            ticket.refunded_players.extend(players.iter().cloned());
        }
        _ => {
            // All players refunded
            ps.settle(0, ps.total);
        }
    }

    ticket.is_refunded = true;
    ticket.refund_reason = Some(req.reason.clone());
    ticket.refund_amount = to_money(dec(ticket.refund_amount) + dec(amount));
    ticket.refund_method = req.method.clone();
    ticket.refund_reference = req.reference.clone();
    ticket.refunded_by = Some(actor.to_string());
    ticket.updated_at = now_millis;

    Ok(amount)
}

/// Apply a per-player prorated partial refund. Returns the refunded amount.
///
/// Cumulative across calls: refunded players and amounts accumulate, and
/// reaching the full head-count promotes the ticket to fully refunded.
pub fn apply_partial_refund(
    ticket: &mut Ticket,
    req: &PartialRefundRequest,
    actor: &str,
    now_millis: i64,
) -> AppResult<f64> {
    require_not_refunded(ticket)?;
    require_reason(&req.reason)?;
    if req.players.is_empty() {
        return Err(AppError::validation(
            "players to refund must not be empty",
        ));
    }
    if let Some(amount) = req.amount {
        validate_money(amount, "refund amount")?;
    }

    let total = ticket.player_status.total;
    // Divide-by-zero guard: a zero head-count degenerates to the full fee
    let per_player = if total == 0 {
        dec(ticket.total_fee)
    } else {
        dec(ticket.total_fee) / Decimal::from(total)
    };
    let amount = match req.amount {
        Some(a) => to_money(dec(a)),
        None => to_money(per_player * Decimal::from(req.players.len() as i64)),
    };

    ticket.refunded_players.extend(req.players.iter().cloned());
    ticket.refund_amount = to_money(dec(ticket.refund_amount) + dec(amount));

    let refunded = ticket.refunded_players.len() as i64;
    let waiting = (ticket.player_status.waiting - req.players.len() as i64).max(0);
    ticket.player_status.settle(waiting, refunded);

    ticket.refund_reason = Some(req.reason.clone());
    if req.method.is_some() {
        ticket.refund_method = req.method.clone();
    }
    if req.reference.is_some() {
        ticket.refund_reference = req.reference.clone();
    }
    ticket.refunded_by = Some(actor.to_string());

    // Promotion: everyone refunded -> terminal refund state
    if ticket.player_status.refunded == ticket.player_status.total {
        ticket.is_refunded = true;
    }
    ticket.updated_at = now_millis;

    Ok(amount)
}

/// Load, apply a full refund, persist.
pub async fn full_refund(
    pool: &SqlitePool,
    clock: &dyn Clock,
    ticket_id: i64,
    req: RefundRequest,
    actor: &str,
) -> AppResult<Ticket> {
    let mut ticket = ticket_repo::find_by_id(pool, ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {ticket_id} not found")))?;

    let expected = ticket.updated_at;
    let amount = apply_full_refund(&mut ticket, &req, actor, clock.now_millis())?;

    let updated = ticket_repo::update(pool, &ticket, expected).await?;
    tracing::info!(
        ticket_no = %updated.ticket_no,
        amount,
        reason = %req.reason,
        "Ticket fully refunded"
    );
    Ok(updated)
}

/// Load, apply a partial refund, persist.
pub async fn partial_refund(
    pool: &SqlitePool,
    clock: &dyn Clock,
    ticket_id: i64,
    req: PartialRefundRequest,
    actor: &str,
) -> AppResult<Ticket> {
    let mut ticket = ticket_repo::find_by_id(pool, ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket {ticket_id} not found")))?;

    let expected = ticket.updated_at;
    let amount = apply_partial_refund(&mut ticket, &req, actor, clock.now_millis())?;

    let updated = ticket_repo::update(pool, &ticket, expected).await?;
    tracing::info!(
        ticket_no = %updated.ticket_no,
        amount,
        players = req.players.len(),
        promoted = updated.is_refunded,
        "Ticket partially refunded"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{PlayerStatus, TicketStatus};

    fn test_ticket(total_players: i64, total_fee: f64) -> Ticket {
        Ticket {
            id: Some(1),
            ticket_no: "123456".into(),
            customer_name: "Asha".into(),
            player_names: (0..total_players).map(|i| format!("P{i}")).collect(),
            group_info: None,
            per_person_fee: total_fee / total_players.max(1) as f64,
            discount: 0.0,
            total_fee,
            status: TicketStatus::Booked,
            player_status: PlayerStatus::new(total_players),
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
            created_at: 0,
            calendar_date: "2023-11-15".into(),
            entry_time: "10:00:00".into(),
            updated_at: 0,
        }
    }

    fn partial(players: &[&str]) -> PartialRefundRequest {
        PartialRefundRequest {
            reason: "left early".into(),
            players: players.iter().map(|p| p.to_string()).collect(),
            amount: None,
            method: None,
            reference: None,
        }
    }

    #[test]
    fn proration_matches_the_reference_table() {
        assert_eq!(refund_amount(300.0, 3, Some(2), 0.0), 200.0);
        assert_eq!(refund_amount(300.0, 3, Some(2), 50.0), 150.0);
        assert_eq!(refund_amount(300.0, 3, None, 0.0), 300.0);
        // Clamped to head-count, floored at zero
        assert_eq!(refund_amount(300.0, 3, Some(5), 0.0), 300.0);
        assert_eq!(refund_amount(300.0, 3, Some(-1), 0.0), 0.0);
        assert_eq!(refund_amount(100.0, 1, None, 150.0), 0.0);
        // Zero head-count degenerates to 1
        assert_eq!(refund_amount(100.0, 0, Some(1), 0.0), 100.0);
    }

    #[test]
    fn full_refund_defaults_to_total_fee() {
        let mut t = test_ticket(3, 300.0);
        let req = RefundRequest {
            reason: "rain".into(),
            amount: None,
            method: Some("cash".into()),
            reference: None,
            players: None,
        };
        let amount = apply_full_refund(&mut t, &req, "staff-1", 5).unwrap();
        assert_eq!(amount, 300.0);
        assert!(t.is_refunded);
        assert_eq!(t.refund_amount, 300.0);
        assert_eq!(t.player_status.refunded, 3);
        assert_eq!(t.player_status.waiting, 0);
        assert!(t.player_status.is_consistent());
    }

    #[test]
    fn full_refund_with_player_list_counts_only_those() {
        let mut t = test_ticket(3, 300.0);
        let req = RefundRequest {
            reason: "rain".into(),
            amount: Some(180.0),
            method: None,
            reference: None,
            players: Some(vec!["P0".into(), "P1".into()]),
        };
        let amount = apply_full_refund(&mut t, &req, "staff-1", 5).unwrap();
        assert_eq!(amount, 180.0);
        assert!(t.is_refunded);
        assert_eq!(t.player_status.refunded, 2);
        assert_eq!(t.player_status.waiting, 1);
        assert!(t.player_status.is_consistent());
        assert_eq!(t.refunded_players, vec!["P0", "P1"]);
    }

    #[test]
    fn double_full_refund_is_a_conflict() {
        let mut t = test_ticket(2, 200.0);
        let req = RefundRequest {
            reason: "rain".into(),
            amount: None,
            method: None,
            reference: None,
            players: None,
        };
        apply_full_refund(&mut t, &req, "staff-1", 5).unwrap();
        let before = t.clone();
        let err = apply_full_refund(&mut t, &req, "staff-1", 6).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // First call's state is untouched by the rejected second call
        assert_eq!(t.refund_amount, before.refund_amount);
        assert_eq!(t.updated_at, before.updated_at);
    }

    #[test]
    fn partial_refunds_accumulate_and_promote_on_the_last_player() {
        let mut t = test_ticket(3, 300.0);

        let a1 = apply_partial_refund(&mut t, &partial(&["P0"]), "staff-1", 1).unwrap();
        assert_eq!(a1, 100.0);
        assert!(!t.is_refunded);
        assert_eq!(t.player_status.refunded, 1);

        let a2 = apply_partial_refund(&mut t, &partial(&["P1"]), "staff-1", 2).unwrap();
        assert_eq!(a2, 100.0);
        assert!(!t.is_refunded);
        assert_eq!(t.refund_amount, 200.0);

        let a3 = apply_partial_refund(&mut t, &partial(&["P2"]), "staff-1", 3).unwrap();
        assert_eq!(a3, 100.0);
        assert!(t.is_refunded, "promoted once every player is refunded");
        assert_eq!(t.refund_amount, 300.0);
        assert_eq!(t.player_status.refunded, 3);
        assert_eq!(t.player_status.waiting, 0);
        assert!(t.player_status.is_consistent());
    }

    #[test]
    fn partial_refund_explicit_amount_overrides_proration() {
        let mut t = test_ticket(4, 400.0);
        let mut req = partial(&["P0", "P1"]);
        req.amount = Some(150.0);
        let amount = apply_partial_refund(&mut t, &req, "staff-1", 1).unwrap();
        assert_eq!(amount, 150.0);
        assert_eq!(t.refund_amount, 150.0);
        assert_eq!(t.player_status.refunded, 2);
    }

    #[test]
    fn refunding_more_players_than_waiting_never_goes_negative() {
        let mut t = test_ticket(2, 200.0);
        t.player_status.settle(1, 0); // one already played
        apply_partial_refund(&mut t, &partial(&["P0", "P1"]), "staff-1", 1).unwrap();
        assert!(t.player_status.waiting >= 0);
        assert!(t.player_status.is_consistent());
        assert!(t.is_refunded);
    }

    #[test]
    fn refund_amount_override_must_be_a_valid_money_value() {
        let mut t = test_ticket(2, 200.0);
        let mut req = RefundRequest {
            reason: "rain".into(),
            amount: Some(f64::NAN),
            method: None,
            reference: None,
            players: None,
        };
        assert!(matches!(
            apply_full_refund(&mut t, &req, "s", 1).unwrap_err(),
            AppError::Validation(_)
        ));
        req.amount = Some(-5.0);
        assert!(matches!(
            apply_full_refund(&mut t, &req, "s", 1).unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(!t.is_refunded);

        let mut preq = partial(&["P0"]);
        preq.amount = Some(f64::INFINITY);
        assert!(matches!(
            apply_partial_refund(&mut t, &preq, "s", 1).unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn partial_refund_requires_players_and_reason() {
        let mut t = test_ticket(2, 200.0);
        assert!(apply_partial_refund(&mut t, &partial(&[]), "s", 1).is_err());
        let mut req = partial(&["P0"]);
        req.reason = "  ".into();
        assert!(apply_partial_refund(&mut t, &req, "s", 1).is_err());
    }
}
