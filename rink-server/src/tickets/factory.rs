//! Ticket Factory
//!
//! 创建门票：票号分配 (碰撞重试)、费用计算、玩家计数初始化、
//! civil 时区时间戳。费用规则:
//! `total_fee = max(0, per_person_fee * total_players - discount)`，
//! 折扣吃掉全部费用时拒绝 (零费票不允许)。

use chrono_tz::Tz;
use rand::Rng;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::db::repository::{RepoError, RepoResult, ticket as ticket_repo};
use crate::tickets::money::{dec, to_money};
use crate::utils::time::{CalendarConverter, Clock, creation_stamp};
use crate::utils::validation::validate_money;
use crate::utils::{AppError, AppResult};
use shared::models::{PlayerStatus, Ticket, TicketCreate, TicketStatus};

/// Pre-check attempts before falling back to the timestamp-derived number
const ALLOC_ATTEMPTS: usize = 10;

/// Insert attempts around the UNIQUE constraint (collision = regenerate)
const INSERT_ATTEMPTS: usize = 3;

/// Split a comma-separated name string, trim each, drop empties.
pub fn parse_player_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Declared head-count wins when positive, else the parsed name count,
/// else 1. Never returns <= 0.
pub fn resolve_total_players(declared: Option<i64>, names: &[String]) -> i64 {
    match declared {
        Some(n) if n > 0 => n,
        _ if !names.is_empty() => names.len() as i64,
        _ => 1,
    }
}

/// `max(0, per_person_fee * total_players - discount)`, 2dp
pub fn compute_fee(per_person_fee: f64, total_players: i64, discount: f64) -> f64 {
    let total = dec(per_person_fee) * rust_decimal::Decimal::from(total_players) - dec(discount);
    to_money(total.max(rust_decimal::Decimal::ZERO))
}

/// Random 6-digit ticket number
pub fn generate_ticket_no<R: Rng>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000))
}

/// Deterministic fallback: last 8 digits of the creation timestamp
pub fn fallback_ticket_no(now_millis: i64) -> String {
    format!("{:08}", now_millis.rem_euclid(100_000_000))
}

/// Allocate a ticket number: bounded existence-checked attempts, then the
/// deterministic fallback. Never errors on exhaustion.
///
/// `next` yields candidate numbers; production passes a thread-rng-backed
/// closure, tests pass a scripted sequence.
pub async fn allocate_ticket_no(
    pool: &SqlitePool,
    mut next: impl FnMut() -> String + Send,
    fallback: String,
) -> RepoResult<String> {
    for _ in 0..ALLOC_ATTEMPTS {
        let candidate = next();
        if !ticket_repo::ticket_no_exists(pool, &candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(ticket_no = %candidate, "Ticket number collision, regenerating");
    }
    tracing::warn!(
        attempts = ALLOC_ATTEMPTS,
        "Ticket number attempts exhausted, using timestamp fallback"
    );
    Ok(fallback)
}

/// Create and persist a ticket.
///
/// The existence pre-check is not atomic with the insert, so a UNIQUE
/// violation on insert is treated as one more collision signal: regenerate
/// and retry with a short incremental backoff; the final attempt uses the
/// timestamp fallback.
pub async fn create_ticket(
    pool: &SqlitePool,
    clock: &dyn Clock,
    calendar: &dyn CalendarConverter,
    tz: Tz,
    payload: TicketCreate,
    actor: &str,
) -> AppResult<Ticket> {
    if !payload.per_person_fee.is_finite() || payload.per_person_fee <= 0.0 {
        return Err(AppError::validation(format!(
            "per_person_fee must be a positive number, got {}",
            payload.per_person_fee
        )));
    }
    let discount = payload.discount.unwrap_or(0.0);
    validate_money(discount, "discount")?;

    let mut player_names = parse_player_names(payload.player_names.as_deref().unwrap_or(""));
    let customer_name = payload.customer_name.trim().to_string();
    if customer_name.is_empty() && player_names.is_empty() {
        return Err(AppError::validation(
            "customer_name or player_names is required",
        ));
    }
    let customer_name = if customer_name.is_empty() {
        player_names[0].clone()
    } else {
        customer_name
    };
    if player_names.is_empty() {
        player_names.push(customer_name.clone());
    }

    let total_players = resolve_total_players(payload.number_of_people, &player_names);
    let total_fee = compute_fee(payload.per_person_fee, total_players, discount);
    if total_fee <= 0.0 {
        // Policy: a discount that covers the entire fee is a caller error
        return Err(AppError::validation(format!(
            "discount {discount} covers the entire fee; zero-fee tickets are not allowed"
        )));
    }

    let stamp = creation_stamp(clock.now_utc(), tz, calendar);

    let mut ticket = Ticket {
        id: None,
        ticket_no: String::new(),
        customer_name,
        player_names,
        group_info: payload.group_info,
        per_person_fee: payload.per_person_fee,
        discount,
        total_fee,
        status: TicketStatus::Booked,
        player_status: PlayerStatus::new(total_players),
        is_refunded: false,
        refund_reason: None,
        refund_amount: 0.0,
        refund_method: None,
        refund_reference: None,
        refunded_by: None,
        refunded_players: Vec::new(),
        extra_entries: Vec::new(),
        total_extra_minutes: 0,
        branch_id: payload.branch_id,
        created_by: actor.to_string(),
        created_at: stamp.created_at,
        calendar_date: stamp.calendar_date,
        entry_time: stamp.entry_time,
        updated_at: stamp.created_at,
    };

    for attempt in 0..INSERT_ATTEMPTS {
        ticket.ticket_no = if attempt + 1 == INSERT_ATTEMPTS {
            fallback_ticket_no(clock.now_millis())
        } else {
            allocate_ticket_no(
                pool,
                || {
                    let mut rng = rand::thread_rng();
                    generate_ticket_no(&mut rng)
                },
                fallback_ticket_no(clock.now_millis()),
            )
            .await?
        };

        match ticket_repo::insert(pool, &ticket).await {
            Ok(created) => {
                tracing::info!(
                    ticket_no = %created.ticket_no,
                    customer = %created.customer_name,
                    players = created.player_status.total,
                    total_fee = created.total_fee,
                    "Ticket created"
                );
                return Ok(created);
            }
            Err(RepoError::Duplicate(_)) if attempt + 1 < INSERT_ATTEMPTS => {
                tracing::warn!(
                    ticket_no = %ticket.ticket_no,
                    attempt = attempt + 1,
                    "Ticket number collided on insert, retrying"
                );
                tokio::time::sleep(Duration::from_millis(20 * (attempt as u64 + 1))).await;
            }
            Err(RepoError::Database(msg)) if attempt + 1 < INSERT_ATTEMPTS => {
                tracing::warn!(
                    error = %msg,
                    attempt = attempt + 1,
                    "Transient store failure on ticket insert, retrying"
                );
                tokio::time::sleep(Duration::from_millis(20 * (attempt as u64 + 1))).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Unreachable: the final iteration either returns the ticket or the error
    Err(AppError::internal("ticket insert retries exhausted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parses_comma_separated_names() {
        assert_eq!(
            parse_player_names(" Asha ,Bikash,, ,Chandra "),
            vec!["Asha", "Bikash", "Chandra"]
        );
        assert!(parse_player_names("").is_empty());
        assert!(parse_player_names(" , ,").is_empty());
    }

    #[test]
    fn head_count_never_drops_to_zero() {
        let names = vec!["A".to_string(), "B".to_string()];
        assert_eq!(resolve_total_players(Some(5), &names), 5);
        assert_eq!(resolve_total_players(Some(0), &names), 2);
        assert_eq!(resolve_total_players(Some(-1), &[]), 1);
        assert_eq!(resolve_total_players(None, &[]), 1);
    }

    #[test]
    fn fee_is_clamped_at_zero() {
        assert_eq!(compute_fee(100.0, 3, 50.0), 250.0);
        assert_eq!(compute_fee(100.0, 1, 0.0), 100.0);
        assert_eq!(compute_fee(100.0, 2, 500.0), 0.0);
    }

    #[test]
    fn ticket_numbers_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let no = generate_ticket_no(&mut rng);
            assert_eq!(no.len(), 6);
            assert!(no.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn fallback_takes_last_eight_digits() {
        assert_eq!(fallback_ticket_no(1_712_345_678_901), "45678901");
        assert_eq!(fallback_ticket_no(42), "00000042");
    }
}
