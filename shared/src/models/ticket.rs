//! Ticket Model (场次门票)
//!
//! 一张 Ticket 对应一次入场（一个或多个玩家）。四个业务组件
//! (factory / ledger / refund / sweeper) 都只操作这一个实体。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ticket lifecycle status
///
/// `Expired` is a first-class member: a booked/playing ticket that aged
/// past its allotted time is administratively closed, distinct from
/// `Completed` and `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Booked,
    Playing,
    Completed,
    Cancelled,
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Booked => "BOOKED",
            TicketStatus::Playing => "PLAYING",
            TicketStatus::Completed => "COMPLETED",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Expired => "EXPIRED",
        }
    }

    /// 是否终态 (不可再变更)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Completed | TicketStatus::Cancelled | TicketStatus::Expired
        )
    }

    /// 是否活跃 (sweeper 只扫描活跃票)
    pub fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Booked | TicketStatus::Playing)
    }

    /// Whether an operator-driven transition `self -> to` is allowed.
    ///
    /// `Expired` is only ever reached through the sweeper, never by hand.
    pub fn can_transition(&self, to: TicketStatus) -> bool {
        match (self, to) {
            (TicketStatus::Booked, TicketStatus::Playing) => true,
            (TicketStatus::Booked, TicketStatus::Completed) => true,
            (TicketStatus::Booked, TicketStatus::Cancelled) => true,
            (TicketStatus::Playing, TicketStatus::Completed) => true,
            (TicketStatus::Playing, TicketStatus::Cancelled) => true,
            _ => false,
        }
    }
}

/// 未知状态字符串 (数据库或客户端传入)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status: {0}")]
pub struct ParseTicketStatusError(pub String);

impl FromStr for TicketStatus {
    type Err = ParseTicketStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(TicketStatus::Booked),
            "PLAYING" => Ok(TicketStatus::Playing),
            "COMPLETED" => Ok(TicketStatus::Completed),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "EXPIRED" => Ok(TicketStatus::Expired),
            other => Err(ParseTicketStatusError(other.to_string())),
        }
    }
}

/// Player-status counters
///
/// Invariant: `played + waiting + refunded == total` after every mutation.
/// Use [`PlayerStatus::settle`] instead of writing the fields directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub total: i64,
    pub played: i64,
    pub waiting: i64,
    pub refunded: i64,
}

impl PlayerStatus {
    /// Initial counters for a freshly created ticket: everyone waiting.
    pub fn new(total: i64) -> Self {
        Self {
            total,
            played: 0,
            waiting: total,
            refunded: 0,
        }
    }

    /// Re-balance the counters from new waiting/refunded values.
    ///
    /// `refunded` is clamped to `total`; `played` absorbs the remainder.
    /// If the requested waiting count would push the sum past `total`,
    /// waiting is reduced so the invariant holds.
    pub fn settle(&mut self, waiting: i64, refunded: i64) {
        self.refunded = refunded.clamp(0, self.total);
        self.waiting = waiting.max(0);
        let mut played = self.total - self.refunded - self.waiting;
        if played < 0 {
            self.waiting = (self.waiting + played).max(0);
            played = self.total - self.refunded - self.waiting;
        }
        self.played = played;
    }

    /// Invariant check, used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        self.played >= 0
            && self.waiting >= 0
            && self.refunded >= 0
            && self.played + self.waiting + self.refunded == self.total
    }
}

/// One extra-time grant, appended by the ledger. Append-only, ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraTimeEntry {
    /// Granted minutes (> 0)
    pub minutes: i64,
    /// Net charge for this grant (charge - discount, never negative)
    pub amount: f64,
    /// Display label, defaults to "{minutes} minutes"
    pub label: String,
    /// Free-text notes
    pub note: Option<String>,
    /// Grant instant (Unix millis)
    pub created_at: i64,
    /// Staff member who granted it
    pub actor: String,
}

/// Optional group-booking metadata. Opaque to all calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: Option<String>,
    pub number: Option<String>,
    pub price: Option<f64>,
    pub total_members: Option<i64>,
}

/// Ticket record - a single booking/session at the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Document id (snowflake), distinct from the human-facing number
    pub id: Option<i64>,
    /// Human-facing short numeric identifier, unique
    pub ticket_no: String,
    /// Customer display name
    pub customer_name: String,
    /// Individual player names (defaults to [customer_name])
    pub player_names: Vec<String>,
    /// Group-booking metadata
    pub group_info: Option<GroupInfo>,
    /// Fee per player (> 0)
    pub per_person_fee: f64,
    /// Discount applied at creation (>= 0)
    pub discount: f64,
    /// Payable total: creation fee plus extra-time charges.
    /// Only the extra-time ledger raises it; refunds accumulate in
    /// `refund_amount` and never decrement it.
    pub total_fee: f64,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Player counters (played / waiting / refunded)
    pub player_status: PlayerStatus,
    /// True once the ticket is fully refunded
    #[serde(default)]
    pub is_refunded: bool,
    pub refund_reason: Option<String>,
    /// Cumulative refunded amount across full and partial refunds
    #[serde(default)]
    pub refund_amount: f64,
    pub refund_method: Option<String>,
    pub refund_reference: Option<String>,
    pub refunded_by: Option<String>,
    /// Cumulative list of specifically-refunded player names
    #[serde(default)]
    pub refunded_players: Vec<String>,
    /// Extra-time ledger, append-only in arrival order
    #[serde(default)]
    pub extra_entries: Vec<ExtraTimeEntry>,
    /// Denormalized sum of entry minutes, recomputed on every mutation
    #[serde(default)]
    pub total_extra_minutes: i64,
    /// Opaque branch reference
    pub branch_id: Option<String>,
    /// Staff member who sold the ticket
    pub created_by: String,
    /// Creation instant (Unix millis)
    pub created_at: i64,
    /// Creation day rendered in the secondary calendar
    pub calendar_date: String,
    /// Wall-clock entry time, HH:mm:ss in the venue's civil zone
    pub entry_time: String,
    /// Last mutation instant (Unix millis) - optimistic-locking token
    pub updated_at: i64,
}

// =============================================================================
// Request payloads
// =============================================================================

/// Create ticket payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCreate {
    /// Customer display name
    pub customer_name: String,
    /// Comma-separated player names ("Asha, Bikash, ...")
    pub player_names: Option<String>,
    /// Fee per player (> 0)
    pub per_person_fee: f64,
    /// Discount (default 0)
    pub discount: Option<f64>,
    /// Declared head-count; overrides the parsed name count when positive
    pub number_of_people: Option<i64>,
    /// Group-booking metadata
    pub group_info: Option<GroupInfo>,
    /// Opaque branch reference
    pub branch_id: Option<String>,
}

/// Add extra time payload (ledger append)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTimeAdd {
    /// Granted minutes (> 0)
    pub minutes: i64,
    /// Charge for the grant (> 0)
    pub charge: f64,
    /// Discount against the charge (default 0)
    pub discount: Option<f64>,
    /// Display label; defaults to "{minutes} minutes"
    pub label: Option<String>,
    /// Free-text notes
    pub note: Option<String>,
}

/// Full refund payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Refund reason (required)
    pub reason: String,
    /// Explicit amount override; defaults to the ticket's total fee
    pub amount: Option<f64>,
    pub method: Option<String>,
    pub reference: Option<String>,
    /// Specifically-refunded player names; absent means "all players"
    pub players: Option<Vec<String>>,
}

/// Partial refund payload (per-player proration)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialRefundRequest {
    /// Refund reason (required)
    pub reason: String,
    /// Players to refund in this call (non-empty)
    pub players: Vec<String>,
    /// Explicit amount override; defaults to players x per-player fee
    pub amount: Option<f64>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

/// Explicit status transition payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusUpdate {
    pub status: TicketStatus,
}

/// Ledger read-back: ordered entries plus recomputed totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTimeSummary {
    pub entries: Vec<ExtraTimeEntry>,
    pub total_extra_minutes: i64,
    pub total_fee: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TicketStatus::Booked,
            TicketStatus::Playing,
            TicketStatus::Completed,
            TicketStatus::Cancelled,
            TicketStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<TicketStatus>().unwrap(), s);
        }
        let err = "BORKED".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown ticket status: BORKED");
    }

    #[test]
    fn expired_is_never_an_operator_transition() {
        assert!(!TicketStatus::Booked.can_transition(TicketStatus::Expired));
        assert!(!TicketStatus::Playing.can_transition(TicketStatus::Expired));
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for s in [
            TicketStatus::Completed,
            TicketStatus::Cancelled,
            TicketStatus::Expired,
        ] {
            assert!(s.is_terminal());
            assert!(!s.can_transition(TicketStatus::Playing));
            assert!(!s.can_transition(TicketStatus::Completed));
        }
    }

    #[test]
    fn settle_holds_invariant() {
        let mut ps = PlayerStatus::new(3);
        assert!(ps.is_consistent());

        ps.settle(1, 2);
        assert!(ps.is_consistent());
        assert_eq!(ps.played, 0);

        // Refunded clamped to total
        let mut ps = PlayerStatus::new(2);
        ps.settle(0, 5);
        assert!(ps.is_consistent());
        assert_eq!(ps.refunded, 2);

        // Waiting reduced when the sum would overflow total
        let mut ps = PlayerStatus::new(3);
        ps.settle(3, 2);
        assert!(ps.is_consistent());
        assert_eq!(ps.refunded, 2);
        assert_eq!(ps.waiting, 1);
    }
}
