//! Entity models and request payloads

pub mod ticket;

pub use ticket::{
    ExtraTimeAdd, ExtraTimeEntry, ExtraTimeSummary, GroupInfo, ParseTicketStatusError,
    PartialRefundRequest, PlayerStatus, RefundRequest, Ticket, TicketCreate, TicketStatus,
    TicketStatusUpdate,
};
