//! Shared types for the Rink edge server
//!
//! 服务端和客户端共用的实体模型与工具函数：
//!
//! - **models**: Ticket 实体与请求/响应 DTO
//! - **util**: 时间戳和 snowflake ID 生成

pub mod models;
pub mod util;

pub use models::{
    ExtraTimeAdd, ExtraTimeEntry, ExtraTimeSummary, GroupInfo, ParseTicketStatusError,
    PartialRefundRequest, PlayerStatus, RefundRequest, Ticket, TicketCreate, TicketStatus,
    TicketStatusUpdate,
};
