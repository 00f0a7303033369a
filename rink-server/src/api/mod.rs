//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查 (公共)
//! - [`tickets`] - 票务接口 (身份闸门)

pub mod health;
pub mod tickets;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// 组合所有路由并附加通用中间件
pub fn router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(tickets::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
