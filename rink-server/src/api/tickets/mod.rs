//! Ticket API 模块 (票务)
//!
//! 所有路由都经过身份中间件 (admin / staff)。

mod handler;

use axum::{
    Router,
    middleware,
    routing::{get, post, put},
};

use crate::auth::identity_middleware;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest(
        "/api/tickets",
        routes().layer(middleware::from_fn(identity_middleware)),
    )
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/sweep", post(handler::sweep))
        .route("/number/{ticket_no}", get(handler::get_by_number))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/status", put(handler::update_status))
        .route(
            "/{id}/extra-time",
            get(handler::list_extra_time).post(handler::add_extra_time),
        )
        .route("/{id}/refund", post(handler::refund_full))
        .route("/{id}/refund/partial", post(handler::refund_partial))
}
