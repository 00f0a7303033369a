//! Caller identity
//!
//! 认证在上游网关完成；这里只提取网关注入的身份头并做角色闸门。
//! 票务写操作仅限 admin / staff。
//!
//! | Header | 含义 |
//! |--------|------|
//! | X-Staff-Id | 员工 ID (必填) |
//! | X-Staff-Name | 显示名 (缺省为 ID) |
//! | X-Staff-Role | 角色 (必填: admin / staff / ...) |

use axum::{extract::Request, middleware::Next, response::Response};

use crate::utils::AppError;

/// Authenticated caller, attached as a request extension
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// 员工 ID
    pub id: String,
    /// 显示名 (用于分录 actor / 退款经手人)
    pub name: String,
    /// 角色名称
    pub role: String,
}

impl CurrentUser {
    /// Ticket-mutating operations are gated to these roles
    pub fn can_manage_tickets(&self) -> bool {
        matches!(self.role.as_str(), "admin" | "staff")
    }
}

fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Extract the gateway-supplied identity and enforce the role gate.
pub async fn identity_middleware(mut req: Request, next: Next) -> Result<Response, AppError> {
    let id = header(&req, "x-staff-id")
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)?;
    let role = header(&req, "x-staff-role")
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)?;
    let name = header(&req, "x-staff-name")
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());

    let user = CurrentUser { id, name, role };
    if !user.can_manage_tickets() {
        return Err(AppError::forbidden(format!(
            "role '{}' may not manage tickets",
            user.role
        )));
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gate_admits_admin_and_staff_only() {
        let mut user = CurrentUser {
            id: "e1".into(),
            name: "Asha".into(),
            role: "admin".into(),
        };
        assert!(user.can_manage_tickets());
        user.role = "staff".into();
        assert!(user.can_manage_tickets());
        user.role = "viewer".into();
        assert!(!user.can_manage_tickets());
    }
}
