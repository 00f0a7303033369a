//! Rink Edge Server - 滑冰/游乐场馆票务后端
//!
//! # 架构概述
//!
//! 本模块是票务引擎的主入口，提供以下核心功能：
//!
//! - **票务引擎** (`tickets`): 创建 / 加时 / 退款 / 过期扫描
//! - **数据库** (`db`): SQLite 存储与 ticket repository
//! - **身份** (`auth`): 网关身份提取与角色闸门
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! rink-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── auth/          # 身份提取、角色闸门
//! ├── api/           # HTTP 路由和处理器
//! ├── tickets/       # 票务业务组件
//! ├── utils/         # 错误、日志、时间、验证
//! └── db/            # 数据库层
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod tickets;
pub mod utils;

// Re-export 公共类型
pub use auth::CurrentUser;
pub use core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境: dotenv + 日志
pub fn setup_environment() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());

    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
    ____  _       __
   / __ \(_)___  / /__
  / /_/ / / __ \/ //_/
 / _, _/ / / / / ,<
/_/ |_/_/_/ /_/_/|_|
    ______    __
   / ____/___/ /___ ____
  / __/ / __  / __ `/ _ \
 / /___/ /_/ / /_/ /  __/
/_____/\__,_/\__, /\___/
            /____/
    "#
    );
}
