use std::sync::Arc;

use sqlx::SqlitePool;

use crate::core::Config;
use crate::db::DbService;
use crate::utils::AppResult;
use crate::utils::time::{CalendarConverter, Clock, IsoCalendar, SystemClock};

/// 服务器状态 - 持有所有共享服务的引用
///
/// 使用 Arc 实现浅拷贝，每个请求 clone 的成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | pool | SQLite 连接池 |
/// | clock | 时间源 (测试时可替换为 FixedClock) |
/// | calendar | 第二历法转换 (票面日期) |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// SQLite 连接池
    pub pool: SqlitePool,
    /// 时间源
    pub clock: Arc<dyn Clock>,
    /// 第二历法转换
    pub calendar: Arc<dyn CalendarConverter>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 确保工作目录存在，打开数据库并应用迁移。
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let db_dir = format!("{}/database", config.work_dir);
        std::fs::create_dir_all(&db_dir).map_err(|e| {
            crate::utils::AppError::internal(format!(
                "Failed to create work dir {db_dir}: {e}"
            ))
        })?;

        let db = DbService::new(&config.db_path()).await?;
        Ok(Self::with_pool(config.clone(), db.pool))
    }

    /// 从现有连接池构造 (测试场景: 内存数据库)
    pub fn with_pool(config: Config, pool: SqlitePool) -> Self {
        Self {
            config,
            pool,
            clock: Arc::new(SystemClock),
            calendar: Arc::new(IsoCalendar),
        }
    }

    /// 替换时间源 (确定性测试)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
