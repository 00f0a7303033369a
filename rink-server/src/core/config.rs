use chrono_tz::Tz;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/rink | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | TIMEZONE | Asia/Kathmandu | 业务时区 (IANA 名称) |
/// | BASE_SESSION_MINUTES | 60 | 基础计时时长 (分钟) |
/// | SWEEP_INTERVAL_SECS | 0 | 后台过期扫描间隔 (0 = 关闭，仅按需) |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志文件目录 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/rink HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 业务时区 (所有业务时间戳锚定于此，与服务器本地时区无关)
    pub timezone: Tz,
    /// 基础计时时长 (分钟)，无加时分录的票超过它即过期
    pub base_session_minutes: i64,
    /// 后台过期扫描间隔 (秒)；0 表示只通过 /api/tickets/sweep 按需触发
    pub sweep_interval_secs: u64,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 日志级别
    pub log_level: String,
    /// 日志文件目录 (可选)
    pub log_dir: Option<String>,
}

/// The venue's civil zone in the original deployment (UTC+5:45)
const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Kathmandu;

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let timezone = match std::env::var("TIMEZONE") {
            Ok(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Invalid TIMEZONE '{}', falling back to {}",
                    name,
                    DEFAULT_TIMEZONE
                );
                DEFAULT_TIMEZONE
            }),
            Err(_) => DEFAULT_TIMEZONE,
        };

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/rink".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            timezone,
            base_session_minutes: std::env::var("BASE_SESSION_MINUTES")
                .ok()
                .and_then(|p| p.parse().ok())
                .filter(|m| *m > 0)
                .unwrap_or(crate::tickets::sweeper::DEFAULT_BASE_MINUTES),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 数据库文件路径
    pub fn db_path(&self) -> String {
        format!("{}/database/rink.db", self.work_dir)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
