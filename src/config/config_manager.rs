// ==========================================
// 口试时段排程系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// 输出: 不可变 ScheduleConfig
// ==========================================

use crate::config::schedule_config::{parse_weekday, ConfigError, ScheduleConfig};
use crate::db::open_sqlite_connection;
use crate::domain::clock::{parse_date, parse_time};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

impl From<rusqlite::Error> for ConfigError {
    fn from(err: rusqlite::Error) -> Self {
        ConfigError::ReadError(err.to_string())
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ConfigError> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::ReadError(format!("锁获取失败: {}", e)))
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.get_conn()?;
        read_value(&conn, key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.get_conn()?;
        write_value(&conn, key, value)?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 排程运行日志中记录当次使用的配置
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&config_map).map_err(|e| ConfigError::ReadError(e.to_string()))
    }

    /// 加载排程配置
    ///
    /// # 规则
    /// - 缺失项使用默认值
    /// - 标量项格式错误 → ConfigError (指明 key)
    /// - exam_day 无法识别 → 回退 friday 并告警
    /// - exam_dates JSON 格式错误 → 视为空并告警
    pub fn load_schedule_config(&self) -> Result<ScheduleConfig, ConfigError> {
        let conn = self.get_conn()?;
        load_from_connection(&conn)
    }
}

/// 从连接加载排程配置（供事务内复用）
pub fn load_from_connection(conn: &Connection) -> Result<ScheduleConfig, ConfigError> {
    let defaults = ScheduleConfig::default();
    let mut config = defaults.clone();

    if let Some(raw) = read_value(conn, config_keys::EXAM_DAY)? {
        config.exam_day = parse_weekday(&raw).unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::EXAM_DAY,
                raw_value = %raw,
                "考试星期无法识别，回退为 friday"
            );
            defaults.exam_day
        });
    }

    if let Some(raw) = read_value(conn, config_keys::EXAM_START_TIME)? {
        config.exam_start_time =
            parse_time(&raw).map_err(|e| invalid(config_keys::EXAM_START_TIME, &raw, e))?;
    }
    if let Some(raw) = read_value(conn, config_keys::EXAM_END_TIME)? {
        config.exam_end_time =
            parse_time(&raw).map_err(|e| invalid(config_keys::EXAM_END_TIME, &raw, e))?;
    }

    if let Some(raw) = read_value(conn, config_keys::EXAM_DURATION_MINUTES)? {
        let minutes = raw
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid(config_keys::EXAM_DURATION_MINUTES, &raw, e))?;
        if minutes <= 0 {
            return Err(invalid(config_keys::EXAM_DURATION_MINUTES, &raw, "必须大于0"));
        }
        config.exam_duration_minutes = minutes;
    }
    if let Some(raw) = read_value(conn, config_keys::EXAM_BUFFER_MINUTES)? {
        let minutes = raw
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid(config_keys::EXAM_BUFFER_MINUTES, &raw, e))?;
        if minutes < 0 {
            return Err(invalid(config_keys::EXAM_BUFFER_MINUTES, &raw, "不能为负数"));
        }
        config.exam_buffer_minutes = minutes;
    }

    if let Some(raw) = read_value(conn, config_keys::QUARTER_START_DATE)? {
        config.quarter_start_date =
            parse_date(&raw).map_err(|e| invalid(config_keys::QUARTER_START_DATE, &raw, e))?;
    }

    if let Some(raw) = read_value(conn, config_keys::TOTAL_EXAMS)? {
        let total = raw
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(config_keys::TOTAL_EXAMS, &raw, e))?;
        if total == 0 {
            return Err(invalid(config_keys::TOTAL_EXAMS, &raw, "必须大于0"));
        }
        config.total_exams = total;
    }

    if let Some(raw) = read_value(conn, config_keys::BALANCED_TA_SCHEDULING)? {
        config.balanced_ta_scheduling = raw.trim().eq_ignore_ascii_case("true");
    }

    if let Some(raw) = read_value(conn, config_keys::EXAM_DATES)? {
        config.exam_dates = parse_exam_dates(&raw);
    }

    Ok(config)
}

/// 解析日期覆写表 (JSON 对象, 值为字符串)
pub fn parse_exam_dates(raw: &str) -> BTreeMap<String, String> {
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str::<BTreeMap<String, String>>(raw).unwrap_or_else(|e| {
        tracing::warn!(
            config_key = config_keys::EXAM_DATES,
            raw_value = %raw,
            error = %e,
            "考试日期覆写配置格式错误，使用空配置"
        );
        BTreeMap::new()
    })
}

/// 读取单个配置值（scope_id='global'）
pub fn read_value(conn: &Connection, key: &str) -> Result<Option<String>, ConfigError> {
    let value = conn
        .query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

/// 写入单个配置值（scope_id='global'）
pub fn write_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
         ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )
}

fn invalid(key: &str, value: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 时间窗
    pub const EXAM_DAY: &str = "exam_day";
    pub const EXAM_START_TIME: &str = "exam_start_time";
    pub const EXAM_END_TIME: &str = "exam_end_time";
    pub const EXAM_DURATION_MINUTES: &str = "exam_duration_minutes";
    pub const EXAM_BUFFER_MINUTES: &str = "exam_buffer_minutes";

    // 学期
    pub const QUARTER_START_DATE: &str = "quarter_start_date";
    pub const TOTAL_EXAMS: &str = "total_exams";

    // 分配模式
    pub const BALANCED_TA_SCHEDULING: &str = "balanced_ta_scheduling";

    // 日期覆写 (JSON)
    pub const EXAM_DATES: &str = "exam_dates";
}
