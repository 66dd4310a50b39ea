// ==========================================
// 口试时段排程系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 口试时段自动分配 (锁定时段由人工控制)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排程规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ConstraintType, Parity, UnscheduledReason};

// 领域实体
pub use domain::{Constraint, ExamSlot, ExamSlotHistory, Section, SlotWindow, Student, TimeRange};

// 配置
pub use config::{ConfigManager, ScheduleConfig};

// 引擎
pub use engine::{
    CohortAssigner, ConstraintEvaluator, DateResolver, GapFiller, GenerationReport, LoadBalancer,
    PriorityOrderer, ScheduleRegenerator, WindowScheduler,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "口试时段排程系统";
