// ==========================================
// 口试时段排程系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod clock;
pub mod exam_slot;
pub mod student;
pub mod types;

// 重导出核心类型
pub use clock::TimeRange;
pub use exam_slot::{ExamSlot, ExamSlotHistory, SlotDraft, SlotWindow};
pub use student::{Constraint, ConstraintRule, Section, Student};
pub use types::{ConstraintType, Parity, UnscheduledReason};
