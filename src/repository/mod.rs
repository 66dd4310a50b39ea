// ==========================================
// 口试时段排程系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 仓储借用 &Connection, 事务边界由调用方控制
// ==========================================

pub mod error;
pub mod exam_slot_repo;
pub mod history_repo;
mod row_codec;
pub mod section_repo;
pub mod student_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use exam_slot_repo::{ExamSlotRepository, SlotWrite};
pub use history_repo::ExamSlotHistoryRepository;
pub use section_repo::SectionRepository;
pub use student_repo::StudentRepository;
