// ==========================================
// 口试时段排程系统 - 引擎层
// ==========================================
// 职责: 实现排程规则
// 红线: 除 ScheduleRegenerator 外, 引擎组件不访问数据库
// 红线: 所有未排结果必须输出 reason
// ==========================================

pub mod cohort;
pub mod constraint_evaluator;
pub mod date_resolver;
pub mod gap_filler;
pub mod load_balancer;
pub mod priority;
pub mod regenerator;
pub mod window_scheduler;

// 重导出核心引擎
pub use cohort::{AssignmentSource, CohortAssigner, ParityAssignment};
pub use constraint_evaluator::ConstraintEvaluator;
pub use date_resolver::{DateResolveError, DateResolver, ResolvedWeek};
pub use gap_filler::GapFiller;
pub use load_balancer::{LoadBalancer, SectionAssignment};
pub use priority::{PriorityGroup, PriorityOrderer};
pub use regenerator::{GenerationReport, ScheduleError, ScheduleRegenerator, ScheduleResult};
pub use window_scheduler::{SlotDecision, SlotOutcome, WindowPlan, WindowScheduler};
