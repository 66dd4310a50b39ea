// ==========================================
// 口试时段排程系统 - 排程重建器
// ==========================================
// 职责: 排程入口编排 (唯一访问仓储的引擎组件)
// 入口:
// - generate_all(start)                    全量重建
// - generate_for_section(section, start)   单分组重建
// - regenerate_for_student(student, start) 单人空档重排
// - apply_exam_date_overrides(mapping)     日期覆写导入
// ==========================================
// 事务: 每次入口调用一个事务, 全部提交或全部回滚
// 红线: 锁定时段永不改写
// 红线: 写入前先修复重复行
// ==========================================

use crate::config::config_manager::{load_from_connection, write_value};
use crate::config::{config_keys, ConfigError, ScheduleConfig};
use crate::domain::clock::{format_date, parse_date, TimeRange};
use crate::domain::exam_slot::{ExamSlot, SlotDraft, SlotWindow};
use crate::domain::student::{Section, Student};
use crate::domain::types::Parity;
use crate::engine::cohort::CohortAssigner;
use crate::engine::date_resolver::DateResolver;
use crate::engine::gap_filler::GapFiller;
use crate::engine::load_balancer::LoadBalancer;
use crate::engine::priority::{window_seed, PriorityOrderer};
use crate::engine::window_scheduler::{SlotDecision, WindowScheduler};
use crate::repository::{
    ExamSlotRepository, RepositoryError, SectionRepository, SlotWrite, StudentRepository,
};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// 历史记录原因
pub const REASON_GENERATED: &str = "Schedule generated";
pub const REASON_STUDENT_REGENERATED: &str = "Student regenerated";
pub const REASON_DATE_OVERRIDE: &str = "Exam date override";

const OVERRIDE_SAVEPOINT: &str = "exam_date_override";

// ==========================================
// ScheduleError - 引擎层错误
// ==========================================
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(err: rusqlite::Error) -> Self {
        ScheduleError::Repository(err.into())
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

// ==========================================
// GenerationReport - 运行报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,            // 运行ID (uuid v4)
    pub success: bool,             // 无错误且事务已提交
    pub errors: Vec<String>,       // 人可读错误
    pub scheduled_count: usize,    // 本次写入的已排定时段
    pub unscheduled_count: usize,  // 本次写入的未排定时段
    pub kept_locked_count: usize,  // 跳过的锁定时段
    pub cleared_count: usize,      // 清理的过期时段
    pub duplicates_removed: usize, // 修复删除的重复行
    pub elapsed_ms: i64,           // 耗时(毫秒)
}

impl GenerationReport {
    fn failed(run_id: String, message: String, elapsed_ms: i64) -> Self {
        Self {
            run_id,
            success: false,
            errors: vec![message],
            scheduled_count: 0,
            unscheduled_count: 0,
            kept_locked_count: 0,
            cleared_count: 0,
            duplicates_removed: 0,
            elapsed_ms,
        }
    }
}

// ==========================================
// RunState - 单次运行的累积状态
// ==========================================
struct RunState {
    config: ScheduleConfig,
    resolver: DateResolver,
    start_exam_index: u32,
    errors: Vec<String>,
    touched: HashSet<(i64, u32)>,
    scheduled_count: usize,
    unscheduled_count: usize,
    kept_locked_count: usize,
    cleared_count: usize,
    duplicates_removed: usize,
}

impl RunState {
    fn new(config: ScheduleConfig, start_exam_index: u32) -> Self {
        Self {
            resolver: DateResolver::new(&config),
            config,
            start_exam_index: start_exam_index.max(1),
            errors: Vec::new(),
            touched: HashSet::new(),
            scheduled_count: 0,
            unscheduled_count: 0,
            kept_locked_count: 0,
            cleared_count: 0,
            duplicates_removed: 0,
        }
    }

    fn exam_indices(&self) -> std::ops::RangeInclusive<u32> {
        self.config.exam_indices_from(self.start_exam_index)
    }

    fn window_bounds(&self, section: &Section) -> (NaiveTime, NaiveTime) {
        (
            section.window_start.unwrap_or(self.config.exam_start_time),
            section.window_end.unwrap_or(self.config.exam_end_time),
        )
    }

    fn slot_window(&self, section: &Section, exam_index: u32, parity: Parity) -> SlotWindow {
        let resolved = self.resolver.resolve(exam_index, parity);
        let (start, end) = self.window_bounds(section);
        SlotWindow {
            section_id: section.id,
            exam_index,
            week_index: resolved.week_index,
            date: resolved.date,
            start,
            end,
        }
    }

    /// 写入单条时段; 校验错误记入报告, 其他错误中止运行
    fn write(
        &mut self,
        conn: &Connection,
        student: &Student,
        draft: &SlotDraft,
        reason: &str,
    ) -> ScheduleResult<()> {
        match ExamSlotRepository::new(conn).upsert(draft, self.config.total_exams, reason) {
            Ok(SlotWrite::LockedUntouched(_)) => {
                self.kept_locked_count += 1;
            }
            Ok(_) => {
                self.touched.insert((draft.student_id, draft.exam_index));
                if draft.is_scheduled {
                    self.scheduled_count += 1;
                } else {
                    self.unscheduled_count += 1;
                }
            }
            Err(e) if e.is_record_level() => {
                tracing::warn!(
                    student_id = student.id,
                    exam_index = draft.exam_index,
                    error = %e,
                    "时段写入校验失败，继续运行"
                );
                self.errors
                    .push(format!("Error creating slot for {}: {}", student.full_name, e));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn into_report(self, run_id: String, elapsed_ms: i64) -> GenerationReport {
        GenerationReport {
            run_id,
            success: self.errors.is_empty(),
            errors: self.errors,
            scheduled_count: self.scheduled_count,
            unscheduled_count: self.unscheduled_count,
            kept_locked_count: self.kept_locked_count,
            cleared_count: self.cleared_count,
            duplicates_removed: self.duplicates_removed,
            elapsed_ms,
        }
    }
}

// ==========================================
// ScheduleRegenerator - 排程重建器
// ==========================================
pub struct ScheduleRegenerator {
    conn: Arc<Mutex<Connection>>,
    orderer: PriorityOrderer,
    cohort: CohortAssigner,
    balancer: LoadBalancer,
}

impl ScheduleRegenerator {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            orderer: PriorityOrderer::new(),
            cohort: CohortAssigner::new(),
            balancer: LoadBalancer::new(),
        }
    }

    // ==========================================
    // 入口
    // ==========================================

    /// 全量重建 (start_exam_index 起的全部轮次)
    #[instrument(skip(self))]
    pub fn generate_all(&self, start_exam_index: u32) -> GenerationReport {
        self.execute("generate_all", start_exam_index, |conn, run| {
            run.duplicates_removed += ExamSlotRepository::new(conn).collapse_duplicates(None)?;

            let sections = SectionRepository::new(conn).find_active()?;
            if run.config.balanced_ta_scheduling {
                if !self.generate_balanced(conn, run)? {
                    return Ok(());
                }
            } else {
                for section in &sections {
                    self.generate_section(conn, run, section)?;
                }
            }

            let scope: Vec<i64> = sections.iter().map(|s| s.id).collect();
            self.clear_stale(conn, run, &scope)
        })
    }

    /// 单分组重建
    #[instrument(skip(self))]
    pub fn generate_for_section(&self, section_id: i64, start_exam_index: u32) -> GenerationReport {
        self.execute("generate_for_section", start_exam_index, |conn, run| {
            let section = SectionRepository::new(conn).get(section_id)?;
            let student_ids: HashSet<i64> = StudentRepository::new(conn)
                .find_active_by_section(section_id)?
                .iter()
                .map(|s| s.id)
                .collect();
            run.duplicates_removed +=
                ExamSlotRepository::new(conn).collapse_duplicates(Some(&student_ids))?;

            self.generate_section(conn, run, &section)?;
            self.clear_stale(conn, run, &[section_id])
        })
    }

    /// 单人重排 (空档优先)
    ///
    /// # 返回
    /// 事务提交且无校验错误时为 true
    pub fn regenerate_for_student(&self, student_id: i64, start_exam_index: u32) -> bool {
        self.regenerate_for_student_report(student_id, start_exam_index)
            .success
    }

    /// 单人重排, 返回完整报告
    #[instrument(skip(self))]
    pub fn regenerate_for_student_report(
        &self,
        student_id: i64,
        start_exam_index: u32,
    ) -> GenerationReport {
        self.execute("regenerate_for_student", start_exam_index, |conn, run| {
            self.regenerate_student(conn, run, student_id)
        })
    }

    /// 导入日期覆写
    ///
    /// # 参数
    /// - `mapping`: "{exam}_{parity}" -> "YYYY-MM-DD"
    ///
    /// # 返回
    /// 改期的未锁定时段数
    ///
    /// # 说明
    /// - 键或日期无效的条目跳过并记录日志
    /// - 每个条目在独立 SAVEPOINT 内执行, 失败只回滚该条目
    /// - 合并后的覆写表在同一事务内写回 exam_dates
    #[instrument(skip(self, mapping), fields(entries = mapping.len()))]
    pub fn apply_exam_date_overrides(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> ScheduleResult<usize> {
        self.run_in_transaction(|conn| {
            let config = load_from_connection(conn)?;
            let resolver = DateResolver::new(&config);
            let slots = ExamSlotRepository::new(conn);
            let mut merged = config.exam_dates.clone();
            let mut updated = 0;

            for (key, value) in mapping {
                if value.trim().is_empty() {
                    continue;
                }
                let (exam_index, parity) = match DateResolver::parse_override_key(key) {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "跳过无效的覆写键");
                        continue;
                    }
                };
                let date = match parse_date(value) {
                    Ok(date) => date,
                    Err(e) => {
                        tracing::error!(key = %key, value = %value, error = %e, "跳过无法解析的覆写日期");
                        continue;
                    }
                };
                let week_index = match resolver.resolve_week(date) {
                    Ok(week) => week,
                    Err(e) => {
                        tracing::error!(key = %key, value = %value, error = %e, "跳过无法映射到周次的覆写日期");
                        continue;
                    }
                };

                conn.execute_batch(&format!("SAVEPOINT {}", OVERRIDE_SAVEPOINT))?;
                match slots.redate_unlocked(exam_index, parity, date, week_index, REASON_DATE_OVERRIDE)
                {
                    Ok(count) => {
                        conn.execute_batch(&format!("RELEASE {}", OVERRIDE_SAVEPOINT))?;
                        merged.insert(key.clone(), format_date(date));
                        updated += count;
                        tracing::info!(
                            exam_index,
                            parity = %parity,
                            date = %format_date(date),
                            week_index,
                            updated = count,
                            "日期覆写已应用"
                        );
                    }
                    Err(e) => {
                        conn.execute_batch(&format!(
                            "ROLLBACK TO {0}; RELEASE {0}",
                            OVERRIDE_SAVEPOINT
                        ))?;
                        tracing::error!(key = %key, error = %e, "日期覆写失败，已回滚该条目");
                    }
                }
            }

            let serialized = serde_json::to_string(&merged)
                .map_err(|e| ConfigError::InvalidValue {
                    key: config_keys::EXAM_DATES.to_string(),
                    value: format!("{:?}", merged),
                    message: e.to_string(),
                })?;
            write_value(conn, config_keys::EXAM_DATES, &serialized)?;
            Ok(updated)
        })
    }

    // ==========================================
    // 全量路径
    // ==========================================

    fn generate_section(
        &self,
        conn: &Connection,
        run: &mut RunState,
        section: &Section,
    ) -> ScheduleResult<()> {
        let mut students = StudentRepository::new(conn).find_active_by_section(section.id)?;
        self.ensure_parity(conn, &mut students)?;

        for exam_index in run.exam_indices() {
            for parity in [Parity::Odd, Parity::Even] {
                let window = run.slot_window(section, exam_index, parity);
                let group: Vec<&Student> = students
                    .iter()
                    .filter(|s| s.parity == Some(parity))
                    .collect();
                let ordered = self
                    .orderer
                    .order(&group, window_seed(exam_index, window.week_index));
                self.schedule_window(conn, run, &window, &ordered)?;
            }
        }
        Ok(())
    }

    /// 均衡模式; 没有可用分组时返回 false
    fn generate_balanced(&self, conn: &Connection, run: &mut RunState) -> ScheduleResult<bool> {
        let sections = SectionRepository::new(conn).find_active_with_proctor()?;
        if sections.is_empty() {
            tracing::error!("没有配置监考助教的分组，无法均衡排程");
            run.errors.push(
                "No sections with assigned proctors found. Cannot generate balanced schedule."
                    .to_string(),
            );
            return Ok(false);
        }
        let by_id: HashMap<i64, &Section> = sections.iter().map(|s| (s.id, s)).collect();

        let mut students = StudentRepository::new(conn).find_all_active()?;
        self.ensure_parity(conn, &mut students)?;

        for exam_index in run.exam_indices() {
            for parity in [Parity::Odd, Parity::Even] {
                let group: Vec<&Student> = students
                    .iter()
                    .filter(|s| s.parity == Some(parity))
                    .collect();
                let resolved = run.resolver.resolve(exam_index, parity);
                let assignments =
                    self.balancer
                        .distribute(&group, &sections, exam_index, resolved.week_index);

                for assignment in assignments {
                    let Some(section) = by_id.get(&assignment.section_id) else {
                        continue;
                    };
                    let window = run.slot_window(section, exam_index, parity);
                    self.schedule_window(conn, run, &window, &assignment.students)?;
                }
            }
        }
        Ok(true)
    }

    /// 单个时间窗: 加载锁定占用 → 游标排程 → 写库
    fn schedule_window(
        &self,
        conn: &Connection,
        run: &mut RunState,
        window: &SlotWindow,
        ordered: &[&Student],
    ) -> ScheduleResult<()> {
        let slots = ExamSlotRepository::new(conn);

        // 全量路径只把锁定时段交给排程器, 其余一律重新放置
        let mut locked: HashMap<i64, ExamSlot> = HashMap::new();
        for student in ordered {
            if let Some(slot) = slots.find_by_student_exam(student.id, window.exam_index)? {
                if slot.is_locked {
                    locked.insert(student.id, slot);
                }
            }
        }
        let reserved: Vec<TimeRange> = slots
            .find_locked_in_window(window.section_id, window.exam_index, window.week_index)?
            .iter()
            .filter_map(ExamSlot::time_range)
            .collect();

        let scheduler = WindowScheduler::new(&run.config);
        let plan = scheduler.place(window, ordered, &locked, &reserved);

        for (student, outcome) in ordered.iter().zip(&plan.outcomes) {
            if let SlotDecision::Unscheduled(reason) = outcome.decision {
                tracing::debug!(
                    student_id = student.id,
                    exam_index = window.exam_index,
                    reason = %reason,
                    "学生未排定"
                );
            }
            if outcome.decision == SlotDecision::KeptLocked {
                run.kept_locked_count += 1;
            } else if let Some(draft) = outcome.draft(&plan.window) {
                run.write(conn, student, &draft, REASON_GENERATED)?;
            }
        }

        tracing::info!(
            section_id = window.section_id,
            exam_index = window.exam_index,
            week_index = window.week_index,
            candidates_count = ordered.len(),
            scheduled = plan.scheduled_count(),
            unscheduled = plan.unscheduled_count(),
            "时间窗排程完成"
        );
        Ok(())
    }

    /// 运行范围内未被写入的未锁定时段置为未排定
    fn clear_stale(
        &self,
        conn: &Connection,
        run: &mut RunState,
        section_ids: &[i64],
    ) -> ScheduleResult<()> {
        let cleared = ExamSlotRepository::new(conn).clear_stale_unlocked(
            section_ids,
            run.start_exam_index,
            &run.touched,
            REASON_GENERATED,
        )?;
        if cleared > 0 {
            tracing::info!(cleared, "清理过期时段");
        }
        run.cleared_count += cleared;
        Ok(())
    }

    // ==========================================
    // 单人路径
    // ==========================================

    fn regenerate_student(
        &self,
        conn: &Connection,
        run: &mut RunState,
        student_id: i64,
    ) -> ScheduleResult<()> {
        let slots = ExamSlotRepository::new(conn);
        let sections = SectionRepository::new(conn);
        let mut student = StudentRepository::new(conn).get(student_id)?;

        let scope: HashSet<i64> = [student_id].into_iter().collect();
        run.duplicates_removed += slots.collapse_duplicates(Some(&scope))?;
        run.cleared_count += slots.mark_student_unscheduled_from(
            student_id,
            run.start_exam_index,
            REASON_STUDENT_REGENERATED,
        )?;

        self.ensure_student_parity(conn, run, &mut student)?;
        let Some(parity) = student.parity else {
            return Ok(());
        };

        let filler = GapFiller::new(&run.config);
        for exam_index in run.exam_indices() {
            let existing = slots.find_by_student_exam(student_id, exam_index)?;
            if existing.as_ref().is_some_and(|s| s.is_locked) {
                run.kept_locked_count += 1;
                continue;
            }

            let section_id = match (&existing, run.config.balanced_ta_scheduling) {
                (Some(slot), true) => slot.section_id,
                _ => student.section_id,
            };
            let section = sections.get(section_id)?;
            let window = run.slot_window(&section, exam_index, parity);

            let occupied: Vec<TimeRange> = slots
                .find_scheduled_in_window(window.section_id, exam_index, window.week_index)?
                .iter()
                .filter(|s| s.student_id != student_id)
                .filter_map(ExamSlot::time_range)
                .collect();

            let draft = match filler.find_slot(&window, &student, &occupied) {
                Ok(range) => SlotDraft::scheduled(student_id, &window, range.start, range.end),
                Err(reason) => {
                    tracing::debug!(student_id, exam_index, reason = %reason, "学生未排定");
                    SlotDraft::unscheduled(student_id, &window)
                }
            };
            run.write(conn, &student, &draft, REASON_STUDENT_REGENERATED)?;
        }
        Ok(())
    }

    // ==========================================
    // 公共步骤
    // ==========================================

    /// 分配周次分组并持久化变化
    fn ensure_parity(&self, conn: &Connection, students: &mut [Student]) -> ScheduleResult<()> {
        let changes = self.cohort.assign(students);
        let repo = StudentRepository::new(conn);
        for change in &changes {
            repo.update_parity(change.student_id, change.parity)?;
        }
        Ok(())
    }

    /// 单人补分组: 以同一范围 (均衡模式为全体, 否则为本分组) 已分组人数为基准
    fn ensure_student_parity(
        &self,
        conn: &Connection,
        run: &RunState,
        student: &mut Student,
    ) -> ScheduleResult<()> {
        if student.parity.is_some() && student.parity_preference().is_none() {
            return Ok(());
        }
        let students = StudentRepository::new(conn);
        let peers = if run.config.balanced_ta_scheduling {
            students.find_all_active()?
        } else {
            students.find_active_by_section(student.section_id)?
        };
        let (odd, even) = peers
            .iter()
            .filter(|s| s.id != student.id)
            .fold((0, 0), |(o, e), s| match s.parity {
                Some(Parity::Odd) => (o + 1, e),
                Some(Parity::Even) => (o, e + 1),
                None => (o, e),
            });

        let changes = self.cohort.assign_against(
            std::slice::from_mut(student),
            odd,
            even,
            &mut rand::rng(),
        );
        for change in &changes {
            students.update_parity(change.student_id, change.parity)?;
        }
        Ok(())
    }

    /// 在单个事务内执行一次运行并生成报告
    fn execute<F>(&self, operation: &str, start_exam_index: u32, body: F) -> GenerationReport
    where
        F: FnOnce(&Connection, &mut RunState) -> ScheduleResult<()>,
    {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let outcome = self.run_in_transaction(|conn| {
            let config = load_from_connection(conn)?;
            let mut run = RunState::new(config, start_exam_index);
            body(conn, &mut run)?;
            Ok(run)
        });
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(run) => {
                let report = run.into_report(run_id, elapsed_ms);
                tracing::info!(
                    operation,
                    run_id = %report.run_id,
                    success = report.success,
                    scheduled = report.scheduled_count,
                    unscheduled = report.unscheduled_count,
                    kept_locked = report.kept_locked_count,
                    errors = report.errors.len(),
                    elapsed_ms,
                    "排程运行完成"
                );
                report
            }
            Err(e) => {
                tracing::error!(operation, run_id = %run_id, error = %e, "排程运行失败，事务已回滚");
                GenerationReport::failed(run_id, format!("Transaction failed: {}", e), elapsed_ms)
            }
        }
    }

    fn run_in_transaction<T, F>(&self, body: F) -> ScheduleResult<T>
    where
        F: FnOnce(&Connection) -> ScheduleResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.unchecked_transaction()?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
