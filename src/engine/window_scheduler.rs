// ==========================================
// 口试时段排程系统 - 时间窗排程器
// ==========================================
// 职责: 在单个时间窗 (分组 × 轮次 × 周次) 内按顺序为学生放置时段
// 输入: 时间窗 + 已排序学生 + 已有时段 + 已锁定占用区间
// 输出: 每个学生一条 SlotOutcome (不写库)
// ==========================================
// 游标推进规则:
// 1) 学生时段已锁定 → 不动; 锁定时段在本时间窗内时游标推到 max(游标, 结束 + 缓冲)
// 2) 学生已有未锁定的"未排定"结果 → 跳过, 保留
// 3) 候选 [游标, 游标 + 时长) 与锁定占用冲突 → 游标跳到占用结束 + 缓冲
// 4) 候选结束超出时间窗 → WindowExhausted
// 5) 违反约束 → ConstraintViolation (游标不动)
// 6) 否则排定, 游标 = 结束 + 缓冲
// ==========================================

use crate::config::ScheduleConfig;
use crate::domain::clock::{add_minutes, format_time, minutes_between, TimeRange};
use crate::domain::exam_slot::{ExamSlot, SlotDraft, SlotWindow};
use crate::domain::student::Student;
use crate::domain::types::UnscheduledReason;
use crate::engine::constraint_evaluator::ConstraintEvaluator;
use chrono::NaiveTime;
use std::collections::HashMap;

/// 单个学生的排程决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    Scheduled(TimeRange),
    Unscheduled(UnscheduledReason),
    /// 已锁定, 不修改
    KeptLocked,
    /// 已有未排定结果, 不修改
    KeptUnscheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOutcome {
    pub student_id: i64,
    pub decision: SlotDecision,
}

impl SlotOutcome {
    /// 需要写库的草稿 (保留类决策返回 None)
    pub fn draft(&self, window: &SlotWindow) -> Option<SlotDraft> {
        match self.decision {
            SlotDecision::Scheduled(range) => Some(SlotDraft::scheduled(
                self.student_id,
                window,
                range.start,
                range.end,
            )),
            SlotDecision::Unscheduled(_) => Some(SlotDraft::unscheduled(self.student_id, window)),
            SlotDecision::KeptLocked | SlotDecision::KeptUnscheduled => None,
        }
    }
}

/// 单个时间窗的排程结果
#[derive(Debug, Clone)]
pub struct WindowPlan {
    pub window: SlotWindow,
    pub outcomes: Vec<SlotOutcome>,
    pub final_cursor: NaiveTime,
}

impl WindowPlan {
    pub fn scheduled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.decision, SlotDecision::Scheduled(_)))
            .count()
    }

    pub fn unscheduled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.decision, SlotDecision::Unscheduled(_)))
            .count()
    }
}

// ==========================================
// WindowScheduler - 时间窗排程器
// ==========================================
#[derive(Debug, Clone)]
pub struct WindowScheduler {
    duration_minutes: i64,
    buffer_minutes: i64,
    evaluator: ConstraintEvaluator,
}

impl WindowScheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self::with_timing(config.exam_duration_minutes, config.exam_buffer_minutes)
    }

    pub fn with_timing(duration_minutes: i64, buffer_minutes: i64) -> Self {
        Self {
            duration_minutes,
            buffer_minutes,
            evaluator: ConstraintEvaluator::new(),
        }
    }

    /// 时间窗是否可容纳至少一场
    pub fn window_is_valid(&self, window: &SlotWindow) -> bool {
        window.end > window.start && minutes_between(window.start, window.end) >= self.duration_minutes
    }

    /// 在时间窗内放置学生
    ///
    /// # 参数
    /// - `students`: 已按优先级排序
    /// - `existing`: 本轮次已有时段 (student_id → slot)
    /// - `reserved`: 时间窗内已锁定的占用区间 (任意学生)
    pub fn place(
        &self,
        window: &SlotWindow,
        students: &[&Student],
        existing: &HashMap<i64, ExamSlot>,
        reserved: &[TimeRange],
    ) -> WindowPlan {
        if !self.window_is_valid(window) {
            tracing::warn!(
                section_id = window.section_id,
                exam_index = window.exam_index,
                week_index = window.week_index,
                window_start = %format_time(window.start),
                window_end = %format_time(window.end),
                duration_minutes = self.duration_minutes,
                "时间窗无效，全部学生记为未排"
            );
            let outcomes = students
                .iter()
                .map(|s| SlotOutcome {
                    student_id: s.id,
                    decision: match existing.get(&s.id) {
                        Some(slot) if slot.is_locked => SlotDecision::KeptLocked,
                        _ => SlotDecision::Unscheduled(UnscheduledReason::InvalidWindow),
                    },
                })
                .collect();
            return WindowPlan {
                window: *window,
                outcomes,
                final_cursor: window.start,
            };
        }

        let mut reserved: Vec<TimeRange> = reserved.to_vec();
        reserved.sort_by_key(|r| (r.start, r.end));

        let mut cursor = window.start;
        let mut outcomes = Vec::with_capacity(students.len());

        for student in students {
            if let Some(slot) = existing.get(&student.id) {
                if slot.is_locked {
                    // 锁定时段属于其他分组/周次时不占用本时间窗
                    let in_window = slot.section_id == window.section_id
                        && slot.week_index == window.week_index;
                    if let (true, Some(range)) = (in_window, slot.time_range()) {
                        let after = add_minutes(range.end, self.buffer_minutes).unwrap_or(window.end);
                        cursor = cursor.max(after);
                    }
                    outcomes.push(SlotOutcome {
                        student_id: student.id,
                        decision: SlotDecision::KeptLocked,
                    });
                    continue;
                }
                if slot.is_explicitly_unscheduled() {
                    outcomes.push(SlotOutcome {
                        student_id: student.id,
                        decision: SlotDecision::KeptUnscheduled,
                    });
                    continue;
                }
            }

            let decision = match self.candidate(cursor, &reserved, window) {
                None => SlotDecision::Unscheduled(UnscheduledReason::WindowExhausted),
                Some(range) => {
                    // 冲突跳转后的位置对后续学生同样有效
                    cursor = range.start;
                    if self
                        .evaluator
                        .allows(student, window.date, range.start, range.end)
                    {
                        cursor = add_minutes(range.end, self.buffer_minutes).unwrap_or(window.end);
                        SlotDecision::Scheduled(range)
                    } else {
                        SlotDecision::Unscheduled(UnscheduledReason::ConstraintViolation)
                    }
                }
            };

            outcomes.push(SlotOutcome {
                student_id: student.id,
                decision,
            });
        }

        let plan = WindowPlan {
            window: *window,
            outcomes,
            final_cursor: cursor,
        };
        tracing::debug!(
            section_id = window.section_id,
            exam_index = window.exam_index,
            week_index = window.week_index,
            scheduled = plan.scheduled_count(),
            unscheduled = plan.unscheduled_count(),
            "时间窗排程完成"
        );
        plan
    }

    /// 从游标开始寻找不与锁定占用冲突且不超出时间窗的候选区间
    fn candidate(
        &self,
        cursor: NaiveTime,
        reserved: &[TimeRange],
        window: &SlotWindow,
    ) -> Option<TimeRange> {
        let mut start = cursor;
        loop {
            let end = add_minutes(start, self.duration_minutes)?;
            if end > window.end {
                return None;
            }
            let footprint_end = add_minutes(end, self.buffer_minutes)?;

            let blocker = reserved.iter().find(|r| {
                let reserved_end = add_minutes(r.end, self.buffer_minutes).unwrap_or(r.end);
                start < reserved_end && r.start < footprint_end
            });

            match blocker {
                None => return Some(TimeRange::new(start, end)),
                Some(r) => {
                    let next = add_minutes(r.end, self.buffer_minutes)?;
                    if next <= start {
                        return None;
                    }
                    start = next;
                }
            }
        }
    }
}
