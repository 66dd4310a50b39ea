// ==========================================
// 口试时段排程系统 - 空档填充器
// ==========================================
// 职责: 单个学生重排时, 在时间窗已有占用之间寻找最早空档
// 规则:
// - 空档 [current, 下一占用开始) 长度 >= 时长 + 缓冲 且满足约束 → 放置在 current
// - 否则 current = max(current, 占用结束 + 缓冲), 继续扫描
// - 扫描完毕后尝试在 current 追加 (须在时间窗内)
// - 均失败 → NoGapAvailable
// ==========================================

use crate::config::ScheduleConfig;
use crate::domain::clock::{add_minutes, format_time, minutes_between, TimeRange};
use crate::domain::exam_slot::SlotWindow;
use crate::domain::student::Student;
use crate::domain::types::UnscheduledReason;
use crate::engine::constraint_evaluator::ConstraintEvaluator;
use chrono::NaiveTime;

#[derive(Debug, Clone)]
pub struct GapFiller {
    duration_minutes: i64,
    buffer_minutes: i64,
    evaluator: ConstraintEvaluator,
}

impl GapFiller {
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

    /// 寻找空档
    ///
    /// # 参数
    /// - `occupied`: 同一时间窗内其他学生已排定的区间
    pub fn find_slot(
        &self,
        window: &SlotWindow,
        student: &Student,
        occupied: &[TimeRange],
    ) -> Result<TimeRange, UnscheduledReason> {
        if window.end <= window.start
            || minutes_between(window.start, window.end) < self.duration_minutes
        {
            return Err(UnscheduledReason::InvalidWindow);
        }

        let mut sorted = occupied.to_vec();
        sorted.sort();

        let needed = self.duration_minutes + self.buffer_minutes;
        let mut current = window.start;

        for range in &sorted {
            if range.start > current && minutes_between(current, range.start) >= needed {
                if let Some(found) = self.try_place(window, student, current) {
                    tracing::debug!(
                        student_id = student.id,
                        start = %format_time(found.start),
                        "在空档中找到时段"
                    );
                    return Ok(found);
                }
            }
            match add_minutes(range.end, self.buffer_minutes) {
                Some(after) => current = current.max(after),
                None => return Err(UnscheduledReason::NoGapAvailable),
            }
        }

        self.try_place(window, student, current)
            .ok_or(UnscheduledReason::NoGapAvailable)
    }

    fn try_place(
        &self,
        window: &SlotWindow,
        student: &Student,
        start: NaiveTime,
    ) -> Option<TimeRange> {
        let end = add_minutes(start, self.duration_minutes)?;
        if end > window.end {
            return None;
        }
        if !self.evaluator.allows(student, window.date, start, end) {
            return None;
        }
        Some(TimeRange::new(start, end))
    }
}
