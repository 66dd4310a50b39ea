// ==========================================
// 口试时段排程系统 - 考试时段领域模型
// ==========================================
// 对齐: schema exam_slots / exam_slot_histories 表
// 红线: (student_id, exam_index) 唯一
// 红线: is_locked=true 的时段日期/时间/排定状态只读
// ==========================================

use crate::domain::clock::TimeRange;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ExamSlot - 考试时段 (预约结果)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSlot {
    pub id: i64,                         // 自增ID (越小越早创建)
    pub student_id: i64,
    pub exam_index: u32,                 // 考试轮次 1..N
    pub section_id: i64,
    pub week_index: u32,                 // 学期周次 (>=1)
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_scheduled: bool,
    pub is_locked: bool,                 // 已对外发布, 引擎只读
}

impl ExamSlot {
    /// 已排定时段的时间区间
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.is_scheduled, self.start_time, self.end_time) {
            (true, Some(start), Some(end)) => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }

    /// 明确的"无法排定"结果（未锁定且未排定）
    pub fn is_explicitly_unscheduled(&self) -> bool {
        !self.is_locked && !self.is_scheduled
    }

    /// 写入前校验
    ///
    /// # 规则
    /// - exam_index 在 1..=total_exams
    /// - week_index >= 1
    /// - 起止时间同时存在时 start < end
    pub fn validate(&self, total_exams: u32) -> Result<(), String> {
        let mut problems = Vec::new();
        if self.exam_index == 0 || self.exam_index > total_exams {
            problems.push(format!(
                "Exam index must be between 1 and {} (got {})",
                total_exams, self.exam_index
            ));
        }
        if self.week_index == 0 {
            problems.push("Week index must be greater than 0".to_string());
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                problems.push("Start time must be before end time".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join(", "))
        }
    }

    /// 排程相关字段是否不同（用于决定是否写历史）
    pub fn scheduling_differs(&self, other: &ExamSlot) -> bool {
        self.section_id != other.section_id
            || self.week_index != other.week_index
            || self.date != other.date
            || self.start_time != other.start_time
            || self.end_time != other.end_time
            || self.is_scheduled != other.is_scheduled
    }
}

// ==========================================
// SlotDraft - 待写入的时段结果
// ==========================================
// 引擎产出, 仓储负责 upsert 到 (student_id, exam_index) 唯一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub student_id: i64,
    pub exam_index: u32,
    pub section_id: i64,
    pub week_index: u32,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_scheduled: bool,
}

impl SlotDraft {
    pub fn scheduled(
        student_id: i64,
        window: &SlotWindow,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            student_id,
            exam_index: window.exam_index,
            section_id: window.section_id,
            week_index: window.week_index,
            date: Some(window.date),
            start_time: Some(start_time),
            end_time: Some(end_time),
            is_scheduled: true,
        }
    }

    pub fn unscheduled(student_id: i64, window: &SlotWindow) -> Self {
        Self {
            student_id,
            exam_index: window.exam_index,
            section_id: window.section_id,
            week_index: window.week_index,
            date: Some(window.date),
            start_time: None,
            end_time: None,
            is_scheduled: false,
        }
    }
}

// ==========================================
// SlotWindow - 单个分组/轮次/周次的时间窗
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub section_id: i64,
    pub exam_index: u32,
    pub week_index: u32,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

// ==========================================
// ExamSlotHistory - 时段变更历史
// ==========================================
// 用途: 审计追踪 (记录变更前的值)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSlotHistory {
    pub id: i64,
    pub exam_slot_id: i64,
    pub student_id: i64,
    pub section_id: i64,
    pub exam_index: u32,
    pub week_index: u32,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_scheduled: bool,
    pub changed_at: NaiveDateTime,
    pub changed_by: String,
    pub reason: String,
}
