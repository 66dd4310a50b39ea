// ==========================================
// 口试时段排程系统 - 时段变更历史仓储
// ==========================================
// 用途: 审计追踪 (记录每次变更前的排程字段)
// ==========================================

use crate::domain::exam_slot::{ExamSlot, ExamSlotHistory};
use crate::repository::error::RepositoryResult;
use crate::repository::row_codec::{date_text, opt_date, opt_time, time_text};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection};

/// 引擎写入时的操作人
pub const SYSTEM_ACTOR: &str = "system";

pub struct ExamSlotHistoryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ExamSlotHistoryRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 记录变更前的值
    pub fn record(&self, before: &ExamSlot, reason: &str) -> RepositoryResult<i64> {
        self.conn.execute(
            r#"INSERT INTO exam_slot_histories (
                   exam_slot_id, student_id, section_id, exam_index, week_index,
                   date, start_time, end_time, is_scheduled, changed_by, reason
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                before.id,
                before.student_id,
                before.section_id,
                before.exam_index,
                before.week_index,
                date_text(before.date),
                time_text(before.start_time),
                time_text(before.end_time),
                before.is_scheduled,
                SYSTEM_ACTOR,
                reason,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 查询某时段的历史 (按时间先后)
    pub fn find_by_slot(&self, exam_slot_id: i64) -> RepositoryResult<Vec<ExamSlotHistory>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, exam_slot_id, student_id, section_id, exam_index, week_index,
                      date, start_time, end_time, is_scheduled, changed_at, changed_by, reason
               FROM exam_slot_histories
               WHERE exam_slot_id = ?1
               ORDER BY id"#,
        )?;

        let rows = stmt
            .query_map(params![exam_slot_id], |row| {
                let changed_at_raw: String = row.get(10)?;
                let changed_at =
                    NaiveDateTime::parse_from_str(&changed_at_raw, "%Y-%m-%d %H:%M:%S")
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e))
                        })?;
                Ok(ExamSlotHistory {
                    id: row.get(0)?,
                    exam_slot_id: row.get(1)?,
                    student_id: row.get(2)?,
                    section_id: row.get(3)?,
                    exam_index: row.get(4)?,
                    week_index: row.get(5)?,
                    date: opt_date(row, 6)?,
                    start_time: opt_time(row, 7)?,
                    end_time: opt_time(row, 8)?,
                    is_scheduled: row.get(9)?,
                    changed_at,
                    changed_by: row.get(11)?,
                    reason: row.get(12)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
