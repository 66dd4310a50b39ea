// ==========================================
// 口试时段排程系统 - 考试时段数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 锁定时段 (is_locked=1) 的日期/时间/排定状态永不被改写
// 红线: 排程字段变化必须写入 exam_slot_histories
// ==========================================

use crate::domain::exam_slot::{ExamSlot, SlotDraft};
use crate::domain::types::Parity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::history_repo::ExamSlotHistoryRepository;
use crate::repository::row_codec::{date_text, opt_date, opt_time, time_text};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

const SLOT_COLUMNS: &str = "id, student_id, exam_index, section_id, week_index, date, \
                            start_time, end_time, is_scheduled, is_locked";

/// upsert 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWrite {
    Inserted(i64),
    Updated(i64),
    Unchanged(i64),
    /// 已锁定, 未做任何修改
    LockedUntouched(i64),
}

impl SlotWrite {
    pub fn slot_id(&self) -> i64 {
        match *self {
            SlotWrite::Inserted(id)
            | SlotWrite::Updated(id)
            | SlotWrite::Unchanged(id)
            | SlotWrite::LockedUntouched(id) => id,
        }
    }
}

// ==========================================
// ExamSlotRepository - 考试时段仓储
// ==========================================
pub struct ExamSlotRepository<'a> {
    conn: &'a Connection,
    history: ExamSlotHistoryRepository<'a>,
}

impl<'a> ExamSlotRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            history: ExamSlotHistoryRepository::new(conn),
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<ExamSlot>> {
        let sql = format!("SELECT {} FROM exam_slots WHERE id = ?1", SLOT_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], map_slot).optional()?)
    }

    /// 按 (student_id, exam_index) 查询 (存在重复时取最早一行)
    pub fn find_by_student_exam(
        &self,
        student_id: i64,
        exam_index: u32,
    ) -> RepositoryResult<Option<ExamSlot>> {
        let sql = format!(
            "SELECT {} FROM exam_slots WHERE student_id = ?1 AND exam_index = ?2 ORDER BY id LIMIT 1",
            SLOT_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![student_id, exam_index], map_slot)
            .optional()?)
    }

    /// 学生全部时段 (按轮次)
    pub fn find_by_student(&self, student_id: i64) -> RepositoryResult<Vec<ExamSlot>> {
        let sql = format!(
            "SELECT {} FROM exam_slots WHERE student_id = ?1 ORDER BY exam_index, id",
            SLOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let slots = stmt
            .query_map(params![student_id], map_slot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    /// exam_index >= from_exam 的全部时段, 按 (student_id, exam_index) 建索引
    pub fn find_map_from_exam(
        &self,
        from_exam: u32,
    ) -> RepositoryResult<HashMap<(i64, u32), ExamSlot>> {
        let sql = format!(
            "SELECT {} FROM exam_slots WHERE exam_index >= ?1 ORDER BY id DESC",
            SLOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut map = HashMap::new();
        // 倒序插入, 重复时最早的一行覆盖在最后
        for slot in stmt.query_map(params![from_exam], map_slot)? {
            let slot = slot?;
            map.insert((slot.student_id, slot.exam_index), slot);
        }
        Ok(map)
    }

    /// 同一分组/轮次/周次下已排定的时段 (按开始时间)
    pub fn find_scheduled_in_window(
        &self,
        section_id: i64,
        exam_index: u32,
        week_index: u32,
    ) -> RepositoryResult<Vec<ExamSlot>> {
        let sql = format!(
            r#"SELECT {} FROM exam_slots
               WHERE section_id = ?1 AND exam_index = ?2 AND week_index = ?3
                 AND is_scheduled = 1 AND start_time IS NOT NULL AND end_time IS NOT NULL
               ORDER BY start_time, id"#,
            SLOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let slots = stmt
            .query_map(params![section_id, exam_index, week_index], map_slot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    /// 同一分组/轮次/周次下已锁定且已排定的时段
    pub fn find_locked_in_window(
        &self,
        section_id: i64,
        exam_index: u32,
        week_index: u32,
    ) -> RepositoryResult<Vec<ExamSlot>> {
        Ok(self
            .find_scheduled_in_window(section_id, exam_index, week_index)?
            .into_iter()
            .filter(|s| s.is_locked)
            .collect())
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 插入或更新 (student_id, exam_index) 唯一行
    ///
    /// # 规则
    /// - 已锁定 → 不修改, 返回 LockedUntouched
    /// - 校验失败 → ValidationError (单条记录级错误)
    /// - 排程字段有变化 → 先写历史再更新
    pub fn upsert(
        &self,
        draft: &SlotDraft,
        total_exams: u32,
        reason: &str,
    ) -> RepositoryResult<SlotWrite> {
        let existing = self.find_by_student_exam(draft.student_id, draft.exam_index)?;

        if let Some(ref slot) = existing {
            if slot.is_locked {
                return Ok(SlotWrite::LockedUntouched(slot.id));
            }
        }

        let candidate = ExamSlot {
            id: existing.as_ref().map(|s| s.id).unwrap_or(0),
            student_id: draft.student_id,
            exam_index: draft.exam_index,
            section_id: draft.section_id,
            week_index: draft.week_index,
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            is_scheduled: draft.is_scheduled,
            is_locked: false,
        };
        candidate.validate(total_exams).map_err(|msg| {
            RepositoryError::ValidationError(format!(
                "student_id={}, exam_index={}: {}",
                draft.student_id, draft.exam_index, msg
            ))
        })?;

        match existing {
            Some(old) => {
                if !old.scheduling_differs(&candidate) {
                    return Ok(SlotWrite::Unchanged(old.id));
                }
                self.history.record(&old, reason)?;
                self.write_scheduling_fields(&candidate)?;
                Ok(SlotWrite::Updated(old.id))
            }
            None => {
                self.conn.execute(
                    r#"INSERT INTO exam_slots (
                           student_id, exam_index, section_id, week_index, date,
                           start_time, end_time, is_scheduled, is_locked
                       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)"#,
                    params![
                        candidate.student_id,
                        candidate.exam_index,
                        candidate.section_id,
                        candidate.week_index,
                        date_text(candidate.date),
                        time_text(candidate.start_time),
                        time_text(candidate.end_time),
                        candidate.is_scheduled,
                    ],
                )?;
                Ok(SlotWrite::Inserted(self.conn.last_insert_rowid()))
            }
        }
    }

    /// 将学生自 from_exam 起的未锁定时段标记为未排定 (保留行)
    ///
    /// # 返回
    /// 实际变化的行数
    pub fn mark_student_unscheduled_from(
        &self,
        student_id: i64,
        from_exam: u32,
        reason: &str,
    ) -> RepositoryResult<usize> {
        let slots: Vec<ExamSlot> = self
            .find_by_student(student_id)?
            .into_iter()
            .filter(|s| s.exam_index >= from_exam && !s.is_locked)
            .collect();
        self.mark_unscheduled(&slots, reason)
    }

    /// 将指定分组内未被本次运行写入的未锁定已排定时段置为未排定
    ///
    /// # 参数
    /// - `section_ids`: 运行范围内的分组
    /// - `from_exam`: 起始轮次
    /// - `touched`: 本次运行已写入的 (student_id, exam_index)
    pub fn clear_stale_unlocked(
        &self,
        section_ids: &[i64],
        from_exam: u32,
        touched: &HashSet<(i64, u32)>,
        reason: &str,
    ) -> RepositoryResult<usize> {
        let scope: HashSet<i64> = section_ids.iter().copied().collect();
        let stale: Vec<ExamSlot> = self
            .find_map_from_exam(from_exam)?
            .into_values()
            .filter(|s| {
                !s.is_locked
                    && s.is_scheduled
                    && scope.contains(&s.section_id)
                    && !touched.contains(&(s.student_id, s.exam_index))
            })
            .collect();
        self.mark_unscheduled(&stale, reason)
    }

    fn mark_unscheduled(&self, slots: &[ExamSlot], reason: &str) -> RepositoryResult<usize> {
        let mut changed = 0;
        for slot in slots.iter().filter(|s| !s.is_locked) {
            let cleared = ExamSlot {
                start_time: None,
                end_time: None,
                is_scheduled: false,
                ..slot.clone()
            };
            if slot.scheduling_differs(&cleared) {
                self.history.record(slot, reason)?;
                self.write_scheduling_fields(&cleared)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// 按周次分组批量改期 (仅未锁定)
    ///
    /// # 返回
    /// 更新的行数
    pub fn redate_unlocked(
        &self,
        exam_index: u32,
        parity: Parity,
        date: NaiveDate,
        week_index: u32,
        reason: &str,
    ) -> RepositoryResult<usize> {
        let sql = format!(
            r#"SELECT {} FROM exam_slots
               WHERE exam_index = ?1 AND is_locked = 0
                 AND student_id IN (SELECT id FROM students WHERE week_group = ?2)
               ORDER BY id"#,
            SLOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let slots = stmt
            .query_map(params![exam_index, parity.as_str()], map_slot)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut updated = 0;
        for slot in slots {
            let redated = ExamSlot {
                date: Some(date),
                week_index,
                ..slot.clone()
            };
            if slot.scheduling_differs(&redated) {
                self.history.record(&slot, reason)?;
                self.write_scheduling_fields(&redated)?;
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// 重复行修复: 同一 (student_id, exam_index) 优先保留最早的锁定行, 否则保留最早一行, 删除其余
    ///
    /// # 参数
    /// - `student_ids`: 为 None 时修复全表
    ///
    /// # 返回
    /// 删除的行数
    pub fn collapse_duplicates(&self, student_ids: Option<&HashSet<i64>>) -> RepositoryResult<usize> {
        let mut stmt = self.conn.prepare(
            r#"SELECT student_id, exam_index,
                      COALESCE(MIN(CASE WHEN is_locked = 1 THEN id END), MIN(id)),
                      COUNT(*)
               FROM exam_slots
               GROUP BY student_id, exam_index
               HAVING COUNT(*) > 1"#,
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed = 0;
        for (student_id, exam_index, kept_id, count) in groups {
            if let Some(scope) = student_ids {
                if !scope.contains(&student_id) {
                    continue;
                }
            }
            tracing::warn!(
                student_id,
                exam_index,
                duplicate_count = count,
                kept_slot_id = kept_id,
                "发现重复时段，保留最早的锁定行 (无锁定时保留最早一行)"
            );
            removed += self.conn.execute(
                "DELETE FROM exam_slots WHERE student_id = ?1 AND exam_index = ?2 AND id <> ?3",
                params![student_id, exam_index, kept_id],
            )?;
        }
        Ok(removed)
    }

    /// 直接插入一行 (测试/外部导入使用, 不做 upsert)
    pub fn insert_raw(&self, slot: &ExamSlot) -> RepositoryResult<i64> {
        self.conn.execute(
            r#"INSERT INTO exam_slots (
                   student_id, exam_index, section_id, week_index, date,
                   start_time, end_time, is_scheduled, is_locked
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                slot.student_id,
                slot.exam_index,
                slot.section_id,
                slot.week_index,
                date_text(slot.date),
                time_text(slot.start_time),
                time_text(slot.end_time),
                slot.is_scheduled,
                slot.is_locked,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 设置锁定标志 (外部"已通知"动作)
    pub fn set_locked(&self, slot_id: i64, locked: bool) -> RepositoryResult<()> {
        let affected = self.conn.execute(
            "UPDATE exam_slots SET is_locked = ?1 WHERE id = ?2",
            params![locked, slot_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ExamSlot".to_string(),
                id: slot_id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新排程字段 (带 is_locked = 0 守卫)
    fn write_scheduling_fields(&self, slot: &ExamSlot) -> RepositoryResult<()> {
        self.conn.execute(
            r#"UPDATE exam_slots
               SET section_id = ?1, week_index = ?2, date = ?3,
                   start_time = ?4, end_time = ?5, is_scheduled = ?6
               WHERE id = ?7 AND is_locked = 0"#,
            params![
                slot.section_id,
                slot.week_index,
                date_text(slot.date),
                time_text(slot.start_time),
                time_text(slot.end_time),
                slot.is_scheduled,
                slot.id,
            ],
        )?;
        Ok(())
    }
}

fn map_slot(row: &Row<'_>) -> rusqlite::Result<ExamSlot> {
    Ok(ExamSlot {
        id: row.get(0)?,
        student_id: row.get(1)?,
        exam_index: row.get(2)?,
        section_id: row.get(3)?,
        week_index: row.get(4)?,
        date: opt_date(row, 5)?,
        start_time: opt_time(row, 6)?,
        end_time: opt_time(row, 7)?,
        is_scheduled: row.get(8)?,
        is_locked: row.get(9)?,
    })
}
