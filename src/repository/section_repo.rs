// ==========================================
// 口试时段排程系统 - 分组数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 借用连接, 便于上层在同一事务内调用
// ==========================================

use crate::domain::student::Section;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{opt_time, time_text};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SECTION_COLUMNS: &str =
    "id, code, name, proctor_id, proctor_name, window_start, window_end, is_active";

// ==========================================
// SectionRepository - 分组仓储
// ==========================================
pub struct SectionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SectionRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 新建分组, 返回自增ID
    pub fn insert(&self, section: &Section) -> RepositoryResult<i64> {
        self.conn.execute(
            r#"INSERT INTO sections (code, name, proctor_id, proctor_name, window_start, window_end, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                section.code,
                section.name,
                section.proctor_id,
                section.proctor_name,
                time_text(section.window_start),
                time_text(section.window_end),
                section.is_active,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Section>> {
        let sql = format!("SELECT {} FROM sections WHERE id = ?1", SECTION_COLUMNS);
        let section = self
            .conn
            .query_row(&sql, params![id], map_section)
            .optional()?;
        Ok(section)
    }

    /// 查询分组, 不存在时返回 NotFound
    pub fn get(&self, id: i64) -> RepositoryResult<Section> {
        self.find_by_id(id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Section".to_string(),
            id: id.to_string(),
        })
    }

    /// 所有启用分组 (按ID升序)
    pub fn find_active(&self) -> RepositoryResult<Vec<Section>> {
        let sql = format!(
            "SELECT {} FROM sections WHERE is_active = 1 ORDER BY id",
            SECTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let sections = stmt
            .query_map([], map_section)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    /// 启用且已指派监考助教的分组 (均衡模式候选)
    pub fn find_active_with_proctor(&self) -> RepositoryResult<Vec<Section>> {
        let sql = format!(
            "SELECT {} FROM sections WHERE is_active = 1 AND proctor_id IS NOT NULL ORDER BY id",
            SECTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let sections = stmt
            .query_map([], map_section)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sections)
    }
}

fn map_section(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        proctor_id: row.get(3)?,
        proctor_name: row.get(4)?,
        window_start: opt_time(row, 5)?,
        window_end: opt_time(row, 6)?,
        is_active: row.get(7)?,
    })
}
