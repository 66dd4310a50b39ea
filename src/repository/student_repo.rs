// ==========================================
// 口试时段排程系统 - 学生/约束数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 约束只读 (引擎唯一的学生写入是周次分组)
// ==========================================

use crate::domain::student::{Constraint, Student};
use crate::domain::types::Parity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const STUDENT_COLUMNS: &str = "id, full_name, email, section_id, week_group, is_active";

// ==========================================
// StudentRepository - 学生仓储
// ==========================================
pub struct StudentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> StudentRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 新建学生 (不含约束), 返回自增ID
    pub fn insert(&self, student: &Student) -> RepositoryResult<i64> {
        self.conn.execute(
            r#"INSERT INTO students (full_name, email, section_id, week_group, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                student.full_name,
                student.email,
                student.section_id,
                student.parity.map(|p| p.as_str()),
                student.is_active,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 新建约束, 返回自增ID
    pub fn insert_constraint(&self, constraint: &Constraint) -> RepositoryResult<i64> {
        self.conn.execute(
            r#"INSERT INTO constraints (student_id, constraint_type, constraint_value, description, is_active)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                constraint.student_id,
                constraint.constraint_type,
                constraint.constraint_value,
                constraint.description,
                constraint.is_active,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 按ID查询学生 (含全部约束)
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS);
        let student = self
            .conn
            .query_row(&sql, params![id], map_student)
            .optional()?;

        match student {
            Some(mut s) => {
                s.constraints = self.find_constraints(s.id)?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    /// 查询学生, 不存在时返回 NotFound
    pub fn get(&self, id: i64) -> RepositoryResult<Student> {
        self.find_by_id(id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Student".to_string(),
            id: id.to_string(),
        })
    }

    /// 分组内启用学生 (按ID升序, 含约束)
    pub fn find_active_by_section(&self, section_id: i64) -> RepositoryResult<Vec<Student>> {
        let sql = format!(
            "SELECT {} FROM students WHERE section_id = ?1 AND is_active = 1 ORDER BY id",
            STUDENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map(params![section_id], map_student)?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_constraints(students)
    }

    /// 所有启用分组内的启用学生 (均衡模式使用)
    pub fn find_all_active(&self) -> RepositoryResult<Vec<Student>> {
        let sql = format!(
            r#"SELECT {} FROM students
               WHERE is_active = 1
                 AND section_id IN (SELECT id FROM sections WHERE is_active = 1)
               ORDER BY id"#,
            STUDENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map([], map_student)?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_constraints(students)
    }

    /// 写入周次分组
    pub fn update_parity(&self, student_id: i64, parity: Parity) -> RepositoryResult<()> {
        let affected = self.conn.execute(
            "UPDATE students SET week_group = ?1 WHERE id = ?2",
            params![parity.as_str(), student_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Student".to_string(),
                id: student_id.to_string(),
            });
        }
        Ok(())
    }

    /// 查询学生全部约束 (含停用)
    pub fn find_constraints(&self, student_id: i64) -> RepositoryResult<Vec<Constraint>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, student_id, constraint_type, constraint_value, description, is_active
               FROM constraints WHERE student_id = ?1 ORDER BY id"#,
        )?;
        let constraints = stmt
            .query_map(params![student_id], map_constraint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(constraints)
    }

    /// 一次查询挂载约束, 避免逐个学生查询
    fn attach_constraints(&self, mut students: Vec<Student>) -> RepositoryResult<Vec<Student>> {
        if students.is_empty() {
            return Ok(students);
        }

        let mut stmt = self.conn.prepare(
            r#"SELECT c.id, c.student_id, c.constraint_type, c.constraint_value, c.description, c.is_active
               FROM constraints c
               JOIN students s ON s.id = c.student_id
               WHERE s.is_active = 1
               ORDER BY c.id"#,
        )?;
        let mut by_student: HashMap<i64, Vec<Constraint>> = HashMap::new();
        for constraint in stmt.query_map([], map_constraint)? {
            let constraint = constraint?;
            by_student
                .entry(constraint.student_id)
                .or_default()
                .push(constraint);
        }

        for student in students.iter_mut() {
            student.constraints = by_student.remove(&student.id).unwrap_or_default();
        }
        Ok(students)
    }
}

fn map_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    let parity = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(raw.parse::<Parity>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into())
        })?),
        None => None,
    };

    Ok(Student {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        section_id: row.get(3)?,
        parity,
        is_active: row.get(5)?,
        constraints: Vec::new(),
    })
}

fn map_constraint(row: &Row<'_>) -> rusqlite::Result<Constraint> {
    Ok(Constraint {
        id: row.get(0)?,
        student_id: row.get(1)?,
        constraint_type: row.get(2)?,
        constraint_value: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
    })
}
