// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use chrono::{NaiveDate, NaiveTime};
use exam_slot_scheduler::domain::{Constraint, ExamSlot, Section, Student};
use exam_slot_scheduler::repository::{ExamSlotRepository, SectionRepository, StudentRepository};
use exam_slot_scheduler::Parity;
use rusqlite::Connection;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn d(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

// ==========================================
// Section 构建器
// ==========================================

pub struct SectionBuilder {
    code: String,
    proctor: Option<(i64, String)>,
    window: Option<(NaiveTime, NaiveTime)>,
    is_active: bool,
}

impl SectionBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            proctor: None,
            window: None,
            is_active: true,
        }
    }

    pub fn proctor(mut self, id: i64, name: &str) -> Self {
        self.proctor = Some((id, name.to_string()));
        self
    }

    pub fn window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn insert(self, conn: &Connection) -> i64 {
        let section = Section {
            id: 0,
            name: format!("Section {}", self.code),
            code: self.code,
            proctor_id: self.proctor.as_ref().map(|p| p.0),
            proctor_name: self.proctor.map(|p| p.1),
            window_start: self.window.map(|w| w.0),
            window_end: self.window.map(|w| w.1),
            is_active: self.is_active,
        };
        SectionRepository::new(conn)
            .insert(&section)
            .expect("插入分组失败")
    }
}

// ==========================================
// Student 构建器
// ==========================================

pub struct StudentBuilder {
    full_name: String,
    section_id: i64,
    parity: Option<Parity>,
    is_active: bool,
    constraints: Vec<(String, String, bool)>,
}

impl StudentBuilder {
    pub fn new(full_name: &str, section_id: i64) -> Self {
        Self {
            full_name: full_name.to_string(),
            section_id,
            parity: None,
            is_active: true,
            constraints: Vec::new(),
        }
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = Some(parity);
        self
    }

    pub fn constraint(mut self, tag: &str, value: &str) -> Self {
        self.constraints
            .push((tag.to_string(), value.to_string(), true));
        self
    }

    pub fn inactive_constraint(mut self, tag: &str, value: &str) -> Self {
        self.constraints
            .push((tag.to_string(), value.to_string(), false));
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn insert(self, conn: &Connection) -> i64 {
        let repo = StudentRepository::new(conn);
        let student = Student {
            id: 0,
            email: format!(
                "{}@example.edu",
                self.full_name.to_lowercase().replace(' ', ".")
            ),
            full_name: self.full_name,
            section_id: self.section_id,
            parity: self.parity,
            is_active: self.is_active,
            constraints: Vec::new(),
        };
        let student_id = repo.insert(&student).expect("插入学生失败");

        for (tag, value, is_active) in self.constraints {
            repo.insert_constraint(&Constraint {
                id: 0,
                student_id,
                constraint_type: tag,
                constraint_value: value,
                description: None,
                is_active,
            })
            .expect("插入约束失败");
        }
        student_id
    }
}

/// 批量创建无约束学生
pub fn seed_students(conn: &Connection, section_id: i64, count: usize, parity: Parity) -> Vec<i64> {
    (1..=count)
        .map(|i| {
            StudentBuilder::new(&format!("{} Student {}", parity, i), section_id)
                .parity(parity)
                .insert(conn)
        })
        .collect()
}

// ==========================================
// ExamSlot 构建器
// ==========================================

pub struct SlotBuilder {
    slot: ExamSlot,
}

impl SlotBuilder {
    pub fn new(student_id: i64, exam_index: u32, section_id: i64) -> Self {
        Self {
            slot: ExamSlot {
                id: 0,
                student_id,
                exam_index,
                section_id,
                week_index: 1,
                date: None,
                start_time: None,
                end_time: None,
                is_scheduled: false,
                is_locked: false,
            },
        }
    }

    pub fn week(mut self, week_index: u32, date: NaiveDate) -> Self {
        self.slot.week_index = week_index;
        self.slot.date = Some(date);
        self
    }

    pub fn at(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.slot.start_time = Some(start);
        self.slot.end_time = Some(end);
        self.slot.is_scheduled = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.slot.is_locked = true;
        self
    }

    pub fn insert(self, conn: &Connection) -> i64 {
        ExamSlotRepository::new(conn)
            .insert_raw(&self.slot)
            .expect("插入时段失败")
    }
}
