// ==========================================
// 单人重排集成测试
// ==========================================
// 测试范围:
// 1. 空档优先 (恰好 时长+缓冲 的空档)
// 2. 追加到末尾
// 3. 约束导致的显式未排
// 4. 锁定时段跳过
// 5. 起始轮次之前的时段不变
// 6. 单人补分组进入人数较少的周次分组
// ==========================================

mod helpers;

use exam_slot_scheduler::config::config_keys;
use exam_slot_scheduler::repository::{ExamSlotHistoryRepository, ExamSlotRepository, StudentRepository};
use exam_slot_scheduler::{Constraint, ExamSlot, Parity, ScheduleRegenerator};
use helpers::test_data_builder::{d, t, SectionBuilder, SlotBuilder, StudentBuilder};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn slot_of(conn: &Arc<Mutex<Connection>>, student_id: i64, exam_index: u32) -> ExamSlot {
    let c = conn.lock().unwrap();
    ExamSlotRepository::new(&c)
        .find_by_student_exam(student_id, exam_index)
        .unwrap()
        .expect("时段不存在")
}

/// 单轮次配置 + 一个分组 + 两名已排定的同周学生 (13:30 / 13:46)
fn setup_with_gap() -> (tempfile::NamedTempFile, Arc<Mutex<Connection>>, i64) {
    let (tmp, conn) = test_helpers::setup_test_db();
    test_helpers::set_config(&conn, config_keys::TOTAL_EXAMS, "1");
    let section_id = {
        let c = conn.lock().unwrap();
        let section_id = SectionBuilder::new("S1").insert(&c);
        for (name, start, end) in [
            ("First", t(13, 30), t(13, 37)),
            ("Third", t(13, 46), t(13, 53)),
        ] {
            let id = StudentBuilder::new(name, section_id)
                .parity(Parity::Odd)
                .insert(&c);
            SlotBuilder::new(id, 1, section_id)
                .week(1, d("2025-10-03"))
                .at(start, end)
                .insert(&c);
        }
        section_id
    };
    (tmp, conn, section_id)
}

#[test]
fn test_exact_interior_gap_is_used() {
    let (_tmp, conn, section_id) = setup_with_gap();
    let student_id = {
        let c = conn.lock().unwrap();
        StudentBuilder::new("Second", section_id)
            .parity(Parity::Odd)
            .insert(&c)
    };

    assert!(ScheduleRegenerator::new(conn.clone()).regenerate_for_student(student_id, 1));

    let slot = slot_of(&conn, student_id, 1);
    assert!(slot.is_scheduled);
    assert_eq!(slot.start_time, Some(t(13, 38)));
    assert_eq!(slot.end_time, Some(t(13, 45)));
    assert_eq!(slot.date, Some(d("2025-10-03")));
    assert_eq!(slot.week_index, 1);
}

#[test]
fn test_appends_when_no_interior_gap() {
    let (_tmp, conn, section_id) = setup_with_gap();
    let (blocker, student_id) = {
        let c = conn.lock().unwrap();
        let blocker = StudentBuilder::new("Blocker", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        SlotBuilder::new(blocker, 1, section_id)
            .week(1, d("2025-10-03"))
            .at(t(13, 38), t(13, 45))
            .insert(&c);
        let student_id = StudentBuilder::new("Late Joiner", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        (blocker, student_id)
    };

    let regenerator = ScheduleRegenerator::new(conn.clone());
    assert!(regenerator.regenerate_for_student(student_id, 1));

    assert_eq!(slot_of(&conn, student_id, 1).start_time, Some(t(13, 54)));
    // 其他学生不受影响
    assert_eq!(slot_of(&conn, blocker, 1).start_time, Some(t(13, 38)));
}

#[test]
fn test_constraint_blocking_every_candidate_leaves_explicit_unscheduled() {
    let (_tmp, conn, section_id) = setup_with_gap();
    let student_id = {
        let c = conn.lock().unwrap();
        StudentBuilder::new("Picky", section_id)
            .parity(Parity::Odd)
            .constraint("exclude_date", "2025-10-03")
            .insert(&c)
    };

    let report = ScheduleRegenerator::new(conn.clone()).regenerate_for_student_report(student_id, 1);
    assert!(report.success);
    assert_eq!(report.unscheduled_count, 1);

    let slot = slot_of(&conn, student_id, 1);
    assert!(!slot.is_scheduled);
    assert_eq!(slot.start_time, None);
    assert_eq!(slot.date, Some(d("2025-10-03")));
}

#[test]
fn test_locked_slot_is_skipped() {
    let (_tmp, conn, section_id) = setup_with_gap();
    let (student_id, locked_id) = {
        let c = conn.lock().unwrap();
        let student_id = StudentBuilder::new("Notified", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        let locked_id = SlotBuilder::new(student_id, 1, section_id)
            .week(1, d("2025-10-03"))
            .at(t(14, 30), t(14, 37))
            .locked()
            .insert(&c);
        (student_id, locked_id)
    };
    let before = slot_of(&conn, student_id, 1);

    let report = ScheduleRegenerator::new(conn.clone()).regenerate_for_student_report(student_id, 1);
    assert!(report.success);
    assert_eq!(report.kept_locked_count, 1);

    let after = slot_of(&conn, student_id, 1);
    assert_eq!(after.id, locked_id);
    assert_eq!(before, after);
}

#[test]
fn test_constraint_change_only_affects_later_exams() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    let (student_id, other) = {
        let c = conn.lock().unwrap();
        let section_id = SectionBuilder::new("S1").insert(&c);
        let student_id = StudentBuilder::new("Changer", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        let other = StudentBuilder::new("Steady", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        (student_id, other)
    };
    let regenerator = ScheduleRegenerator::new(conn.clone());
    regenerator.generate_all(1);

    let exam1_before = slot_of(&conn, student_id, 1);
    let other_exam2_before = slot_of(&conn, other, 2);

    {
        let c = conn.lock().unwrap();
        StudentRepository::new(&c)
            .insert_constraint(&Constraint {
                id: 0,
                student_id,
                constraint_type: "specific_date".to_string(),
                constraint_value: "2025-10-03".to_string(),
                description: None,
                is_active: true,
            })
            .unwrap();
    }

    assert!(regenerator.regenerate_for_student(student_id, 2));

    // 第 1 轮不变, 第 2 轮 (2025-10-17) 无法满足指定日期 → 未排, 行保留
    assert_eq!(slot_of(&conn, student_id, 1), exam1_before);
    let exam2 = slot_of(&conn, student_id, 2);
    assert!(!exam2.is_scheduled);
    assert_eq!(slot_of(&conn, other, 2), other_exam2_before);

    let c = conn.lock().unwrap();
    let history = ExamSlotHistoryRepository::new(&c)
        .find_by_slot(exam2.id)
        .unwrap();
    assert!(!history.is_empty());
    assert!(history.iter().all(|h| h.reason == "Student regenerated"));
    assert!(history[0].is_scheduled);
}

#[test]
fn test_missing_student_returns_false() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    assert!(!ScheduleRegenerator::new(conn).regenerate_for_student(404, 1));
}

#[test]
fn test_untagged_student_joins_smaller_week_group() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    let student_id = {
        let c = conn.lock().unwrap();
        let section_id = SectionBuilder::new("S1").insert(&c);
        for name in ["Odd A", "Odd B", "Odd C"] {
            StudentBuilder::new(name, section_id)
                .parity(Parity::Odd)
                .insert(&c);
        }
        StudentBuilder::new("Even A", section_id)
            .parity(Parity::Even)
            .insert(&c);
        StudentBuilder::new("Newcomer", section_id).insert(&c)
    };

    assert!(ScheduleRegenerator::new(conn.clone()).regenerate_for_student(student_id, 1));

    let c = conn.lock().unwrap();
    let student = StudentRepository::new(&c).get(student_id).unwrap();
    assert_eq!(student.parity, Some(Parity::Even));
    let slot = ExamSlotRepository::new(&c)
        .find_by_student_exam(student_id, 1)
        .unwrap()
        .unwrap();
    assert_eq!(slot.week_index, 2);
    assert_eq!(slot.date, Some(d("2025-10-10")));
}
