// ==========================================
// 均衡模式集成测试
// ==========================================
// 测试范围:
// 1. 学生只分配到有监考助教的分组
// 2. 分组间人数差不超过 1
// 3. 无可用分组时报告失败且不清理已有时段
// 4. 单人重排沿用已分配的分组
// 5. 其他分组的锁定时段不占用本分组容量
// ==========================================

mod helpers;

use exam_slot_scheduler::config::config_keys;
use exam_slot_scheduler::repository::ExamSlotRepository;
use exam_slot_scheduler::{ExamSlot, Parity, ScheduleRegenerator};
use helpers::test_data_builder::{d, seed_students, t, SectionBuilder, SlotBuilder, StudentBuilder};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn slots_for(conn: &Arc<Mutex<Connection>>, student_ids: &[i64], exam_index: u32) -> Vec<ExamSlot> {
    let c = conn.lock().unwrap();
    let repo = ExamSlotRepository::new(&c);
    student_ids
        .iter()
        .map(|id| {
            repo.find_by_student_exam(*id, exam_index)
                .unwrap()
                .expect("时段不存在")
        })
        .collect()
}

struct Fixture {
    _tmp: tempfile::NamedTempFile,
    conn: Arc<Mutex<Connection>>,
    section_a: i64,
    section_b: i64,
    section_c: i64,
    students: Vec<i64>,
}

/// A、B 有监考助教, C 没有; 6 名单周学生都挂在 C
fn setup() -> Fixture {
    let (tmp, conn) = test_helpers::setup_test_db();
    test_helpers::set_config(&conn, config_keys::BALANCED_TA_SCHEDULING, "true");
    test_helpers::set_config(&conn, config_keys::TOTAL_EXAMS, "1");
    let (section_a, section_b, section_c, students) = {
        let c = conn.lock().unwrap();
        let section_a = SectionBuilder::new("A").proctor(101, "TA Alpha").insert(&c);
        let section_b = SectionBuilder::new("B").proctor(102, "TA Beta").insert(&c);
        let section_c = SectionBuilder::new("C").insert(&c);
        let students = seed_students(&c, section_c, 6, Parity::Odd);
        (section_a, section_b, section_c, students)
    };
    Fixture {
        _tmp: tmp,
        conn,
        section_a,
        section_b,
        section_c,
        students,
    }
}

#[test]
fn test_students_split_evenly_across_proctored_sections() {
    let fx = setup();
    let report = ScheduleRegenerator::new(fx.conn.clone()).generate_all(1);
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.scheduled_count, 6);

    let slots = slots_for(&fx.conn, &fx.students, 1);
    let mut per_section: HashMap<i64, Vec<&ExamSlot>> = HashMap::new();
    for slot in &slots {
        per_section.entry(slot.section_id).or_default().push(slot);
    }

    assert!(!per_section.contains_key(&fx.section_c));
    assert_eq!(per_section[&fx.section_a].len(), 3);
    assert_eq!(per_section[&fx.section_b].len(), 3);

    // 每个分组独立从窗口起点开始排
    for section_id in [fx.section_a, fx.section_b] {
        let mut starts: Vec<_> = per_section[&section_id]
            .iter()
            .map(|s| s.start_time.unwrap())
            .collect();
        starts.sort();
        assert_eq!(starts, vec![t(13, 30), t(13, 38), t(13, 46)]);
    }
    assert!(slots.iter().all(|s| s.date == Some(d("2025-10-03"))));
}

#[test]
fn test_balanced_distribution_is_stable_across_runs() {
    let fx = setup();
    let regenerator = ScheduleRegenerator::new(fx.conn.clone());
    regenerator.generate_all(1);
    let first = slots_for(&fx.conn, &fx.students, 1);

    regenerator.generate_all(1);
    let second = slots_for(&fx.conn, &fx.students, 1);
    assert_eq!(first, second);
}

#[test]
fn test_locked_slot_outside_assigned_section_keeps_capacity() {
    let fx = setup();
    // C 没有监考助教, 锁定学生一定被分到 A 或 B
    let locked_id = {
        let c = fx.conn.lock().unwrap();
        SlotBuilder::new(fx.students[0], 1, fx.section_c)
            .week(1, d("2025-10-03"))
            .at(t(14, 40), t(14, 47))
            .locked()
            .insert(&c)
    };
    let before = slots_for(&fx.conn, &fx.students[..1], 1).remove(0);

    let report = ScheduleRegenerator::new(fx.conn.clone()).generate_all(1);
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.kept_locked_count, 1);
    assert_eq!(report.scheduled_count, 5);
    assert_eq!(report.unscheduled_count, 0);

    let after = slots_for(&fx.conn, &fx.students[..1], 1).remove(0);
    assert_eq!(after.id, locked_id);
    assert_eq!(after, before);

    let others = slots_for(&fx.conn, &fx.students[1..], 1);
    assert!(others.iter().all(|s| s.is_scheduled));
    assert!(others
        .iter()
        .all(|s| s.start_time.unwrap() < t(14, 10)));
}

#[test]
fn test_no_proctored_sections_fails_without_clearing() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::set_config(&conn, config_keys::BALANCED_TA_SCHEDULING, "true");
    let (student_id, slot_id) = {
        let c = conn.lock().unwrap();
        let section_id = SectionBuilder::new("Lonely").insert(&c);
        let student_id = StudentBuilder::new("Keeper", section_id)
            .parity(Parity::Odd)
            .insert(&c);
        let slot_id = SlotBuilder::new(student_id, 1, section_id)
            .week(1, d("2025-10-03"))
            .at(t(13, 30), t(13, 37))
            .insert(&c);
        (student_id, slot_id)
    };

    let report = ScheduleRegenerator::new(conn.clone()).generate_all(1);
    assert!(!report.success);
    assert_eq!(report.cleared_count, 0);
    assert!(report
        .errors
        .iter()
        .any(|e| e == "No sections with assigned proctors found. Cannot generate balanced schedule."));

    let kept = slots_for(&conn, &[student_id], 1);
    assert_eq!(kept[0].id, slot_id);
    assert!(kept[0].is_scheduled);
}

#[test]
fn test_student_regeneration_keeps_assigned_section() {
    let fx = setup();
    let regenerator = ScheduleRegenerator::new(fx.conn.clone());
    regenerator.generate_all(1);

    let target = fx.students[0];
    let before = slots_for(&fx.conn, &[target], 1).remove(0);
    assert_ne!(before.section_id, fx.section_c);

    assert!(regenerator.regenerate_for_student(target, 1));

    let after = slots_for(&fx.conn, &[target], 1).remove(0);
    assert_eq!(after.section_id, before.section_id);
    // 自己的位置已释放, 最早的空档就是原位置
    assert_eq!(after.start_time, before.start_time);
}
