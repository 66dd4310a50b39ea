// ==========================================
// 口试时段排程系统 - 周次分组分配器
// ==========================================
// 职责: 为学生分配单/双周分组 (Parity)
// 规则:
// 1) 有生效 week_preference 约束 → 强制为偏好分组 (覆盖已有值)
// 2) 其余尚无分组的学生 → 随机洗牌后交替分配 odd/even
//    单人补分组时改为进入人数较少的分组 (相同则随机)
// 已有分组且无偏好约束的学生保持不变
// ==========================================

use crate::domain::student::Student;
use crate::domain::types::Parity;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;

/// 分配来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignmentSource {
    Preference,
    Alternating,
}

/// 单个学生的分组变化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityAssignment {
    pub student_id: i64,
    pub parity: Parity,
    pub source: AssignmentSource,
}

// ==========================================
// CohortAssigner - 周次分组分配器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct CohortAssigner;

impl CohortAssigner {
    pub fn new() -> Self {
        Self
    }

    /// 使用线程随机源分配
    pub fn assign(&self, students: &mut [Student]) -> Vec<ParityAssignment> {
        self.assign_with_rng(students, &mut rand::rng())
    }

    /// 使用指定随机源分配
    ///
    /// # 返回
    /// 分组发生变化的学生 (调用方负责持久化)
    pub fn assign_with_rng<R: Rng + ?Sized>(
        &self,
        students: &mut [Student],
        rng: &mut R,
    ) -> Vec<ParityAssignment> {
        let mut changes = self.apply_preferences(students);

        // 第二轮: 无分组学生交替分配
        for (position, idx) in Self::shuffled_untagged(students, rng).into_iter().enumerate() {
            changes.push(Self::tag(&mut students[idx], Parity::alternating(position)));
        }

        Self::log_changes(&changes);
        changes
    }

    /// 以已有分组人数为基准分配 (单人补分组)
    ///
    /// # 参数
    /// - `odd`/`even`: 切片之外已分组的人数
    ///
    /// # 规则
    /// 无分组学生依次进入人数较少的分组, 人数相同时随机选择
    pub fn assign_against<R: Rng + ?Sized>(
        &self,
        students: &mut [Student],
        odd: usize,
        even: usize,
        rng: &mut R,
    ) -> Vec<ParityAssignment> {
        let mut changes = self.apply_preferences(students);

        let (mut odd, mut even) = students.iter().fold((odd, even), |(o, e), s| match s.parity {
            Some(Parity::Odd) => (o + 1, e),
            Some(Parity::Even) => (o, e + 1),
            None => (o, e),
        });

        for idx in Self::shuffled_untagged(students, rng) {
            let parity = match odd.cmp(&even) {
                Ordering::Less => Parity::Odd,
                Ordering::Greater => Parity::Even,
                Ordering::Equal if rng.random_bool(0.5) => Parity::Odd,
                Ordering::Equal => Parity::Even,
            };
            match parity {
                Parity::Odd => odd += 1,
                Parity::Even => even += 1,
            }
            changes.push(Self::tag(&mut students[idx], parity));
        }

        Self::log_changes(&changes);
        changes
    }

    /// 第一轮: 偏好约束
    fn apply_preferences(&self, students: &mut [Student]) -> Vec<ParityAssignment> {
        let mut changes = Vec::new();
        for student in students.iter_mut() {
            if let Some(preferred) = student.parity_preference() {
                if student.parity != Some(preferred) {
                    student.parity = Some(preferred);
                    changes.push(ParityAssignment {
                        student_id: student.id,
                        parity: preferred,
                        source: AssignmentSource::Preference,
                    });
                }
            }
        }
        changes
    }

    fn shuffled_untagged<R: Rng + ?Sized>(students: &[Student], rng: &mut R) -> Vec<usize> {
        let mut untagged: Vec<usize> = students
            .iter()
            .enumerate()
            .filter(|(_, s)| s.parity.is_none())
            .map(|(i, _)| i)
            .collect();
        untagged.shuffle(rng);
        untagged
    }

    fn tag(student: &mut Student, parity: Parity) -> ParityAssignment {
        student.parity = Some(parity);
        ParityAssignment {
            student_id: student.id,
            parity,
            source: AssignmentSource::Alternating,
        }
    }

    fn log_changes(changes: &[ParityAssignment]) {
        if !changes.is_empty() {
            tracing::info!(assigned = changes.len(), "周次分组分配完成");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::student::Constraint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn student(id: i64, parity: Option<Parity>, preference: Option<&str>) -> Student {
        Student {
            id,
            full_name: format!("Student {}", id),
            email: format!("s{}@example.edu", id),
            section_id: 1,
            parity,
            is_active: true,
            constraints: preference
                .map(|p| {
                    vec![Constraint {
                        id,
                        student_id: id,
                        constraint_type: "week_preference".to_string(),
                        constraint_value: p.to_string(),
                        description: None,
                        is_active: true,
                    }]
                })
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_preference_overrides_existing_parity() {
        let mut students = vec![student(1, Some(Parity::Even), Some("odd"))];
        let changes = CohortAssigner::new().assign(&mut students);
        assert_eq!(students[0].parity, Some(Parity::Odd));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].source, AssignmentSource::Preference);
    }

    #[test]
    fn test_untagged_split_evenly() {
        let mut students: Vec<Student> = (1..=11).map(|i| student(i, None, None)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let changes = CohortAssigner::new().assign_with_rng(&mut students, &mut rng);

        assert_eq!(changes.len(), 11);
        let odd = students.iter().filter(|s| s.parity == Some(Parity::Odd)).count();
        let even = students.iter().filter(|s| s.parity == Some(Parity::Even)).count();
        assert_eq!(odd, 6);
        assert_eq!(even, 5);
    }

    #[test]
    fn test_existing_parity_without_preference_kept() {
        let mut students = vec![
            student(1, Some(Parity::Even), None),
            student(2, Some(Parity::Odd), Some("odd")),
        ];
        let changes = CohortAssigner::new().assign(&mut students);
        assert!(changes.is_empty());
        assert_eq!(students[0].parity, Some(Parity::Even));
    }

    #[test]
    fn test_malformed_preference_treated_as_absent() {
        let mut students = vec![student(1, None, Some("weekly"))];
        let changes = CohortAssigner::new().assign(&mut students);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].source, AssignmentSource::Alternating);
        assert_eq!(students[0].parity, Some(Parity::Odd));
    }

    #[test]
    fn test_single_student_joins_smaller_group() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let assigner = CohortAssigner::new();

        let mut students = vec![student(1, None, None)];
        assigner.assign_against(&mut students, 4, 2, &mut rng);
        assert_eq!(students[0].parity, Some(Parity::Even));

        let mut students = vec![student(2, None, None)];
        assigner.assign_against(&mut students, 1, 3, &mut rng);
        assert_eq!(students[0].parity, Some(Parity::Odd));
    }

    #[test]
    fn test_tied_groups_are_not_always_odd() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let assigner = CohortAssigner::new();
        let picks: Vec<Parity> = (1..=32)
            .map(|i| {
                let mut students = vec![student(i, None, None)];
                assigner.assign_against(&mut students, 3, 3, &mut rng);
                students[0].parity.unwrap()
            })
            .collect();
        assert!(picks.contains(&Parity::Odd));
        assert!(picks.contains(&Parity::Even));
    }

    #[test]
    fn test_assign_against_honours_preference_and_counts_slice() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut students = vec![
            student(1, None, Some("even")),
            student(2, None, None),
        ];
        let changes = CohortAssigner::new().assign_against(&mut students, 0, 0, &mut rng);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].source, AssignmentSource::Preference);
        assert_eq!(students[0].parity, Some(Parity::Even));
        assert_eq!(students[1].parity, Some(Parity::Odd));
    }
}
