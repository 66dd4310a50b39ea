// ==========================================
// 口试时段排程系统 - 跨分组均衡分配器
// ==========================================
// 职责: 均衡模式下, 将同一周次分组的学生轮询分配到有监考助教的分组
// 流程:
// 1) 整组按 distribution_seed(exam, week) 做优先级排序
// 2) 按排序结果轮询分配到分组 (分组按 ID 升序)
// 3) 每个分组内按 section_seed(section, exam, week) 重新排序
// ==========================================

use crate::domain::student::{Section, Student};
use crate::engine::priority::{distribution_seed, section_seed, PriorityOrderer};

/// 单个分组的分配结果 (已排序)
#[derive(Debug, Clone)]
pub struct SectionAssignment<'s> {
    pub section_id: i64,
    pub students: Vec<&'s Student>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBalancer {
    orderer: PriorityOrderer,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self {
            orderer: PriorityOrderer::new(),
        }
    }

    /// 分配
    ///
    /// # 返回
    /// 至少分到一名学生的分组 (按分组ID升序); 无可用分组时为空
    pub fn distribute<'s>(
        &self,
        students: &[&'s Student],
        sections: &[Section],
        exam_index: u32,
        week_index: u32,
    ) -> Vec<SectionAssignment<'s>> {
        let mut eligible: Vec<i64> = sections
            .iter()
            .filter(|s| s.is_active && s.has_proctor())
            .map(|s| s.id)
            .collect();
        eligible.sort_unstable();
        eligible.dedup();

        if eligible.is_empty() {
            tracing::warn!(exam_index, week_index, "没有配置监考助教的分组，无法均衡分配");
            return Vec::new();
        }

        let ordered = self
            .orderer
            .order(students, distribution_seed(exam_index, week_index));

        let mut buckets: Vec<Vec<&'s Student>> = vec![Vec::new(); eligible.len()];
        for (position, student) in ordered.into_iter().enumerate() {
            buckets[position % eligible.len()].push(student);
        }

        let assignments: Vec<SectionAssignment<'s>> = eligible
            .into_iter()
            .zip(buckets)
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(section_id, bucket)| SectionAssignment {
                section_id,
                students: self
                    .orderer
                    .order(&bucket, section_seed(section_id, exam_index, week_index)),
            })
            .collect();

        tracing::debug!(
            exam_index,
            week_index,
            sections = assignments.len(),
            students = students.len(),
            "均衡分配完成"
        );
        assignments
    }
}
