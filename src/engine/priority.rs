// ==========================================
// 口试时段排程系统 - 优先级排序器
// ==========================================
// 职责: 单次排程前, 对学生集合做确定性的分组 + 洗牌
// 输入: 学生列表 + 种子
// 输出: 排序后的学生列表 (约束越紧越靠前)
// ==========================================
// 分组优先级 (固定):
// 1) 有生效 TimeBefore
// 2) 有生效 TimeAfter
// 3) 有生效 SpecificDate / ExcludeDate
// 4) 无上述约束
// 组内洗牌: ChaCha8Rng, 种子 = derive_group_seed(seed, 组标签)
// ==========================================

use crate::domain::student::Student;
use crate::domain::types::ConstraintType;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// 优先级分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityGroup {
    TimeBefore,
    TimeAfter,
    DateBound,
    Unconstrained,
}

impl PriorityGroup {
    /// 固定的优先顺序
    pub const ORDER: [PriorityGroup; 4] = [
        PriorityGroup::TimeBefore,
        PriorityGroup::TimeAfter,
        PriorityGroup::DateBound,
        PriorityGroup::Unconstrained,
    ];

    /// 组标签 (参与派生种子)
    pub fn tag(&self) -> &'static str {
        match self {
            PriorityGroup::TimeBefore => "time_before",
            PriorityGroup::TimeAfter => "time_after",
            PriorityGroup::DateBound => "other_constraints",
            PriorityGroup::Unconstrained => "no_constraints",
        }
    }

    fn position(&self) -> usize {
        match self {
            PriorityGroup::TimeBefore => 0,
            PriorityGroup::TimeAfter => 1,
            PriorityGroup::DateBound => 2,
            PriorityGroup::Unconstrained => 3,
        }
    }
}

// ==========================================
// PriorityOrderer - 优先级排序器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityOrderer;

impl PriorityOrderer {
    pub fn new() -> Self {
        Self
    }

    /// 判定学生所属优先级分组
    pub fn classify(&self, student: &Student) -> PriorityGroup {
        if student.has_active(ConstraintType::TimeBefore) {
            PriorityGroup::TimeBefore
        } else if student.has_active(ConstraintType::TimeAfter) {
            PriorityGroup::TimeAfter
        } else if student.has_active(ConstraintType::SpecificDate)
            || student.has_active(ConstraintType::ExcludeDate)
        {
            PriorityGroup::DateBound
        } else {
            PriorityGroup::Unconstrained
        }
    }

    /// 排序
    ///
    /// # 说明
    /// - 组内先按学生ID排序再洗牌, 结果与输入顺序无关
    /// - 同一 seed + 同一学生集合 → 完全相同的顺序
    /// - 某组成员变化不影响其他组的相对顺序
    pub fn order<'s>(&self, students: &[&'s Student], seed: u64) -> Vec<&'s Student> {
        let mut groups: [Vec<&'s Student>; 4] = Default::default();
        for student in students {
            groups[self.classify(student).position()].push(*student);
        }

        let mut ordered = Vec::with_capacity(students.len());
        for group in PriorityGroup::ORDER {
            let members = &mut groups[group.position()];
            members.sort_by_key(|s| s.id);
            let mut rng = ChaCha8Rng::seed_from_u64(derive_group_seed(seed, group.tag()));
            members.shuffle(&mut rng);
            ordered.append(members);
        }
        ordered
    }
}

// ==========================================
// 种子派生
// ==========================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// FNV-1a 64 位
fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// 组种子 = (seed * GOLDEN_GAMMA) XOR FNV1a64(tag)
pub fn derive_group_seed(seed: u64, tag: &str) -> u64 {
    seed.wrapping_mul(GOLDEN_GAMMA) ^ fnv1a64(tag.as_bytes())
}

/// 分组排程 (非均衡模式) 的窗口种子
pub fn window_seed(exam_index: u32, week_index: u32) -> u64 {
    u64::from(exam_index) + u64::from(week_index)
}

/// 均衡模式: 整个周次分组的分配种子
pub fn distribution_seed(exam_index: u32, week_index: u32) -> u64 {
    u64::from(exam_index) * 100 + u64::from(week_index)
}

/// 均衡模式: 单个分组内的时段种子
pub fn section_seed(section_id: i64, exam_index: u32, week_index: u32) -> u64 {
    (section_id as u64)
        .wrapping_mul(1000)
        .wrapping_add(distribution_seed(exam_index, week_index))
}
