// ==========================================
// 口试时段排程系统 - 学生/分组/约束领域模型
// ==========================================
// 对齐: schema students / sections / constraints 表
// 红线: 引擎只读约束, 唯一例外是周次偏好驱动分组分配
// ==========================================

use crate::domain::clock::{parse_date, parse_time};
use crate::domain::types::{ConstraintType, Parity};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Section - 考试分组 (对应一位监考助教)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub proctor_id: Option<i64>,            // 监考助教 (可空)
    pub proctor_name: Option<String>,
    pub window_start: Option<NaiveTime>,    // 分组专属时间窗 (为空则用全局配置)
    pub window_end: Option<NaiveTime>,
    pub is_active: bool,
}

impl Section {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }

    pub fn has_proctor(&self) -> bool {
        self.proctor_id.is_some()
    }
}

// ==========================================
// Constraint - 学生约束 (原始字符串形式)
// ==========================================
// 说明: 值在评估时才解析, 解析失败由评估器按放行策略处理
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: i64,
    pub student_id: i64,
    pub constraint_type: String,
    pub constraint_value: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// 解析后的约束规则（封闭枚举, 穷尽匹配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintRule {
    TimeBefore(NaiveTime),
    TimeAfter(NaiveTime),
    SpecificDate(NaiveDate),
    ExcludeDate(NaiveDate),
    WeekParityPreference(Parity),
    /// 未知标签或值无法解析
    Unrecognized { tag: String, value: String, error: String },
}

impl Constraint {
    /// 按标签识别类型（不解析值）
    pub fn kind(&self) -> Option<ConstraintType> {
        self.constraint_type.parse().ok()
    }

    /// 解析为规则
    pub fn rule(&self) -> ConstraintRule {
        let unrecognized = |error: String| ConstraintRule::Unrecognized {
            tag: self.constraint_type.clone(),
            value: self.constraint_value.clone(),
            error,
        };

        let kind = match self.kind() {
            Some(kind) => kind,
            None => return unrecognized("未知约束类型".to_string()),
        };

        match kind {
            ConstraintType::TimeBefore => parse_time(&self.constraint_value)
                .map(ConstraintRule::TimeBefore)
                .unwrap_or_else(|e| unrecognized(e.to_string())),
            ConstraintType::TimeAfter => parse_time(&self.constraint_value)
                .map(ConstraintRule::TimeAfter)
                .unwrap_or_else(|e| unrecognized(e.to_string())),
            ConstraintType::SpecificDate => parse_date(&self.constraint_value)
                .map(ConstraintRule::SpecificDate)
                .unwrap_or_else(|e| unrecognized(e.to_string())),
            ConstraintType::ExcludeDate => parse_date(&self.constraint_value)
                .map(ConstraintRule::ExcludeDate)
                .unwrap_or_else(|e| unrecognized(e.to_string())),
            ConstraintType::WeekPreference => self
                .constraint_value
                .parse::<Parity>()
                .map(ConstraintRule::WeekParityPreference)
                .unwrap_or_else(unrecognized),
        }
    }

    /// 面向人的约束描述
    pub fn display_description(&self) -> String {
        if let Some(desc) = self.description.as_ref().filter(|d| !d.trim().is_empty()) {
            return desc.clone();
        }

        let value = &self.constraint_value;
        match self.kind() {
            Some(ConstraintType::TimeBefore) => format!("Must complete exam before {}", value),
            Some(ConstraintType::TimeAfter) => format!("Cannot take exam before {}", value),
            Some(ConstraintType::WeekPreference) => format!("Prefers {} weeks only", value),
            Some(ConstraintType::SpecificDate) => format!("Must take exam on {}", value),
            Some(ConstraintType::ExcludeDate) => format!("Cannot take exam on {}", value),
            None => value.clone(),
        }
    }
}

// ==========================================
// Student - 学生
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub section_id: i64,
    pub parity: Option<Parity>,       // 周次分组 (分配前为空)
    pub is_active: bool,
    pub constraints: Vec<Constraint>, // 全部约束 (含停用)
}

impl Student {
    pub fn active_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_active)
    }

    /// 是否存在指定类型的生效约束
    pub fn has_active(&self, kind: ConstraintType) -> bool {
        self.active_constraints().any(|c| c.kind() == Some(kind))
    }

    /// 生效的周次偏好（取第一条可解析的）
    pub fn parity_preference(&self) -> Option<Parity> {
        self.active_constraints().find_map(|c| match c.rule() {
            ConstraintRule::WeekParityPreference(p) => Some(p),
            _ => None,
        })
    }
}
