// ==========================================
// 口试时段排程系统 - 领域类型定义
// ==========================================
// 职责: 周次分组 / 约束类型 / 未排原因 等封闭枚举
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 周次分组 (Parity)
// ==========================================
// 每个考试轮次占两周: odd 组在前一周, even 组在后一周
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Odd,  // 单周
    Even, // 双周
}

impl Parity {
    /// 数据库/配置中的字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::Odd => "odd",
            Parity::Even => "even",
        }
    }

    /// 该分组在考试轮次两周中的偏移 (odd=1, even=2)
    pub fn week_offset(&self) -> u32 {
        match self {
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }

    /// 按位置交替分配: 0 -> odd, 1 -> even, 2 -> odd ...
    pub fn alternating(position: usize) -> Self {
        if position % 2 == 0 {
            Parity::Odd
        } else {
            Parity::Even
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "odd" => Ok(Parity::Odd),
            "even" => Ok(Parity::Even),
            other => Err(format!("无效的周次分组: {}", other)),
        }
    }
}

// ==========================================
// 约束类型标签 (Constraint Type)
// ==========================================
// 对齐: constraints.constraint_type 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    TimeBefore,     // 必须在某时刻前开始
    TimeAfter,      // 不得早于某时刻开始
    SpecificDate,   // 只能在指定日期
    ExcludeDate,    // 不能在指定日期
    WeekPreference, // 周次偏好 (odd/even)
}

impl ConstraintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::TimeBefore => "time_before",
            ConstraintType::TimeAfter => "time_after",
            ConstraintType::SpecificDate => "specific_date",
            ConstraintType::ExcludeDate => "exclude_date",
            ConstraintType::WeekPreference => "week_preference",
        }
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConstraintType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "time_before" => Ok(ConstraintType::TimeBefore),
            "time_after" => Ok(ConstraintType::TimeAfter),
            "specific_date" => Ok(ConstraintType::SpecificDate),
            "exclude_date" => Ok(ConstraintType::ExcludeDate),
            "week_preference" => Ok(ConstraintType::WeekPreference),
            other => Err(format!("未知约束类型: {}", other)),
        }
    }
}

// ==========================================
// 未排原因 (Unscheduled Reason)
// ==========================================
// 红线: 所有未排结果必须输出 reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnscheduledReason {
    WindowExhausted,     // 时间窗剩余不足
    ConstraintViolation, // 违反学生约束
    InvalidWindow,       // 时间窗配置无效 (结束<=开始 或 短于单场时长)
    NoGapAvailable,      // 单人重排时无可用空档
}

impl fmt::Display for UnscheduledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnscheduledReason::WindowExhausted => write!(f, "WINDOW_EXHAUSTED"),
            UnscheduledReason::ConstraintViolation => write!(f, "CONSTRAINT_VIOLATION"),
            UnscheduledReason::InvalidWindow => write!(f, "INVALID_WINDOW"),
            UnscheduledReason::NoGapAvailable => write!(f, "NO_GAP_AVAILABLE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_round_trip_and_offsets() {
        assert_eq!("ODD".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!(" even ".parse::<Parity>().unwrap(), Parity::Even);
        assert!("weekly".parse::<Parity>().is_err());
        assert_eq!(Parity::Odd.week_offset(), 1);
        assert_eq!(Parity::Even.week_offset(), 2);
        assert_eq!(Parity::alternating(0), Parity::Odd);
        assert_eq!(Parity::alternating(3), Parity::Even);
    }

    #[test]
    fn test_constraint_type_unknown_tag() {
        assert_eq!(
            "exclude_date".parse::<ConstraintType>().unwrap(),
            ConstraintType::ExcludeDate
        );
        assert!("room_preference".parse::<ConstraintType>().is_err());
    }
}
