// ==========================================
// 口试时段排程系统 - 约束评估器
// ==========================================
// 职责: 判断候选时段是否满足学生的生效约束
// 策略: 放行优先 (fail-open) —— 约束无法解析时视为允许并告警
// ==========================================

use crate::domain::clock::format_time;
use crate::domain::student::{Constraint, ConstraintRule, Student};
use chrono::{NaiveDate, NaiveTime};

// ==========================================
// ConstraintEvaluator - 约束评估器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEvaluator;

impl ConstraintEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 学生是否可安排在该时段
    pub fn allows(
        &self,
        student: &Student,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> bool {
        let allowed = self.allows_constraints(&student.constraints, date, start_time, end_time);
        if allowed {
            tracing::debug!(
                student_id = student.id,
                start = %format_time(start_time),
                "约束检查通过"
            );
        }
        allowed
    }

    /// 逐条评估生效约束, 首个违反即返回 false
    ///
    /// # 规则
    /// - TimeBefore(t): start >= t 违反
    /// - TimeAfter(t): start < t 违反
    /// - SpecificDate(d): date != d 违反
    /// - ExcludeDate(d): date == d 违反
    /// - WeekParityPreference: 不在此评估 (由分组分配消费)
    /// - Unrecognized: 放行并告警
    pub fn allows_constraints(
        &self,
        constraints: &[Constraint],
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> bool {
        for constraint in constraints.iter().filter(|c| c.is_active) {
            let violated = match constraint.rule() {
                ConstraintRule::TimeBefore(limit) => start_time >= limit,
                ConstraintRule::TimeAfter(limit) => start_time < limit,
                ConstraintRule::SpecificDate(required) => date != required,
                ConstraintRule::ExcludeDate(excluded) => date == excluded,
                ConstraintRule::WeekParityPreference(_) => false,
                ConstraintRule::Unrecognized { tag, value, error } => {
                    tracing::warn!(
                        constraint_id = constraint.id,
                        student_id = constraint.student_id,
                        constraint_type = %tag,
                        constraint_value = %value,
                        error = %error,
                        "约束无法解析，按放行处理"
                    );
                    false
                }
            };

            if violated {
                tracing::debug!(
                    constraint_id = constraint.id,
                    student_id = constraint.student_id,
                    constraint_type = %constraint.constraint_type,
                    constraint_value = %constraint.constraint_value,
                    date = %date,
                    start = %format_time(start_time),
                    end = %format_time(end_time),
                    "约束违反"
                );
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn c(tag: &str, value: &str, active: bool) -> Constraint {
        Constraint {
            id: 1,
            student_id: 1,
            constraint_type: tag.to_string(),
            constraint_value: value.to_string(),
            description: None,
            is_active: active,
        }
    }

    fn allows(constraints: &[Constraint], date: NaiveDate, start: NaiveTime) -> bool {
        ConstraintEvaluator::new().allows_constraints(constraints, date, start, start)
    }

    #[test]
    fn test_no_constraints_is_permissive() {
        assert!(allows(&[], d(3), t(13, 30)));
    }

    #[test]
    fn test_time_before_is_strict() {
        let cs = [c("time_before", "14:00", true)];
        assert!(allows(&cs, d(3), t(13, 59)));
        assert!(!allows(&cs, d(3), t(14, 0)));
        assert!(!allows(&cs, d(3), t(14, 5)));
    }

    #[test]
    fn test_time_after_is_inclusive() {
        let cs = [c("time_after", "14:00", true)];
        assert!(!allows(&cs, d(3), t(13, 59)));
        assert!(allows(&cs, d(3), t(14, 0)));
    }

    #[test]
    fn test_date_rules() {
        let specific = [c("specific_date", "2025-10-03", true)];
        assert!(allows(&specific, d(3), t(13, 30)));
        assert!(!allows(&specific, d(10), t(13, 30)));

        let exclude = [c("exclude_date", "2025-10-03", true)];
        assert!(!allows(&exclude, d(3), t(13, 30)));
        assert!(allows(&exclude, d(10), t(13, 30)));
    }

    #[test]
    fn test_inactive_and_preference_ignored() {
        let cs = [
            c("time_before", "13:00", false),
            c("week_preference", "odd", true),
        ];
        assert!(allows(&cs, d(3), t(14, 0)));
    }

    #[test]
    fn test_malformed_value_fails_open_but_others_still_apply() {
        let cs = [c("specific_date", "soon", true)];
        assert!(allows(&cs, d(3), t(13, 30)));

        let mixed = [c("room", "B12", true), c("time_before", "14:00", true)];
        assert!(!allows(&mixed, d(3), t(14, 10)));
    }
}
