// ==========================================
// 口试时段排程系统 - 考试日期解析器
// ==========================================
// 职责: (考试轮次, 周次分组) ↔ (学期周次, 日历日期)
// 规则:
// - week_index = 2 * (exam_index - 1) + offset  (odd=1, even=2)
// - 首个考试日 = 学期开始日当天或之后第一个考试星期
// - 默认日期 = 首个考试日 + (week_index - 1) * 7 天
// - exam_dates 中 "{exam}_{parity}" 覆写优先
// ==========================================

use crate::config::ScheduleConfig;
use crate::domain::clock::parse_date;
use crate::domain::types::Parity;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateResolveError {
    #[error("{date} 不是考试日 (应为 {expected})")]
    NotExamDay { date: NaiveDate, expected: Weekday },

    #[error("{date} 早于首个考试日 {first}")]
    BeforeFirstExamDay { date: NaiveDate, first: NaiveDate },

    #[error("无效的日期覆写键: {0} (应为 <轮次>_<odd|even>)")]
    InvalidOverrideKey(String),

    #[error("无效的覆写日期: {key} = {value}")]
    InvalidOverrideDate { key: String, value: String },
}

/// 解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWeek {
    pub date: NaiveDate,
    pub week_index: u32,
}

// ==========================================
// DateResolver - 考试日期解析器
// ==========================================
#[derive(Debug, Clone)]
pub struct DateResolver {
    exam_day: Weekday,
    quarter_start: NaiveDate,
    overrides: BTreeMap<String, String>,
}

impl DateResolver {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            exam_day: config.exam_day,
            quarter_start: config.quarter_start_date,
            overrides: config.exam_dates.clone(),
        }
    }

    /// 覆写键
    pub fn override_key(exam_index: u32, parity: Parity) -> String {
        format!("{}_{}", exam_index, parity.as_str())
    }

    /// 解析覆写键 "3_even" → (3, Even)
    pub fn parse_override_key(key: &str) -> Result<(u32, Parity), DateResolveError> {
        let invalid = || DateResolveError::InvalidOverrideKey(key.to_string());
        let (exam, parity) = key.trim().split_once('_').ok_or_else(invalid)?;
        let exam_index: u32 = exam.parse().map_err(|_| invalid())?;
        if exam_index == 0 {
            return Err(invalid());
        }
        let parity = match parity {
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            _ => return Err(invalid()),
        };
        Ok((exam_index, parity))
    }

    /// 学期周次 (未考虑覆写)
    pub fn week_index(exam_index: u32, parity: Parity) -> u32 {
        2 * exam_index.saturating_sub(1) + parity.week_offset()
    }

    /// 首个考试日
    pub fn first_exam_day(&self) -> NaiveDate {
        let target = i64::from(self.exam_day.num_days_from_monday());
        let current = i64::from(self.quarter_start.weekday().num_days_from_monday());
        let ahead = (target - current).rem_euclid(7);
        self.quarter_start + Duration::days(ahead)
    }

    /// 按周次推算的默认日期
    pub fn default_date(&self, week_index: u32) -> NaiveDate {
        self.first_exam_day() + Duration::weeks(i64::from(week_index.saturating_sub(1)))
    }

    /// 覆写日期 (不存在或无法解析时为 None)
    pub fn override_date(&self, exam_index: u32, parity: Parity) -> Option<NaiveDate> {
        let key = Self::override_key(exam_index, parity);
        let raw = self.overrides.get(&key)?;
        if raw.trim().is_empty() {
            return None;
        }
        match parse_date(raw) {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::error!(key = %key, value = %raw, error = %e, "覆写日期无法解析，使用默认日期");
                None
            }
        }
    }

    /// 考试日期: 覆写优先, 否则默认
    pub fn resolve_date(&self, exam_index: u32, parity: Parity) -> NaiveDate {
        self.resolve(exam_index, parity).date
    }

    /// 考试日期 + 存储周次
    ///
    /// # 说明
    /// 覆写日期合法时, 周次取该日期的反推结果, 与覆写导入保持一致
    pub fn resolve(&self, exam_index: u32, parity: Parity) -> ResolvedWeek {
        let computed = Self::week_index(exam_index, parity);
        match self.override_date(exam_index, parity) {
            Some(date) => {
                let week_index = match self.resolve_week(date) {
                    Ok(week) => week,
                    Err(e) => {
                        tracing::warn!(
                            exam_index,
                            parity = %parity,
                            error = %e,
                            "覆写日期无法反推周次，沿用计算周次"
                        );
                        computed
                    }
                };
                ResolvedWeek { date, week_index }
            }
            None => ResolvedWeek {
                date: self.default_date(computed),
                week_index: computed,
            },
        }
    }

    /// 由日期反推学期周次
    pub fn resolve_week(&self, date: NaiveDate) -> Result<u32, DateResolveError> {
        if date.weekday() != self.exam_day {
            return Err(DateResolveError::NotExamDay {
                date,
                expected: self.exam_day,
            });
        }
        let first = self.first_exam_day();
        let days = (date - first).num_days();
        if days < 0 {
            return Err(DateResolveError::BeforeFirstExamDay { date, first });
        }
        Ok((days / 7) as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(quarter_start: &str) -> ScheduleConfig {
        ScheduleConfig {
            quarter_start_date: parse_date(quarter_start).unwrap(),
            exam_day: Weekday::Fri,
            ..ScheduleConfig::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_week_index_formula() {
        assert_eq!(DateResolver::week_index(1, Parity::Odd), 1);
        assert_eq!(DateResolver::week_index(1, Parity::Even), 2);
        assert_eq!(DateResolver::week_index(3, Parity::Odd), 5);
        assert_eq!(DateResolver::week_index(3, Parity::Even), 6);
    }

    #[test]
    fn test_default_dates_from_monday_quarter_start() {
        // 2025-09-29 为周一
        let resolver = DateResolver::new(&config("2025-09-29"));
        assert_eq!(resolver.first_exam_day(), date("2025-10-03"));
        assert_eq!(resolver.resolve_date(1, Parity::Odd), date("2025-10-03"));
        assert_eq!(resolver.resolve_date(1, Parity::Even), date("2025-10-10"));
        assert_eq!(resolver.resolve_date(2, Parity::Odd), date("2025-10-17"));
    }

    #[test]
    fn test_quarter_starting_on_exam_day() {
        let resolver = DateResolver::new(&config("2025-10-03"));
        assert_eq!(resolver.first_exam_day(), date("2025-10-03"));
    }

    #[test]
    fn test_override_wins_and_invalid_override_falls_back() {
        let mut cfg = config("2025-09-29");
        cfg.exam_dates
            .insert("2_even".to_string(), "2025-11-07".to_string());
        cfg.exam_dates
            .insert("1_odd".to_string(), "next friday".to_string());
        let resolver = DateResolver::new(&cfg);

        let resolved = resolver.resolve(2, Parity::Even);
        assert_eq!(resolved.date, date("2025-11-07"));
        assert_eq!(resolved.week_index, 6);
        assert_eq!(resolver.resolve_date(1, Parity::Odd), date("2025-10-03"));
    }

    #[test]
    fn test_resolve_week_inverse() {
        let resolver = DateResolver::new(&config("2025-09-29"));
        for exam in 1..=5 {
            for parity in [Parity::Odd, Parity::Even] {
                let d = resolver.resolve_date(exam, parity);
                assert_eq!(
                    resolver.resolve_week(d).unwrap(),
                    DateResolver::week_index(exam, parity)
                );
            }
        }
        assert!(matches!(
            resolver.resolve_week(date("2025-10-04")),
            Err(DateResolveError::NotExamDay { .. })
        ));
        assert!(matches!(
            resolver.resolve_week(date("2025-09-26")),
            Err(DateResolveError::BeforeFirstExamDay { .. })
        ));
    }

    #[test]
    fn test_parse_override_key() {
        assert_eq!(
            DateResolver::parse_override_key("3_even").unwrap(),
            (3, Parity::Even)
        );
        assert!(DateResolver::parse_override_key("0_odd").is_err());
        assert!(DateResolver::parse_override_key("3-even").is_err());
        assert!(DateResolver::parse_override_key("x_odd").is_err());
        assert!(DateResolver::parse_override_key("3_weekly").is_err());
    }
}
