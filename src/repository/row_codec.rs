// ==========================================
// 口试时段排程系统 - 行字段编解码
// ==========================================
// 存储格式: 日期 YYYY-MM-DD, 时间 HH:MM, 布尔 0/1
// ==========================================

use crate::domain::clock::{format_date, format_time, parse_date, parse_time};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Type;
use rusqlite::Row;

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub fn opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_date(&raw).map(Some).map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub fn opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_time(&raw).map(Some).map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(format_date)
}

pub fn time_text(time: Option<NaiveTime>) -> Option<String> {
    time.map(format_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_stored_as_plain_text() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (d TEXT, s TEXT, e TEXT)").unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3)",
            params![
                date_text(NaiveDate::from_ymd_opt(2025, 10, 3)),
                time_text(Some(t(13, 30))),
                time_text(None),
            ],
        )
        .unwrap();

        let raw: (String, String) = conn
            .query_row("SELECT d, s FROM t", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!(raw, ("2025-10-03".to_string(), "13:30".to_string()));

        let decoded = conn
            .query_row("SELECT d, s, e FROM t", [], |row| {
                Ok((opt_date(row, 0)?, opt_time(row, 1)?, opt_time(row, 2)?))
            })
            .unwrap();
        assert_eq!(decoded.0, NaiveDate::from_ymd_opt(2025, 10, 3));
        assert_eq!(decoded.1, Some(t(13, 30)));
        assert_eq!(decoded.2, None);
    }

    #[test]
    fn test_malformed_text_is_conversion_error() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.query_row("SELECT 'half past one'", [], |row| opt_time(row, 0));
        assert!(matches!(
            result,
            Err(rusqlite::Error::FromSqlConversionFailure(0, Type::Text, _))
        ));
    }
}
