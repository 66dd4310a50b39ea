// ==========================================
// 口试时段排程系统 - 命令行入口
// ==========================================
// 用法:
//   exam-slot-scheduler [db_path] <command> [args]
//
// 命令:
//   init                         建表 (幂等)
//   generate [start_exam]        全量重建
//   section <id> [start_exam]    单分组重建
//   student <id> [start_exam]    单人重排
//   overrides '<json>'           导入日期覆写 {"1_odd":"2025-10-03"}
//   config                       输出当前配置
//   slots <student_id>           输出学生时段
// ==========================================

use anyhow::{bail, Context, Result};
use exam_slot_scheduler::config::ConfigManager;
use exam_slot_scheduler::db::{default_db_path, init_schema, open_sqlite_connection};
use exam_slot_scheduler::repository::ExamSlotRepository;
use exam_slot_scheduler::{logging, ScheduleRegenerator};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const COMMANDS: [&str; 7] = [
    "init", "generate", "section", "student", "overrides", "config", "slots",
];

fn main() -> Result<()> {
    // EXAM_SLOT_SCHEDULER_LOG_FORMAT=json 时输出 JSON 行
    match std::env::var("EXAM_SLOT_SCHEDULER_LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => logging::init_json(),
        _ => logging::init(),
    }

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => default_db_path(),
    };
    let command = if args.is_empty() {
        "generate".to_string()
    } else {
        args.remove(0)
    };

    tracing::info!("口试时段排程系统 v{}", exam_slot_scheduler::VERSION);
    tracing::info!("使用数据库: {}", db_path);

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn).context("建表失败")?;
    let conn = Arc::new(Mutex::new(conn));
    let regenerator = ScheduleRegenerator::new(conn.clone());

    match command.as_str() {
        "init" => {
            println!("schema ready: {}", db_path);
        }
        "generate" => {
            let start = parse_arg(args.first(), "start_exam")?.unwrap_or(1);
            let report = regenerator.generate_all(start);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "section" => {
            let section_id = parse_arg(args.first(), "section_id")?
                .context("缺少参数 section_id")?;
            let start = parse_arg(args.get(1), "start_exam")?.unwrap_or(1);
            let report = regenerator.generate_for_section(section_id, start);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "student" => {
            let student_id = parse_arg(args.first(), "student_id")?
                .context("缺少参数 student_id")?;
            let start = parse_arg(args.get(1), "start_exam")?.unwrap_or(1);
            let report = regenerator.regenerate_for_student_report(student_id, start);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "overrides" => {
            let raw = args.first().context("缺少参数 mapping (JSON)")?;
            let mapping: BTreeMap<String, String> =
                serde_json::from_str(raw).context("mapping 必须是字符串到字符串的 JSON 对象")?;
            let updated = regenerator.apply_exam_date_overrides(&mapping)?;
            println!("updated={}", updated);
        }
        "config" => {
            let manager = ConfigManager::from_connection(conn.clone());
            println!("{}", manager.get_config_snapshot()?);
        }
        "slots" => {
            let student_id: i64 = parse_arg(args.first(), "student_id")?
                .context("缺少参数 student_id")?;
            let guard = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("数据库锁获取失败: {}", e))?;
            let slots = ExamSlotRepository::new(&guard).find_by_student(student_id)?;
            println!("{}", serde_json::to_string_pretty(&slots)?);
        }
        other => bail!("未知命令: {} (可用: {})", other, COMMANDS.join(", ")),
    }

    Ok(())
}

fn parse_arg<T>(raw: Option<&String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .with_context(|| format!("参数 {} 无效: {}", name, value))
    })
    .transpose()
}
