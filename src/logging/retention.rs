//! 过期日志清理.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::fs;
use std::path::Path;

/// 删除早于 `today - retention_days` 的日志文件, 返回删除数量
///
/// 只处理 `<prefix>.<YYYY-MM-DD>.log` 形式的文件, 其他文件保持不动.
pub fn prune_expired_logs(
    directory: &Path,
    prefix: &str,
    retention_days: i64,
    today: NaiveDate,
) -> Result<usize> {
    if !directory.exists() {
        return Ok(0);
    }
    let cutoff = today - ChronoDuration::days(retention_days.max(0));

    let mut removed = 0;
    let entries = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?;
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = parse_log_file_date(&file_name, prefix) else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(entry.path())
                .with_context(|| format!("删除过期日志失败, file={}", file_name))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_log_file_date(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date_part = file_name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if date_part.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
