//! 每日定时调度
//!
//! 按 "HH:MM"（本地时区）每天触发一次任务。触发是无条件的，
//! 任务自己决定是否有事可做（比如当日无重要消息就跳过通知）。

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 调度句柄，`cancel` 或 drop 时停止后续触发
pub struct ScheduleToken {
    handle: JoinHandle<()>,
}

impl ScheduleToken {
    /// 取消调度
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for ScheduleToken {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 每天在本地时间 `hhmm`（"HH:MM" 格式）触发一次 `job`
///
/// 时间格式非法时立即返回错误；任务本身的失败由任务内部处理。
pub fn schedule_daily<F, Fut>(hhmm: &str, job: F) -> Result<ScheduleToken>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (hour, minute) = parse_hhmm(hhmm)?;
    info!(time = %hhmm, "Scheduling daily job");

    let handle = tokio::spawn(async move {
        loop {
            let now = Local::now();
            let target = next_occurrence(now, hour, minute);
            let wait = (target - now)
                .to_std()
                .unwrap_or_else(|_| std::time::Duration::from_secs(0));
            debug!(target = %target, "Sleeping until next scheduled run");
            tokio::time::sleep(wait).await;

            job().await;
        }
    });

    Ok(ScheduleToken { handle })
}

/// 解析 "HH:MM"
fn parse_hhmm(hhmm: &str) -> Result<(u32, u32)> {
    let (h, m) = match hhmm.split_once(':') {
        Some(parts) => parts,
        None => bail!("Invalid time format '{}', expected HH:MM", hhmm),
    };
    let hour: u32 = h
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid hour in '{}'", hhmm))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid minute in '{}'", hhmm))?;
    if hour > 23 || minute > 59 {
        bail!("Time '{}' out of range", hhmm);
    }
    Ok((hour, minute))
}

/// `now` 之后最近一次本地时间 hour:minute
fn next_occurrence(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let mut date = now.date_naive();
    loop {
        if let Some(naive) = date.and_hms_opt(hour, minute, 0) {
            // 夏令时不存在的时刻顺延到下一天
            if let Some(candidate) = Local.from_local_datetime(&naive).earliest() {
                if candidate > now {
                    return candidate;
                }
            }
        }
        date += ChronoDuration::days(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm_valid() {
        assert_eq!(parse_hhmm("21:00").unwrap(), (21, 0));
        assert_eq!(parse_hhmm("09:30").unwrap(), (9, 30));
        assert_eq!(parse_hhmm("0:5").unwrap(), (0, 5));
    }

    #[test]
    fn test_parse_hhmm_invalid() {
        assert!(parse_hhmm("2100").is_err());
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("12:60").is_err());
        assert!(parse_hhmm("ab:cd").is_err());
        assert!(parse_hhmm("").is_err());
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let now = Local.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let next = next_occurrence(now, 21, 0);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let now = Local.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap();
        let next = next_occurrence(now, 21, 0);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_exact_time_rolls_over() {
        // 恰好等于目标时刻时取明天，避免同一分钟触发两次
        let now = Local.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap();
        let next = next_occurrence(now, 21, 0);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_schedule_rejects_bad_format() {
        let result = schedule_daily("not-a-time", || async {});
        assert!(result.is_err());
    }
}
