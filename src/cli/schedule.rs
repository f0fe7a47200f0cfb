use crate::cli::{open_store, ScheduleArgs};
use crate::config::AppConfig;
use crate::sync::SyncEngine;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 计算 `after` 之后下一次在 `tz` 时区 `at` 时刻触发的时间
///
/// 夏令时跳过的本地时刻顺延一小时，重复的本地时刻取较早者。
pub fn next_fire(after: DateTime<Utc>, at: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let mut date = after.with_timezone(&tz).date_naive();
    for _ in 0..3 {
        let local = date.and_time(at);
        let fire = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest());
        if let Some(fire) = fire {
            let fire = fire.with_timezone(&Utc);
            if fire > after {
                return Some(fire);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

pub async fn execute(args: &ScheduleArgs, config: &AppConfig) -> Result<()> {
    let at = config.schedule.daily_time().map_err(anyhow::Error::msg)?;
    let tz = config.schedule.tz().map_err(anyhow::Error::msg)?;

    let store = open_store(config, args.dry_run).await?;
    let engine = Arc::new(
        SyncEngine::from_config_with_store(config, store).context("Failed to build sync engine")?,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down scheduler");
            on_signal.cancel();
        }
    });

    let permits = Arc::new(Semaphore::new(1));
    if args.run_now {
        spawn_run(&engine, &permits, &cancel);
    }

    loop {
        let now = Utc::now();
        let next = next_fire(now, at, tz).context("Could not compute the next run time")?;
        info!("Next cache update at {}", next.with_timezone(&tz));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        spawn_run(&engine, &permits, &cancel);
    }

    // 等待进行中的运行结束
    let _permit = permits.acquire().await.context("Scheduler semaphore closed")?;
    Ok(())
}

fn spawn_run(engine: &Arc<SyncEngine>, permits: &Arc<Semaphore>, cancel: &CancellationToken) {
    let permit = match permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Previous cache update still running, skipping this trigger");
            return;
        }
    };

    let engine = engine.clone();
    let cancel = cancel.child_token();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = engine.run_with_cancel(Utc::now(), &cancel).await {
            error!("Scheduled cache update failed: {}", e);
        }
    });
}
