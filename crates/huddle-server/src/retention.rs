//! Age-based cleanup of the activity tables. Rows strictly older than the
//! cutoff go away; rows exactly at the cutoff survive.

use std::sync::Arc;

use huddle_db::entities::{activity_logs, feed_items};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

use crate::jobs::{JobRunner, names};

pub async fn sweep_activity_logs(
    db: &DatabaseConnection,
    cutoff: DateTimeWithTimeZone,
) -> Result<u64, DbErr> {
    let res = activity_logs::Entity::delete_many()
        .filter(activity_logs::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

pub async fn sweep_feed_items(
    db: &DatabaseConnection,
    cutoff: DateTimeWithTimeZone,
) -> Result<u64, DbErr> {
    let res = feed_items::Entity::delete_many()
        .filter(feed_items::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Registers the `cleanup_old_activities` job. The cutoff is computed at
/// execution time, not enqueue time.
pub fn register_handler(runner: &mut JobRunner, db: Arc<DatabaseConnection>) {
    runner.register(names::CLEANUP_OLD_ACTIVITIES, move |_args| {
        let db = db.clone();
        async move {
            let cutoff: DateTimeWithTimeZone =
                (chrono::Utc::now() - chrono::Duration::days(retention_days())).into();
            let activities = sweep_activity_logs(&db, cutoff).await?;
            let feed = sweep_feed_items(&db, cutoff).await?;
            tracing::info!(activities, feed, %cutoff, "retention sweep finished");
            Ok(())
        }
    });
}

fn retention_days() -> i64 {
    std::env::var("HUDDLE_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(90)
}
