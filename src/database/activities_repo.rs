// Activities repository
// Handles CRUD operations for activities; deletion is always soft

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::codec::{
    from_db_enum, from_db_time, from_json, opt_from_db_time, opt_to_db_time, to_db_time, to_json,
};
use super::models::{Activity, ActivityStatus, ActivityType, ListOptions};
use super::DatabaseManager;

impl DatabaseManager {
    pub fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.with_connection(|conn| insert_activity_impl(conn, activity))
    }

    /// Get an activity by ID, soft-deleted rows included
    pub fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        self.with_connection(|conn| get_activity_impl(conn, id))
    }

    /// Activities of a user, most recent start first
    pub fn list_activities(&self, user_id: &str, options: &ListOptions) -> Result<Vec<Activity>> {
        self.with_connection(|conn| list_activities_impl(conn, user_id, options))
    }

    /// Persist every mutable column of the activity
    pub fn update_activity(&self, activity: &Activity) -> Result<()> {
        self.with_connection(|conn| update_activity_impl(conn, activity))
    }

    /// Set `deleted_at`. Returns false if the row was missing or already deleted.
    pub fn soft_delete_activity(&self, id: &str, deleted_at: &DateTime<Utc>) -> Result<bool> {
        self.with_connection(|conn| soft_delete_activity_impl(conn, id, deleted_at))
    }

    pub fn list_deleted_activity_ids(&self) -> Result<Vec<String>> {
        self.with_connection(list_deleted_activity_ids_impl)
    }
}

const ACTIVITY_COLUMNS: &str = "id, user_id, activity_type, title, start_time, end_time, status, \
     tags, metadata, created_at, updated_at, deleted_at";

fn row_to_activity(row: &Row) -> rusqlite::Result<Activity> {
    let activity_type: String = row.get(2)?;
    let start_time: String = row.get(4)?;
    let status: String = row.get(6)?;
    let tags: String = row.get(7)?;
    let metadata: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Activity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        activity_type: from_db_enum(2, &activity_type, ActivityType::from_str)?,
        title: row.get(3)?,
        start_time: from_db_time(4, &start_time)?,
        end_time: opt_from_db_time(5, row.get(5)?)?,
        status: from_db_enum(6, &status, ActivityStatus::from_str)?,
        tags: from_json(7, &tags)?,
        metadata: from_json(8, &metadata)?,
        created_at: from_db_time(9, &created_at)?,
        updated_at: from_db_time(10, &updated_at)?,
        deleted_at: opt_from_db_time(11, row.get(11)?)?,
    })
}

fn insert_activity_impl(conn: &Connection, activity: &Activity) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO activities (
            id, user_id, activity_type, title, start_time, end_time, status,
            tags, metadata, created_at, updated_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            activity.id,
            activity.user_id,
            activity.activity_type.as_str(),
            activity.title,
            to_db_time(&activity.start_time),
            opt_to_db_time(&activity.end_time),
            activity.status.as_str(),
            to_json(&activity.tags)?,
            to_json(&activity.metadata)?,
            to_db_time(&activity.created_at),
            to_db_time(&activity.updated_at),
            opt_to_db_time(&activity.deleted_at),
        ],
    ).context("Failed to create activity")?;

    Ok(())
}

fn get_activity_impl(conn: &Connection, id: &str) -> Result<Option<Activity>> {
    let sql = format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS);
    let result = conn.query_row(&sql, params![id], row_to_activity);

    match result {
        Ok(activity) => Ok(Some(activity)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get activity"),
    }
}

fn list_activities_impl(conn: &Connection, user_id: &str, options: &ListOptions) -> Result<Vec<Activity>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM activities
        WHERE user_id = ?1 AND (?2 OR deleted_at IS NULL)
        ORDER BY start_time DESC, rowid DESC
        LIMIT ?3 OFFSET ?4
        "#,
        ACTIVITY_COLUMNS
    );

    // SQLite treats a negative LIMIT as "no limit"
    let limit: i64 = options.limit.map(i64::from).unwrap_or(-1);
    let offset: i64 = options.offset.map(i64::from).unwrap_or(0);

    let mut stmt = conn.prepare(&sql).context("Failed to prepare list_activities query")?;
    let rows = stmt
        .query_map(params![user_id, options.include_deleted, limit, offset], row_to_activity)
        .context("Failed to query activities")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read activity row")
}

fn update_activity_impl(conn: &Connection, activity: &Activity) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE activities SET
            activity_type = ?1,
            title = ?2,
            start_time = ?3,
            end_time = ?4,
            status = ?5,
            tags = ?6,
            metadata = ?7,
            updated_at = ?8
        WHERE id = ?9
        "#,
        params![
            activity.activity_type.as_str(),
            activity.title,
            to_db_time(&activity.start_time),
            opt_to_db_time(&activity.end_time),
            activity.status.as_str(),
            to_json(&activity.tags)?,
            to_json(&activity.metadata)?,
            to_db_time(&activity.updated_at),
            activity.id,
        ],
    ).context("Failed to update activity")?;

    if updated == 0 {
        anyhow::bail!("Activity not found: {}", activity.id);
    }

    Ok(())
}

fn soft_delete_activity_impl(conn: &Connection, id: &str, deleted_at: &DateTime<Utc>) -> Result<bool> {
    let stamp = to_db_time(deleted_at);
    let updated = conn.execute(
        "UPDATE activities SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![stamp, id],
    ).context("Failed to delete activity")?;

    Ok(updated > 0)
}

fn list_deleted_activity_ids_impl(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM activities WHERE deleted_at IS NOT NULL ORDER BY deleted_at")
        .context("Failed to prepare deleted activities query")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query deleted activities")?;

    ids.collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read deleted activity id")
}
