// Users repository
// Handles CRUD operations for the local user and their settings

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::codec::{from_db_time, from_json, to_db_time, to_json, utc_now};
use super::models::{User, UserSettings};
use super::DatabaseManager;

impl DatabaseManager {
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.with_connection(|conn| create_user_impl(conn, user))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_connection(|conn| get_user_impl(conn, id))
    }

    /// The earliest created user, if any exists yet
    pub fn get_first_user(&self) -> Result<Option<User>> {
        self.with_connection(get_first_user_impl)
    }

    pub fn update_user_settings(&self, id: &str, settings: &UserSettings) -> Result<()> {
        self.with_connection(|conn| update_user_settings_impl(conn, id, settings))
    }
}

const USER_COLUMNS: &str = "id, username, settings, created_at, updated_at";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let settings: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        settings: from_json(2, &settings)?,
        created_at: from_db_time(3, &created_at)?,
        updated_at: from_db_time(4, &updated_at)?,
    })
}

fn create_user_impl(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, settings, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.username,
            to_json(&user.settings)?,
            to_db_time(&user.created_at),
            to_db_time(&user.updated_at),
        ],
    ).context("Failed to create user")?;

    Ok(())
}

fn get_user_impl(conn: &Connection, id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let result = conn.query_row(&sql, params![id], row_to_user);

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get user"),
    }
}

fn get_first_user_impl(conn: &Connection) -> Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY created_at ASC, rowid ASC LIMIT 1",
        USER_COLUMNS
    );
    let result = conn.query_row(&sql, [], row_to_user);

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get first user"),
    }
}

fn update_user_settings_impl(conn: &Connection, id: &str, settings: &UserSettings) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET settings = ?1, updated_at = ?2 WHERE id = ?3",
        params![to_json(settings)?, to_db_time(&utc_now()), id],
    ).context("Failed to update user settings")?;

    if updated == 0 {
        anyhow::bail!("User not found: {}", id);
    }

    Ok(())
}
