//! Submission ledger operations
//!
//! Windows passed to these queries are half-open: `start <= created_at < end`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

use crate::db::{from_db_time, to_db_time, Database};
use crate::models::{NewSubmission, PublishedItem, Submission};

const SUBMISSION_COLUMNS: &str = "id, module_id, user_id, group_id, item_id, channel_id, created_at,
     processed, processed_at, published_item_id, published_channel_id, cooldown_expires_at";

fn row_to_submission(row: &Row) -> SqliteResult<Submission> {
    let created_at: String = row.get(6)?;
    let processed_at: Option<String> = row.get(8)?;
    let cooldown_expires_at: Option<String> = row.get(11)?;

    Ok(Submission {
        id: row.get(0)?,
        module_id: row.get(1)?,
        user_id: row.get(2)?,
        group_id: row.get(3)?,
        item_id: row.get(4)?,
        channel_id: row.get(5)?,
        created_at: from_db_time(6, &created_at)?,
        processed: row.get::<_, i32>(7)? != 0,
        processed_at: processed_at.map(|s| from_db_time(8, &s)).transpose()?,
        published_item_id: row.get(9)?,
        published_channel_id: row.get(10)?,
        cooldown_expires_at: cooldown_expires_at.map(|s| from_db_time(11, &s)).transpose()?,
    })
}

impl Database {
    /// Record an admitted submission.
    ///
    /// Returns `None` when the module already tracks this item.
    pub fn create_submission(&self, new: &NewSubmission) -> SqliteResult<Option<Submission>> {
        let conn = self.conn();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO submissions (
                module_id, user_id, group_id, item_id, channel_id, created_at,
                processed, cooldown_expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                new.module_id,
                new.user_id,
                new.group_id,
                new.item_id,
                new.channel_id,
                to_db_time(&new.created_at),
                new.cooldown_expires_at.as_ref().map(to_db_time),
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(Submission {
            id: conn.last_insert_rowid(),
            module_id: new.module_id.clone(),
            user_id: new.user_id.clone(),
            group_id: new.group_id.clone(),
            item_id: new.item_id.clone(),
            channel_id: new.channel_id.clone(),
            created_at: new.created_at,
            processed: false,
            processed_at: None,
            published_item_id: None,
            published_channel_id: None,
            cooldown_expires_at: new.cooldown_expires_at,
        }))
    }

    /// Get a submission by id
    pub fn get_submission(&self, id: i64) -> SqliteResult<Option<Submission>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
            params![id],
            row_to_submission,
        )
        .optional()
    }

    /// Get the submission a module holds for an item
    pub fn get_submission_by_item(
        &self,
        module_id: &str,
        item_id: &str,
    ) -> SqliteResult<Option<Submission>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM submissions WHERE module_id = ?1 AND item_id = ?2",
                SUBMISSION_COLUMNS
            ),
            params![module_id, item_id],
            row_to_submission,
        )
        .optional()
    }

    /// Unprocessed submissions of a module created inside the window,
    /// in ledger order (creation time, then id)
    pub fn list_open_submissions_in_window(
        &self,
        module_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> SqliteResult<Vec<Submission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM submissions
             WHERE module_id = ?1 AND processed = 0 AND created_at >= ?2 AND created_at < ?3
             ORDER BY created_at ASC, id ASC",
            SUBMISSION_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![module_id, to_db_time(start), to_db_time(end)],
            row_to_submission,
        )?;
        rows.collect()
    }

    /// A user's submissions to a module channel inside the window, oldest first
    pub fn list_user_submissions_in_window(
        &self,
        module_id: &str,
        user_id: &str,
        channel_id: &str,
        group_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> SqliteResult<Vec<Submission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM submissions
             WHERE module_id = ?1 AND user_id = ?2 AND channel_id = ?3 AND group_id = ?4
               AND created_at >= ?5 AND created_at < ?6
             ORDER BY created_at ASC, id ASC",
            SUBMISSION_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![
                module_id,
                user_id,
                channel_id,
                group_id,
                to_db_time(start),
                to_db_time(end)
            ],
            row_to_submission,
        )?;
        rows.collect()
    }

    /// Number of submissions to a module channel inside the window
    pub fn count_submissions_in_window(
        &self,
        module_id: &str,
        channel_id: &str,
        group_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM submissions
             WHERE module_id = ?1 AND channel_id = ?2 AND group_id = ?3
               AND created_at >= ?4 AND created_at < ?5",
            params![
                module_id,
                channel_id,
                group_id,
                to_db_time(start),
                to_db_time(end)
            ],
            |row| row.get(0),
        )
    }

    /// Flag the winning submission as published.
    ///
    /// Only an unprocessed row is updated, so a submission is processed at
    /// most once; returns whether a row changed.
    pub fn mark_submission_processed(
        &self,
        id: i64,
        processed_at: &DateTime<Utc>,
        published: &PublishedItem,
    ) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE submissions
             SET processed = 1, processed_at = ?1, published_item_id = ?2, published_channel_id = ?3
             WHERE id = ?4 AND processed = 0",
            params![
                to_db_time(processed_at),
                published.id,
                published.channel_id,
                id
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a submission by id
    pub fn delete_submission(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute("DELETE FROM submissions WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    /// Delete a batch of a module's submissions, returns how many were removed
    pub fn delete_submissions(&self, module_id: &str, ids: &[i64]) -> SqliteResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders: Vec<String> = (0..ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "DELETE FROM submissions WHERE module_id = ?1 AND id IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(ids.len() + 1);
        values.push(module_id.to_string().into());
        values.extend(ids.iter().map(|id| rusqlite::types::Value::from(*id)));

        let conn = self.conn();
        conn.execute(&sql, rusqlite::params_from_iter(values))
    }
}
