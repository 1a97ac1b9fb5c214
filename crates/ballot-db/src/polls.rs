use crate::{DbError, DbPool};
use ballot_models::poll::{reconcile_options, Poll, PollOption};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: String,
    pub question: String,
    pub question_html: String,
    pub content_type: String,
    pub total_votes: i64,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollOptionRow {
    pub id: String,
    pub poll_id: String,
    pub position: i64,
    pub text: String,
    pub votes: i64,
}

impl PollRow {
    fn into_poll(self, options: Vec<PollOptionRow>) -> Poll {
        Poll {
            id: self.id,
            question: self.question,
            question_html: self.question_html,
            content_type: self.content_type,
            options: options
                .into_iter()
                .map(|o| PollOption {
                    id: o.id,
                    text: o.text,
                    votes: o.votes,
                })
                .collect(),
            total_votes: self.total_votes,
            is_active: self.is_active,
            allow_multiple_votes: self.allow_multiple_votes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Validated input for [`create_poll`]. Option texts are stored as given.
#[derive(Debug, Clone)]
pub struct NewPoll<'a> {
    pub question: &'a str,
    pub question_html: &'a str,
    pub content_type: &'a str,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub options: &'a [String],
}

/// Partial update for [`update_poll`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PollChanges {
    pub question: Option<String>,
    pub question_html: Option<String>,
    pub content_type: Option<String>,
    pub is_active: Option<bool>,
    pub allow_multiple_votes: Option<bool>,
    pub options: Option<Vec<String>>,
}

async fn load_options(
    conn: &mut SqliteConnection,
    poll_id: &str,
) -> Result<Vec<PollOptionRow>, DbError> {
    let rows = sqlx::query_as::<_, PollOptionRow>(
        "SELECT id, poll_id, position, text, votes
         FROM poll_options WHERE poll_id = ?1
         ORDER BY position ASC",
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_poll(conn: &mut SqliteConnection, poll_id: &str) -> Result<Option<Poll>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "SELECT id, question, question_html, content_type, total_votes,
                is_active, allow_multiple_votes, created_at, updated_at
         FROM polls WHERE id = ?1",
    )
    .bind(poll_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let options = load_options(conn, poll_id).await?;
    Ok(Some(row.into_poll(options)))
}

async fn insert_option(
    conn: &mut SqliteConnection,
    poll_id: &str,
    position: i64,
    text: &str,
    votes: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO poll_options (id, poll_id, position, text, votes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(poll_id)
    .bind(position)
    .bind(text)
    .bind(votes)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn create_poll(pool: &DbPool, new: &NewPoll<'_>) -> Result<Poll, DbError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO polls (id, question, question_html, content_type, total_votes,
                            is_active, allow_multiple_votes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7)",
    )
    .bind(&id)
    .bind(new.question)
    .bind(new.question_html)
    .bind(new.content_type)
    .bind(new.is_active)
    .bind(new.allow_multiple_votes)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for (position, text) in new.options.iter().enumerate() {
        insert_option(&mut tx, &id, position as i64, text, 0).await?;
    }

    let poll = load_poll(&mut tx, &id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(poll)
}

pub async fn get_poll(pool: &DbPool, poll_id: &str) -> Result<Option<Poll>, DbError> {
    let mut tx = pool.begin().await?;
    let poll = load_poll(&mut tx, poll_id).await?;
    tx.commit().await?;
    Ok(poll)
}

/// All polls, newest first. Polls created in the same instant come back in
/// reverse insertion order.
pub async fn list_polls(pool: &DbPool) -> Result<Vec<Poll>, DbError> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query_as::<_, PollRow>(
        "SELECT id, question, question_html, content_type, total_votes,
                is_active, allow_multiple_votes, created_at, updated_at
         FROM polls
         ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(&mut *tx)
    .await?;

    let option_rows = sqlx::query_as::<_, PollOptionRow>(
        "SELECT id, poll_id, position, text, votes
         FROM poll_options
         ORDER BY poll_id, position ASC",
    )
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    let mut by_poll: HashMap<String, Vec<PollOptionRow>> = HashMap::new();
    for option in option_rows {
        by_poll.entry(option.poll_id.clone()).or_default().push(option);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let options = by_poll.remove(&row.id).unwrap_or_default();
            row.into_poll(options)
        })
        .collect())
}

/// Apply `changes` to a poll in one transaction.
///
/// The poll row is written first so the transaction holds the write lock
/// before existing options are read; a concurrent vote lands either before
/// or after the option merge, never in between.
pub async fn update_poll(
    pool: &DbPool,
    poll_id: &str,
    changes: &PollChanges,
) -> Result<Poll, DbError> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query(
        "UPDATE polls SET
            question = COALESCE(?2, question),
            question_html = COALESCE(?3, question_html),
            content_type = COALESCE(?4, content_type),
            is_active = COALESCE(?5, is_active),
            allow_multiple_votes = COALESCE(?6, allow_multiple_votes),
            updated_at = ?7
         WHERE id = ?1",
    )
    .bind(poll_id)
    .bind(changes.question.as_deref())
    .bind(changes.question_html.as_deref())
    .bind(changes.content_type.as_deref())
    .bind(changes.is_active)
    .bind(changes.allow_multiple_votes)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    if let Some(incoming) = changes.options.as_deref() {
        let existing: Vec<PollOption> = load_options(&mut tx, poll_id)
            .await?
            .into_iter()
            .map(|o| PollOption {
                id: o.id,
                text: o.text,
                votes: o.votes,
            })
            .collect();
        let drafts = reconcile_options(&existing, incoming);

        let kept: HashSet<&str> = drafts.iter().filter_map(|d| d.id.as_deref()).collect();
        for stale in existing.iter().filter(|o| !kept.contains(o.id.as_str())) {
            sqlx::query("DELETE FROM poll_options WHERE id = ?1")
                .bind(&stale.id)
                .execute(&mut *tx)
                .await?;
        }

        for (position, draft) in drafts.iter().enumerate() {
            match draft.id.as_deref() {
                Some(option_id) => {
                    sqlx::query(
                        "UPDATE poll_options SET text = ?2, position = ?3, votes = ?4
                         WHERE id = ?1",
                    )
                    .bind(option_id)
                    .bind(&draft.text)
                    .bind(position as i64)
                    .bind(draft.votes)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    insert_option(&mut tx, poll_id, position as i64, &draft.text, 0).await?;
                }
            }
        }

        let total: i64 = drafts.iter().map(|d| d.votes).sum();
        sqlx::query("UPDATE polls SET total_votes = ?2 WHERE id = ?1")
            .bind(poll_id)
            .bind(total)
            .execute(&mut *tx)
            .await?;
    }

    let poll = load_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(poll)
}

/// Add one vote to `option_id` and to the poll total.
///
/// The conditional update on the option row is the gate: it matches only when
/// the option exists and belongs to `poll_id`.
pub async fn cast_vote(pool: &DbPool, poll_id: &str, option_id: &str) -> Result<Poll, DbError> {
    let mut tx = pool.begin().await?;

    let bumped = sqlx::query(
        "UPDATE poll_options SET votes = votes + 1
         WHERE id = ?1 AND poll_id = ?2",
    )
    .bind(option_id)
    .bind(poll_id)
    .execute(&mut *tx)
    .await?;
    if bumped.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    sqlx::query(
        "UPDATE polls SET total_votes = total_votes + 1, updated_at = ?2
         WHERE id = ?1",
    )
    .bind(poll_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    let poll = load_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(poll)
}

/// Remove one vote from `option_id` and from the poll total.
///
/// Matches only while both counters are above zero. On a miss nothing is
/// written; the error is `PreconditionFailed` when the option exists (its
/// counts are at zero) and `NotFound` otherwise.
pub async fn retract_vote(
    pool: &DbPool,
    poll_id: &str,
    option_id: &str,
) -> Result<Poll, DbError> {
    let mut tx = pool.begin().await?;

    let dropped = sqlx::query(
        "UPDATE poll_options SET votes = votes - 1
         WHERE id = ?1 AND poll_id = ?2 AND votes > 0
           AND EXISTS (SELECT 1 FROM polls WHERE id = ?2 AND total_votes > 0)",
    )
    .bind(option_id)
    .bind(poll_id)
    .execute(&mut *tx)
    .await?;

    if dropped.rows_affected() == 0 {
        let option_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM poll_options WHERE id = ?1 AND poll_id = ?2)",
        )
        .bind(option_id)
        .bind(poll_id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(if option_exists {
            DbError::PreconditionFailed
        } else {
            DbError::NotFound
        });
    }

    sqlx::query(
        "UPDATE polls SET total_votes = total_votes - 1, updated_at = ?2
         WHERE id = ?1 AND total_votes > 0",
    )
    .bind(poll_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    let poll = load_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(poll)
}

/// Zero every option count and the total; text, ids and order are untouched.
pub async fn reset_votes(pool: &DbPool, poll_id: &str) -> Result<Poll, DbError> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query("UPDATE polls SET total_votes = 0, updated_at = ?2 WHERE id = ?1")
        .bind(poll_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    sqlx::query("UPDATE poll_options SET votes = 0 WHERE poll_id = ?1")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    let poll = load_poll(&mut tx, poll_id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(poll)
}

/// Delete a poll; its options go with it through the foreign key cascade.
pub async fn delete_poll(pool: &DbPool, poll_id: &str) -> Result<(), DbError> {
    let deleted = sqlx::query("DELETE FROM polls WHERE id = ?1")
        .bind(poll_id)
        .execute(pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
