use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use crate::users::repo::PublicUser;

use super::dto::ValidatedEvent;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub price: f64,
    pub participants: i32,
    pub image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Event {
    pub async fn create(
        db: &PgPool,
        fields: &ValidatedEvent,
        image: &str,
    ) -> anyhow::Result<Event> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (title, description, date, price, participants, image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, description, date, price, participants, image, created_at
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.date)
        .bind(fields.price)
        .bind(fields.participants)
        .bind(image)
        .fetch_one(db)
        .await
        .context("insert event")?;
        Ok(event)
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, date, price, participants, image, created_at
            FROM events
            ORDER BY id ASC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(events)
    }

    pub async fn find(db: &PgPool, id: i64) -> anyhow::Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, date, price, participants, image, created_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(event)
    }

    /// Participants of an event; `None` when the event itself does not exist.
    pub async fn participants(db: &PgPool, id: i64) -> anyhow::Result<Option<Vec<PublicUser>>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(id)
            .fetch_one(db)
            .await?;
        if !exists {
            return Ok(None);
        }

        let users = sqlx::query_as::<_, PublicUser>(
            r#"
            SELECT u.id, u.name, u.email
            FROM users u
            JOIN event_participants ep ON ep.user_id = u.id
            WHERE ep.event_id = $1
            ORDER BY ep.created_at ASC
            "#,
        )
        .bind(id)
        .fetch_all(db)
        .await?;
        Ok(Some(users))
    }

    /// Delete every event (participations cascade) and restart the id sequence.
    pub async fn reset(db: &PgPool) -> anyhow::Result<()> {
        sqlx::query("TRUNCATE events RESTART IDENTITY CASCADE")
            .execute(db)
            .await
            .context("reset events")?;
        Ok(())
    }
}

// Participant addition runs inside one transaction so the cached counter can
// never desynchronize from the relation.

/// Lock the event row for the remainder of the transaction.
pub async fn lock_event(tx: &mut Transaction<'_, Postgres>, event_id: i64) -> anyhow::Result<bool> {
    let row: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = $1 FOR UPDATE")
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await
        .context("lock event")?;
    Ok(row.is_some())
}

pub async fn is_participant(
    tx: &mut Transaction<'_, Postgres>,
    event_id: i64,
    user_id: i64,
) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM event_participants WHERE event_id = $1 AND user_id = $2)",
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
    .context("check participant")?;
    Ok(exists)
}

/// Insert the relation row and bump the cached counter, both on the same
/// transaction as the preceding checks.
pub async fn link_participant(
    tx: &mut Transaction<'_, Postgres>,
    event_id: i64,
    user_id: i64,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO event_participants (event_id, user_id) VALUES ($1, $2)")
        .bind(event_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("link participant")?;

    sqlx::query("UPDATE events SET participants = participants + 1 WHERE id = $1")
        .bind(event_id)
        .execute(&mut **tx)
        .await
        .context("bump participant count")?;
    Ok(())
}
