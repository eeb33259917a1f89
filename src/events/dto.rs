use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::{
    error::{AppError, FieldError},
    users::repo::PublicUser,
};

use super::repo::Event;

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub message: String,
    pub event: Event,
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub users: Vec<PublicUser>,
}

/// Text fields of the multipart form, collected as parts arrive.
#[derive(Debug, Default)]
pub struct RawEventForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub price: Option<String>,
    pub participants: Option<String>,
}

/// Fields after validation, ready to persist alongside the stored image.
#[derive(Debug)]
pub struct ValidatedEvent {
    pub title: String,
    pub description: String,
    pub date: OffsetDateTime,
    pub price: f64,
    pub participants: i32,
}

impl RawEventForm {
    /// Record a text part by field name; unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = Some(value),
            "description" => self.description = Some(value),
            "date" => self.date = Some(value),
            "price" => self.price = Some(value),
            "participants" => self.participants = Some(value),
            _ => {}
        }
    }

    /// Validate before any file I/O. Presence of the four required fields is
    /// checked first; parse failures come back with field-level detail.
    /// `participants` defaults to 0 when absent or unparsable.
    pub fn validate(&self) -> Result<ValidatedEvent, AppError> {
        let (Some(title), Some(description), Some(date_raw), Some(price_raw)) = (
            self.title.as_deref(),
            self.description.as_deref(),
            self.date.as_deref(),
            self.price.as_deref(),
        ) else {
            return Err(AppError::BadRequest("Missing required fields".into()));
        };

        let mut details = Vec::new();
        let date = parse_event_date(date_raw);
        if date.is_none() {
            details.push(FieldError::new("date", "Invalid date format"));
        }
        let price = price_raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p >= 0.0);
        if price.is_none() {
            details.push(FieldError::new("price", "Expected a non-negative number"));
        }
        let (Some(date), Some(price)) = (date, price) else {
            return Err(AppError::Validation(details));
        };

        let participants = self
            .participants
            .as_deref()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);

        Ok(ValidatedEvent {
            title: title.to_string(),
            description: description.to_string(),
            date,
            price,
            participants,
        })
    }
}

/// Accepts RFC 3339, a bare datetime, or a bare calendar date (midnight UTC).
pub fn parse_event_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(dt.assume_utc());
    }
    if let Ok(d) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(d.midnight().assume_utc());
    }
    None
}
