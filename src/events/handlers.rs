use std::path::Path as FsPath;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{auth::jwt::Staff, error::AppError, state::AppState};

use super::{
    dto::{
        AddParticipantRequest, CreateEventResponse, MessageResponse, ParticipantsResponse,
        RawEventForm, ValidatedEvent,
    },
    repo::{self, Event},
    upload::{self, SavedUpload},
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/:id", get(get_event))
        .route("/events/:id/get-participants", get(get_participants))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event))
        .route("/events/:id/add-participant", post(add_participant))
        .route("/reset-events", delete(reset_events))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let events = Event::list(&state.db).await?;
    Ok(Json(events))
}

#[instrument(skip(state))]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, AppError> {
    match Event::find(&state.db, id).await? {
        Some(event) => Ok(Json(event)),
        None => Err(AppError::NotFound("Event not found.".into())),
    }
}

#[instrument(skip(state))]
pub async fn get_participants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    match Event::participants(&state.db, id).await? {
        Some(users) => Ok(Json(ParticipantsResponse { users })),
        None => Err(AppError::NotFound("Event not found.".into())),
    }
}

/// POST /events (multipart). Text fields are expected before the single file
/// part; the form is validated when the file is reached, so nothing touches
/// disk for invalid input, and the database row is written only after the
/// file stream completes.
#[instrument(skip(state, multipart))]
pub async fn create_event(
    State(state): State<AppState>,
    Staff(claims): Staff,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreateEventResponse>), AppError> {
    let mut form = RawEventForm::default();
    let mut stored: Option<(ValidatedEvent, SavedUpload)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some((_, saved)) = &stored {
                    upload::discard(&saved.path).await;
                }
                warn!(error = %e, "malformed multipart body");
                return Err(AppError::BadRequest("Malformed multipart body".into()));
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(original) = field.file_name().map(str::to_string) {
            // At most one file is written per request; extra file parts are skipped.
            if stored.is_some() {
                continue;
            }
            let fields = form.validate()?;
            let saved =
                upload::save_field(FsPath::new(&state.config.upload_dir), field, &original)
                    .await?;
            stored = Some((fields, saved));
        } else {
            let value = match field.text().await {
                Ok(v) => v,
                Err(e) => {
                    if let Some((_, saved)) = &stored {
                        upload::discard(&saved.path).await;
                    }
                    warn!(error = %e, field = %name, "unreadable text part");
                    return Err(AppError::BadRequest("Malformed multipart body".into()));
                }
            };
            form.set(&name, value);
        }
    }

    let Some((fields, saved)) = stored else {
        // Required fields may be missing too; report those first.
        form.validate()?;
        return Err(AppError::BadRequest("Image file is required".into()));
    };

    let image = format!(
        "{}/{}",
        state.config.public_prefix.trim_end_matches('/'),
        saved.file_name
    );

    let event = match Event::create(&state.db, &fields, &image).await {
        Ok(event) => event,
        Err(e) => {
            // The row was never written; don't leave the file orphaned.
            upload::discard(&saved.path).await;
            return Err(e.into());
        }
    };

    info!(event_id = event.id, user_id = claims.user_id, "event created");
    Ok((
        StatusCode::CREATED,
        Json(CreateEventResponse {
            message: "Event created successfully!".into(),
            event,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn add_participant(
    State(state): State<AppState>,
    Staff(claims): Staff,
    Path(event_id): Path<i64>,
    Json(payload): Json<AddParticipantRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let Some(user_id) = payload.user_id else {
        return Err(AppError::BadRequest("User ID is required.".into()));
    };

    let mut tx = state.db.begin().await?;

    if !repo::lock_event(&mut tx, event_id).await? {
        return Err(AppError::NotFound("Event not found.".into()));
    }
    if repo::is_participant(&mut tx, event_id, user_id).await? {
        return Err(AppError::Conflict("User is already a participant.".into()));
    }
    repo::link_participant(&mut tx, event_id, user_id).await?;

    tx.commit().await?;

    info!(event_id, user_id, added_by = claims.user_id, "participant added");
    Ok(Json(MessageResponse::new("Participant added successfully!")))
}

#[instrument(skip(state))]
pub async fn reset_events(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    Event::reset(&state.db).await?;
    info!("all events deleted, id sequence reset");
    Ok(Json(MessageResponse::new(
        "All events were deleted and the ID sequence was reset.",
    )))
}
