use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;

use super::{load_owned, optional_text, required_text};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, NoContentResponse, QueryParams, RouteModule};
use crate::models::{Company, Contract, Note, User};

const MAX_NOTE_LEN: usize = 10_000;

pub struct NotesModule;

impl RouteModule for NotesModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/notes", get(list_notes).post(create_note))
            .route(
                "/api/notes/{id}",
                get(get_note).put(update_note).delete(delete_note),
            )
    }
}

#[derive(Deserialize)]
struct NotesQuery {
    company_id: Option<String>,
    contract_id: Option<String>,
}

async fn list_notes(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    QueryParams(query): QueryParams<NotesQuery>,
) -> Result<Json<Vec<Note>>> {
    let (company_id, contract_id) =
        resolve_links(&ctx, &user, query.company_id, query.contract_id).await?;

    let notes: Vec<Note> = match &company_id {
        Some(company_id) => ctx.db().find_by_parent_id(company_id).await?,
        None => ctx.db().find_by_user_id(&user.id).await?,
    };
    let notes = notes
        .into_iter()
        .filter(|n| n.user_id == user.id)
        .filter(|n| contract_id.is_none() || n.contract_id == contract_id)
        .collect();
    Ok(Json(notes))
}

/// Check the referenced company and contract belong to `user`. A contract
/// implies its company; naming a different company is a 400.
async fn resolve_links(
    ctx: &AppContext,
    user: &User,
    company_id: Option<String>,
    contract_id: Option<String>,
) -> Result<(Option<String>, Option<String>)> {
    let company_id = optional_text(company_id);
    let contract_id = optional_text(contract_id);

    let company_id = match &contract_id {
        Some(contract_id) => {
            let contract: Contract = load_owned(ctx, contract_id, user).await?;
            if company_id
                .as_deref()
                .is_some_and(|id| id != contract.company_id)
            {
                return Err(CorpdeskError::bad_request(
                    "contract_id does not belong to company_id",
                ));
            }
            Some(contract.company_id)
        }
        None => match company_id {
            Some(company_id) => {
                let company: Company = load_owned(ctx, &company_id, user).await?;
                Some(company.id)
            }
            None => None,
        },
    };
    Ok((company_id, contract_id))
}

#[derive(Deserialize)]
struct CreateNoteRequest {
    body: String,
    company_id: Option<String>,
    contract_id: Option<String>,
}

async fn create_note(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateNoteRequest>,
) -> Result<CreatedResponse<Note>> {
    let body = required_text("body", &req.body, MAX_NOTE_LEN)?;
    let (company_id, contract_id) =
        resolve_links(&ctx, &user, req.company_id, req.contract_id).await?;

    let mut note = Note::new(&user.id, body);
    note.company_id = company_id;
    note.contract_id = contract_id;
    let note = ctx.db().create(note).await?;

    let location = format!("/api/notes/{}", note.id);
    Ok(CreatedResponse::new(note, location))
}

async fn get_note(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Note>> {
    Ok(Json(load_owned(&ctx, &id, &user).await?))
}

#[derive(Deserialize)]
struct UpdateNoteRequest {
    body: String,
}

async fn update_note(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateNoteRequest>,
) -> Result<Json<Note>> {
    let mut note: Note = load_owned(&ctx, &id, &user).await?;
    note.body = required_text("body", &req.body, MAX_NOTE_LEN)?;
    Ok(Json(ctx.db().update(note).await?))
}

async fn delete_note(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    let note: Note = load_owned(&ctx, &id, &user).await?;
    ctx.db().delete::<Note>(&note.id).await?;
    Ok(NoContentResponse)
}
