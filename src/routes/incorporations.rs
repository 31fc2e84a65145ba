use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{load_owned, optional_text};
use crate::app::AppContext;
use crate::auth::{AdminUser, AuthUser};
use crate::email::templates;
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, NoContentResponse, RouteModule};
use crate::models::{
    Address, Attestation, BusinessInfo, Company, EntityType, Incorporation, IncorporationStatus,
    User,
};

pub struct IncorporationsModule;

impl RouteModule for IncorporationsModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route(
                "/api/incorporations",
                get(list_incorporations).post(create_incorporation),
            )
            .route(
                "/api/incorporations/{id}",
                get(get_incorporation)
                    .put(update_incorporation)
                    .delete(delete_incorporation),
            )
            .route("/api/incorporations/{id}/submit", post(submit_incorporation))
            .route("/api/admin/incorporations/{id}", patch(review_incorporation))
    }
}

/// Drafts may be saved incomplete; completeness is checked on submit.
#[derive(Deserialize)]
struct PacketRequest {
    #[serde(default)]
    business: BusinessInfo,
    address: Option<Address>,
    attestation: Option<Attestation>,
}

/// Drafts and rejected packets can be edited; editing a rejected packet
/// returns it to draft.
fn ensure_editable(packet: &Incorporation) -> Result<()> {
    match packet.status {
        IncorporationStatus::Draft | IncorporationStatus::Rejected => Ok(()),
        status => Err(CorpdeskError::conflict(format!(
            "Incorporation is {} and can no longer be changed",
            status.as_str()
        ))),
    }
}

fn apply_packet(packet: &mut Incorporation, req: PacketRequest) {
    let mut business = req.business;
    business.legal_name = business.legal_name.trim().to_string();
    business.state_of_formation = business.state_of_formation.trim().to_string();
    business.business_purpose = optional_text(business.business_purpose);
    business.registered_agent = optional_text(business.registered_agent);
    business.members = business
        .members
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    packet.business = business;
    packet.address = req.address;
    // A signature only counts for the packet as submitted.
    packet.attestation = req.attestation.map(|a| Attestation {
        signed_at: None,
        ..a
    });
}

async fn list_incorporations(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Incorporation>>> {
    Ok(Json(ctx.db().find_by_user_id(&user.id).await?))
}

async fn create_incorporation(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<PacketRequest>,
) -> Result<CreatedResponse<Incorporation>> {
    let mut packet = Incorporation::new(&user.id, BusinessInfo::default());
    apply_packet(&mut packet, req);
    let packet = ctx.db().create(packet).await?;

    tracing::info!(user_id = %user.id, incorporation_id = %packet.id, "Incorporation draft created");
    let location = format!("/api/incorporations/{}", packet.id);
    Ok(CreatedResponse::new(packet, location))
}

async fn get_incorporation(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Incorporation>> {
    Ok(Json(load_owned(&ctx, &id, &user).await?))
}

async fn update_incorporation(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PacketRequest>,
) -> Result<Json<Incorporation>> {
    let mut packet: Incorporation = load_owned(&ctx, &id, &user).await?;
    ensure_editable(&packet)?;

    apply_packet(&mut packet, req);
    packet.status = IncorporationStatus::Draft;
    packet.reviewed_at = None;
    Ok(Json(ctx.db().update(packet).await?))
}

async fn delete_incorporation(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    let packet: Incorporation = load_owned(&ctx, &id, &user).await?;
    ensure_editable(&packet)?;
    ctx.db().delete::<Incorporation>(&packet.id).await?;
    Ok(NoContentResponse)
}

async fn submit_incorporation(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Incorporation>> {
    let mut packet: Incorporation = load_owned(&ctx, &id, &user).await?;
    if !packet.is_draft() {
        return Err(CorpdeskError::conflict(format!(
            "Only drafts can be submitted; this one is {}",
            packet.status.as_str()
        )));
    }

    let missing = packet.missing_fields();
    if !missing.is_empty() {
        return Err(CorpdeskError::bad_request(format!(
            "Incorporation is incomplete: {}",
            missing.join(", ")
        )));
    }

    let now = Utc::now();
    if let Some(attestation) = packet.attestation.as_mut() {
        attestation.signed_at = Some(now);
    }
    packet.status = IncorporationStatus::Submitted;
    packet.submitted_at = Some(now);
    packet.review_note = None;
    let packet = ctx.db().update(packet).await?;

    tracing::info!(user_id = %user.id, incorporation_id = %packet.id, "Incorporation submitted");
    ctx.notify(
        &user.email,
        templates::incorporation_submitted(&user.name, &packet.business.legal_name),
    )
    .await;

    Ok(Json(packet))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Decision {
    Approve,
    Reject,
}

#[derive(Deserialize)]
struct ReviewRequest {
    decision: Decision,
    note: Option<String>,
}

#[derive(Serialize)]
struct ReviewResponse {
    incorporation: Incorporation,
    /// The company created on approval.
    company: Option<Company>,
}

async fn review_incorporation(
    State(ctx): State<AppContext>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> Result<Json<ReviewResponse>> {
    let mut packet: Incorporation = ctx.db().get(&id).await?;
    if packet.status != IncorporationStatus::Submitted {
        return Err(CorpdeskError::conflict(format!(
            "Only submitted incorporations can be reviewed; this one is {}",
            packet.status.as_str()
        )));
    }

    let approved = req.decision == Decision::Approve;
    let company = if approved {
        let mut company = Company::new(
            &packet.user_id,
            &packet.business.legal_name,
            packet.business.entity_type.unwrap_or(EntityType::Llc),
        );
        company.state = Some(packet.business.state_of_formation.clone());
        company.address = packet.address.clone();
        let company = ctx.db().create(company).await?;
        packet.company_id = Some(company.id.clone());
        packet.status = IncorporationStatus::Approved;
        Some(company)
    } else {
        packet.status = IncorporationStatus::Rejected;
        None
    };
    packet.review_note = optional_text(req.note);
    packet.reviewed_at = Some(Utc::now());
    let packet = ctx.db().update(packet).await?;

    tracing::info!(
        admin_id = %admin.id,
        incorporation_id = %packet.id,
        status = packet.status.as_str(),
        "Incorporation reviewed"
    );

    match ctx.db().find_by_id::<User>(&packet.user_id).await? {
        Some(owner) => {
            ctx.notify(
                &owner.email,
                templates::incorporation_reviewed(
                    &owner.name,
                    &packet.business.legal_name,
                    approved,
                    packet.review_note.as_deref(),
                ),
            )
            .await;
        }
        None => {
            tracing::warn!(incorporation_id = %packet.id, "Incorporation owner no longer exists");
        }
    }

    Ok(Json(ReviewResponse {
        incorporation: packet,
        company,
    }))
}
