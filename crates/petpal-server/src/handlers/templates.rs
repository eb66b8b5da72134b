//! Template handlers.
//!
//! GET  /templates?tipo=&ativos=   list templates
//! POST /templates                 create or edit a template
//! GET  /templates/:id             fetch one
//! POST /templates/:id/deactivate  retire a template

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use petpal_contracts::{ContractError, ContractTemplate, EntityKind};
use serde::Deserialize;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListTemplatesQuery {
    pub tipo: Option<String>,
    #[serde(default)]
    pub ativos: Option<bool>,
}

pub async fn list_templates(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListTemplatesQuery>,
) -> Result<Json<Vec<ContractTemplate>>, AppError> {
    let kind = query
        .tipo
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<EntityKind>)
        .transpose()?;
    let templates = state
        .lifecycle
        .templates()
        .list(kind, query.ativos.unwrap_or(false))
        .await?;
    Ok(Json(templates))
}

pub async fn save_template(
    Extension(state): Extension<AppState>,
    AppJson(template): AppJson<ContractTemplate>,
) -> Result<(StatusCode, Json<ContractTemplate>), AppError> {
    for (field, value) in [
        ("id", &template.id),
        ("name", &template.name),
        ("body", &template.body),
        ("version", &template.version),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("template {field} is required")));
        }
    }

    let saved = state.lifecycle.templates().save(&template).await?;
    tracing::info!(template = %saved.id, version = %saved.version, "template saved");
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_template(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContractTemplate>, AppError> {
    let template = state
        .lifecycle
        .templates()
        .load(&id)
        .await?
        .ok_or(ContractError::TemplateNotFound(id))?;
    Ok(Json(template))
}

pub async fn deactivate_template(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContractTemplate>, AppError> {
    let templates = state.lifecycle.templates();
    if !templates.deactivate(&id).await? {
        return Err(ContractError::TemplateNotFound(id).into());
    }
    let template = templates
        .load(&id)
        .await?
        .ok_or(ContractError::TemplateNotFound(id))?;
    tracing::info!(template = %template.id, "template deactivated");
    Ok(Json(template))
}
