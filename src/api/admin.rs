// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{error::ApiError, state::AppState, storage::AuditLogEntry};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// Query parameters for the audit listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Maximum number of entries (default 100, capped at 1000).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    /// Newest first.
    pub entries: Vec<AuditLogEntry>,
    pub count: usize,
}

/// Most recent audit entries.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    security(("bearer" = [])),
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Audit entries", body = AuditLogResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let entries = state.audit.recent(limit)?;
    Ok(Json(AuditLogResponse {
        count: entries.len(),
        entries,
    }))
}
