//! Certificate upload handler.

use crate::api::{blocking, ApiError};
use crate::{record_audit, AppState};
use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::PathRejection,
    extract::{Extension, Multipart, Path},
    Json,
};
use fedlink_observe::EventPayload;
use fedlink_registry::CertificateFlags;
use fedlink_types::CertSlot;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct UploadCertResponse {
    pub status: &'static str,
    pub cert_type: CertSlot,
    #[serde(flatten)]
    pub flags: CertificateFlags,
}

/// Handler for `POST /federations/{id}/upload_cert`.
///
/// Expects multipart fields `file` (with a filename) and `cert_type`
/// (`ca`, `client_cert` or `client_key`), in any order. Replaces exactly
/// the named slot; a rejected upload leaves every slot unchanged.
pub async fn upload_cert_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadCertResponse>, ApiError> {
    let Path(id) = id?;
    let mut multipart = multipart?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut cert_type: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file: missing filename".to_string()))?;
                let data = field.bytes().await?;
                file = Some((filename, data.to_vec()));
            }
            Some("cert_type") => cert_type = Some(field.text().await?),
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| ApiError::BadRequest("file: no file provided".to_string()))?;
    let slot: CertSlot = cert_type
        .ok_or_else(|| ApiError::BadRequest("cert_type: is required".to_string()))?
        .trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("cert_type: {e}")))?;

    let _guard = state.peer_locks.acquire(id).await;
    let pool = state.pool.clone();
    let flags = blocking(move || {
        let conn = pool.get()?;
        let format = fedlink_registry::store_certificate(&conn, id, slot, &filename, &data)?;
        record_audit(
            &conn,
            Some(id),
            &EventPayload::CertificateUploaded {
                cert_type: slot.to_string(),
                filename,
                format: format.to_string(),
            },
        );
        Ok(fedlink_registry::certificate_flags(&conn, id)?)
    })
    .await?;

    state.request_reconcile();
    Ok(Json(UploadCertResponse {
        status: "ok",
        cert_type: slot,
        flags,
    }))
}
