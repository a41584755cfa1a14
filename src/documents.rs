use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::schemas::{new_id, StoredDocument, UserId};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Base64-encoded file contents.
    pub data: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// A stored document without its contents, for listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: usize,
    pub uploaded_at: String,
}

impl From<&StoredDocument> for DocumentMeta {
    fn from(document: &StoredDocument) -> Self {
        DocumentMeta {
            id: document.id.clone(),
            name: document.name.clone(),
            content_type: document.content_type.clone(),
            size: document.size,
            uploaded_at: document.uploaded_at.clone(),
        }
    }
}

pub fn accept_upload(
    upload: DocumentUpload,
    user_id: UserId,
    max_bytes: usize,
) -> Result<StoredDocument, ApiError> {
    let name = upload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("document name is required".into()));
    }
    let bytes = STANDARD
        .decode(upload.data.trim())
        .map_err(|err| ApiError::BadRequest(format!("document data is not base64: {err}")))?;
    if bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(bytes.len()));
    }

    Ok(StoredDocument {
        id: new_id(),
        user_id,
        name: name.to_string(),
        content_type: upload.content_type,
        size: bytes.len(),
        data: STANDARD.encode(&bytes),
        uploaded_at: Utc::now().to_rfc3339(),
    })
}

pub fn contents(document: &StoredDocument) -> Result<Vec<u8>, ApiError> {
    STANDARD
        .decode(&document.data)
        .map_err(|err| ApiError::BadRequest(format!("stored document is corrupt: {err}")))
}
