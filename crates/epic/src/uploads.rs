//! Multipart upload storage

use crate::errors::HttpError;
use axum::extract::multipart::{Multipart, MultipartError};
use epic_core::Environment;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Upload directory when neither `UPLOADDIR` nor the options name one.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads/";

/// `UPLOADDIR`, else `default`, else [`DEFAULT_UPLOAD_DIR`].
pub fn resolve_upload_dir(env: &Environment, default: Option<&Path>) -> PathBuf {
    match (env.get_opt("UPLOADDIR"), default) {
        (Some(dir), _) => PathBuf::from(dir),
        (None, Some(dir)) => dir.to_path_buf(),
        (None, None) => PathBuf::from(DEFAULT_UPLOAD_DIR),
    }
}

/// A file saved from a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Form field the file was sent in
    pub field: String,
    /// File name supplied by the client
    pub original_name: String,
    pub stored_path: PathBuf,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Text fields and stored files of one multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub fields: IndexMap<String, String>,
    pub files: Vec<StoredFile>,
}

/// Save every file field of `multipart` into `dir` under a random name.
///
/// Malformed bodies are a 400; failing to write a file is a 500.
pub async fn store_uploads(dir: &Path, mut multipart: Multipart) -> Result<UploadSummary, HttpError> {
    let mut summary = UploadSummary::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(malformed)?;
            summary.fields.insert(name, value);
            continue;
        };

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(malformed)?;
        let stored_path = dir.join(Uuid::new_v4().simple().to_string());

        tokio::fs::write(&stored_path, &data).await.map_err(|e| {
            HttpError::internal("Failed to store upload")
                .with_detail(format!("{}: {}", stored_path.display(), e))
        })?;
        debug!(
            "Stored upload '{}' ({} bytes) at {}",
            original_name,
            data.len(),
            stored_path.display()
        );

        summary.files.push(StoredFile {
            field: name,
            original_name,
            stored_path,
            content_type,
            size: data.len() as u64,
        });
    }

    Ok(summary)
}

fn malformed(err: MultipartError) -> HttpError {
    HttpError::bad_request(err.body_text())
}
