//! Multipart upload pipeline: parse, validate everything, then write the file
//! and the row. Nothing touches disk or the database until validation passes.

use std::path::Path;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use tracing::{error, info};

use studyshare_db::models::{MaterialRow, NewMaterial};
use studyshare_types::api::Claims;
use studyshare_types::models::{Role, Visibility};

use crate::error::ApiError;
use crate::permissions::{self, Permission};
use crate::state::AppState;
use crate::storage::stored_file_name;

pub const FILE_FIELD: &str = "material";

/// Accepted extensions and the content types a client may declare for each.
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("pdf", &["application/pdf"]),
    ("doc", &["application/msword"]),
    (
        "docx",
        &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
    ),
    ("ppt", &["application/vnd.ms-powerpoint"]),
    (
        "pptx",
        &["application/vnd.openxmlformats-officedocument.presentationml.presentation"],
    ),
    ("jpg", &["image/jpeg", "image/jpg"]),
    ("jpeg", &["image/jpeg", "image/jpg"]),
    ("png", &["image/png"]),
];

#[derive(Debug, Default)]
pub struct UploadForm {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub semester: Option<String>,
    pub visibility: Option<String>,
    pub group_id: Option<String>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A form that passed every check that does not need the database.
#[derive(Debug)]
pub struct ValidUpload {
    pub title: String,
    pub subject: String,
    pub semester: String,
    pub visibility: Visibility,
    pub group_id: Option<i64>,
    pub file: UploadedFile,
}

fn limit_mb(max_file_size: u64) -> u64 {
    max_file_size / (1024 * 1024)
}

fn multipart_error(err: MultipartError, max_file_size: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { limit_mb: limit_mb(max_file_size) }
    } else {
        ApiError::validation(err.body_text())
    }
}

/// Drain the multipart body. The file part is read chunk by chunk and
/// abandoned as soon as it passes `max_file_size`.
pub async fn read_form(mut multipart: Multipart, max_file_size: u64) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let mut data = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| multipart_error(e, max_file_size))?
            {
                if (data.len() + chunk.len()) as u64 > max_file_size {
                    return Err(ApiError::FileTooLarge { limit_mb: limit_mb(max_file_size) });
                }
                data.extend_from_slice(&chunk);
            }
            form.file = Some(UploadedFile { file_name, content_type, data });
            continue;
        }

        let value = field.text().await.map_err(|e| multipart_error(e, max_file_size))?;
        match name.as_str() {
            "title" => form.title = Some(value),
            "subject" => form.subject = Some(value),
            "semester" => form.semester = Some(value),
            "visibility" => form.visibility = Some(value),
            "groupId" => form.group_id = Some(value),
            // Client-supplied isVerified / uploaderRole / uploadedBy are ignored.
            _ => {}
        }
    }

    Ok(form)
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extension must be allowed and the declared content type must be one
/// registered for that extension.
pub fn check_file_type(file_name: &str, content_type: &str) -> Result<(), ApiError> {
    let ext = extension(file_name).ok_or(ApiError::UnsupportedType)?;
    let mime = essence(content_type);
    let allowed = ALLOWED_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .ok_or(ApiError::UnsupportedType)?;
    if allowed.1.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(ApiError::UnsupportedType)
    }
}

fn required(value: Option<String>, label: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{} is required", label)))
}

/// Every check that needs no I/O, in order.
pub fn validate(claims: &Claims, form: UploadForm, max_file_size: u64) -> Result<ValidUpload, ApiError> {
    permissions::require(claims, Permission::UploadMaterial)?;

    let file = match form.file {
        Some(f) if !f.data.is_empty() => f,
        _ => return Err(ApiError::MissingFile),
    };
    if file.data.len() as u64 > max_file_size {
        return Err(ApiError::FileTooLarge { limit_mb: limit_mb(max_file_size) });
    }
    check_file_type(&file.file_name, &file.content_type)?;

    let title = required(form.title, "Title")?;
    let subject = required(form.subject, "Subject")?;
    let semester = required(form.semester, "Semester")?;

    let visibility = match form.visibility.as_deref().map(str::trim) {
        None | Some("") => Visibility::Public,
        Some(v) => v
            .parse::<Visibility>()
            .map_err(|_| ApiError::validation("Visibility must be public or group"))?,
    };

    let group_id = match form.group_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ApiError::validation("Invalid group id"))?,
        ),
    };
    let group_id = match visibility {
        Visibility::Group => Some(group_id.ok_or(ApiError::MissingGroup)?),
        Visibility::Public => None,
    };

    Ok(ValidUpload { title, subject, semester, visibility, group_id, file })
}

/// Verification status and role snapshot come from the uploader's role only.
pub fn uploader_snapshot(role: Role) -> (Role, bool) {
    match role {
        Role::Teacher | Role::Admin => (Role::Teacher, true),
        Role::Student => (Role::Student, false),
    }
}

/// Validate, store the bytes, record the row. A failed insert removes the
/// file that was just written.
pub async fn upload(state: &AppState, claims: Claims, form: UploadForm) -> Result<MaterialRow, ApiError> {
    let upload = validate(&claims, form, state.settings.max_file_size)?;

    if let Some(group_id) = upload.group_id {
        let exists = state
            .blocking(move |s| Ok(s.db.get_group(group_id)?.is_some()))
            .await?;
        if !exists {
            return Err(ApiError::GroupNotFound);
        }
    }

    let stored_name = stored_file_name(&upload.file.file_name);
    state
        .storage
        .write_file(&stored_name, &upload.file.data)
        .await
        .map_err(ApiError::Internal)?;

    let (uploader_role, is_verified) = uploader_snapshot(claims.role);
    let ValidUpload { title, subject, semester, visibility, group_id, file } = upload;
    let file_size = file.data.len() as i64;
    let UploadedFile { file_name, content_type, .. } = file;
    let path = stored_name.clone();

    let inserted = state
        .blocking(move |s| {
            let id = s.db.insert_material(&NewMaterial {
                title: &title,
                subject: &subject,
                semester: &semester,
                uploaded_by: &claims.name,
                user_id: claims.sub,
                uploader_role,
                visibility,
                group_id,
                file_path: &path,
                file_name: &file_name,
                file_type: &essence(&content_type),
                file_size,
                is_verified,
            })?;
            s.db.get_material(id)?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("material {} vanished after insert", id)))
        })
        .await;

    match inserted {
        Ok(material) => {
            info!("Material {} uploaded by user {} ({} bytes)", material.id, material.user_id.unwrap_or_default(), material.file_size);
            Ok(material)
        }
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_file(&stored_name).await {
                error!("Failed to remove orphaned upload {}: {:#}", stored_name, cleanup);
            }
            Err(e)
        }
    }
}
