use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::BytesMut;

use crate::{
    AppState,
    api::models::files::{FileListResponse, MessageResponse, UploadForm, UploadResponse},
    errors::{Error, ErrorBody, Result},
    listing::list_all,
    validation::{extension, is_image},
};

fn multipart_error(state: &AppState, err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::TooLarge {
            limit: state.policy.max_file_size(),
        };
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", err.body_text()),
    }
}

/// Replace anything that cannot sit inside a quoted header parameter.
fn attachment_name(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect()
}

fn image_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .iter()
        .find(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| format!("image/{}", extension(filename).to_ascii_lowercase()))
}

#[utoipa::path(
    post,
    path = "/cdn/v1/uploadfile/",
    tag = "files",
    summary = "Upload file",
    description = "Store a file under its own name. The name must not already be taken and its extension must be in the allow-list.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "Missing file or extension not allowed", body = ErrorBody),
        (status = 403, description = "Missing or wrong bearer token", body = ErrorBody),
        (status = 409, description = "A file with this name already exists", body = ErrorBody),
        (status = 413, description = "File larger than the configured limit", body = ErrorBody),
        (status = 500, description = "Storage error", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    let mut upload: Option<(String, BytesMut)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(&state, e))? {
        if field.name() != Some("file") {
            tracing::trace!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::BadRequest {
                message: "Uploaded file has no name".to_string(),
            })?;

        let mut content = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(&state, e))? {
            content.extend_from_slice(&chunk);
            // Fail fast instead of buffering past the limit
            state.policy.check_size(content.len() as u64)?;
        }

        upload = Some((filename, content));
        break;
    }

    let (filename, content) = upload.ok_or_else(|| Error::BadRequest {
        message: "No file uploaded".to_string(),
    })?;

    state.policy.validate(&filename, content.len() as u64)?;

    if state.storage.exists(&filename).await? {
        return Err(Error::AlreadyExists { name: filename });
    }

    let size = content.len();
    state.storage.put(&filename, content.freeze()).await?;
    tracing::info!(filename = %filename, size, "File uploaded");

    Ok(Json(UploadResponse {
        file_type: extension(&filename).to_ascii_lowercase(),
        filename,
        message: "File uploaded successfully".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/cdn/v1/files/{filename}",
    tag = "files",
    summary = "Download file",
    description = "Return the stored bytes. Images are served inline with an `image/*` content type; anything else is sent as an attachment.",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "File content"),
        (status = 400, description = "Extension not allowed (only when downloads are restricted)", body = ErrorBody),
        (status = 403, description = "Missing or wrong bearer token", body = ErrorBody),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 500, description = "Storage error", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state))]
pub async fn download_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response> {
    if state.config.files.restrict_downloads {
        state.policy.check_extension(&filename)?;
    }

    let content = state
        .storage
        .get(&filename)
        .await?
        .ok_or_else(|| Error::NotFound { name: filename.clone() })?;

    tracing::debug!(size = content.len(), "Serving file");

    if is_image(&filename) {
        return Ok(([(header::CONTENT_TYPE, image_content_type(&filename))], content).into_response());
    }

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", attachment_name(&filename)))
        .map_err(|e| Error::Unexpected(e.into()))?;

    let mut response = Response::new(Body::from(content));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/cdn/v1/files/",
    tag = "files",
    summary = "List files",
    description = "Return every stored name. Backend pages are followed until exhausted.",
    responses(
        (status = 200, description = "All stored names", body = FileListResponse),
        (status = 403, description = "Missing or wrong bearer token", body = ErrorBody),
        (status = 500, description = "Storage error", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>> {
    let names = list_all(state.storage.as_ref()).await?;
    tracing::info!(count = names.len(), "File list retrieved");
    Ok(Json(FileListResponse::from_names(names)))
}

#[utoipa::path(
    delete,
    path = "/cdn/v1/files/{filename}",
    tag = "files",
    summary = "Delete file",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "File deleted successfully", body = MessageResponse),
        (status = 403, description = "Missing or wrong bearer token", body = ErrorBody),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 500, description = "Storage error", body = ErrorBody),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip(state))]
pub async fn delete_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Json<MessageResponse>> {
    if !state.storage.exists(&filename).await? {
        return Err(Error::NotFound { name: filename });
    }

    state.storage.delete(&filename).await?;
    tracing::info!(filename = %filename, "File deleted");

    Ok(Json(MessageResponse {
        message: "File deleted successfully".to_string(),
    }))
}
