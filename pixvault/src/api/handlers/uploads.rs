use crate::AppState;
use crate::api::models::uploads::{ExportUploadsQuery, ExportUploadsResponse};
use crate::errors::{Error, ErrorBody, Result, ValidationIssue};
use crate::storage::ContentStreamError;
use crate::uploads::{self, ExportUploadsInput, UploadImageError, UploadImageInput};
use axum::{
    Json,
    extract::{
        Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
};
use futures::StreamExt;

fn multipart_error(err: MultipartError, limit: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return UploadImageError::FileSizeLimitReached { limit }.into();
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", err.body_text()),
    }
}

fn content_error(err: MultipartError, limit: u64) -> ContentStreamError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // The body limit sits above the file size limit
        ContentStreamError::SizeLimitExceeded { limit }
    } else {
        ContentStreamError::Read(err.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/uploads",
    tag = "uploads",
    summary = "Upload image",
    description = "Upload a single image (JPEG, PNG or WebP, at most 2 MiB by default). The first multipart part \
                   that carries a file name is stored; other parts are ignored.",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with one file part"
    ),
    responses(
        (status = 201, description = "Image stored and recorded"),
        (status = 400, description = "Missing file, invalid file format, file too large or malformed body", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<StatusCode> {
    let mut multipart = multipart.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    })?;

    let limit = state.config.uploads.max_file_size;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        // A part without a content type cannot be on the allow-list
        let content_type = field.content_type().unwrap_or_default().to_string();

        tracing::debug!(file_name = %file_name, content_type = %content_type, "Receiving upload");

        let input = UploadImageInput {
            file_name,
            content_type,
            content: field.map(move |chunk| chunk.map_err(|e| content_error(e, limit))).boxed(),
        };
        uploads::upload_image(&*state.uploads, &*state.storage, &state.config.uploads, input).await?;

        return Ok(StatusCode::CREATED);
    }

    Err(Error::BadRequest {
        message: "File is required.".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/uploads/exports",
    tag = "uploads",
    summary = "Export uploads",
    description = "Write the upload catalog as CSV (`ID,Name,URL,Uploaded at`) into object storage and return \
                   the report URL. Responds once the report is fully stored.",
    params(ExportUploadsQuery),
    responses(
        (status = 200, description = "Report stored", body = ExportUploadsResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn export_uploads(
    State(state): State<AppState>,
    query: std::result::Result<Query<ExportUploadsQuery>, QueryRejection>,
) -> Result<Json<ExportUploadsResponse>> {
    let Query(query) = query.map_err(|e| Error::Validation {
        issues: vec![ValidationIssue {
            field: "query".to_string(),
            message: e.body_text(),
        }],
    })?;
    query.validate().map_err(|issues| Error::Validation { issues })?;

    let output = uploads::export_uploads(
        &*state.uploads,
        &*state.storage,
        &state.config.exports,
        ExportUploadsInput {
            search_query: query.search_query,
        },
    )
    .await?;

    Ok(Json(ExportUploadsResponse {
        report_url: output.report_url.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::models::uploads::ExportUploadsResponse;
    use crate::config::Config;
    use crate::test_utils::{
        InMemoryUploadStore, TEST_PUBLIC_URL, create_test_app, create_test_config, memory_storage, stored_objects,
    };
    use crate::{AppState, build_router};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use object_store::{ObjectStore, path::Path};
    use serde_json::json;
    use std::sync::Arc;

    fn image_form(file_name: &str, mime_type: &str, content: Vec<u8>) -> MultipartForm {
        MultipartForm::new().add_part("file", Part::bytes(content).file_name(file_name).mime_type(mime_type))
    }

    fn small_limit_config(max_file_size: u64) -> Config {
        let mut config = create_test_config();
        config.uploads.max_file_size = max_file_size;
        config
    }

    #[tokio::test]
    async fn test_upload_then_export_scenario() {
        let (server, uploads, memory) = create_test_app(create_test_config());

        let response = server
            .post("/uploads")
            .multipart(image_form("photo.png", "image/png", vec![0x89, b'P', b'N', b'G']))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert!(response.text().is_empty());

        let records = uploads.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "photo.png");
        assert!(records[0].storage_key.starts_with("images/"));

        let response = server.post("/uploads/exports").await;
        response.assert_status_ok();
        let body: ExportUploadsResponse = response.json();
        let key = body.report_url.strip_prefix(TEST_PUBLIC_URL).unwrap();
        assert!(key.starts_with("downloads/"));

        let report = memory.get(&Path::parse(key).unwrap()).await.unwrap().bytes().await.unwrap();
        let mut reader = csv::Reader::from_reader(&report[..]);
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], records[0].id.to_string());
        assert_eq!(&rows[0][1], "photo.png");
        assert_eq!(&rows[0][2], records[0].remote_url);
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_format_without_side_effects() {
        let (server, uploads, memory) = create_test_app(create_test_config());

        let response = server
            .post("/uploads")
            .multipart(image_form("doc.pdf", "application/pdf", b"%PDF-1.7".to_vec()))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "message": "Invalid file format." }));
        assert!(uploads.records().is_empty());
        assert!(stored_objects(&memory).await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_requires_a_file_part() {
        let (server, uploads, _memory) = create_test_app(create_test_config());

        let response = server
            .post("/uploads")
            .multipart(MultipartForm::new().add_text("description", "holiday"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "message": "File is required." }));
        assert!(uploads.records().is_empty());
    }

    #[tokio::test]
    async fn test_upload_uses_first_file_part() {
        let (server, uploads, _memory) = create_test_app(create_test_config());

        let form = MultipartForm::new()
            .add_text("description", "holiday")
            .add_part("file", Part::bytes(b"first".to_vec()).file_name("first.jpg").mime_type("image/jpeg"))
            .add_part("other", Part::bytes(b"second".to_vec()).file_name("second.png").mime_type("image/png"));
        let response = server.post("/uploads").multipart(form).await;

        response.assert_status(StatusCode::CREATED);
        let records = uploads.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "first.jpg");
    }

    #[tokio::test]
    async fn test_upload_over_size_limit_is_rejected() {
        let (server, uploads, memory) = create_test_app(small_limit_config(1024));

        let response = server
            .post("/uploads")
            .multipart(image_form("large.webp", "image/webp", vec![7u8; 1025]))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "message": "File size limit reached." }));
        assert!(uploads.records().is_empty());
        assert!(stored_objects(&memory).await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_at_size_limit_is_accepted() {
        let (server, uploads, _memory) = create_test_app(small_limit_config(1024));

        let response = server
            .post("/uploads")
            .multipart(image_form("exact.jpg", "image/jpg", vec![7u8; 1024]))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(uploads.records().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_default_limit_is_two_mebibytes() {
        let (server, uploads, _memory) = create_test_app(create_test_config());

        let response = server
            .post("/uploads")
            .multipart(image_form("huge.png", "image/png", vec![0u8; 2 * 1024 * 1024 + 1]))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "message": "File size limit reached." }));
        assert!(uploads.records().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_multipart_body() {
        let (server, _uploads, _memory) = create_test_app(create_test_config());

        let response = server.post("/uploads").text("photo.png").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["message"].as_str().unwrap().starts_with("Failed to parse multipart data"));
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_database_failure_is_internal_error() {
        let (_memory, storage) = memory_storage();
        let state = AppState::builder()
            .config(create_test_config())
            .uploads(Arc::new(InMemoryUploadStore::new().with_failing_inserts()))
            .storage(storage)
            .build();
        let server = axum_test::TestServer::new(build_router(state).unwrap()).unwrap();

        let response = server
            .post("/uploads")
            .multipart(image_form("photo.png", "image/png", b"png".to_vec()))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({ "message": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_export_filters_by_search_query() {
        let (server, uploads, memory) = create_test_app(create_test_config());
        uploads.seed("Sunset.png");
        uploads.seed("beach-sunset.jpg");
        uploads.seed("mountain.webp");

        let response = server
            .post("/uploads/exports")
            .add_query_param("searchQuery", "sunset")
            .await;
        response.assert_status_ok();

        let body: ExportUploadsResponse = response.json();
        let key = body.report_url.strip_prefix(TEST_PUBLIC_URL).unwrap();
        let report = memory.get(&Path::parse(key).unwrap()).await.unwrap().bytes().await.unwrap();
        let mut reader = csv::Reader::from_reader(&report[..]);
        let names: Vec<String> = reader.records().map(|r| r.unwrap()[1].to_string()).collect();
        assert_eq!(names, vec!["Sunset.png", "beach-sunset.jpg"]);
    }

    #[tokio::test]
    async fn test_export_rejects_overlong_search_query() {
        let (server, _uploads, memory) = create_test_app(create_test_config());

        let response = server
            .post("/uploads/exports")
            .add_query_param("searchQuery", "a".repeat(256))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Validation error");
        assert_eq!(body["issues"][0]["field"], "searchQuery");
        assert!(stored_objects(&memory).await.is_empty());
    }
}
