//! OpenAPI document for the upload endpoints, served at `/openapi.json` and rendered at `/docs`.

use crate::api::{self, models::uploads::ExportUploadsResponse};
use crate::errors::{ErrorBody, ValidationIssue};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pixvault",
        description = "Image uploads and CSV exports of the upload catalog"
    ),
    paths(
        api::handlers::uploads::upload_image,
        api::handlers::uploads::export_uploads,
    ),
    components(schemas(ExportUploadsResponse, ErrorBody, ValidationIssue)),
    tags(
        (name = "uploads", description = "Image uploads and catalog exports")
    )
)]
pub struct ApiDoc;
