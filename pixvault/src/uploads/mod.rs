//! Upload use cases.
//!
//! - [`upload_image`]: validate the content type, stream the file into storage, record it
//! - [`export_uploads`]: stream the catalog through a CSV encoder into a storage report
//!
//! Both return explicit error enums ([`errors`]); mapping them to HTTP status codes is the job of
//! [`crate::errors::Error`].

pub mod errors;
pub mod export_uploads;
pub mod report;
pub mod upload_image;

pub use errors::{ExportUploadsError, UploadImageError};
pub use export_uploads::{ExportUploadsInput, ExportUploadsOutput, export_uploads};
pub use upload_image::{UploadImageInput, UploadImageOutput, upload_image};

/// Storage folder for uploaded images
pub const IMAGES_FOLDER: &str = "images";
/// Storage folder for generated CSV reports
pub const DOWNLOADS_FOLDER: &str = "downloads";
