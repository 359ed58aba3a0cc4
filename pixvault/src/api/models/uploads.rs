//! API request/response models for uploads.

use crate::errors::ValidationIssue;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Longest accepted `searchQuery`, in characters
pub const MAX_SEARCH_QUERY_LENGTH: usize = 255;

/// Query parameters for exporting uploads
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ExportUploadsQuery {
    /// Only export uploads whose name contains this text (case-insensitive)
    #[param(max_length = 255)]
    pub search_query: Option<String>,
}

impl ExportUploadsQuery {
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if let Some(query) = &self.search_query
            && query.chars().count() > MAX_SEARCH_QUERY_LENGTH
        {
            issues.push(ValidationIssue {
                field: "searchQuery".to_string(),
                message: format!("must be at most {MAX_SEARCH_QUERY_LENGTH} characters"),
            });
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

/// Location of a generated export
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportUploadsResponse {
    /// Public URL of the CSV report
    #[schema(format = "uri")]
    pub report_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_length_counts_characters() {
        let at_limit = ExportUploadsQuery {
            search_query: Some("é".repeat(MAX_SEARCH_QUERY_LENGTH)),
        };
        assert!(at_limit.validate().is_ok());

        let too_long = ExportUploadsQuery {
            search_query: Some("a".repeat(MAX_SEARCH_QUERY_LENGTH + 1)),
        };
        let issues = too_long.validate().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "searchQuery");
    }

    #[test]
    fn test_missing_search_query_is_valid() {
        assert!(ExportUploadsQuery::default().validate().is_ok());
    }

    #[test]
    fn test_response_uses_camel_case() {
        let body = serde_json::to_value(ExportUploadsResponse {
            report_url: "https://cdn.example.com/downloads/report.csv".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "reportUrl": "https://cdn.example.com/downloads/report.csv" }));
    }
}
