use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;
use crate::product::ProductId;

/// Moderation state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
}

/// A buyer's complaint about a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub reporter: UserId,
    pub product: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    pub reason: String,
    pub details: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Trim and require both the reason and the details.
pub fn validate_report_text(reason: &str, details: &str) -> Result<(String, String), ValidationError> {
    let reason = reason.trim();
    let details = details.trim();
    if reason.is_empty() {
        return Err(ValidationError::MissingField("reason"));
    }
    if details.is_empty() {
        return Err(ValidationError::MissingField("details"));
    }
    Ok((reason.to_string(), details.to_string()))
}
