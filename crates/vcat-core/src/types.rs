//! Shared domain types used across the pipeline crates.

use serde::{Deserialize, Serialize};

/// The structured payload extracted from one product page.
///
/// This is what a worker stages and what the committer promotes. Fields that
/// could not be extracted are empty rather than absent; the committer never
/// lets an empty field overwrite a previously known good value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub name: String,
    /// Canonical URL of the product page; the catalog identity key together
    /// with the owning profile.
    pub canonical_url: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub file_urls: Vec<String>,
    #[serde(default)]
    pub guessed_code: String,
    #[serde(default)]
    pub category: String,
}

impl ExtractedProduct {
    /// True when extraction produced no usable field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.image_url.is_empty()
            && self.file_urls.is_empty()
            && self.guessed_code.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    StructureScan,
    BulkExtract,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::StructureScan => "structure_scan",
            JobType::BulkExtract => "bulk_extract",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "structure_scan" => Some(JobType::StructureScan),
            "bulk_extract" => Some(JobType::BulkExtract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    WaitingCommit,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::WaitingCommit => "waiting_commit",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "waiting_commit" => Some(JobStatus::WaitingCommit),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "stopped" => Some(JobStatus::Stopped),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions or counter updates.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::WaitingCommit,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("paused"), None);
    }

    #[test]
    fn terminal_states_are_exactly_completed_failed_stopped() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::WaitingCommit.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }

    #[test]
    fn extracted_product_is_empty_ignores_category() {
        let mut product = ExtractedProduct {
            canonical_url: "https://example.com/p/1".to_string(),
            category: "Taps / Kitchen".to_string(),
            ..ExtractedProduct::default()
        };
        assert!(product.is_empty());

        product.name = "Single-lever mixer".to_string();
        assert!(!product.is_empty());
    }

    #[test]
    fn extracted_product_deserializes_with_missing_optional_fields() {
        let product: ExtractedProduct = serde_json::from_str(
            r#"{"name":"Mixer","canonical_url":"https://example.com/p/1"}"#,
        )
        .expect("deserialize");
        assert!(product.file_urls.is_empty());
        assert!(product.image_url.is_empty());
    }
}
