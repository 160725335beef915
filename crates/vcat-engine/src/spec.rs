//! Job submission input and its validation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vcat_core::JobType;

use crate::error::EngineError;

/// What a caller submits to create a job.
///
/// A `bulk_extract` job takes explicit target URLs, a scan root to plan
/// from, or both; a `structure_scan` job takes only a scan root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub profile_id: Uuid,
    pub job_type: JobType,
    #[serde(default)]
    pub target_urls: Vec<String>,
    #[serde(default)]
    pub scan_root: Option<String>,
    /// Deep scans descend to the configured depth bound; shallow ones stop
    /// at the first level.
    #[serde(default)]
    pub deep: bool,
}

/// The subset of the spec persisted as `jobs.params`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default)]
    pub target_urls: Vec<String>,
    #[serde(default)]
    pub scan_root: Option<String>,
    #[serde(default)]
    pub deep: bool,
}

impl JobSpec {
    /// Validates the spec before any job row is created.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSpec`] naming the first problem found.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.job_type {
            JobType::StructureScan => {
                let Some(root) = &self.scan_root else {
                    return Err(EngineError::InvalidSpec(
                        "structure_scan requires scan_root".to_string(),
                    ));
                };
                check_url(root)?;
            }
            JobType::BulkExtract => {
                if self.target_urls.is_empty() && self.scan_root.is_none() {
                    return Err(EngineError::InvalidSpec(
                        "bulk_extract requires target_urls or scan_root".to_string(),
                    ));
                }
                for url in &self.target_urls {
                    check_url(url)?;
                }
                if let Some(root) = &self.scan_root {
                    check_url(root)?;
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn params(&self) -> JobParams {
        JobParams {
            target_urls: self.target_urls.clone(),
            scan_root: self.scan_root.clone(),
            deep: self.deep,
        }
    }
}

fn check_url(url: &str) -> Result<(), EngineError> {
    let ok = url::Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidSpec(format!(
            "\"{url}\" is not a valid http(s) URL"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_spec() -> JobSpec {
        JobSpec {
            profile_id: Uuid::new_v4(),
            job_type: JobType::BulkExtract,
            target_urls: vec!["https://vendor.example.com/products/1".to_string()],
            scan_root: None,
            deep: false,
        }
    }

    #[test]
    fn bulk_spec_with_targets_is_valid() {
        assert!(bulk_spec().validate().is_ok());
    }

    #[test]
    fn bulk_spec_without_targets_or_root_is_rejected() {
        let spec = JobSpec {
            target_urls: vec![],
            ..bulk_spec()
        };
        let result = spec.validate();
        assert!(
            matches!(result, Err(EngineError::InvalidSpec(_))),
            "expected InvalidSpec, got: {result:?}"
        );
    }

    #[test]
    fn bulk_spec_with_malformed_url_is_rejected() {
        let spec = JobSpec {
            target_urls: vec!["ftp://vendor.example.com/file".to_string()],
            ..bulk_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(EngineError::InvalidSpec(_))
        ));

        let spec = JobSpec {
            target_urls: vec!["not a url at all".to_string()],
            ..bulk_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(EngineError::InvalidSpec(_))
        ));
    }

    #[test]
    fn scan_spec_requires_root() {
        let spec = JobSpec {
            job_type: JobType::StructureScan,
            target_urls: vec![],
            scan_root: None,
            ..bulk_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(EngineError::InvalidSpec(_))
        ));

        let spec = JobSpec {
            job_type: JobType::StructureScan,
            target_urls: vec![],
            scan_root: Some("https://vendor.example.com/".to_string()),
            deep: true,
            profile_id: Uuid::new_v4(),
        };
        assert!(spec.validate().is_ok());
    }
}
