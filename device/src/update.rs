use std::{path::PathBuf, time::Duration};

use chrono::Utc;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

const UPDATE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STAGING_PATH: &str = "./firmware-update.bin";

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("firmware download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("firmware endpoint returned HTTP {0}")]
    Status(StatusCode),

    #[error("firmware image is empty")]
    EmptyImage,

    #[error("firmware sha256 mismatch (expected {expected}, got {actual})")]
    DigestMismatch { expected: String, actual: String },

    #[error("failed to stage firmware image: {0}")]
    Stage(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied {
        bytes_written: u64,
        sha256: String,
        completed_epoch: i64,
    },
    NoUpdate,
}

/// Downloads a firmware image and stages it for the next boot.
///
/// The whole attempt runs inline on the control task: feeding and the broker
/// session stall until it finishes. A successful apply is followed by a
/// restart, so nothing after it matters.
#[derive(Debug, Clone)]
pub struct FirmwareUpdater {
    http: reqwest::Client,
    staging_path: PathBuf,
}

impl FirmwareUpdater {
    pub fn from_env() -> anyhow::Result<Self> {
        let staging_path = std::env::var("FEEDER_FIRMWARE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_PATH));

        // The firmware host serves the same self-signed certificate chain as
        // the registration endpoint.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(UPDATE_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http, staging_path })
    }

    pub async fn apply(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let mut response = self.http.get(url).send().await?;

        let status = response.status();
        if is_no_update(status) {
            return Ok(UpdateOutcome::NoUpdate);
        }
        if !status.is_success() {
            return Err(UpdateError::Status(status));
        }

        let mut hasher = Sha256::new();
        let mut image = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            image.extend_from_slice(&chunk);
        }

        if image.is_empty() {
            return Err(UpdateError::EmptyImage);
        }

        let actual = digest_hex(&hasher.finalize());
        if let Some(expected) = expected_sha256 {
            check_expected_digest(expected, &actual)?;
        }

        tokio::fs::write(&self.staging_path, &image).await?;
        info!(
            "staged firmware image at {} ({} bytes, sha256 {actual})",
            self.staging_path.display(),
            image.len(),
        );

        Ok(UpdateOutcome::Applied {
            bytes_written: image.len() as u64,
            sha256: actual,
            completed_epoch: Utc::now().timestamp(),
        })
    }
}

fn is_no_update(status: StatusCode) -> bool {
    status == StatusCode::NOT_MODIFIED || status == StatusCode::NO_CONTENT
}

fn check_expected_digest(expected: &str, actual: &str) -> Result<(), UpdateError> {
    let normalized = expected.trim().to_ascii_lowercase();
    if normalized != actual {
        return Err(UpdateError::DigestMismatch {
            expected: normalized,
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn digest_hex(digest: &[u8]) -> String {
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use core::fmt::Write as _;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_hex_matches_known_vector() {
        let digest = Sha256::digest(b"");
        assert_eq!(
            digest_hex(&digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn no_update_statuses() {
        assert!(is_no_update(StatusCode::NOT_MODIFIED));
        assert!(is_no_update(StatusCode::NO_CONTENT));
        assert!(!is_no_update(StatusCode::OK));
        assert!(!is_no_update(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn expected_digest_is_normalized_before_comparison() {
        let actual = "ab12cd34";
        assert!(check_expected_digest("  AB12CD34 ", actual).is_ok());
        assert!(matches!(
            check_expected_digest("ffffffff", actual),
            Err(UpdateError::DigestMismatch { .. })
        ));
    }
}
