//! Remote upload of log files.
//!
//! Object keys are derived from the upload time only, so uploading the same
//! file twice stores two objects rather than overwriting one.

mod s3;

use std::fmt::Display;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};

use crate::error::UploadError;

pub use s3::S3Uploader;

/// Uploads one local file and returns the key it was stored under.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_file(&self, path: &Path) -> Result<String, UploadError>;
}

/// Build the remote key for `path` uploaded at `now`:
/// `<prefix>/<YYYY>/<MM>/<DD>/<stem>_<YYYY_MM_DD_HH_MM_SS><.ext>`.
///
/// An empty prefix yields a key that starts at the date.
pub fn object_key<Tz>(prefix: &str, path: &Path, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let dated = format!(
        "{}/{}_{}{}",
        now.format("%Y/%m/%d"),
        stem,
        now.format("%Y_%m_%d_%H_%M_%S"),
        ext
    );

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        dated
    } else {
        format!("{prefix}/{dated}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_object_key_layout() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 13, 4, 5).unwrap();
        assert_eq!(
            object_key("logs", Path::new("ping.log"), &now),
            "logs/2024/02/29/ping_2024_02_29_13_04_05.log"
        );
    }

    #[test]
    fn test_object_key_uses_file_name_only() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            object_key("archive/ping/", Path::new("/var/log/probe/ping.error.log"), &now),
            "archive/ping/2023/12/31/ping.error_2023_12_31_23_59_59.log"
        );
    }

    #[test]
    fn test_object_key_without_extension_or_prefix() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            object_key("", Path::new("data"), &now),
            "2024/01/02/data_2024_01_02_03_04_05"
        );
    }
}
