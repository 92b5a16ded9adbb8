//! S3-compatible object storage provider.
//!
//! Only configuration is wired up so far; every transfer operation reports
//! that it is not implemented once the bucket settings have been validated.

use super::StorageProvider;
use crate::utils::errors::BackupError;
use crate::Result;
use std::fmt;
use std::path::Path;

#[derive(Clone, Default)]
pub struct S3Provider {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

// Credentials stay out of logs.
impl fmt::Debug for S3Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Provider")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Provider {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        self.access_key_id = access_key_id.into();
        self.secret_access_key = secret_access_key.into();
        self.session_token = session_token.into();
        self
    }

    fn check_configured(&self) -> Result<()> {
        if self.bucket.is_empty() || self.region.is_empty() {
            return Err(BackupError::Config(
                "s3 bucket and region are required".to_string(),
            ));
        }
        Ok(())
    }
}

impl StorageProvider for S3Provider {
    fn upload(&self, _local_path: &Path, _remote_key: &str) -> Result<()> {
        self.check_configured()?;
        Err(BackupError::NotImplemented("s3 upload".to_string()))
    }

    fn download(&self, _remote_key: &str, _local_path: &Path) -> Result<()> {
        self.check_configured()?;
        Err(BackupError::NotImplemented("s3 download".to_string()))
    }

    fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        self.check_configured()?;
        Err(BackupError::NotImplemented("s3 list".to_string()))
    }

    fn delete(&self, _remote_key: &str) -> Result<()> {
        self.check_configured()?;
        Err(BackupError::NotImplemented("s3 delete".to_string()))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
