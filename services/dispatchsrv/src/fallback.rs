//! Backup channel policy
//!
//! A failed primary alarm is resent once as the same request with the keyword
//! forced to the backup code.

use crate::alarm::AlarmRequest;

pub const DEFAULT_BACKUP_KEYWORD: &str = "TEST";

#[derive(Debug, Clone)]
pub struct BackupFallbackPolicy {
    backup_keyword: String,
}

impl Default for BackupFallbackPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_KEYWORD)
    }
}

impl BackupFallbackPolicy {
    pub fn new(backup_keyword: impl Into<String>) -> Self {
        Self {
            backup_keyword: backup_keyword.into(),
        }
    }

    pub fn backup_keyword(&self) -> &str {
        &self.backup_keyword
    }

    /// Backup variant of `original`: only the keyword changes
    pub fn backup_variant(&self, original: &AlarmRequest) -> AlarmRequest {
        AlarmRequest {
            keyword: self.backup_keyword.clone(),
            ..original.clone()
        }
    }
}
