//! Server Configuration

use crate::storage::ExpiryConfig;

/// Default number of numbered databases.
pub const DEFAULT_DATABASES: usize = 16;

/// Default page size of the SCAN family when no COUNT is given.
pub const DEFAULT_SCAN_BATCH: usize = 10;

/// Settings fixed at server construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of databases, addressable as 0..databases (default: 16)
    pub databases: usize,

    /// Entries examined per SCAN call without COUNT (default: 10)
    pub scan_batch: usize,

    /// Background sweeper settings
    pub expiry: ExpiryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            databases: DEFAULT_DATABASES,
            scan_batch: DEFAULT_SCAN_BATCH,
            expiry: ExpiryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Same defaults with a different database count. At least one
    /// database always exists.
    pub fn with_databases(databases: usize) -> Self {
        Self {
            databases: databases.max(1),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.databases, 16);
        assert_eq!(config.scan_batch, 10);
    }

    #[test]
    fn test_with_databases_floor() {
        assert_eq!(ServerConfig::with_databases(0).databases, 1);
        assert_eq!(ServerConfig::with_databases(4).databases, 4);
    }
}
