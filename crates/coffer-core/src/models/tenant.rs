use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-tenant storage counters. `quota_bytes = None` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TenantStorageAccount {
    pub tenant_id: Uuid,
    pub quota_bytes: Option<i64>,
    pub used_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

impl TenantStorageAccount {
    pub fn new(tenant_id: Uuid, quota_bytes: Option<i64>) -> Self {
        Self {
            tenant_id,
            quota_bytes,
            used_bytes: 0,
            updated_at: Utc::now(),
        }
    }

    /// Remaining bytes, or `None` when the account is unlimited.
    pub fn available_bytes(&self) -> Option<u64> {
        self.quota_bytes
            .map(|quota| quota.saturating_sub(self.used_bytes).max(0) as u64)
    }
}

/// Storage usage summary returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub tenant_id: Uuid,
    pub used_bytes: i64,
    pub quota_bytes: Option<i64>,
    /// Used share of the quota in percent (0.0 when unlimited).
    pub percentage: f64,
}

impl From<&TenantStorageAccount> for StorageStats {
    fn from(account: &TenantStorageAccount) -> Self {
        let percentage = match account.quota_bytes {
            Some(quota) if quota > 0 => {
                let pct = account.used_bytes as f64 / quota as f64 * 100.0;
                (pct * 100.0).round() / 100.0
            }
            _ => 0.0,
        };
        StorageStats {
            tenant_id: account.tenant_id,
            used_bytes: account.used_bytes,
            quota_bytes: account.quota_bytes,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: i64 = 1024 * 1024;

    #[test]
    fn test_available_bytes() {
        let mut account = TenantStorageAccount::new(Uuid::new_v4(), Some(100 * MB));
        account.used_bytes = 95 * MB;
        assert_eq!(account.available_bytes(), Some((5 * MB) as u64));

        let unlimited = TenantStorageAccount::new(Uuid::new_v4(), None);
        assert_eq!(unlimited.available_bytes(), None);
    }

    #[test]
    fn test_stats_percentage() {
        let mut account = TenantStorageAccount::new(Uuid::new_v4(), Some(100 * MB));
        account.used_bytes = 95 * MB;
        let stats = StorageStats::from(&account);
        assert_eq!(stats.percentage, 95.0);

        let unlimited = TenantStorageAccount::new(Uuid::new_v4(), None);
        assert_eq!(StorageStats::from(&unlimited).percentage, 0.0);
    }
}
