//! Version Manager
//!
//! Decides what a write does to the catalog, then carries the decision out inside
//! the caller's unit of work. Planning is pure so the quota delta of a write
//! (including versions evicted by retention) is known before anything changes.

use coffer_core::models::{LifecycleState, LogicalFile, NewLogicalFile};
use coffer_core::{AppError, VersionMode};
use coffer_db::UnitOfWork;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    pub mode: VersionMode,
    /// Active versions kept per chain; 0 keeps everything.
    pub max_versions: u32,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            mode: VersionMode::Version,
            max_versions: 10,
        }
    }
}

/// Catalog change for one incoming write.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePlan {
    /// No same-name file: start a new chain at version 1.
    Create,
    /// Overwrite mode: trash the existing chain, then start a new one.
    Replace { trashed: Vec<LogicalFile> },
    /// Add a version on top of `previous` and purge `evicted` for retention.
    Append {
        previous: LogicalFile,
        root_id: Uuid,
        version_number: i32,
        evicted: Vec<LogicalFile>,
    },
}

impl WritePlan {
    /// Net change in used bytes once a row of `size_bytes` is added.
    pub fn quota_delta(&self, size_bytes: i64) -> i64 {
        let released: i64 = match self {
            WritePlan::Create => 0,
            WritePlan::Replace { trashed } => active_bytes(trashed),
            WritePlan::Append { evicted, .. } => active_bytes(evicted),
        };
        size_bytes - released
    }

    /// Rows the plan removes from the catalog.
    pub fn removed_rows(&self) -> &[LogicalFile] {
        match self {
            WritePlan::Append { evicted, .. } => evicted,
            _ => &[],
        }
    }
}

impl VersionPolicy {
    /// Plan a write of a file whose name and folder match `existing_chain`'s head,
    /// or of a new name when `existing_chain` is empty.
    ///
    /// `existing_chain` is the head's chain in version order.
    pub fn plan(&self, existing_chain: Vec<LogicalFile>) -> Result<WritePlan, AppError> {
        if existing_chain.is_empty() {
            return Ok(WritePlan::Create);
        }
        match self.mode {
            VersionMode::Overwrite => Ok(WritePlan::Replace {
                trashed: existing_chain
                    .into_iter()
                    .filter(LogicalFile::is_active)
                    .collect(),
            }),
            VersionMode::Version => self.plan_append(existing_chain),
        }
    }

    /// Plan a new version on top of the chain's latest row.
    pub fn plan_append(&self, chain: Vec<LogicalFile>) -> Result<WritePlan, AppError> {
        let previous = chain
            .iter()
            .find(|f| f.is_latest)
            .cloned()
            .ok_or_else(|| AppError::Internal("Version chain has no latest row".to_string()))?;
        let evicted = self.evictions(&chain);
        Ok(WritePlan::Append {
            root_id: previous.chain_root(),
            version_number: previous.version_number + 1,
            previous,
            evicted,
        })
    }

    /// Oldest active versions to purge so that, after one more version is
    /// appended, the chain holds at most `max_versions` active rows.
    pub fn evictions(&self, chain: &[LogicalFile]) -> Vec<LogicalFile> {
        if self.max_versions == 0 {
            return Vec::new();
        }
        let mut active: Vec<&LogicalFile> = chain.iter().filter(|f| f.is_active()).collect();
        active.sort_by_key(|f| f.version_number);

        let after_append = active.len() + 1;
        let excess = after_append.saturating_sub(self.max_versions as usize);
        active.into_iter().take(excess).cloned().collect()
    }
}

fn active_bytes(rows: &[LogicalFile]) -> i64 {
    rows.iter()
        .filter(|f| f.is_active())
        .map(|f| f.size_bytes)
        .sum()
}

/// Carry out `plan` for `new_file`. Returns the inserted row.
///
/// Trashing and the latest-marker flip happen before the insert so the chain
/// never holds two latest rows, even transiently.
pub async fn apply_plan(
    uow: &mut dyn UnitOfWork,
    plan: &WritePlan,
    new_file: NewLogicalFile,
) -> Result<LogicalFile, AppError> {
    let tenant_id = uow.scope().tenant_id();
    let row = match plan {
        WritePlan::Create => new_file.into_row(tenant_id, 1, None),
        WritePlan::Replace { trashed } => {
            for old in trashed {
                uow.set_lifecycle(old.upload_id, LifecycleState::Trashed)
                    .await?;
            }
            tracing::info!(
                trashed_rows = trashed.len(),
                file_name = %new_file.file_name,
                "Overwriting existing file"
            );
            new_file.into_row(tenant_id, 1, None)
        }
        WritePlan::Append {
            previous,
            root_id,
            version_number,
            evicted,
        } => {
            uow.set_latest(previous.upload_id, false).await?;
            let row = new_file.into_row(tenant_id, *version_number, Some(*root_id));
            uow.insert(&row).await?;
            for old in evicted {
                uow.delete(old.upload_id).await?;
            }
            if !evicted.is_empty() {
                tracing::info!(
                    root_id = %root_id,
                    evicted_versions = ?evicted.iter().map(|f| f.version_number).collect::<Vec<_>>(),
                    "Retention purged old versions"
                );
            }
            return Ok(row);
        }
    };
    uow.insert(&row).await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::StorageBackend;

    fn chain_of(n: i32) -> Vec<LogicalFile> {
        let tenant = Uuid::new_v4();
        let base = NewLogicalFile {
            file_name: "report.pdf".to_string(),
            blob_locator: "blobs/t/a.pdf".to_string(),
            folder_id: None,
            extension: "pdf".to_string(),
            size_bytes: 10,
            mime_type: "application/pdf".to_string(),
            storage_backend: StorageBackend::Local,
            content_digest: "d".to_string(),
        };
        let root = base.clone().into_row(tenant, 1, None);
        let root_id = root.upload_id;
        let mut chain = vec![root];
        for v in 2..=n {
            chain.push(base.clone().into_row(tenant, v, Some(root_id)));
        }
        let last = chain.len() - 1;
        for (i, row) in chain.iter_mut().enumerate() {
            row.is_latest = i == last;
        }
        chain
    }

    #[test]
    fn test_new_name_creates_chain() {
        let plan = VersionPolicy::default().plan(Vec::new()).unwrap();
        assert_eq!(plan, WritePlan::Create);
        assert_eq!(plan.quota_delta(10), 10);
    }

    #[test]
    fn test_overwrite_releases_active_bytes() {
        let policy = VersionPolicy {
            mode: VersionMode::Overwrite,
            max_versions: 10,
        };
        let plan = policy.plan(chain_of(3)).unwrap();
        assert!(matches!(&plan, WritePlan::Replace { trashed } if trashed.len() == 3));
        assert_eq!(plan.quota_delta(7), 7 - 30);
    }

    #[test]
    fn test_append_continues_numbering_from_latest() {
        let chain = chain_of(2);
        let root = chain[0].upload_id;
        let plan = VersionPolicy::default().plan(chain).unwrap();
        match plan {
            WritePlan::Append {
                version_number,
                root_id,
                evicted,
                ..
            } => {
                assert_eq!(version_number, 3);
                assert_eq!(root_id, root);
                assert!(evicted.is_empty());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn test_retention_evicts_oldest_first() {
        let policy = VersionPolicy {
            mode: VersionMode::Version,
            max_versions: 2,
        };
        let chain = chain_of(3);
        let evicted = policy.evictions(&chain);
        let versions: Vec<i32> = evicted.iter().map(|f| f.version_number).collect();
        assert_eq!(versions, vec![1, 2]);

        let plan = policy.plan(chain).unwrap();
        assert_eq!(plan.removed_rows().len(), 2);
        assert_eq!(plan.quota_delta(10), 10 - 20);
    }

    #[test]
    fn test_zero_max_versions_keeps_everything() {
        let policy = VersionPolicy {
            mode: VersionMode::Version,
            max_versions: 0,
        };
        assert!(policy.evictions(&chain_of(50)).is_empty());
    }
}
