use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use coffer_core::models::{LifecycleState, LogicalFile};
use coffer_core::{AppError, ErrorMetadata, StorageBackend, TenantScope, VersionMode};
use coffer_db::{Catalog, MemoryCatalog};
use coffer_engine::{
    ChunkAssembler, ChunkAssemblerConfig, EngineConfig, FileService, VersionPolicy,
};
use coffer_storage::{
    BlobReader, BlobStore, BlobStream, LocalStorage, StorageError, StorageResult, StorageRouter,
};
use futures::TryStreamExt;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

const KB: i64 = 1024;

struct Harness {
    _dir: TempDir,
    service: Arc<FileService>,
    catalog: Arc<MemoryCatalog>,
    store: Arc<dyn BlobStore>,
    scope: TenantScope,
}

impl Harness {
    async fn new() -> Self {
        Self::with(EngineConfig::default(), None).await
    }

    async fn with(config: EngineConfig, quota_bytes: Option<i64>) -> Self {
        Self::with_store(config, quota_bytes, |local| Arc::new(local)).await
    }

    /// `wrap` decides which store the service writes through.
    async fn with_store(
        config: EngineConfig,
        quota_bytes: Option<i64>,
        wrap: impl FnOnce(LocalStorage) -> Arc<dyn BlobStore>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = wrap(LocalStorage::new(dir.path().join("blobs")).await.unwrap());
        let catalog = Arc::new(MemoryCatalog::new(quota_bytes));
        let assembler = Arc::new(
            ChunkAssembler::new(ChunkAssemblerConfig {
                staging_root: dir.path().join("staging"),
                ..ChunkAssemblerConfig::default()
            })
            .await
            .unwrap(),
        );
        let service = FileService::new(
            catalog.clone(),
            StorageRouter::new(store.clone()),
            assembler,
            None,
            config,
        );
        Self {
            _dir: dir,
            service: Arc::new(service),
            catalog,
            store,
            scope: TenantScope::new(Uuid::new_v4()),
        }
    }

    async fn upload(&self, name: &str, content: &[u8]) -> LogicalFile {
        self.service
            .upload_whole(self.scope, Bytes::copy_from_slice(content), name, None)
            .await
            .unwrap()
    }

    async fn used_bytes(&self) -> i64 {
        self.catalog
            .storage_account(self.scope)
            .await
            .unwrap()
            .used_bytes
    }

    /// Sum of active row sizes over the chains of `ids`.
    async fn active_bytes(&self, ids: &[Uuid]) -> i64 {
        let mut roots = std::collections::HashSet::new();
        let mut total = 0;
        for id in ids {
            let Some(row) = self.catalog.find_file(self.scope, *id).await.unwrap() else {
                continue;
            };
            if !roots.insert(row.chain_root()) {
                continue;
            }
            total += self
                .catalog
                .list_chain(self.scope, row.chain_root())
                .await
                .unwrap()
                .iter()
                .filter(|f| f.is_active())
                .map(|f| f.size_bytes)
                .sum::<i64>();
        }
        total
    }

    async fn read(&self, upload_id: Uuid) -> Vec<u8> {
        let (_, stream) = self.service.download(self.scope, upload_id).await.unwrap();
        let parts: Vec<Bytes> = stream.try_collect().await.unwrap();
        parts.concat()
    }
}

fn versioned(max_versions: u32) -> EngineConfig {
    EngineConfig {
        versioning: VersionPolicy {
            mode: VersionMode::Version,
            max_versions,
        },
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_usage_tracks_active_rows_through_lifecycle() {
    let h = Harness::new().await;
    let a = h.upload("a.txt", b"aaaa").await;
    let b = h.upload("b.txt", b"bbbbbbbb").await;
    let b2 = h.upload("b.txt", b"bbbbbbbbbbbb").await;
    let ids = [a.upload_id, b.upload_id, b2.upload_id];
    assert_eq!(h.used_bytes().await, 24);
    assert_eq!(h.used_bytes().await, h.active_bytes(&ids).await);

    assert_eq!(h.service.soft_delete(h.scope, &[b2.upload_id]).await.unwrap(), 2);
    assert_eq!(h.used_bytes().await, 4);
    assert_eq!(h.used_bytes().await, h.active_bytes(&ids).await);

    assert_eq!(
        h.service.restore_from_trash(h.scope, &[b.upload_id]).await.unwrap(),
        2
    );
    assert_eq!(h.used_bytes().await, 24);

    assert_eq!(h.service.purge(h.scope, &[a.upload_id, b.upload_id]).await.unwrap(), 3);
    assert_eq!(h.used_bytes().await, 0);
    assert!(!h.store.exists(&a.blob_locator).await.unwrap());
    assert!(!h.store.exists(&b2.blob_locator).await.unwrap());
}

#[tokio::test]
async fn test_versions_are_gap_free_with_one_latest() {
    let h = Harness::new().await;
    let mut last = None;
    for i in 0..4 {
        last = Some(h.upload("report.pdf", format!("draft {i}").as_bytes()).await);
    }
    let last = last.unwrap();
    assert_eq!(last.version_number, 4);

    let versions = h.service.list_versions(h.scope, last.upload_id).await.unwrap();
    let numbers: Vec<i32> = versions.iter().map(|f| f.version_number).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
    assert_eq!(versions.iter().filter(|f| f.is_latest).count(), 1);
    assert!(versions[0].is_latest);

    let root = versions[3].upload_id;
    assert!(versions[..3]
        .iter()
        .all(|f| f.parent_file_id == Some(root)));
}

#[tokio::test]
async fn test_identical_bytes_share_one_blob_and_are_billed_twice() {
    let h = Harness::new().await;
    let first = h.upload("one.bin", b"same-content").await;
    let second = h.upload("two.bin", b"same-content").await;

    assert_ne!(first.upload_id, second.upload_id);
    assert_eq!(first.blob_locator, second.blob_locator);
    assert_eq!(second.version_number, 1);
    assert_eq!(second.parent_file_id, None);
    assert_eq!(h.used_bytes().await, 24);

    // The shared blob survives until its last row is purged.
    h.service.purge(h.scope, &[first.upload_id]).await.unwrap();
    assert!(h.store.exists(&second.blob_locator).await.unwrap());
    h.service.purge(h.scope, &[second.upload_id]).await.unwrap();
    assert!(!h.store.exists(&second.blob_locator).await.unwrap());
}

#[tokio::test]
async fn test_dedup_is_tenant_scoped() {
    let h = Harness::new().await;
    let first = h.upload("one.bin", b"same-content").await;
    let other = TenantScope::new(Uuid::new_v4());
    let foreign = h
        .service
        .upload_whole(other, Bytes::from_static(b"same-content"), "one.bin", None)
        .await
        .unwrap();
    assert_ne!(first.blob_locator, foreign.blob_locator);
}

#[tokio::test]
async fn test_upload_over_quota_is_rejected_without_side_effects() {
    let h = Harness::with(EngineConfig::default(), Some(100 * KB)).await;
    h.upload("big.bin", &vec![1u8; (95 * KB) as usize]).await;
    assert_eq!(h.used_bytes().await, 95 * KB);

    let err = h
        .service
        .upload_whole(
            h.scope,
            Bytes::from(vec![2u8; (10 * KB) as usize]),
            "more.bin",
            None,
        )
        .await
        .unwrap_err();
    match err {
        AppError::CapacityExceeded {
            required,
            available,
        } => {
            assert_eq!(required, (10 * KB) as u64);
            assert_eq!(available, (5 * KB) as u64);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.used_bytes().await, 95 * KB);
}

#[tokio::test]
async fn test_retention_keeps_newest_versions() {
    let h = Harness::with(versioned(2), None).await;
    let v1 = h.upload("report.pdf", b"one").await;
    let v2 = h.upload("report.pdf", b"two!").await;
    let v3 = h.upload("report.pdf", b"three").await;

    let versions = h.service.list_versions(h.scope, v3.upload_id).await.unwrap();
    let numbers: Vec<i32> = versions.iter().map(|f| f.version_number).collect();
    assert_eq!(numbers, vec![3, 2]);
    assert!(!h.store.exists(&v1.blob_locator).await.unwrap());
    assert!(h.store.exists(&v2.blob_locator).await.unwrap());
    assert_eq!(h.used_bytes().await, 9);
}

#[tokio::test]
async fn test_overwrite_mode_trashes_previous_chain() {
    let config = EngineConfig {
        versioning: VersionPolicy {
            mode: VersionMode::Overwrite,
            max_versions: 10,
        },
        ..EngineConfig::default()
    };
    let h = Harness::with(config, None).await;
    let old = h.upload("notes.txt", b"old notes").await;
    let new = h.upload("notes.txt", b"new").await;

    assert_eq!(new.version_number, 1);
    assert_ne!(new.chain_root(), old.chain_root());
    let old_row = h.service.get_file(h.scope, old.upload_id).await.unwrap();
    assert_eq!(old_row.lifecycle_state, LifecycleState::Trashed);
    assert_eq!(h.used_bytes().await, 3);
}

#[tokio::test]
async fn test_restore_version_appends_copy_of_target() {
    let h = Harness::new().await;
    let v1 = h.upload("plan.txt", b"first plan").await;
    let v2 = h.upload("plan.txt", b"second").await;

    let v3 = h
        .service
        .restore_version(h.scope, v2.upload_id, v1.upload_id)
        .await
        .unwrap();
    assert_eq!(v3.version_number, 3);
    assert_eq!(v3.blob_locator, v1.blob_locator);
    assert_eq!(h.read(v3.upload_id).await, b"first plan");
    assert_eq!(h.used_bytes().await, 10 + 6 + 10);

    // v2 is no longer the head.
    let err = h
        .service
        .restore_version(h.scope, v2.upload_id, v1.upload_id)
        .await
        .unwrap_err();
    match err {
        AppError::Conflict {
            latest_id,
            latest_version,
            ..
        } => {
            assert_eq!(latest_id, v3.upload_id);
            assert_eq!(latest_version, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_restores_exactly_one_wins() {
    let h = Harness::new().await;
    let v1 = h.upload("race.txt", b"base").await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&h.service);
        let scope = h.scope;
        let id = v1.upload_id;
        handles.push(tokio::spawn(async move {
            service.restore_version(scope, id, id).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((successes, conflicts), (1, 1));

    let versions = h.service.list_versions(h.scope, v1.upload_id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions.iter().filter(|f| f.is_latest).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_name_uploads_stay_linear() {
    let h = Harness::new().await;
    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&h.service);
        let scope = h.scope;
        handles.push(tokio::spawn(async move {
            service
                .upload_whole(scope, Bytes::from(format!("body {i}")), "shared.txt", None)
                .await
        }));
    }
    let mut last = None;
    for handle in handles {
        last = Some(handle.await.unwrap().unwrap());
    }

    let versions = h
        .service
        .list_versions(h.scope, last.unwrap().upload_id)
        .await
        .unwrap();
    let numbers: Vec<i32> = versions.iter().map(|f| f.version_number).collect();
    assert_eq!(numbers, (1..=8).rev().collect::<Vec<i32>>());
    assert_eq!(versions.iter().filter(|f| f.is_latest).count(), 1);
}

async fn chunked_upload(h: &Harness, name: &str, order: &[u32]) -> LogicalFile {
    const PARTS: [&[u8]; 3] = [b"first-", b"second-", b"third"];
    let session = h.service.initiate_chunked_upload(h.scope).await.unwrap();
    for &i in order {
        h.service
            .upload_chunk(
                h.scope,
                session,
                i,
                3,
                name,
                None,
                Bytes::from_static(PARTS[i as usize]),
            )
            .await
            .unwrap();
    }
    h.service
        .merge_chunks(h.scope, session, name, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_chunk_order_does_not_change_merged_bytes() {
    let h = Harness::new().await;
    let forward = chunked_upload(&h, "forward.txt", &[0, 1, 2]).await;
    let shuffled = chunked_upload(&h, "shuffled.txt", &[2, 0, 1]).await;

    assert_eq!(h.read(forward.upload_id).await, b"first-second-third");
    assert_eq!(h.read(shuffled.upload_id).await, b"first-second-third");
    assert_eq!(forward.content_digest, shuffled.content_digest);
    // Same digest, so the second merge shares the first blob.
    assert_eq!(forward.blob_locator, shuffled.blob_locator);
    assert_eq!(h.used_bytes().await, 2 * 18);
}

#[tokio::test]
async fn test_merge_twice_is_rejected() {
    let h = Harness::new().await;
    let session = h.service.initiate_chunked_upload(h.scope).await.unwrap();
    for _ in 0..2 {
        let ack = h
            .service
            .upload_chunk(h.scope, session, 0, 1, "once.txt", None, Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(ack.index, 0);
    }
    h.service
        .merge_chunks(h.scope, session, "once.txt", None)
        .await
        .unwrap();

    let again = h.service.merge_chunks(h.scope, session, "once.txt", None).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
    assert_eq!(h.used_bytes().await, 1);
}

#[tokio::test]
async fn test_rejected_merge_keeps_chunks() {
    let h = Harness::with(EngineConfig::default(), Some(10)).await;
    let session = h.service.initiate_chunked_upload(h.scope).await.unwrap();
    h.service
        .upload_chunk(
            h.scope,
            session,
            0,
            1,
            "big.txt",
            None,
            Bytes::from_static(b"more than ten bytes"),
        )
        .await
        .unwrap();

    let err = h
        .service
        .merge_chunks(h.scope, session, "big.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded { .. }));
    assert!(h
        .service
        .assembler()
        .chunk_exists(h.scope, session, 0)
        .await
        .unwrap());

    h.service.set_quota(h.scope, None).await.unwrap();
    let file = h
        .service
        .merge_chunks(h.scope, session, "big.txt", None)
        .await
        .unwrap();
    assert_eq!(file.size_bytes, 19);
}

#[tokio::test]
async fn test_restore_from_trash_detects_name_conflict() {
    let h = Harness::new().await;
    let old = h.upload("doc.txt", b"old").await;
    h.service.soft_delete(h.scope, &[old.upload_id]).await.unwrap();
    h.upload("doc.txt", b"replacement").await;

    let err = h
        .service
        .restore_from_trash(h.scope, &[old.upload_id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NameConflict(_)));
    assert_eq!(h.used_bytes().await, 11);
}

#[tokio::test]
async fn test_restore_from_trash_rechecks_capacity() {
    let h = Harness::with(EngineConfig::default(), Some(10)).await;
    let first = h.upload("a.txt", b"123456").await;
    h.service.soft_delete(h.scope, &[first.upload_id]).await.unwrap();
    h.upload("b.txt", b"123456").await;

    let err = h
        .service
        .restore_from_trash(h.scope, &[first.upload_id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded { .. }));
    assert_eq!(h.used_bytes().await, 6);
}

#[tokio::test]
async fn test_rename_applies_to_whole_chain() {
    let h = Harness::new().await;
    h.upload("a.txt", b"1").await;
    let v2 = h.upload("a.txt", b"22").await;
    h.upload("b.txt", b"3").await;

    let clash = h.service.rename(h.scope, v2.upload_id, "b.txt").await;
    assert!(matches!(clash, Err(AppError::NameConflict(_))));

    let renamed = h.service.rename(h.scope, v2.upload_id, "c.txt").await.unwrap();
    assert_eq!(renamed.file_name, "c.txt");
    let versions = h.service.list_versions(h.scope, v2.upload_id).await.unwrap();
    assert!(versions.iter().all(|f| f.file_name == "c.txt"));

    // New uploads named c.txt now extend the renamed chain.
    let v3 = h.upload("c.txt", b"333").await;
    assert_eq!(v3.version_number, 3);
}

#[tokio::test]
async fn test_move_file_changes_folder_of_chain() {
    let h = Harness::new().await;
    let file = h.upload("a.txt", b"1").await;
    let folder = Uuid::new_v4();

    let moved = h
        .service
        .move_file(h.scope, file.upload_id, Some(folder))
        .await
        .unwrap();
    assert_eq!(moved.folder_id, Some(folder));

    // Same name at the root is a new chain now.
    let fresh = h.upload("a.txt", b"2").await;
    assert_eq!(fresh.version_number, 1);
}

#[tokio::test]
async fn test_download_counts_and_hides_trashed_files() {
    let h = Harness::new().await;
    let file = h.upload("hello.txt", b"hello").await;

    assert_eq!(h.read(file.upload_id).await, b"hello");
    let row = h.service.get_file(h.scope, file.upload_id).await.unwrap();
    assert_eq!(row.download_count, 1);

    h.service.soft_delete(h.scope, &[file.upload_id]).await.unwrap();
    let hidden = h.service.download(h.scope, file.upload_id).await;
    assert!(matches!(hidden, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_storage_stats_reflect_writes() {
    let h = Harness::with(EngineConfig::default(), Some(200)).await;
    let empty = h.service.get_storage_stats(h.scope).await.unwrap();
    assert_eq!(empty.used_bytes, 0);

    h.upload("half.bin", &[0u8; 100]).await;
    let stats = h.service.get_storage_stats(h.scope).await.unwrap();
    assert_eq!(stats.used_bytes, 100);
    assert_eq!(stats.quota_bytes, Some(200));
    assert_eq!(stats.percentage, 50.0);
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let h = Harness::new().await;
    let err = h
        .service
        .upload_whole(h.scope, Bytes::from_static(b"x"), "../etc/passwd", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let config = EngineConfig {
        max_file_size_bytes: 4,
        ..EngineConfig::default()
    };
    let h = Harness::with(config, None).await;
    let err = h
        .service
        .upload_whole(h.scope, Bytes::from_static(b"12345"), "a.bin", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PayloadTooLarge(_)));
    assert_eq!(h.used_bytes().await, 0);
}

/// Local store whose writes fail while `failing` is set. Streamed writes consume
/// part of the input before failing.
struct FlakyStore {
    inner: LocalStorage,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn upload(
        &self,
        tenant_id: Uuid,
        extension: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<String> {
        self.check()?;
        self.inner.upload(tenant_id, extension, content_type, data).await
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.check()?;
        self.inner.upload_with_key(storage_key, data, content_type).await
    }

    async fn upload_stream(
        &self,
        tenant_id: Uuid,
        extension: &str,
        content_type: &str,
        content_length: Option<u64>,
        mut reader: BlobReader,
    ) -> StorageResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            let mut head = [0u8; 4];
            reader.read_exact(&mut head).await?;
            return Err(StorageError::UploadFailed("connection reset by peer".to_string()));
        }
        self.inner
            .upload_stream(tenant_id, extension, content_type, content_length, reader)
            .await
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Bytes> {
        self.inner.download(storage_key).await
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<BlobStream> {
        self.inner.download_stream(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        self.inner.content_length(storage_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

async fn flaky_harness() -> (Harness, Arc<AtomicBool>) {
    let failing = Arc::new(AtomicBool::new(false));
    let flag = failing.clone();
    let h = Harness::with_store(EngineConfig::default(), None, move |inner| {
        Arc::new(FlakyStore {
            inner,
            failing: flag,
        })
    })
    .await;
    (h, failing)
}

#[tokio::test]
async fn test_missing_blob_is_reported_without_its_locator() {
    let h = Harness::new().await;
    let file = h.upload("a.txt", b"hello").await;
    h.store.delete(&file.blob_locator).await.unwrap();

    let err = match h.service.download(h.scope, file.upload_id).await {
        Ok(_) => panic!("download of a missing blob succeeded"),
        Err(e) => e,
    };
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!err.client_message().contains(&file.blob_locator));
    assert!(!err.to_string().contains(&file.blob_locator));
}

#[tokio::test]
async fn test_store_failure_on_upload_commits_nothing() {
    let (h, failing) = flaky_harness().await;
    h.upload("keep.txt", b"1234").await;

    failing.store(true, Ordering::SeqCst);
    let err = h
        .service
        .upload_whole(h.scope, Bytes::from_static(b"payload"), "a.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BackendUnavailable(_)));
    assert_eq!(err.client_message(), "Failed to access storage");
    assert_eq!(h.used_bytes().await, 4);

    // No row was written: the next upload of the name starts a new chain.
    failing.store(false, Ordering::SeqCst);
    let file = h.upload("a.txt", b"payload").await;
    assert_eq!(file.version_number, 1);
    assert_eq!(h.used_bytes().await, 11);
}

#[tokio::test]
async fn test_store_failure_during_merge_keeps_chunks_and_unlocks() {
    let (h, failing) = flaky_harness().await;
    let session = h.service.initiate_chunked_upload(h.scope).await.unwrap();
    let parts: [&'static [u8]; 3] = [b"first-", b"second-", b"third"];
    for (i, part) in parts.iter().enumerate() {
        h.service
            .upload_chunk(h.scope, session, i as u32, 3, "big.txt", None, Bytes::from_static(*part))
            .await
            .unwrap();
    }

    failing.store(true, Ordering::SeqCst);
    let err = h
        .service
        .merge_chunks(h.scope, session, "big.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BackendUnavailable(_)));
    assert_eq!(h.used_bytes().await, 0);
    for i in 0..3 {
        assert!(h
            .service
            .assembler()
            .chunk_exists(h.scope, session, i)
            .await
            .unwrap());
    }

    failing.store(false, Ordering::SeqCst);
    let file = h
        .service
        .merge_chunks(h.scope, session, "big.txt", None)
        .await
        .unwrap();
    assert_eq!(file.size_bytes, 18);
    assert_eq!(h.read(file.upload_id).await, b"first-second-third");
    assert_eq!(h.used_bytes().await, 18);
}
