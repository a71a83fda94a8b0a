//! Chunk Assembler
//!
//! Staging layout, one directory per session:
//!
//! ```text
//! {staging_root}/{tenant_id}/{session_id}/manifest.json   {"totalChunks": N}
//! {staging_root}/{tenant_id}/{session_id}/chunk-{index}
//! {staging_root}/{tenant_id}/{session_id}/merge.lock      present while merging
//! ```
//!
//! Chunks may arrive in any order. A merge streams them into the Blob Store in
//! ascending index order, one file at a time, hashing on the way. The staging
//! directory is only removed by [`ChunkAssembler::finish`], so a failed merge can
//! be retried without re-uploading.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use coffer_core::{AppError, Config, StorageBackend, TenantScope};
use coffer_storage::{BlobReader, BlobStore};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::digest::ContentHasher;

const MANIFEST_FILE: &str = "manifest.json";
const MERGE_LOCK_FILE: &str = "merge.lock";
const CHUNK_PREFIX: &str = "chunk-";

#[derive(Debug, Clone)]
pub struct ChunkAssemblerConfig {
    pub staging_root: PathBuf,
    pub max_chunk_count: u32,
    pub max_file_size_bytes: u64,
}

impl Default for ChunkAssemblerConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir().join("coffer-staging"),
            max_chunk_count: 10_000,
            max_file_size_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl From<&Config> for ChunkAssemblerConfig {
    fn from(config: &Config) -> Self {
        Self {
            staging_root: config.staging_path().clone(),
            max_chunk_count: config.max_chunk_count(),
            max_file_size_bytes: config.max_file_size_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionManifest {
    total_chunks: u32,
}

/// Acknowledgement for one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkAck {
    pub session_id: Uuid,
    pub index: u32,
    pub total_chunks: u32,
    /// The index was already staged; the new bytes were ignored.
    pub already_present: bool,
}

/// Result of a successful merge. The blob is written but not yet cataloged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBlob {
    pub blob_locator: String,
    pub backend: StorageBackend,
    pub size_bytes: u64,
    pub content_digest: String,
}

pub struct ChunkAssembler {
    config: ChunkAssemblerConfig,
}

impl ChunkAssembler {
    pub async fn new(config: ChunkAssemblerConfig) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(&config.staging_root).await?;
        tracing::info!(
            staging_root = %config.staging_root.display(),
            max_chunk_count = config.max_chunk_count,
            "Chunk assembler initialized"
        );
        Ok(Self { config })
    }

    pub fn staging_root(&self) -> &Path {
        &self.config.staging_root
    }

    fn session_dir(&self, scope: TenantScope, session_id: Uuid) -> PathBuf {
        self.config
            .staging_root
            .join(scope.tenant_id().to_string())
            .join(session_id.to_string())
    }

    async fn existing_session_dir(
        &self,
        scope: TenantScope,
        session_id: Uuid,
    ) -> Result<PathBuf, AppError> {
        let dir = self.session_dir(scope, session_id);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(session_not_found(session_id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(session_not_found(session_id)),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn open_session(&self, scope: TenantScope) -> Result<Uuid, AppError> {
        let session_id = Uuid::new_v4();
        tokio::fs::create_dir_all(self.session_dir(scope, session_id)).await?;
        tracing::debug!(session_id = %session_id, "Chunk session opened");
        Ok(session_id)
    }

    /// Stage one chunk. Re-sending an index that is already staged is a no-op.
    #[tracing::instrument(skip(self, data), fields(tenant_id = %scope, chunk_bytes = data.len()))]
    pub async fn write_chunk(
        &self,
        scope: TenantScope,
        session_id: Uuid,
        index: u32,
        total_chunks: u32,
        data: Bytes,
    ) -> Result<ChunkAck, AppError> {
        if total_chunks == 0 {
            return Err(AppError::InvalidInput(
                "totalChunks must be greater than 0".to_string(),
            ));
        }
        if total_chunks > self.config.max_chunk_count {
            return Err(AppError::InvalidInput(format!(
                "totalChunks {} exceeds maximum {}",
                total_chunks, self.config.max_chunk_count
            )));
        }
        if index >= total_chunks {
            return Err(AppError::InvalidInput(format!(
                "Chunk index {} out of range for {} chunks",
                index, total_chunks
            )));
        }
        if data.len() as u64 > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Chunk of {} bytes exceeds the maximum file size",
                data.len()
            )));
        }

        let dir = self.existing_session_dir(scope, session_id).await?;
        if path_exists(&dir.join(MERGE_LOCK_FILE)).await? {
            return Err(AppError::InvalidInput(format!(
                "Upload session {} is already being merged",
                session_id
            )));
        }

        let manifest = ensure_manifest(&dir, total_chunks).await?;
        if manifest.total_chunks != total_chunks {
            return Err(AppError::InvalidInput(format!(
                "Upload session {} expects {} chunks, got totalChunks {}",
                session_id, manifest.total_chunks, total_chunks
            )));
        }

        let chunk_path = dir.join(chunk_file_name(index));
        if path_exists(&chunk_path).await? {
            tracing::debug!(session_id = %session_id, index, "Chunk already staged");
            return Ok(ChunkAck {
                session_id,
                index,
                total_chunks,
                already_present: true,
            });
        }

        let part_path = dir.join(format!("{}.{}.part", chunk_file_name(index), Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&part_path, &data).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        // First writer of an index wins; a concurrent retry sees AlreadyExists.
        let linked = tokio::fs::hard_link(&part_path, &chunk_path).await;
        let _ = tokio::fs::remove_file(&part_path).await;
        let already_present = match linked {
            Ok(()) => false,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => true,
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(session_id = %session_id, index, total_chunks, already_present, "Chunk staged");
        Ok(ChunkAck {
            session_id,
            index,
            total_chunks,
            already_present,
        })
    }

    pub async fn chunk_exists(
        &self,
        scope: TenantScope,
        session_id: Uuid,
        index: u32,
    ) -> Result<bool, AppError> {
        let dir = self.existing_session_dir(scope, session_id).await?;
        path_exists(&dir.join(chunk_file_name(index))).await
    }

    /// Total size of the chunks staged so far.
    pub async fn staged_bytes(&self, scope: TenantScope, session_id: Uuid) -> Result<u64, AppError> {
        let dir = self.existing_session_dir(scope, session_id).await?;
        let mut total = 0u64;
        for (_, path) in list_chunks(&dir).await? {
            total += tokio::fs::metadata(path).await?.len();
        }
        Ok(total)
    }

    /// Stream every staged chunk, in index order, into a new blob on `store`.
    ///
    /// On success the session stays locked until [`finish`](Self::finish) or
    /// [`release`](Self::release); a second merge of the same session is rejected.
    #[tracing::instrument(skip(self, store, content_type), fields(tenant_id = %scope))]
    pub async fn merge(
        &self,
        scope: TenantScope,
        session_id: Uuid,
        store: &dyn BlobStore,
        extension: &str,
        content_type: &str,
    ) -> Result<MergedBlob, AppError> {
        let start = Instant::now();
        let dir = self.existing_session_dir(scope, session_id).await?;
        let manifest = read_manifest(&dir).await?.ok_or_else(|| {
            AppError::NotFound(format!("Upload session {} has no chunks", session_id))
        })?;

        acquire_merge_lock(&dir, session_id).await?;

        let result = self
            .merge_locked(scope, &dir, &manifest, store, extension, content_type)
            .await;
        match result {
            Ok(merged) => {
                tracing::info!(
                    session_id = %session_id,
                    chunks = manifest.total_chunks,
                    size_bytes = merged.size_bytes,
                    blob_locator = %merged.blob_locator,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Chunks merged"
                );
                Ok(merged)
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Chunk merge failed; staging kept for retry");
                remove_merge_lock(&dir).await;
                Err(e)
            }
        }
    }

    async fn merge_locked(
        &self,
        scope: TenantScope,
        dir: &Path,
        manifest: &SessionManifest,
        store: &dyn BlobStore,
        extension: &str,
        content_type: &str,
    ) -> Result<MergedBlob, AppError> {
        let chunks = list_chunks(dir).await?;
        if chunks.is_empty() {
            return Err(AppError::NotFound(format!(
                "Upload session {} has no chunks",
                file_name_lossy(dir)
            )));
        }

        let missing: Vec<u32> = (0..manifest.total_chunks)
            .filter(|i| chunks.binary_search_by_key(i, |(index, _)| *index).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Missing chunks {:?} of {}",
                missing, manifest.total_chunks
            )));
        }

        let mut content_length = 0u64;
        for (_, path) in &chunks {
            content_length += tokio::fs::metadata(path).await?.len();
        }
        if content_length > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Assembled file of {} bytes exceeds maximum of {} bytes",
                content_length, self.config.max_file_size_bytes
            )));
        }

        let hasher = Arc::new(Mutex::new(ContentHasher::new()));
        let stream_hasher = Arc::clone(&hasher);
        let paths: Vec<PathBuf> = chunks.into_iter().map(|(_, path)| path).collect();

        // `then` opens the next chunk only after the previous one is drained.
        let stream = futures::stream::iter(paths)
            .then(|path| async move { tokio::fs::File::open(path).await.map(ReaderStream::new) })
            .try_flatten()
            .inspect_ok(move |bytes: &Bytes| {
                stream_hasher
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .update(bytes);
            })
            .boxed();
        let reader: BlobReader = Box::pin(StreamReader::new(stream));

        let blob_locator = store
            .upload_stream(
                scope.tenant_id(),
                extension,
                content_type,
                Some(content_length),
                reader,
            )
            .await?;

        let hasher = hasher.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if hasher.bytes_hashed() != content_length {
            if let Err(e) = store.delete(&blob_locator).await {
                tracing::warn!(error = %e, blob_locator = %blob_locator, "Failed to delete short merge output");
            }
            return Err(AppError::Internal(format!(
                "Merged {} bytes but staged chunks total {} bytes",
                hasher.bytes_hashed(),
                content_length
            )));
        }

        Ok(MergedBlob {
            blob_locator,
            backend: store.backend_type(),
            size_bytes: content_length,
            content_digest: hasher.finalize(),
        })
    }

    /// Delete the session's staging area after its merge has been cataloged.
    pub async fn finish(&self, scope: TenantScope, session_id: Uuid) -> Result<(), AppError> {
        let dir = self.session_dir(scope, session_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Unlock a merged session whose result was not cataloged, so it can be merged again.
    pub async fn release(&self, scope: TenantScope, session_id: Uuid) {
        remove_merge_lock(&self.session_dir(scope, session_id)).await;
    }

    /// Remove session directories untouched for at least `ttl`. Returns how many were removed.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "staging_sweep"))]
    pub async fn sweep_stale(&self, ttl: Duration) -> Result<usize, AppError> {
        let now = SystemTime::now();
        let mut removed = 0usize;

        let mut tenants = tokio::fs::read_dir(&self.config.staging_root).await?;
        while let Some(tenant) = tenants.next_entry().await? {
            if !tenant.file_type().await?.is_dir() {
                continue;
            }
            let mut sessions = tokio::fs::read_dir(tenant.path()).await?;
            while let Some(session) = sessions.next_entry().await? {
                let meta = match session.metadata().await {
                    Ok(meta) if meta.is_dir() => meta,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, path = %session.path().display(), "Failed to stat staging session");
                        continue;
                    }
                };
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age < ttl {
                    continue;
                }
                match tokio::fs::remove_dir_all(session.path()).await {
                    Ok(()) => {
                        removed += 1;
                        tracing::debug!(path = %session.path().display(), age_secs = age.as_secs(), "Removed stale staging session");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, path = %session.path().display(), "Failed to remove stale staging session");
                    }
                }
            }
        }

        tracing::info!(removed, ttl_secs = ttl.as_secs(), "Staging sweep finished");
        Ok(removed)
    }
}

fn session_not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("Upload session {} not found", session_id))
}

fn chunk_file_name(index: u32) -> String {
    format!("{}{}", CHUNK_PREFIX, index)
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn path_exists(path: &Path) -> Result<bool, AppError> {
    Ok(tokio::fs::try_exists(path).await?)
}

/// Staged chunks sorted by index. Temporary `.part` files are ignored.
async fn list_chunks(dir: &Path) -> Result<Vec<(u32, PathBuf)>, AppError> {
    let mut chunks = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix(CHUNK_PREFIX))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        chunks.push((index, entry.path()));
    }
    chunks.sort_by_key(|(index, _)| *index);
    Ok(chunks)
}

async fn read_manifest(dir: &Path) -> Result<Option<SessionManifest>, AppError> {
    match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Record `total_chunks` for the session unless a manifest already exists, and
/// return the manifest in effect.
async fn ensure_manifest(dir: &Path, total_chunks: u32) -> Result<SessionManifest, AppError> {
    if let Some(existing) = read_manifest(dir).await? {
        return Ok(existing);
    }

    let manifest = SessionManifest { total_chunks };
    let part_path = dir.join(format!("{}.{}.part", MANIFEST_FILE, Uuid::new_v4()));
    tokio::fs::write(&part_path, serde_json::to_vec(&manifest)?).await?;

    // hard_link fails if another chunk published a manifest first.
    let linked = tokio::fs::hard_link(&part_path, dir.join(MANIFEST_FILE)).await;
    let _ = tokio::fs::remove_file(&part_path).await;
    match linked {
        Ok(()) => Ok(manifest),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => read_manifest(dir)
            .await?
            .ok_or_else(|| AppError::Internal("Chunk manifest disappeared".to_string())),
        Err(e) => Err(e.into()),
    }
}

async fn acquire_merge_lock(dir: &Path, session_id: Uuid) -> Result<(), AppError> {
    let created = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dir.join(MERGE_LOCK_FILE))
        .await;
    match created {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(AppError::InvalidInput(format!(
            "Upload session {} is already merged or being merged",
            session_id
        ))),
        Err(e) => Err(e.into()),
    }
}

async fn remove_merge_lock(dir: &Path) {
    if let Err(e) = tokio::fs::remove_file(dir.join(MERGE_LOCK_FILE)).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(error = %e, "Failed to remove merge lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_storage::LocalStorage;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        assembler: ChunkAssembler,
        store: LocalStorage,
        scope: TenantScope,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ChunkAssembler::new(ChunkAssemblerConfig {
            staging_root: dir.path().join("staging"),
            max_chunk_count: 16,
            max_file_size_bytes: 1024,
        })
        .await
        .unwrap();
        let store = LocalStorage::new(dir.path().join("blobs")).await.unwrap();
        Fixture {
            _dir: dir,
            assembler,
            store,
            scope: TenantScope::new(Uuid::new_v4()),
        }
    }

    const PARTS: [&[u8]; 3] = [b"alpha-", b"beta-", b"gamma"];

    async fn upload_in_order(f: &Fixture, order: &[u32]) -> MergedBlob {
        let session = f.assembler.open_session(f.scope).await.unwrap();
        for &i in order {
            f.assembler
                .write_chunk(f.scope, session, i, 3, Bytes::from_static(PARTS[i as usize]))
                .await
                .unwrap();
        }
        let merged = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap();
        f.assembler.finish(f.scope, session).await.unwrap();
        merged
    }

    #[tokio::test]
    async fn test_out_of_order_chunks_merge_in_index_order() {
        let f = fixture().await;
        let forward = upload_in_order(&f, &[0, 1, 2]).await;
        let shuffled = upload_in_order(&f, &[2, 0, 1]).await;
        let reversed = upload_in_order(&f, &[2, 1, 0]).await;

        let expected = b"alpha-beta-gamma";
        for merged in [&forward, &shuffled, &reversed] {
            let bytes = f.store.download(&merged.blob_locator).await.unwrap();
            assert_eq!(&bytes[..], expected);
            assert_eq!(merged.size_bytes, expected.len() as u64);
            assert_eq!(merged.content_digest, crate::digest::digest(expected));
        }
    }

    #[tokio::test]
    async fn test_rewriting_a_chunk_is_a_no_op() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();
        for (i, part) in PARTS.iter().enumerate() {
            f.assembler
                .write_chunk(f.scope, session, i as u32, 3, Bytes::from_static(part))
                .await
                .unwrap();
        }
        let ack = f
            .assembler
            .write_chunk(f.scope, session, 1, 3, Bytes::from_static(b"beta-"))
            .await
            .unwrap();
        assert!(ack.already_present);

        let merged = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap();
        let bytes = f.store.download(&merged.blob_locator).await.unwrap();
        assert_eq!(&bytes[..], b"alpha-beta-gamma");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_of_one_index_stage_it_once() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();

        let writes = (0..8).map(|_| {
            f.assembler
                .write_chunk(f.scope, session, 0, 1, Bytes::from_static(b"same-bytes"))
        });
        let acks = futures::future::try_join_all(writes).await.unwrap();

        let fresh = acks.iter().filter(|ack| !ack.already_present).count();
        assert_eq!(fresh, 1);
        assert_eq!(f.assembler.staged_bytes(f.scope, session).await.unwrap(), 10);

        let merged = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap();
        let bytes = f.store.download(&merged.blob_locator).await.unwrap();
        assert_eq!(&bytes[..], b"same-bytes");
    }

    #[tokio::test]
    async fn test_merge_with_missing_chunk_keeps_staging_for_retry() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();
        f.assembler
            .write_chunk(f.scope, session, 0, 3, Bytes::from_static(PARTS[0]))
            .await
            .unwrap();
        f.assembler
            .write_chunk(f.scope, session, 2, 3, Bytes::from_static(PARTS[2]))
            .await
            .unwrap();

        let err = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(f.assembler.chunk_exists(f.scope, session, 0).await.unwrap());

        f.assembler
            .write_chunk(f.scope, session, 1, 3, Bytes::from_static(PARTS[1]))
            .await
            .unwrap();
        let merged = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(merged.size_bytes, 16);
    }

    #[tokio::test]
    async fn test_second_merge_is_rejected() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();
        f.assembler
            .write_chunk(f.scope, session, 0, 1, Bytes::from_static(b"only"))
            .await
            .unwrap();
        f.assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await
            .unwrap();

        let again = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await;
        assert!(matches!(again, Err(AppError::InvalidInput(_))));

        f.assembler.finish(f.scope, session).await.unwrap();
        let after_finish = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await;
        assert!(matches!(after_finish, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_merge_of_empty_or_unknown_session_is_not_found() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();
        let empty = f
            .assembler
            .merge(f.scope, session, &f.store, "txt", "text/plain")
            .await;
        assert!(matches!(empty, Err(AppError::NotFound(_))));

        let unknown = f
            .assembler
            .merge(f.scope, Uuid::new_v4(), &f.store, "txt", "text/plain")
            .await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sessions_are_tenant_scoped() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();
        let other = TenantScope::new(Uuid::new_v4());
        let result = f
            .assembler
            .write_chunk(other, session, 0, 1, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chunk_validation() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();

        let out_of_range = f
            .assembler
            .write_chunk(f.scope, session, 3, 3, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(out_of_range, Err(AppError::InvalidInput(_))));

        let too_many = f
            .assembler
            .write_chunk(f.scope, session, 0, 17, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(too_many, Err(AppError::InvalidInput(_))));

        f.assembler
            .write_chunk(f.scope, session, 0, 3, Bytes::from_static(b"x"))
            .await
            .unwrap();
        let mismatch = f
            .assembler
            .write_chunk(f.scope, session, 1, 4, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(mismatch, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_sessions() {
        let f = fixture().await;
        let session = f.assembler.open_session(f.scope).await.unwrap();

        let kept = f
            .assembler
            .sweep_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(kept, 0);
        assert!(f.assembler.chunk_exists(f.scope, session, 0).await.is_ok());

        let removed = f.assembler.sweep_stale(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(
            f.assembler.chunk_exists(f.scope, session, 0).await,
            Err(AppError::NotFound(_))
        ));
    }
}
