use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ShopId, UserId};
use crate::storage::StorageError;

/// Path to a stored verification photo, relative to the evidence root.
/// Attached to the order header so operators can audit on-site proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef(pub String);

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Durably stores a verified photo. Write-once: the generated name is
    /// collision-resistant, existing files are never overwritten.
    async fn store(
        &self,
        bytes: &[u8],
        shop_id: ShopId,
        user_id: UserId,
    ) -> Result<EvidenceRef, StorageError>;
}

/// Filesystem-backed evidence storage under a single root directory.
pub struct FsEvidenceStore {
    root: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn store(
        &self,
        bytes: &[u8],
        shop_id: ShopId,
        user_id: UserId,
    ) -> Result<EvidenceRef, StorageError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let name = format!("shop_{}_user_{}_{stamp}_{suffix}.jpg", shop_id.0, user_id.0);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;
        tokio::fs::write(self.root.join(&name), bytes)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;

        Ok(EvidenceRef(name))
    }
}

#[cfg(test)]
mod tests {
    use super::{EvidenceStore, FsEvidenceStore};
    use crate::domain::{ShopId, UserId};

    #[tokio::test]
    async fn stores_bytes_under_a_collision_resistant_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsEvidenceStore::new(dir.path());

        let first =
            store.store(b"jpeg-bytes", ShopId(4), UserId(7)).await.expect("first write");
        let second =
            store.store(b"jpeg-bytes", ShopId(4), UserId(7)).await.expect("second write");

        assert_ne!(first, second, "same shop/user must still get distinct names");
        assert!(first.0.starts_with("shop_4_user_7_"));

        let stored = std::fs::read(dir.path().join(&first.0)).expect("read back");
        assert_eq!(stored, b"jpeg-bytes");
    }
}
