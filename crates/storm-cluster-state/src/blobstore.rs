//! Blobstore coordination index.
//!
//! Records which nimbus hosts hold which version of each blob key. Blob
//! contents never pass through here; nimbuses compare the advertised
//! versions to decide what to replicate.

use storm_coord::Watch;
use tracing::{debug, info};

use crate::error::ClusterStateResult;
use crate::paths::decode_segment;
use crate::state::StormClusterState;
use crate::types::{BlobReplica, NimbusInfo};

impl StormClusterState {
    /// Advertise that `nimbus` holds `version` of blob `key`.
    pub fn setup_blobstore(
        &self,
        key: &str,
        nimbus: &NimbusInfo,
        version: u64,
    ) -> ClusterStateResult<()> {
        let path = self.paths().blobstore_replica(key, &nimbus.host_port());
        self.write_record(&path, &version)?;
        debug!(%key, nimbus = %nimbus.host_port(), version, "blob replica advertised");
        Ok(())
    }

    /// All blob keys with at least a registration.
    pub fn active_keys(&self) -> ClusterStateResult<Vec<String>> {
        self.blobstore(None)
    }

    /// All blob keys, optionally arming `watch` for keys added or removed.
    pub fn blobstore(&self, watch: Option<&Watch>) -> ClusterStateResult<Vec<String>> {
        self.list_ids(&self.paths().blobstore(), watch)
    }

    /// Nimbus hosts holding `key` and the version each holds.
    pub fn blobstore_info(&self, key: &str) -> ClusterStateResult<Vec<BlobReplica>> {
        Ok(self
            .read_children::<u64>(&self.paths().blobstore_key(key))?
            .into_iter()
            .map(|(nimbus, version)| BlobReplica {
                nimbus: decode_segment(&nimbus),
                version,
            })
            .collect())
    }

    /// Highest version of `key` advertised by any nimbus.
    pub fn blob_max_version(&self, key: &str) -> ClusterStateResult<Option<u64>> {
        Ok(self
            .blobstore_info(key)?
            .into_iter()
            .map(|replica| replica.version)
            .max())
    }

    /// Forget a blob key on every nimbus.
    pub fn remove_blobstore_key(&self, key: &str) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().blobstore_key(key))?;
        info!(%key, "blob key removed");
        Ok(())
    }

    /// Forget one nimbus's copy of `key`, keeping other replicas.
    pub fn remove_key_version(&self, key: &str, nimbus: &NimbusInfo) -> ClusterStateResult<()> {
        self.store().delete(&self.paths().blobstore_replica(key, &nimbus.host_port()))?;
        debug!(%key, nimbus = %nimbus.host_port(), "blob replica removed");
        Ok(())
    }
}
