//! Credential & worker-key vault.
//!
//! Topology credentials are stored with a digest of their contents so a
//! reader can tell a tampered or truncated record from a valid one.
//!
//! Private worker keys rotate by version. Each `(service, topology)` pair
//! keeps a high-water mark in its directory node; claiming a version
//! advances the mark with compare-and-set, so concurrent claimers never
//! receive the same number. Older versions stay readable until they
//! expire, which lets tokens signed with them keep validating.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, info, warn};

use crate::codec::{decode, encode};
use crate::error::{ClusterStateError, ClusterStateResult};
use crate::state::StormClusterState;
use crate::types::{Credentials, PrivateWorkerKey, WorkerTokenServiceType};

/// Digest algorithms available for credential records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Hex digest of `bytes`.
    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ClusterStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(ClusterStateError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// On-store form of [`Credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    credentials: Credentials,
    algorithm: String,
    digest: String,
}

impl StormClusterState {
    // ── Credentials ────────────────────────────────────────────────

    /// Store a topology's credentials, digested with `algorithm`.
    ///
    /// An unknown algorithm fails with `UnsupportedAlgorithm` before
    /// anything is written.
    pub fn set_credentials(
        &self,
        storm_id: &str,
        credentials: &Credentials,
        algorithm: &str,
    ) -> ClusterStateResult<()> {
        let algorithm: HashAlgorithm = algorithm.parse()?;
        let stored = StoredCredentials {
            credentials: credentials.clone(),
            algorithm: algorithm.name().to_string(),
            digest: algorithm.digest_hex(&encode(credentials)?),
        };
        self.write_record(&self.paths().credentials(storm_id), &stored)?;
        info!(%storm_id, %algorithm, entries = credentials.creds.len(), "credentials stored");
        Ok(())
    }

    /// A topology's credentials, verified against their stored digest.
    pub fn credentials(
        &self,
        storm_id: &str,
        watch: Option<&storm_coord::Watch>,
    ) -> ClusterStateResult<Option<Credentials>> {
        let Some(stored) =
            self.read_record::<StoredCredentials>(&self.paths().credentials(storm_id), watch)?
        else {
            return Ok(None);
        };
        let algorithm: HashAlgorithm = stored.algorithm.parse()?;
        if algorithm.digest_hex(&encode(&stored.credentials)?) != stored.digest {
            warn!(%storm_id, "credential digest mismatch");
            return Err(ClusterStateError::CorruptCredentials(storm_id.to_string()));
        }
        Ok(Some(stored.credentials))
    }

    // ── Private worker keys ────────────────────────────────────────

    /// Claim the next key version for `(service, storm_id)`.
    ///
    /// Returns 0 for a new pair. The claimed number is above every stored
    /// version and every earlier claim; lost compare-and-set races are
    /// retried here and never reach the caller.
    pub fn get_next_private_worker_key_version(
        &self,
        service: WorkerTokenServiceType,
        storm_id: &str,
    ) -> ClusterStateResult<u64> {
        let dir = self.paths().secret_keys_storm(service, storm_id);
        loop {
            let mark = self.store().read(&dir, None)?;
            let next_unstored = self
                .list(&dir, None)?
                .iter()
                .filter_map(|name| name.parse::<u64>().ok())
                .max()
                .map_or(0, |v| v + 1);
            let high_water = match &mark {
                Some(node) if !node.data.is_empty() => decode::<u64>(&dir, &node.data)?,
                _ => 0,
            };
            let claimed = high_water.max(next_unstored);
            let next_mark = encode(&(claimed + 1))?;

            let result = match &mark {
                Some(node) => self.store().write_if_version(&dir, &next_mark, node.version),
                None => self.store().create(&dir, &next_mark),
            };
            match result.map_err(ClusterStateError::from) {
                Ok(_) => {
                    debug!(%service, %storm_id, version = claimed, "worker key version claimed");
                    return Ok(claimed);
                }
                Err(ClusterStateError::VersionConflict(reason))
                | Err(ClusterStateError::NotFound(reason)) => {
                    debug!(%service, %storm_id, %reason, "key version claim raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Store `key` under `version`. Existing versions are left untouched;
    /// storing an already-present version fails with `DuplicateKeyVersion`.
    pub fn add_private_worker_key(
        &self,
        service: WorkerTokenServiceType,
        storm_id: &str,
        version: u64,
        key: &PrivateWorkerKey,
    ) -> ClusterStateResult<()> {
        let path = self.paths().secret_key(service, storm_id, version);
        match self.store().create(&path, &encode(key)?) {
            Ok(_) => {
                info!(%service, %storm_id, version, "private worker key added");
                Ok(())
            }
            Err(storm_coord::StoreError::NodeExists(_)) => {
                Err(ClusterStateError::DuplicateKeyVersion {
                    service: service.to_string(),
                    topology_id: storm_id.to_string(),
                    version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The key stored under exactly this version, if any.
    pub fn get_private_worker_key(
        &self,
        service: WorkerTokenServiceType,
        storm_id: &str,
        version: u64,
    ) -> ClusterStateResult<Option<PrivateWorkerKey>> {
        self.read_record(&self.paths().secret_key(service, storm_id, version), None)
    }

    /// Delete every expired key of a topology, across all service types.
    /// Returns how many keys were removed.
    pub fn remove_expired_private_worker_keys(&self, storm_id: &str) -> ClusterStateResult<usize> {
        let now = self.now_millis();
        let mut removed = 0;
        for service in WorkerTokenServiceType::ALL {
            let dir = self.paths().secret_keys_storm(service, storm_id);
            for name in self.list(&dir, None)? {
                let Ok(version) = name.parse::<u64>() else {
                    continue;
                };
                let Some(key) = self.get_private_worker_key(service, storm_id, version)? else {
                    continue;
                };
                if key.is_expired(now) {
                    removed += self
                        .store()
                        .delete(&self.paths().secret_key(service, storm_id, version))?;
                    debug!(%service, %storm_id, version, "expired worker key removed");
                }
            }
        }
        if removed > 0 {
            info!(%storm_id, removed, "expired private worker keys removed");
        }
        Ok(removed)
    }

    /// Delete every key of every service type for a topology.
    pub fn remove_all_private_worker_keys(&self, storm_id: &str) -> ClusterStateResult<()> {
        for service in WorkerTokenServiceType::ALL {
            self.store().delete(&self.paths().secret_keys_storm(service, storm_id))?;
        }
        debug!(%storm_id, "all private worker keys removed");
        Ok(())
    }

    /// Topologies holding at least one stored key of any service type.
    pub fn ids_of_topologies_with_private_worker_keys(
        &self,
    ) -> ClusterStateResult<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for service in WorkerTokenServiceType::ALL {
            for storm_id in self.list_ids(&self.paths().secret_keys(service), None)? {
                let dir = self.paths().secret_keys_storm(service, &storm_id);
                if !self.list(&dir, None)?.is_empty() {
                    ids.insert(storm_id);
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::clock::ManualClock;

    fn test_state() -> StormClusterState {
        StormClusterState::open_in_memory().unwrap()
    }

    fn test_key(expiration_time_millis: u64) -> PrivateWorkerKey {
        PrivateWorkerKey {
            key: vec![7; 32],
            user_name: "alice".to_string(),
            created_at_millis: 0,
            expiration_time_millis,
        }
    }

    fn test_credentials() -> Credentials {
        Credentials {
            creds: BTreeMap::from([
                ("TGT".to_string(), "ticket".to_string()),
                ("token".to_string(), "abc".to_string()),
            ]),
        }
    }

    // ── Credentials ────────────────────────────────────────────────

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!(matches!(
            "MD5".parse::<HashAlgorithm>(),
            Err(ClusterStateError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn credentials_round_trip() {
        let state = test_state();
        assert!(state.credentials("t1", None).unwrap().is_none());

        state
            .set_credentials("t1", &test_credentials(), "SHA-512")
            .unwrap();
        assert_eq!(
            state.credentials("t1", None).unwrap(),
            Some(test_credentials())
        );
    }

    #[test]
    fn unsupported_algorithm_writes_nothing() {
        let state = test_state();
        let err = state
            .set_credentials("t1", &test_credentials(), "rot13")
            .unwrap_err();

        assert!(matches!(err, ClusterStateError::UnsupportedAlgorithm(name) if name == "rot13"));
        assert!(state.credentials("t1", None).unwrap().is_none());
    }

    #[test]
    fn tampered_credentials_detected() {
        let state = test_state();
        let tampered = StoredCredentials {
            credentials: test_credentials(),
            algorithm: "SHA-256".to_string(),
            digest: "00".to_string(),
        };
        state
            .write_record(&state.paths().credentials("t1"), &tampered)
            .unwrap();

        assert!(matches!(
            state.credentials("t1", None),
            Err(ClusterStateError::CorruptCredentials(_))
        ));
    }

    // ── Key versions ───────────────────────────────────────────────

    #[test]
    fn new_pair_starts_at_zero() {
        let state = test_state();
        let version = state
            .get_next_private_worker_key_version(WorkerTokenServiceType::Nimbus, "t1")
            .unwrap();
        assert_eq!(version, 0);
    }

    #[test]
    fn sequential_claims_have_no_gaps() {
        let state = test_state();
        let service = WorkerTokenServiceType::Supervisor;
        for expected in 0..5 {
            let version = state
                .get_next_private_worker_key_version(service, "t1")
                .unwrap();
            assert_eq!(version, expected);
            state
                .add_private_worker_key(service, "t1", version, &test_key(u64::MAX))
                .unwrap();
        }

        let stored = state.list(&state.paths().secret_keys_storm(service, "t1"), None).unwrap();
        assert_eq!(stored, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn unused_claims_are_not_reissued() {
        let state = test_state();
        let service = WorkerTokenServiceType::Drpc;
        let first = state.get_next_private_worker_key_version(service, "t1").unwrap();
        let second = state.get_next_private_worker_key_version(service, "t1").unwrap();
        assert_eq!((first, second), (0, 1));
    }

    #[test]
    fn next_version_skips_stored_versions() {
        let state = test_state();
        let service = WorkerTokenServiceType::Nimbus;
        state
            .add_private_worker_key(service, "t1", 3, &test_key(u64::MAX))
            .unwrap();

        assert_eq!(
            state.get_next_private_worker_key_version(service, "t1").unwrap(),
            4
        );
    }

    #[test]
    fn pairs_are_independent() {
        let state = test_state();
        state
            .get_next_private_worker_key_version(WorkerTokenServiceType::Nimbus, "t1")
            .unwrap();
        assert_eq!(
            state
                .get_next_private_worker_key_version(WorkerTokenServiceType::Drpc, "t1")
                .unwrap(),
            0
        );
        assert_eq!(
            state
                .get_next_private_worker_key_version(WorkerTokenServiceType::Nimbus, "t2")
                .unwrap(),
            0
        );
    }

    #[test]
    fn duplicate_version_rejected_and_original_kept() {
        let state = test_state();
        let service = WorkerTokenServiceType::Nimbus;
        state
            .add_private_worker_key(service, "t1", 0, &test_key(100))
            .unwrap();

        let err = state
            .add_private_worker_key(service, "t1", 0, &test_key(200))
            .unwrap_err();
        assert!(matches!(
            err,
            ClusterStateError::DuplicateKeyVersion { version: 0, .. }
        ));
        assert_eq!(
            state.get_private_worker_key(service, "t1", 0).unwrap(),
            Some(test_key(100))
        );
    }

    #[test]
    fn older_versions_stay_readable() {
        let state = test_state();
        let service = WorkerTokenServiceType::Nimbus;
        state.add_private_worker_key(service, "t1", 0, &test_key(100)).unwrap();
        state.add_private_worker_key(service, "t1", 1, &test_key(200)).unwrap();

        assert!(state.get_private_worker_key(service, "t1", 0).unwrap().is_some());
        assert!(state.get_private_worker_key(service, "t1", 1).unwrap().is_some());
        assert!(state.get_private_worker_key(service, "t1", 2).unwrap().is_none());
    }

    // ── Expiry & cleanup ───────────────────────────────────────────

    #[test]
    fn remove_expired_scans_all_service_types() {
        let clock = ManualClock::new(1_000);
        let state = test_state().with_clock(clock);
        state
            .add_private_worker_key(WorkerTokenServiceType::Nimbus, "t1", 0, &test_key(500))
            .unwrap();
        state
            .add_private_worker_key(WorkerTokenServiceType::Nimbus, "t1", 1, &test_key(5_000))
            .unwrap();
        state
            .add_private_worker_key(WorkerTokenServiceType::Drpc, "t1", 0, &test_key(999))
            .unwrap();
        state
            .add_private_worker_key(WorkerTokenServiceType::Drpc, "t2", 0, &test_key(1))
            .unwrap();

        assert_eq!(state.remove_expired_private_worker_keys("t1").unwrap(), 2);
        assert_eq!(state.remove_expired_private_worker_keys("t1").unwrap(), 0);

        assert!(state
            .get_private_worker_key(WorkerTokenServiceType::Nimbus, "t1", 1)
            .unwrap()
            .is_some());
        assert!(state
            .get_private_worker_key(WorkerTokenServiceType::Drpc, "t1", 0)
            .unwrap()
            .is_none());
        // Other topologies are not touched.
        assert!(state
            .get_private_worker_key(WorkerTokenServiceType::Drpc, "t2", 0)
            .unwrap()
            .is_some());
    }

    #[test]
    fn expiry_does_not_reissue_claimed_versions() {
        let clock = ManualClock::new(0);
        let state = test_state().with_clock(clock.clone());
        let service = WorkerTokenServiceType::Nimbus;
        for _ in 0..2 {
            let v = state.get_next_private_worker_key_version(service, "t1").unwrap();
            state.add_private_worker_key(service, "t1", v, &test_key(10)).unwrap();
        }

        clock.set_millis(100);
        state.remove_expired_private_worker_keys("t1").unwrap();

        assert_eq!(
            state.get_next_private_worker_key_version(service, "t1").unwrap(),
            2
        );
    }

    #[test]
    fn topology_ids_with_slashes_enumerate_whole() {
        let state = test_state();
        let service = WorkerTokenServiceType::Drpc;
        let version = state.get_next_private_worker_key_version(service, "team/t1").unwrap();
        state
            .add_private_worker_key(service, "team/t1", version, &test_key(u64::MAX))
            .unwrap();

        assert_eq!(
            state.ids_of_topologies_with_private_worker_keys().unwrap(),
            BTreeSet::from(["team/t1".to_string()])
        );
        state.remove_all_private_worker_keys("team/t1").unwrap();
        assert!(state.ids_of_topologies_with_private_worker_keys().unwrap().is_empty());
    }

    #[test]
    fn remove_all_and_enumerate_ids() {
        let state = test_state();
        state
            .add_private_worker_key(WorkerTokenServiceType::Nimbus, "t1", 0, &test_key(1))
            .unwrap();
        state
            .add_private_worker_key(WorkerTokenServiceType::Supervisor, "t1", 0, &test_key(1))
            .unwrap();
        state
            .add_private_worker_key(WorkerTokenServiceType::Drpc, "t2", 0, &test_key(1))
            .unwrap();
        // A claim alone does not count as a stored key.
        state
            .get_next_private_worker_key_version(WorkerTokenServiceType::Drpc, "t3")
            .unwrap();

        assert_eq!(
            state.ids_of_topologies_with_private_worker_keys().unwrap(),
            BTreeSet::from(["t1".to_string(), "t2".to_string()])
        );

        state.remove_all_private_worker_keys("t1").unwrap();
        assert_eq!(
            state.ids_of_topologies_with_private_worker_keys().unwrap(),
            BTreeSet::from(["t2".to_string()])
        );
        assert_eq!(
            state
                .get_next_private_worker_key_version(WorkerTokenServiceType::Nimbus, "t1")
                .unwrap(),
            0
        );
    }
}
