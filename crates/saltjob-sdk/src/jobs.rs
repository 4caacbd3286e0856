//! Job operations as seen by a reconciler.
//!
//! [`JobClient`] is the capability a reconcile loop depends on; it is
//! implemented by [`SaltClient`] and can be faked in controller tests.
//! The volume helpers are [`SaltClient::submit_job`] with fixed state
//! files and pillar data.

use async_trait::async_trait;
use saltjob_models::{JobHandle, STATE_SLS};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::client::SaltClient;
use crate::error::SaltError;

/// Handle name of volume preparation jobs.
pub const PREPARE_VOLUME: &str = "PrepareVolume";
/// Handle name of volume teardown jobs.
pub const UNPREPARE_VOLUME: &str = "UnprepareVolume";
/// Handle name of device inspection jobs.
pub const DEVICE_INFO: &str = "DeviceInfo";

/// Submit and poll remote jobs.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit an asynchronous job; see [`SaltClient::submit_job`].
    async fn submit_job(
        &self,
        name: &str,
        target: &str,
        function: &str,
        kwargs: Map<String, Value>,
    ) -> Result<JobHandle, SaltError>;

    /// Poll a job; `Ok(None)` means still running.
    async fn poll_job(&self, handle: &JobHandle, target: &str)
        -> Result<Option<Value>, SaltError>;

    /// Resolve a device path to its kernel name on a node.
    async fn get_device_name(&self, target: &str, device_path: &str) -> Result<String, SaltError>;
}

#[async_trait]
impl JobClient for SaltClient {
    async fn submit_job(
        &self,
        name: &str,
        target: &str,
        function: &str,
        kwargs: Map<String, Value>,
    ) -> Result<JobHandle, SaltError> {
        SaltClient::submit_job(self, name, target, function, kwargs).await
    }

    async fn poll_job(
        &self,
        handle: &JobHandle,
        target: &str,
    ) -> Result<Option<Value>, SaltError> {
        SaltClient::poll_job(self, handle, target).await
    }

    async fn get_device_name(&self, target: &str, device_path: &str) -> Result<String, SaltError> {
        SaltClient::get_device_name(self, target, device_path).await
    }
}

/// Volume a node should prepare or release.
///
/// Serialized as the `pillar` passed to the volume state files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSpec {
    /// Volume identifier.
    pub volume_id: String,
    /// Block device backing the volume, e.g. `/dev/disk/by-id/...`.
    pub device: String,
    /// Filesystem to create, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    /// Where the volume is mounted, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

impl VolumeSpec {
    /// A raw block volume with no filesystem or mount point.
    pub fn new(volume_id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            device: device.into(),
            fs_type: None,
            mount_path: None,
        }
    }
}

/// `state.sls` keyword arguments running `mods` with the given pillar.
pub fn state_kwargs(mods: &str, pillar: Value) -> Map<String, Value> {
    let mut kwargs = Map::new();
    kwargs.insert("mods".into(), Value::String(mods.to_string()));
    if !pillar.is_null() {
        kwargs.insert("pillar".into(), pillar);
    }
    kwargs
}

impl SaltClient {
    /// Run the `prepare-volume` state for `volume` on `target`.
    pub async fn prepare_volume(
        &self,
        target: &str,
        volume: &VolumeSpec,
    ) -> Result<JobHandle, SaltError> {
        let kwargs = state_kwargs("prepare-volume", json!({ "volume": volume }));
        self.submit_job(PREPARE_VOLUME, target, STATE_SLS, kwargs).await
    }

    /// Run the `unprepare-volume` state for `volume` on `target`.
    pub async fn unprepare_volume(
        &self,
        target: &str,
        volume: &VolumeSpec,
    ) -> Result<JobHandle, SaltError> {
        let kwargs = state_kwargs("unprepare-volume", json!({ "volume": volume }));
        self.submit_job(UNPREPARE_VOLUME, target, STATE_SLS, kwargs).await
    }

    /// Run the `device-info` state for `device_path` on `target`.
    pub async fn device_info(&self, target: &str, device_path: &str) -> Result<JobHandle, SaltError> {
        let kwargs = state_kwargs("device-info", json!({ "device": device_path }));
        self.submit_job(DEVICE_INFO, target, STATE_SLS, kwargs).await
    }
}
