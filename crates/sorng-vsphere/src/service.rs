//! Aggregate service façade over named vSphere sessions.
//!
//! `VsphereService` keeps one `VsphereClient` per session name so an
//! application can talk to several vCenters / ESXi hosts at once. Embedders
//! share it as `VsphereServiceState = Arc<Mutex<VsphereService>>`.

use crate::config::VsphereConfig;
use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::host::HostManager;
use crate::storage::StorageManager;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe handle shared by embedders.
pub type VsphereServiceState = Arc<Mutex<VsphereService>>;

/// Connection details of a session, without the password.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub name: String,
    pub server: Option<String>,
    pub username: Option<String>,
    pub full_name: String,
    pub api_version: String,
    pub logged_in: bool,
}

struct Session {
    client: VsphereClient,
    config: Option<VsphereConfig>,
}

/// Named vSphere sessions.
#[derive(Default)]
pub struct VsphereService {
    sessions: BTreeMap<String, Session>,
}

impl VsphereService {
    /// Create a service with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_state() -> VsphereServiceState {
        Arc::new(Mutex::new(Self::new()))
    }

    fn require_client(&self, name: &str) -> VsphereResult<&VsphereClient> {
        self.sessions
            .get(name)
            .map(|s| &s.client)
            .ok_or_else(|| VsphereError::not_found(format!("No vSphere session named '{name}'")))
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Connect and log in, registering the session under `name`. An
    /// existing session with that name is logged out and replaced.
    pub async fn connect(&mut self, name: &str, config: VsphereConfig) -> VsphereResult<SessionSummary> {
        let client = VsphereClient::connect(&config).await?;
        if let Some(old) = self.sessions.remove(name) {
            if let Err(e) = old.client.logout().await {
                warn!("logout of replaced session '{name}' failed: {e}");
            }
        }
        info!("session '{name}' connected to {}", config.server);
        self.sessions.insert(
            name.to_string(),
            Session {
                client,
                config: Some(config),
            },
        );
        self.session_info(name)
    }

    /// Register an already built client, e.g. one over a custom invoker.
    pub fn insert(&mut self, name: &str, client: VsphereClient) {
        self.sessions.insert(name.to_string(), Session { client, config: None });
    }

    /// Log out and forget the session. Logout failures are logged; the
    /// session is dropped either way.
    pub async fn disconnect(&mut self, name: &str) -> VsphereResult<()> {
        let session = self
            .sessions
            .remove(name)
            .ok_or_else(|| VsphereError::not_found(format!("No vSphere session named '{name}'")))?;
        if let Err(e) = session.client.logout().await {
            warn!("logout of session '{name}' failed: {e}");
        }
        info!("session '{name}' disconnected");
        Ok(())
    }

    /// Log out of every session concurrently. Returns how many were closed.
    pub async fn disconnect_all(&mut self) -> usize {
        let sessions = std::mem::take(&mut self.sessions);
        let count = sessions.len();
        let results = join_all(sessions.iter().map(|(name, s)| async move {
            (name.as_str(), s.client.logout().await)
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                warn!("logout of session '{name}' failed: {e}");
            }
        }
        count
    }

    /// Whether the server still accepts the session. An authentication
    /// fault means no; other failures are returned.
    pub async fn check_session(&self, name: &str) -> VsphereResult<bool> {
        let client = self.require_client(name)?;
        if !client.is_logged_in() {
            return Ok(false);
        }
        match client.current_time().await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == VsphereErrorKind::AuthenticationError => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub fn client(&self, name: &str) -> VsphereResult<VsphereClient> {
        self.require_client(name).cloned()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn session_info(&self, name: &str) -> VsphereResult<SessionSummary> {
        let session = self
            .sessions
            .get(name)
            .ok_or_else(|| VsphereError::not_found(format!("No vSphere session named '{name}'")))?;
        let about = session.client.about();
        Ok(SessionSummary {
            name: name.to_string(),
            server: session.config.as_ref().map(|c| c.server.clone()),
            username: session
                .client
                .session()
                .map(|s| s.user_name)
                .or_else(|| session.config.as_ref().map(|c| c.username.clone())),
            full_name: about.full_name.clone(),
            api_version: about.api_version.clone(),
            logged_in: session.client.is_logged_in(),
        })
    }

    // ── Inventory shortcuts ─────────────────────────────────────────

    pub async fn power_on_vm(&self, name: &str, vm_name: &str) -> VsphereResult<()> {
        let c = self.require_client(name)?;
        let vms = VmManager::new(c);
        let mut vm = vms.find_by_name(vm_name).await?;
        vms.power_on(&mut vm).await
    }

    pub async fn power_off_vm(&self, name: &str, vm_name: &str) -> VsphereResult<()> {
        let c = self.require_client(name)?;
        let vms = VmManager::new(c);
        let vm = vms.find_by_name(vm_name).await?;
        vms.power_off(&vm).await
    }

    pub async fn list_host_vms(&self, name: &str, host_name: &str) -> VsphereResult<Vec<String>> {
        let c = self.require_client(name)?;
        let mut host = HostManager::new(c).find_by_name(host_name).await?;
        HostManager::new(c).list_vm_names(&mut host).await
    }

    pub async fn datastore_free_space(&self, name: &str, datastore: &str) -> VsphereResult<i64> {
        let c = self.require_client(name)?;
        StorageManager::new(c).free_space(datastore).await
    }
}
