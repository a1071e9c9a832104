//! ESXi host operations over `HostSystem` managed objects.

use crate::entity::Entity;
use crate::error::VsphereResult;
use crate::types::VimValue;
use crate::vsphere::VsphereClient;

use log::info;
use std::time::Duration;

/// ESXi host operations.
pub struct HostManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> HostManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    pub async fn find_by_name(&self, name: &str) -> VsphereResult<Entity> {
        self.client
            .find_entity_view("HostSystem", &[("name", VimValue::from(name))], None, None)
            .await
    }

    /// Names of the VMs registered on `host`, sorted.
    pub async fn list_vm_names(&self, host: &mut Entity) -> VsphereResult<Vec<String>> {
        let vms = host.preload("vm", &["name"]).await?;
        let mut names: Vec<String> = vms
            .iter()
            .filter_map(|vm| vm.cached("name").and_then(VimValue::as_str))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    /// `runtime.inMaintenanceMode`.
    pub async fn in_maintenance_mode(&self, host: &mut Entity) -> VsphereResult<bool> {
        let runtime = host.get_value("runtime").await?;
        Ok(runtime
            .field("inMaintenanceMode")
            .and_then(VimValue::as_bool)
            .unwrap_or(false))
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Enter maintenance mode. `timeout` is handed to the server; zero
    /// means it waits indefinitely for the host to drain.
    pub async fn enter_maintenance_mode(&self, host: &mut Entity, timeout: Duration) -> VsphereResult<()> {
        self.maintenance(host, "EnterMaintenanceMode_Task", timeout).await
    }

    pub async fn exit_maintenance_mode(&self, host: &mut Entity, timeout: Duration) -> VsphereResult<()> {
        self.maintenance(host, "ExitMaintenanceMode_Task", timeout).await
    }

    async fn maintenance(&self, host: &mut Entity, operation: &str, timeout: Duration) -> VsphereResult<()> {
        let secs = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        self.client
            .invoke_task(
                operation,
                host.moref(),
                &[("timeout".to_string(), VimValue::from(secs))],
                None,
            )
            .await?;
        host.invalidate(Some("runtime"));
        info!("{operation} on {} finished", host.moref());
        Ok(())
    }
}
