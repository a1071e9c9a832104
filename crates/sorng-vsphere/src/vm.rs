//! Virtual machine lookup and lifecycle over `VirtualMachine` managed objects.
//!
//! Lookups go through the property collector; power, reconfigure, destroy
//! and create are `*_Task` operations waited on by the task poller.

use crate::entity::Entity;
use crate::error::{VsphereError, VsphereResult};
use crate::types::{DataObject, ManagedObjectReference, VimValue};
use crate::vsphere::VsphereClient;

use log::info;
use regex::Regex;

const VIRTUAL_MACHINE: &str = "VirtualMachine";

/// High-level VM operations backed by `VsphereClient`.
pub struct VmManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// The VM called `name`.
    pub async fn find_by_name(&self, name: &str) -> VsphereResult<Entity> {
        self.client
            .find_entity_view(VIRTUAL_MACHINE, &[("name", VimValue::from(name))], None, None)
            .await
    }

    /// VMs whose name matches `pattern`, searched under `start` (the root
    /// folder by default).
    pub async fn find_by_regex(
        &self,
        pattern: &str,
        start: Option<&ManagedObjectReference>,
    ) -> VsphereResult<Vec<Entity>> {
        let re = Regex::new(pattern)
            .map_err(|e| VsphereError::invalid_argument(format!("Bad VM name pattern '{pattern}': {e}")))?;
        let vms = self
            .client
            .find_entity_views(VIRTUAL_MACHINE, start, Some(&["name"][..]))
            .await?;
        Ok(vms
            .into_iter()
            .filter(|vm| name_of(vm).is_some_and(|n| re.is_match(n)))
            .collect())
    }

    /// VMs registered on the host called `host_name`, sorted by name.
    pub async fn vms_on_host(&self, host_name: &str) -> VsphereResult<Vec<Entity>> {
        let mut host = self
            .client
            .find_entity_view("HostSystem", &[("name", VimValue::from(host_name))], None, None)
            .await?;
        let mut vms = host.preload("vm", &["name"]).await?;
        vms.sort_by(|a, b| name_of(a).cmp(&name_of(b)));
        Ok(vms)
    }

    /// `runtime.powerState` (`poweredOn`, `poweredOff` or `suspended`).
    pub async fn power_state(&self, vm: &mut Entity) -> VsphereResult<String> {
        let moref = vm.moref().clone();
        let runtime = vm.get_value("runtime").await?;
        runtime
            .field("powerState")
            .and_then(VimValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| VsphereError::parse(format!("{moref} has no runtime.powerState")))
    }

    // ── Power ───────────────────────────────────────────────────────

    /// Power on; a VM that is already running is left alone.
    pub async fn power_on(&self, vm: &mut Entity) -> VsphereResult<()> {
        if self.power_state(vm).await? == "poweredOn" {
            info!("{} is already powered on", vm.moref());
            return Ok(());
        }
        self.run(vm, "PowerOnVM_Task", &[]).await?;
        vm.invalidate(Some("runtime"));
        Ok(())
    }

    pub async fn power_off(&self, vm: &Entity) -> VsphereResult<()> {
        self.run(vm, "PowerOffVM_Task", &[]).await.map(|_| ())
    }

    pub async fn reset(&self, vm: &Entity) -> VsphereResult<()> {
        self.run(vm, "ResetVM_Task", &[]).await.map(|_| ())
    }

    pub async fn suspend(&self, vm: &Entity) -> VsphereResult<()> {
        self.run(vm, "SuspendVM_Task", &[]).await.map(|_| ())
    }

    // ── Configuration ───────────────────────────────────────────────

    /// Apply a `VirtualMachineConfigSpec`.
    pub async fn reconfigure(&self, vm: &mut Entity, spec: DataObject) -> VsphereResult<()> {
        self.run(vm, "ReconfigVM_Task", &[("spec".to_string(), spec.into())])
            .await?;
        vm.invalidate(None);
        Ok(())
    }

    /// Delete the VM and its files.
    pub async fn destroy(&self, vm: Entity) -> VsphereResult<()> {
        self.run(&vm, "Destroy_Task", &[]).await.map(|_| ())
    }

    /// `CreateVM_Task` in `folder` using `config`, placed in `pool` and
    /// optionally pinned to `host`. Returns a view of the new VM.
    pub async fn create(
        &self,
        folder: &ManagedObjectReference,
        config: DataObject,
        pool: &ManagedObjectReference,
        host: Option<&ManagedObjectReference>,
    ) -> VsphereResult<Entity> {
        let mut args = vec![
            ("config".to_string(), VimValue::from(config)),
            ("pool".to_string(), VimValue::from(pool)),
        ];
        if let Some(h) = host {
            args.push(("host".to_string(), VimValue::from(h)));
        }
        let info = self
            .client
            .invoke_task("CreateVM_Task", folder, &args, None)
            .await?;
        let vm = info
            .result
            .as_ref()
            .and_then(VimValue::as_moref)
            .ok_or_else(|| VsphereError::parse("CreateVM_Task returned no VirtualMachine"))?;
        info!("created {vm} in {folder}");
        self.client.entity(vm)
    }

    async fn run(
        &self,
        vm: &Entity,
        operation: &str,
        args: &[(String, VimValue)],
    ) -> VsphereResult<Option<VimValue>> {
        let info = self
            .client
            .invoke_task(operation, vm.moref(), args, None)
            .await?;
        info!("{operation} on {} finished", vm.moref());
        Ok(info.result)
    }
}

fn name_of(entity: &Entity) -> Option<&str> {
    entity.cached("name").and_then(VimValue::as_str)
}
