//! Local proxies ("views") of server-side managed objects.
//!
//! An [`Entity`] starts empty and fills its property cache on demand, one
//! batched request at a time. Reference-valued properties are kept as
//! [`ManagedObjectReference`]s and only turned into further `Entity` values
//! when read, so the cyclic inventory graph is never walked eagerly.

use crate::catalog::{is_task_operation, PropertyDecl, PropertySchema, ROOT_TYPE};
use crate::collector::PropertyMap;
use crate::error::{VsphereError, VsphereResult};
use crate::task::Task;
use crate::traversal::PropertySelection;
use crate::types::{ManagedObjectReference, VimValue};
use crate::vsphere::VsphereClient;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
struct Cached {
    value: VimValue,
    fetched_at: DateTime<Utc>,
    fetched: Instant,
}

/// A property read through an [`Entity`].
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Primitive or data-object value (`Null` when the server has none)
    Value(VimValue),
    /// Single-valued reference; `None` when unset
    Entity(Option<Entity>),
    /// Multi-valued reference, possibly empty
    Entities(Vec<Entity>),
}

impl PropertyValue {
    pub fn as_value(&self) -> Option<&VimValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(e) => e,
            _ => None,
        }
    }

    pub fn into_entities(self) -> Vec<Entity> {
        match self {
            Self::Entities(list) => list,
            Self::Entity(Some(e)) => vec![e],
            _ => Vec::new(),
        }
    }
}

/// What [`Entity::invoke`] produced.
#[derive(Debug)]
pub enum Invocation {
    Value(VimValue),
    /// The operation started a server-side task
    Task(Task),
}

#[derive(Clone)]
pub struct Entity {
    client: VsphereClient,
    moref: ManagedObjectReference,
    schema: Arc<PropertySchema>,
    cache: HashMap<String, Cached>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cached: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        cached.sort_unstable();
        f.debug_struct("Entity")
            .field("moref", &self.moref)
            .field("cached", &cached)
            .finish()
    }
}

impl Entity {
    /// An empty view of `moref`. Nothing is fetched.
    pub(crate) fn new(client: VsphereClient, moref: ManagedObjectReference) -> VsphereResult<Self> {
        let schema = client.catalog().resolve_properties(&moref.type_name)?;
        Ok(Self {
            client,
            moref,
            schema,
            cache: HashMap::new(),
        })
    }

    pub fn moref(&self) -> &ManagedObjectReference {
        &self.moref
    }

    pub fn type_name(&self) -> &str {
        &self.moref.type_name
    }

    pub fn client(&self) -> &VsphereClient {
        &self.client
    }

    /// Own and inherited declared properties.
    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    fn declared(&self, name: &str) -> VsphereResult<PropertyDecl> {
        self.schema
            .get(name)
            .copied()
            .ok_or_else(|| VsphereError::unknown_property(&self.moref.type_name, name))
    }

    // ── Cache ───────────────────────────────────────────────────────

    /// Whether `name` holds a value that is still fresh.
    pub fn is_cached(&self, name: &str) -> bool {
        let ttl = self.client.options().cache_ttl;
        self.cache
            .get(name)
            .is_some_and(|c| ttl.map_or(true, |ttl| c.fetched.elapsed() < ttl))
    }

    /// When `name` was last fetched.
    pub fn fetched_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.cache.get(name).map(|c| c.fetched_at)
    }

    /// Cached raw value, fresh or not.
    pub fn cached(&self, name: &str) -> Option<&VimValue> {
        self.cache.get(name).map(|c| &c.value)
    }

    pub fn cached_names(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Drop one cached property, or all of them.
    pub fn invalidate(&mut self, name: Option<&str>) {
        match name {
            Some(n) => {
                self.cache.remove(n);
            }
            None => self.cache.clear(),
        }
    }

    /// Store a retrieve result.
    ///
    /// Properties the type does not declare are logged and dropped.
    /// Requested properties missing from `props` are stored as unset: an
    /// empty list when multi-valued, `Null` otherwise.
    pub fn set_view_data(&mut self, requested: &[String], props: PropertyMap) {
        let fetched_at = Utc::now();
        let fetched = Instant::now();
        let mut seen: HashSet<String> = HashSet::with_capacity(props.len());

        for (name, value) in props {
            let Some(decl) = self.schema.get(&name).copied() else {
                warn!(
                    "{}: server returned undeclared property '{name}', ignoring it",
                    self.moref
                );
                continue;
            };
            self.cache.insert(
                name.clone(),
                Cached {
                    value: normalize(decl, value),
                    fetched_at,
                    fetched,
                },
            );
            seen.insert(name);
        }

        for name in requested {
            if seen.contains(name) {
                continue;
            }
            let Some(decl) = self.schema.get(name).copied() else {
                continue;
            };
            debug!("{}: '{name}' is unset on the server", self.moref);
            self.cache.insert(
                name.clone(),
                Cached {
                    value: normalize(decl, VimValue::Null),
                    fetched_at,
                    fetched,
                },
            );
        }
    }

    async fn fetch(&mut self, names: Vec<String>) -> VsphereResult<()> {
        debug!("{}: fetching {}", self.moref, names.join(", "));
        let mut found = self
            .client
            .collector()
            .fetch_properties(
                std::slice::from_ref(&self.moref),
                &PropertySelection::Named(names.clone()),
            )
            .await?;
        let props = found.remove(&self.moref).unwrap_or_default();
        self.set_view_data(&names, props);
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Read one property, fetching it when not cached.
    pub async fn get(&mut self, name: &str) -> VsphereResult<PropertyValue> {
        let decl = self.declared(name)?;
        if !self.is_cached(name) {
            self.fetch(vec![name.to_string()]).await?;
        }
        self.materialize(name, decl)
    }

    /// Raw value of one property, fetching it when not cached.
    pub async fn get_value(&mut self, name: &str) -> VsphereResult<&VimValue> {
        self.declared(name)?;
        if !self.is_cached(name) {
            self.fetch(vec![name.to_string()]).await?;
        }
        self.cached(name)
            .ok_or_else(|| VsphereError::parse(format!("{}: '{name}' was not stored", self.moref)))
    }

    /// Read several properties; every uncached one is fetched in a single
    /// request.
    pub async fn get_many(&mut self, names: &[&str]) -> VsphereResult<Vec<PropertyValue>> {
        let decls = names
            .iter()
            .map(|n| self.declared(n))
            .collect::<VsphereResult<Vec<_>>>()?;

        let mut missing: Vec<String> = Vec::new();
        for name in names {
            if !self.is_cached(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            self.fetch(missing).await?;
        }

        names
            .iter()
            .zip(decls)
            .map(|(name, decl)| self.materialize(name, decl))
            .collect()
    }

    /// Re-read `names` (every declared property when `None`) in one
    /// request, overwriting the cache.
    pub async fn refresh(&mut self, names: Option<&[&str]>) -> VsphereResult<()> {
        let names: Vec<String> = match names {
            Some(list) => {
                for n in list {
                    self.declared(n)?;
                }
                list.iter().map(|n| n.to_string()).collect()
            }
            None => self.schema.keys().cloned().collect(),
        };
        if names.is_empty() {
            return Ok(());
        }
        self.fetch(names).await
    }

    /// A single-valued reference property as an entity.
    pub async fn get_reference(&mut self, name: &str) -> VsphereResult<Option<Entity>> {
        match self.get(name).await? {
            PropertyValue::Entity(e) => Ok(e),
            _ => Err(VsphereError::invalid_argument(format!(
                "'{name}' of {} is not a single reference",
                self.moref.type_name
            ))),
        }
    }

    /// A multi-valued reference property as entities.
    pub async fn get_references(&mut self, name: &str) -> VsphereResult<Vec<Entity>> {
        match self.get(name).await? {
            PropertyValue::Entities(list) => Ok(list),
            _ => Err(VsphereError::invalid_argument(format!(
                "'{name}' of {} is not a reference list",
                self.moref.type_name
            ))),
        }
    }

    fn materialize(&self, name: &str, decl: PropertyDecl) -> VsphereResult<PropertyValue> {
        let value = self.cached(name).cloned().unwrap_or(VimValue::Null);
        if !decl.is_reference() {
            return Ok(PropertyValue::Value(value));
        }
        if decl.multivalued {
            let entities = value
                .references()
                .into_iter()
                .map(|r| self.child(name, r))
                .collect::<VsphereResult<Vec<_>>>()?;
            return Ok(PropertyValue::Entities(entities));
        }
        match value {
            VimValue::Ref(r) => Ok(PropertyValue::Entity(Some(self.child(name, r)?))),
            _ => Ok(PropertyValue::Entity(None)),
        }
    }

    /// View of a reference read from `via`. A type the catalog does not
    /// know is viewed through the property's declared target type.
    fn child(&self, via: &str, moref: ManagedObjectReference) -> VsphereResult<Entity> {
        let catalog = self.client.catalog();
        if catalog.contains(&moref.type_name) {
            return Entity::new(self.client.clone(), moref);
        }
        let target = catalog
            .reference_target(&self.moref.type_name, via)
            .unwrap_or(ROOT_TYPE);
        warn!(
            "{moref} read from {}.{via} has an unregistered type, viewed as {target}",
            self.moref.type_name
        );
        Ok(Self {
            client: self.client.clone(),
            moref,
            schema: catalog.resolve_properties(target)?,
            cache: HashMap::new(),
        })
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Invoke `operation` on this object. `*_Task` operations come back as
    /// a [`Task`] ready to be waited on.
    pub async fn invoke(
        &self,
        operation: &str,
        args: &[(String, VimValue)],
    ) -> VsphereResult<Invocation> {
        let value = self.client.invoke(operation, &self.moref, args).await?;
        if !is_task_operation(operation) {
            return Ok(Invocation::Value(value));
        }
        let task_ref = value.as_moref().cloned().ok_or_else(|| {
            VsphereError::parse(format!("{operation} did not return a Task reference"))
        })?;
        Ok(Invocation::Task(self.client.task(&task_ref)?))
    }

    /// Materialize the targets of reference property `ref_property` and
    /// fill `properties` on all of them with one request.
    pub async fn preload(
        &mut self,
        ref_property: &str,
        properties: &[&str],
    ) -> VsphereResult<Vec<Entity>> {
        let decl = self.declared(ref_property)?;
        if !decl.is_reference() {
            return Err(VsphereError::invalid_argument(format!(
                "'{ref_property}' of {} holds no references",
                self.moref.type_name
            )));
        }
        if !self.is_cached(ref_property) {
            self.fetch(vec![ref_property.to_string()]).await?;
        }

        let refs = self
            .cached(ref_property)
            .map(VimValue::references)
            .unwrap_or_default();
        let mut targets = refs
            .iter()
            .map(|r| self.child(ref_property, r.clone()))
            .collect::<VsphereResult<Vec<_>>>()?;
        if targets.is_empty() || properties.is_empty() {
            return Ok(targets);
        }
        for target in &targets {
            for p in properties {
                target.declared(p)?;
            }
        }

        let names: Vec<String> = properties.iter().map(|p| p.to_string()).collect();
        let mut found = self
            .client
            .collector()
            .fetch_properties(&refs, &PropertySelection::Named(names.clone()))
            .await?;
        for target in &mut targets {
            let props = found.remove(&target.moref).unwrap_or_default();
            target.set_view_data(&names, props);
        }
        Ok(targets)
    }

    /// The datacenter this entity lives in, found by walking `parent`.
    pub async fn find_datacenter(&mut self) -> VsphereResult<Entity> {
        if self.type_name() == "Datacenter" {
            return Ok(self.clone());
        }
        let mut next = self.get_reference("parent").await?;
        while let Some(mut entity) = next {
            if entity.type_name() == "Datacenter" {
                return Ok(entity);
            }
            next = entity.get_reference("parent").await?;
        }
        Err(VsphereError::not_found(format!(
            "{} is not inside a Datacenter",
            self.moref
        )))
    }
}

/// Multi-valued properties are always lists, even when the server sent a
/// single element or nothing.
fn normalize(decl: PropertyDecl, value: VimValue) -> VimValue {
    if !decl.multivalued {
        return value;
    }
    match value {
        VimValue::List(_) => value,
        VimValue::Null => VimValue::List(Vec::new()),
        single => VimValue::List(vec![single]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VsphereErrorKind;
    use crate::fake::{self, FakeInventory};
    use crate::vsphere::ClientOptions;
    use std::time::Duration;

    fn host42() -> ManagedObjectReference {
        fake::moref("HostSystem", "host-42")
    }

    #[tokio::test]
    async fn host_scenario_name_then_empty_vm_list() {
        let fake = FakeInventory::new();
        fake.add(&host42(), vec![("name", "esx01.lab".into()), ("vm", VimValue::List(Vec::new()))]);
        let client = fake.client().await;

        let mut host = client.entity(&host42()).unwrap();
        assert!(!host.is_cached("name"));
        assert_eq!(fake.fetches(), 0);

        let name = host.get("name").await.unwrap();
        assert_eq!(name.as_value().and_then(VimValue::as_str), Some("esx01.lab"));
        assert_eq!(fake.fetches(), 1);
        assert!(host.fetched_at("name").is_some());

        host.get("name").await.unwrap();
        assert_eq!(fake.fetches(), 1);

        let vms = host.get("vm").await.unwrap();
        assert!(matches!(vms, PropertyValue::Entities(ref v) if v.is_empty()));
        assert_eq!(fake.fetches(), 2);
        assert_eq!(host.cached("vm"), Some(&VimValue::List(Vec::new())));
    }

    #[tokio::test]
    async fn omitted_properties_are_stored_as_unset() {
        let fake = FakeInventory::new();
        fake.add(&host42(), vec![("name", "esx01.lab".into())]);
        let client = fake.client().await;
        let mut host = client.entity(&host42()).unwrap();

        let vms = host.get("vm").await.unwrap();
        assert!(vms.into_entities().is_empty());
        assert_eq!(host.cached("vm"), Some(&VimValue::List(Vec::new())));

        assert!(host.get_reference("parent").await.unwrap().is_none());
        assert!(host.is_cached("parent"));
        assert_eq!(fake.fetches(), 2);
    }

    #[tokio::test]
    async fn referenced_entities_start_empty() {
        let fake = FakeInventory::new();
        let vms: Vec<VimValue> = (1..=3)
            .map(|i| fake::moref("VirtualMachine", &format!("vm-{i}")).into())
            .collect();
        fake.add(&host42(), vec![("vm", VimValue::List(vms))]);
        let client = fake.client().await;

        let mut host = client.entity(&host42()).unwrap();
        let vms = host.get_references("vm").await.unwrap();
        assert_eq!(vms.len(), 3);
        for vm in &vms {
            assert_eq!(vm.type_name(), "VirtualMachine");
            assert_eq!(vm.cached_names().count(), 0);
        }
        assert_eq!(fake.fetches(), 1);
    }

    #[tokio::test]
    async fn get_many_fetches_uncached_names_once() {
        let fake = FakeInventory::new();
        fake.add(
            &host42(),
            vec![("name", "esx01.lab".into()), ("overallStatus", "green".into())],
        );
        let client = fake.client().await;
        let mut host = client.entity(&host42()).unwrap();
        host.get("name").await.unwrap();

        let values = host
            .get_many(&["name", "overallStatus", "summary", "overallStatus"])
            .await
            .unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[1].as_value().and_then(VimValue::as_str), Some("green"));
        assert_eq!(values[2].as_value(), Some(&VimValue::Null));
        assert_eq!(fake.fetches(), 2);

        let last = fake.calls().pop().unwrap();
        let paths: Vec<&str> = last.args[0]
            .1
            .field("propSet")
            .map(VimValue::items)
            .unwrap_or_default()[0]
            .field("pathSet")
            .map(VimValue::items)
            .unwrap_or_default()
            .iter()
            .filter_map(VimValue::as_str)
            .collect();
        assert_eq!(paths, ["overallStatus", "summary"]);
    }

    #[tokio::test]
    async fn undeclared_property_is_refused_without_a_request() {
        let fake = FakeInventory::new();
        let client = fake.client().await;
        let mut host = client.entity(&host42()).unwrap();
        let err = host.get("powerState").await.unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::UnknownProperty);
        assert_eq!(fake.fetches(), 0);
    }

    #[tokio::test]
    async fn undeclared_server_values_are_dropped() {
        let fake = FakeInventory::new();
        let client = fake.client().await;
        let mut host = client.entity(&host42()).unwrap();
        let props = PropertyMap::from([
            ("name".to_string(), VimValue::from("esx01.lab")),
            ("bogusProperty".to_string(), VimValue::from(1i64)),
        ]);
        host.set_view_data(&["name".to_string()], props);
        assert!(host.is_cached("name"));
        assert!(host.cached("bogusProperty").is_none());
    }

    #[tokio::test]
    async fn refresh_overwrites_in_one_request() {
        let fake = FakeInventory::new();
        fake.add(&host42(), vec![("name", "esx01.lab".into())]);
        let client = fake.client().await;
        let mut host = client.entity(&host42()).unwrap();
        host.get("name").await.unwrap();

        fake.set(&host42(), "name", "esx01-renamed.lab");
        host.refresh(None).await.unwrap();
        assert_eq!(fake.fetches(), 2);
        assert_eq!(host.cached("name").and_then(VimValue::as_str), Some("esx01-renamed.lab"));
        assert!(host.is_cached("datastore"));
        assert!(host.is_cached("runtime"));
    }

    #[tokio::test]
    async fn expired_entries_are_fetched_again() {
        let fake = FakeInventory::new();
        fake.add(&host42(), vec![("name", "esx01.lab".into())]);
        let options = ClientOptions {
            cache_ttl: Some(Duration::ZERO),
            ..ClientOptions::fast()
        };
        let client = VsphereClient::with_invoker(fake.clone(), options).await.unwrap();
        let mut host = client.entity(&host42()).unwrap();
        host.get("name").await.unwrap();
        host.get("name").await.unwrap();
        assert_eq!(fake.fetches(), 2);
    }

    #[tokio::test]
    async fn preload_fills_targets_in_one_request() {
        let fake = FakeInventory::new();
        let dc = fake::moref("Datacenter", "datacenter-2");
        let host = fake::moref("HostSystem", "host-9");
        fake.add(&dc, vec![("name", "DC1".into())]);
        fake.add(&host, vec![("name", "esx09".into())]);
        fake.set(&fake::root_folder(), "childEntity", VimValue::List(vec![dc.clone().into(), host.clone().into()]));
        let client = fake.client().await;

        let mut root = client.entity(&fake::root_folder()).unwrap();
        let children = root.preload("childEntity", &["name"]).await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.is_cached("name")));
        assert_eq!(fake.fetches(), 2);

        let err = root.preload("name", &["name"]).await.unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn find_datacenter_walks_parents() {
        let fake = FakeInventory::new();
        let dc = fake::moref("Datacenter", "datacenter-2");
        let vm_folder = fake::moref("Folder", "group-v3");
        let vm = fake::moref("VirtualMachine", "vm-5");
        fake.add(&dc, vec![("parent", fake::root_folder().into())]);
        fake.add(&vm_folder, vec![("parent", dc.clone().into())]);
        fake.add(&vm, vec![("parent", vm_folder.into())]);
        let client = fake.client().await;

        let found = client.entity(&vm).unwrap().find_datacenter().await.unwrap();
        assert_eq!(found.moref(), &dc);

        let err = client
            .entity(&fake::root_folder())
            .unwrap()
            .find_datacenter()
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn task_operations_come_back_as_tasks() {
        let fake = FakeInventory::new();
        let vm = fake::moref("VirtualMachine", "vm-5");
        fake.add(&vm, vec![("name", "web01".into())]);
        fake.script_task("PowerOnVM_Task", &fake::moref("Task", "task-3"), vec![fake::task_success(VimValue::Null)]);
        let client = fake.client().await;

        let entity = client.entity(&vm).unwrap();
        match entity.invoke("PowerOnVM_Task", &[]).await.unwrap() {
            Invocation::Task(mut task) => {
                assert_eq!(task.moref().value, "task-3");
                assert!(task.wait(None).await.unwrap().result.is_none());
            }
            Invocation::Value(v) => panic!("expected a task, got {v:?}"),
        }
        match entity.invoke("MarkAsTemplate", &[]).await.unwrap() {
            Invocation::Value(v) => assert!(v.is_null()),
            Invocation::Task(_) => panic!("MarkAsTemplate is synchronous"),
        }
    }

    #[tokio::test]
    async fn storage_pod_children_materialize() {
        let fake = FakeInventory::new();
        let ds_folder = fake::moref("Folder", "group-s5");
        let ds = fake::moref("Datastore", "datastore-1");
        let pod = fake::moref("StoragePod", "group-p9");
        fake.add(
            &ds_folder,
            vec![("childEntity", VimValue::List(vec![ds.clone().into(), pod.clone().into()]))],
        );
        let client = fake.client().await;

        let mut folder = client.entity(&ds_folder).unwrap();
        let children = folder.get_references("childEntity").await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].type_name(), "StoragePod");
        assert!(children[1].schema().contains_key("podStorageDrsEntry"));
        assert!(children[1].schema()["childEntity"].is_reference());
    }

    #[tokio::test]
    async fn license_assignment_manager_reference_resolves() {
        let fake = FakeInventory::new();
        let licenses = fake::moref("LicenseManager", "LicenseManager");
        let lam = fake::moref("LicenseAssignmentManager", "LicenseAssignmentManager");
        fake.add(&licenses, vec![("licenseAssignmentManager", lam.clone().into())]);
        let client = fake.client().await;

        let found = client
            .entity(&licenses)
            .unwrap()
            .get_reference("licenseAssignmentManager")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.moref(), &lam);
    }

    #[tokio::test]
    async fn unregistered_reference_type_uses_declared_target() {
        let fake = FakeInventory::new();
        let folder = fake::moref("Folder", "group-v3");
        let newer = fake::moref("VirtualMachineGroup", "vmgroup-1");
        fake.add(&folder, vec![("childEntity", VimValue::List(vec![newer.clone().into()]))]);
        fake.add(&newer, vec![("name", "canary".into())]);
        let client = fake.client().await;

        let mut children = client
            .entity(&folder)
            .unwrap()
            .get_references("childEntity")
            .await
            .unwrap();
        let child = &mut children[0];
        assert_eq!(child.moref(), &newer);
        assert!(child.schema().contains_key("parent"));
        let name = child.get("name").await.unwrap();
        assert_eq!(name.as_value().and_then(VimValue::as_str), Some("canary"));
    }

    #[tokio::test]
    async fn find_datacenter_through_storage_pod() {
        let fake = FakeInventory::new();
        let dc = fake::moref("Datacenter", "datacenter-2");
        let ds_folder = fake::moref("Folder", "group-s5");
        let pod = fake::moref("StoragePod", "group-p9");
        let ds = fake::moref("Datastore", "datastore-7");
        fake.add(&dc, vec![("parent", fake::root_folder().into())]);
        fake.add(&ds_folder, vec![("parent", dc.clone().into())]);
        fake.add(&pod, vec![("parent", ds_folder.into())]);
        fake.add(&ds, vec![("parent", pod.into())]);
        let client = fake.client().await;

        let found = client.entity(&ds).unwrap().find_datacenter().await.unwrap();
        assert_eq!(found.moref(), &dc);
    }
}
