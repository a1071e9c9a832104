//! In-memory inventory answering invoker calls, for unit tests.
//!
//! `RetrievePropertiesEx` is answered from an object table the way a server
//! would: each object spec starts at its `obj` and follows the `selectSet`
//! traversal specs over stored reference properties, and every visited
//! object whose type has a property spec is returned. Operations nothing was
//! scripted for return no value. Every call is recorded.

use crate::catalog::TypeCatalog;
use crate::error::{SoapFault, VsphereError, VsphereResult};
use crate::invoker::Invoker;
use crate::types::{DataObject, ManagedObjectReference, VimValue};
use crate::vsphere::{ClientOptions, VsphereClient};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Props = BTreeMap<String, VimValue>;

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub operation: String,
    pub this: ManagedObjectReference,
    pub args: Vec<(String, VimValue)>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ManagedObjectReference, Props>,
    calls: Vec<Call>,
    responses: HashMap<String, VimValue>,
    failures: HashMap<String, VsphereError>,
    delays: HashMap<String, Duration>,
    task_ops: HashMap<String, ManagedObjectReference>,
    task_infos: HashMap<ManagedObjectReference, VecDeque<VimValue>>,
    pages: HashMap<String, Vec<VimValue>>,
    page_size: Option<usize>,
    next_token: u64,
}

pub(crate) struct FakeInventory {
    state: Mutex<State>,
}

pub(crate) fn moref(type_name: &str, id: &str) -> ManagedObjectReference {
    ManagedObjectReference::new(type_name, id)
}

pub(crate) fn root_folder() -> ManagedObjectReference {
    moref("Folder", "group-d1")
}

/// A datacenter under the root folder with its four child folders.
pub(crate) struct FakeDatacenter {
    pub dc: ManagedObjectReference,
    pub vm_folder: ManagedObjectReference,
    pub host_folder: ManagedObjectReference,
    pub datastore_folder: ManagedObjectReference,
}

pub(crate) fn property_collector() -> ManagedObjectReference {
    moref("PropertyCollector", "propertyCollector")
}

/// `TaskInfo` in the given state.
pub(crate) fn task_info(state: &str) -> VimValue {
    DataObject::new("TaskInfo")
        .with("key", "task-1")
        .with("state", state)
        .into()
}

pub(crate) fn task_success(result: impl Into<VimValue>) -> VimValue {
    DataObject::new("TaskInfo")
        .with("key", "task-1")
        .with("state", "success")
        .with("result", result.into())
        .into()
}

/// A failed `TaskInfo`; `None` leaves out the error detail entirely.
pub(crate) fn task_error(message: Option<&str>) -> VimValue {
    let info = DataObject::new("TaskInfo").with("key", "task-1").with("state", "error");
    match message {
        Some(msg) => info
            .with(
                "error",
                DataObject::new("LocalizedMethodFault")
                    .with("fault", DataObject::new("InvalidPowerState"))
                    .with("localizedMessage", msg),
            )
            .into(),
        None => info.into(),
    }
}

impl FakeInventory {
    pub fn new() -> Arc<Self> {
        let mut state = State::default();
        state.responses.insert(
            "RetrieveServiceContent".into(),
            DataObject::new("ServiceContent")
                .with("rootFolder", root_folder())
                .with("propertyCollector", property_collector())
                .with("viewManager", moref("ViewManager", "ViewManager"))
                .with(
                    "about",
                    DataObject::new("AboutInfo")
                        .with("fullName", "VMware vCenter Server 7.0.3 build-19234570")
                        .with("apiVersion", "7.0.3.0")
                        .with("apiType", "VirtualCenter")
                        .with("version", "7.0.3")
                        .with("build", "19234570"),
                )
                .with("sessionManager", moref("SessionManager", "SessionManager"))
                .with("searchIndex", moref("SearchIndex", "SearchIndex"))
                .with("taskManager", moref("TaskManager", "TaskManager"))
                .with("licenseManager", moref("LicenseManager", "LicenseManager"))
                .into(),
        );
        state.responses.insert(
            "Login".into(),
            DataObject::new("UserSession")
                .with("key", "52b5ab5a-8a2c-4e5c-9c4a-2f4f3d3b1a10")
                .with("userName", "VSPHERE.LOCAL\\Administrator")
                .with("fullName", "Administrator vsphere.local")
                .into(),
        );
        state.objects.insert(
            root_folder(),
            Props::from([("name".to_string(), VimValue::from("Datacenters"))]),
        );
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn add(&self, r: &ManagedObjectReference, props: Vec<(&str, VimValue)>) {
        let props = props.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.state.lock().unwrap().objects.insert(r.clone(), props);
    }

    pub fn set(&self, r: &ManagedObjectReference, name: &str, value: impl Into<VimValue>) {
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .entry(r.clone())
            .or_default()
            .insert(name.to_string(), value.into());
    }

    /// Add `child` to reference property `property` of `parent`: appended
    /// for multi-valued properties, replaced otherwise.
    pub fn link(&self, parent: &ManagedObjectReference, property: &str, child: &ManagedObjectReference) {
        let multivalued = TypeCatalog::vim25()
            .property(&parent.type_name, property)
            .map(|d| d.multivalued)
            .unwrap_or(true);
        let mut state = self.state.lock().unwrap();
        let props = state.objects.entry(parent.clone()).or_default();
        if !multivalued {
            props.insert(property.to_string(), VimValue::Ref(child.clone()));
            return;
        }
        match props.entry(property.to_string()).or_insert_with(|| VimValue::List(Vec::new())) {
            VimValue::List(items) => items.push(VimValue::Ref(child.clone())),
            other => *other = VimValue::List(vec![VimValue::Ref(child.clone())]),
        }
    }

    /// Datacenter `id` named `name`, linked under the root folder.
    pub fn datacenter(&self, id: &str, name: &str) -> FakeDatacenter {
        let dc = moref("Datacenter", id);
        let folder = |suffix: &str, folder_name: &str| {
            let r = moref("Folder", &format!("group-{suffix}-{id}"));
            self.add(&r, vec![("name", folder_name.into()), ("parent", dc.clone().into())]);
            r
        };
        let out = FakeDatacenter {
            vm_folder: folder("v", "vm"),
            host_folder: folder("h", "host"),
            datastore_folder: folder("s", "datastore"),
            dc: dc.clone(),
        };
        self.add(
            &dc,
            vec![
                ("name", name.into()),
                ("parent", root_folder().into()),
                ("vmFolder", out.vm_folder.clone().into()),
                ("hostFolder", out.host_folder.clone().into()),
                ("datastoreFolder", out.datastore_folder.clone().into()),
            ],
        );
        self.link(&root_folder(), "childEntity", &dc);
        out
    }

    pub fn respond(&self, operation: &str, value: impl Into<VimValue>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(operation.to_string(), value.into());
    }

    pub fn fail(&self, operation: &str, err: VsphereError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string(), err);
    }

    /// `operation` returns `task`; successive `info` reads walk `infos`
    /// and then keep returning the last one.
    pub fn script_task(&self, operation: &str, task: &ManagedObjectReference, infos: Vec<VimValue>) {
        let mut state = self.state.lock().unwrap();
        state.task_ops.insert(operation.to_string(), task.clone());
        state.task_infos.insert(task.clone(), infos.into());
        state.objects.entry(task.clone()).or_default();
    }

    /// `operation` answers only after `by`.
    pub fn delay(&self, operation: &str, by: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(operation.to_string(), by);
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = Some(size);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Property collector reads, first pages only.
    pub fn fetches(&self) -> usize {
        self.count("RetrievePropertiesEx")
    }

    /// Logged-in client over this inventory.
    pub async fn client(self: &Arc<Self>) -> VsphereClient {
        let client = VsphereClient::with_invoker(self.clone(), ClientOptions::fast())
            .await
            .unwrap();
        client.login("administrator@vsphere.local", "secret").await.unwrap();
        client
    }
}

fn arg<'a>(args: &'a [(String, VimValue)], name: &str) -> Option<&'a VimValue> {
    args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Index every full traversal spec under `select_set` by name, so named
/// selection specs can refer to them.
fn collect_traversals(select_set: &[VimValue], into: &mut HashMap<String, VimValue>) {
    for selection in select_set {
        if selection.field("path").is_none() {
            continue;
        }
        if let Some(name) = selection.field("name").and_then(VimValue::as_str) {
            if into.insert(name.to_string(), selection.clone()).is_none() {
                let nested = selection.field("selectSet").map(VimValue::items).unwrap_or_default();
                collect_traversals(nested, into);
            }
        }
    }
}

struct PropSpec {
    type_name: String,
    all: bool,
    paths: Vec<String>,
}

impl State {
    fn retrieve(&mut self, args: &[(String, VimValue)]) -> VsphereResult<VimValue> {
        let spec = arg(args, "specSet")
            .ok_or_else(|| VsphereError::invalid_argument("specSet missing"))?;

        let prop_specs: Vec<PropSpec> = spec
            .field("propSet")
            .map(VimValue::items)
            .unwrap_or_default()
            .iter()
            .map(|p| PropSpec {
                type_name: p.field("type").and_then(VimValue::as_str).unwrap_or_default().to_string(),
                all: p.field("all").and_then(VimValue::as_bool).unwrap_or(false),
                paths: p
                    .field("pathSet")
                    .map(VimValue::items)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            })
            .collect();

        let wanted = |r: &ManagedObjectReference| {
            prop_specs.iter().any(|p| TypeCatalog::vim25().is_a(&r.type_name, &p.type_name))
        };

        let mut selected: Vec<ManagedObjectReference> = Vec::new();
        for object_spec in spec.field("objectSet").map(VimValue::items).unwrap_or_default() {
            let obj = object_spec
                .field("obj")
                .and_then(VimValue::as_moref)
                .ok_or_else(|| VsphereError::invalid_argument("objectSet.obj missing"))?;
            if !self.objects.contains_key(obj) {
                return Err(VsphereError::remote_fault(SoapFault {
                    code: "ServerFaultCode".into(),
                    message: "The object has already been deleted or has not been completely created".into(),
                    fault_type: Some("ManagedObjectNotFound".into()),
                    fields: BTreeMap::from([("obj".to_string(), obj.value.clone())]),
                }));
            }

            let select_set = object_spec.field("selectSet").map(VimValue::items).unwrap_or_default();
            let mut named = HashMap::new();
            collect_traversals(select_set, &mut named);

            let skip = object_spec.field("skip").and_then(VimValue::as_bool).unwrap_or(false);
            let mut reached = Vec::new();
            if !skip {
                reached.push(obj.clone());
            }
            let mut seen = HashSet::new();
            self.traverse(obj, select_set, &named, &mut seen, &mut reached);

            for r in reached {
                if wanted(&r) && !selected.contains(&r) {
                    selected.push(r);
                }
            }
        }

        let mut contents = Vec::new();
        for r in selected {
            let Some(ps) = prop_specs
                .iter()
                .find(|p| TypeCatalog::vim25().is_a(&r.type_name, &p.type_name))
            else {
                continue;
            };
            let stored = self.objects.get(&r).cloned().unwrap_or_default();
            let mut names: Vec<String> = if ps.all {
                stored.keys().cloned().collect()
            } else {
                ps.paths.clone()
            };
            if ps.all && self.task_infos.contains_key(&r) && !names.iter().any(|n| n == "info") {
                names.push("info".into());
            }

            let mut prop_set = Vec::new();
            for name in names {
                let value = if name == "info" && self.task_infos.contains_key(&r) {
                    self.next_task_info(&r)
                } else {
                    stored.get(&name).cloned()
                };
                if let Some(val) = value {
                    prop_set.push(VimValue::from(
                        DataObject::new("DynamicProperty").with("name", name).with("val", val),
                    ));
                }
            }
            contents.push(VimValue::from(
                DataObject::new("ObjectContent")
                    .with("obj", r)
                    .with("propSet", VimValue::List(prop_set)),
            ));
        }

        Ok(self.page(contents))
    }

    /// Follow every traversal in `select_set` that applies to `from`.
    fn traverse(
        &self,
        from: &ManagedObjectReference,
        select_set: &[VimValue],
        named: &HashMap<String, VimValue>,
        seen: &mut HashSet<(ManagedObjectReference, String)>,
        reached: &mut Vec<ManagedObjectReference>,
    ) {
        for selection in select_set {
            let name = selection.field("name").and_then(VimValue::as_str).unwrap_or_default();
            let Some(traversal) = selection.field("path").map(|_| selection).or_else(|| named.get(name)) else {
                continue;
            };
            let type_name = traversal.field("type").and_then(VimValue::as_str).unwrap_or_default();
            if !TypeCatalog::vim25().is_a(&from.type_name, type_name) {
                continue;
            }
            if !seen.insert((from.clone(), name.to_string())) {
                continue;
            }
            let path = traversal.field("path").and_then(VimValue::as_str).unwrap_or_default();
            let skip = traversal.field("skip").and_then(VimValue::as_bool).unwrap_or(false);
            let next = traversal.field("selectSet").map(VimValue::items).unwrap_or_default();
            let targets = self
                .objects
                .get(from)
                .and_then(|props| props.get(path))
                .map(VimValue::references)
                .unwrap_or_default();
            for target in targets {
                if !self.objects.contains_key(&target) {
                    continue;
                }
                if !skip && !reached.contains(&target) {
                    reached.push(target.clone());
                }
                self.traverse(&target, next, named, seen, reached);
            }
        }
    }

    fn next_task_info(&mut self, task: &ManagedObjectReference) -> Option<VimValue> {
        let queue = self.task_infos.get_mut(task)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn page(&mut self, mut contents: Vec<VimValue>) -> VimValue {
        if contents.is_empty() {
            return VimValue::Null;
        }
        let mut result = DataObject::new("RetrieveResult");
        if let Some(size) = self.page_size {
            if contents.len() > size {
                let rest = contents.split_off(size);
                self.next_token += 1;
                let token = format!("token-{}", self.next_token);
                self.pages.insert(token.clone(), rest);
                result.set("token", token);
            }
        }
        result.set("objects", VimValue::List(contents));
        result.into()
    }
}

#[async_trait]
impl Invoker for FakeInventory {
    async fn invoke(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
    ) -> VsphereResult<VimValue> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                operation: operation.to_string(),
                this: this.clone(),
                args: args.to_vec(),
            });
            state.delays.get(operation).copied()
        };
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.failures.get(operation) {
            return Err(err.clone());
        }

        match operation {
            "RetrievePropertiesEx" => state.retrieve(args),
            "ContinueRetrievePropertiesEx" => {
                let token = arg(args, "token").and_then(VimValue::as_str).unwrap_or_default();
                let rest = state
                    .pages
                    .remove(token)
                    .ok_or_else(|| VsphereError::invalid_argument(format!("unknown token {token}")))?;
                Ok(state.page(rest))
            }
            op => {
                if let Some(task) = state.task_ops.get(op) {
                    return Ok(VimValue::Ref(task.clone()));
                }
                if let Some(value) = state.responses.get(op) {
                    return Ok(value.clone());
                }
                Ok(VimValue::Null)
            }
        }
    }
}
