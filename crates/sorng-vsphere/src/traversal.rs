//! Property-collector query specs and the fixed inventory traversal graph.
//!
//! Specs are plain request-scoped values converted to wire [`DataObject`]s
//! with fields in XSD sequence order. Only the edge graph is shared; it is
//! built once and reused by every query.

use crate::types::{DataObject, ManagedObjectReference, VimValue};

use lazy_static::lazy_static;
use std::collections::BTreeSet;

// ─── Spec values ─────────────────────────────────────────────────────

/// Which properties a query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySelection {
    /// Every property the server knows for the type
    All,
    Named(Vec<String>),
}

impl PropertySelection {
    pub fn named<S: AsRef<str>>(names: &[S]) -> Self {
        Self::Named(names.iter().map(|n| n.as_ref().to_string()).collect())
    }
}

/// Either a reference to a named traversal or a full traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionSpec {
    Named(String),
    Traversal(TraversalSpec),
}

impl SelectionSpec {
    pub fn to_value(&self) -> VimValue {
        match self {
            Self::Named(name) => DataObject::new("SelectionSpec").with("name", name.as_str()).into(),
            Self::Traversal(t) => t.to_value(),
        }
    }
}

/// Edge: from objects of `type_name`, follow reference property `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalSpec {
    pub name: String,
    pub type_name: String,
    pub path: String,
    pub skip: bool,
    pub select_set: Vec<SelectionSpec>,
}

impl TraversalSpec {
    pub fn new(name: &str, type_name: &str, path: &str, next: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            path: path.to_string(),
            skip: false,
            select_set: next.iter().map(|n| SelectionSpec::Named(n.to_string())).collect(),
        }
    }

    pub fn to_value(&self) -> VimValue {
        DataObject::new("TraversalSpec")
            .with("name", self.name.as_str())
            .with("type", self.type_name.as_str())
            .with("path", self.path.as_str())
            .with("skip", self.skip)
            .with("selectSet", list(&self.select_set, SelectionSpec::to_value))
            .into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    pub obj: ManagedObjectReference,
    pub skip: bool,
    pub select_set: Vec<SelectionSpec>,
}

impl ObjectSpec {
    /// Just the object itself, no traversal.
    pub fn single(obj: &ManagedObjectReference) -> Self {
        Self {
            obj: obj.clone(),
            skip: false,
            select_set: Vec::new(),
        }
    }

    pub fn to_value(&self) -> VimValue {
        DataObject::new("ObjectSpec")
            .with("obj", &self.obj)
            .with("skip", self.skip)
            .with("selectSet", list(&self.select_set, SelectionSpec::to_value))
            .into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub type_name: String,
    pub selection: PropertySelection,
}

impl PropertySpec {
    pub fn new(type_name: &str, selection: PropertySelection) -> Self {
        Self {
            type_name: type_name.to_string(),
            selection,
        }
    }

    pub fn to_value(&self) -> VimValue {
        let obj = DataObject::new("PropertySpec").with("type", self.type_name.as_str());
        match self.selection {
            PropertySelection::All => obj.with("all", true).into(),
            PropertySelection::Named(ref names) => obj
                .with("all", false)
                .with(
                    "pathSet",
                    VimValue::List(names.iter().map(|n| VimValue::from(n.as_str())).collect()),
                )
                .into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilterSpec {
    pub prop_set: Vec<PropertySpec>,
    pub object_set: Vec<ObjectSpec>,
}

impl PropertyFilterSpec {
    pub fn to_value(&self) -> VimValue {
        DataObject::new("PropertyFilterSpec")
            .with("propSet", list(&self.prop_set, PropertySpec::to_value))
            .with("objectSet", list(&self.object_set, ObjectSpec::to_value))
            .into()
    }
}

fn list<T>(items: &[T], f: impl Fn(&T) -> VimValue) -> VimValue {
    VimValue::List(items.iter().map(f).collect())
}

// ─── Inventory graph ─────────────────────────────────────────────────

pub const RESOURCE_POOL_TRAVERSAL: &str = "resource_pool_traversal_spec";
pub const RESOURCE_POOL_VM_TRAVERSAL: &str = "resource_pool_vm_traversal_spec";
pub const FOLDER_TRAVERSAL: &str = "folder_traversal_spec";
pub const DATACENTER_HOST_TRAVERSAL: &str = "datacenter_host_traversal_spec";
pub const DATACENTER_VM_TRAVERSAL: &str = "datacenter_vm_traversal_spec";
pub const DATACENTER_DATASTORE_TRAVERSAL: &str = "datacenter_datastore_traversal_spec";
pub const DATACENTER_NETWORK_TRAVERSAL: &str = "datacenter_network_traversal_spec";
pub const COMPUTE_RESOURCE_RP_TRAVERSAL: &str = "compute_resource_rp_traversal_spec";
pub const COMPUTE_RESOURCE_HOST_TRAVERSAL: &str = "compute_resource_host_traversal_spec";
pub const HOST_VM_TRAVERSAL: &str = "host_vm_traversal_spec";

lazy_static! {
    static ref INVENTORY_GRAPH: Vec<SelectionSpec> = build_inventory_graph();
}

fn build_inventory_graph() -> Vec<SelectionSpec> {
    let edges = [
        TraversalSpec::new(
            FOLDER_TRAVERSAL,
            "Folder",
            "childEntity",
            &[
                FOLDER_TRAVERSAL,
                DATACENTER_HOST_TRAVERSAL,
                DATACENTER_VM_TRAVERSAL,
                DATACENTER_DATASTORE_TRAVERSAL,
                DATACENTER_NETWORK_TRAVERSAL,
                COMPUTE_RESOURCE_RP_TRAVERSAL,
                COMPUTE_RESOURCE_HOST_TRAVERSAL,
                HOST_VM_TRAVERSAL,
                RESOURCE_POOL_VM_TRAVERSAL,
            ],
        ),
        TraversalSpec::new(DATACENTER_VM_TRAVERSAL, "Datacenter", "vmFolder", &[FOLDER_TRAVERSAL]),
        TraversalSpec::new(DATACENTER_HOST_TRAVERSAL, "Datacenter", "hostFolder", &[FOLDER_TRAVERSAL]),
        TraversalSpec::new(
            DATACENTER_DATASTORE_TRAVERSAL,
            "Datacenter",
            "datastoreFolder",
            &[FOLDER_TRAVERSAL],
        ),
        TraversalSpec::new(
            DATACENTER_NETWORK_TRAVERSAL,
            "Datacenter",
            "networkFolder",
            &[FOLDER_TRAVERSAL],
        ),
        TraversalSpec::new(COMPUTE_RESOURCE_HOST_TRAVERSAL, "ComputeResource", "host", &[]),
        TraversalSpec::new(
            COMPUTE_RESOURCE_RP_TRAVERSAL,
            "ComputeResource",
            "resourcePool",
            &[RESOURCE_POOL_TRAVERSAL, RESOURCE_POOL_VM_TRAVERSAL],
        ),
        TraversalSpec::new(
            RESOURCE_POOL_TRAVERSAL,
            "ResourcePool",
            "resourcePool",
            &[RESOURCE_POOL_TRAVERSAL, RESOURCE_POOL_VM_TRAVERSAL],
        ),
        TraversalSpec::new(HOST_VM_TRAVERSAL, "HostSystem", "vm", &[FOLDER_TRAVERSAL]),
        TraversalSpec::new(RESOURCE_POOL_VM_TRAVERSAL, "ResourcePool", "vm", &[]),
    ];
    edges.into_iter().map(SelectionSpec::Traversal).collect()
}

/// The shared inventory edge set.
pub fn inventory_graph() -> &'static [SelectionSpec] {
    &INVENTORY_GRAPH
}

/// Filter spec selecting every `target_type` object reachable from `start`.
pub fn build_traversal(
    start: &ManagedObjectReference,
    target_type: &str,
    selection: PropertySelection,
) -> PropertyFilterSpec {
    PropertyFilterSpec {
        prop_set: vec![PropertySpec::new(target_type, selection)],
        object_set: vec![ObjectSpec {
            obj: start.clone(),
            skip: false,
            select_set: inventory_graph().to_vec(),
        }],
    }
}

/// Filter spec reading properties from exactly `refs`, one property spec
/// per distinct type. `selection` picks the properties for each type.
pub fn for_objects(
    refs: &[ManagedObjectReference],
    selection: impl Fn(&str) -> PropertySelection,
) -> PropertyFilterSpec {
    let types: BTreeSet<&str> = refs.iter().map(|r| r.type_name.as_str()).collect();
    PropertyFilterSpec {
        prop_set: types
            .into_iter()
            .map(|t| PropertySpec::new(t, selection(t)))
            .collect(),
        object_set: refs.iter().map(ObjectSpec::single).collect(),
    }
}
