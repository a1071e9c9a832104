//! Static type catalog: managed-object types and their declared properties.
//!
//! The catalog is built once (see [`TypeCatalog::vim25`]) and is read-only
//! afterwards, so it can be shared freely between sessions and threads.
//! Each type's full property set is the union of its own declarations and
//! those of every ancestor, resolved at build time. Reference properties
//! name the type they point at; a build fails if that type is missing.
//!
//! Operation names are not listed here. Any name is sent as-is and the
//! server's `MethodNotFound` fault decides whether it exists.

use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};

use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Suffix the API uses for operations that return a `Task` reference.
pub const TASK_SUFFIX: &str = "_Task";

/// Root of the managed-object inheritance chain.
pub const ROOT_TYPE: &str = "ManagedObject";

/// Whether an operation name follows the asynchronous `*_Task` convention.
pub fn is_task_operation(operation: &str) -> bool {
    operation.ends_with(TASK_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Primitive or data-object value
    Scalar,
    /// Managed object reference(s), dereferenced lazily
    Reference,
}

/// Property shape as written in a type table. A reference names the
/// managed-object type it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType<'a> {
    Scalar,
    Reference(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDecl {
    pub kind: PropertyKind,
    pub multivalued: bool,
}

impl PropertyDecl {
    pub fn is_reference(&self) -> bool {
        self.kind == PropertyKind::Reference
    }
}

/// Resolved (own + inherited) property set of one type.
pub type PropertySchema = BTreeMap<String, PropertyDecl>;

/// One managed-object type: its parent and directly declared properties.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub parent: Option<String>,
    pub properties: BTreeMap<String, PropertyDecl>,
    /// Target type of each reference property
    pub references: BTreeMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct TypeCatalog {
    types: HashMap<String, TypeDescriptor>,
    resolved: HashMap<String, Arc<PropertySchema>>,
}

lazy_static! {
    static ref VIM25: TypeCatalog = TypeCatalog::build_vim25();
}

impl TypeCatalog {
    pub fn builder() -> TypeCatalogBuilder {
        TypeCatalogBuilder::default()
    }

    /// The process-wide VIM25 catalog.
    pub fn vim25() -> &'static TypeCatalog {
        &VIM25
    }

    fn build_vim25() -> TypeCatalog {
        let mut builder = TypeCatalog::builder();
        for (name, parent, props) in VIM25_TYPES {
            builder = builder.with_type(name, *parent, props);
        }
        builder
            .build()
            .unwrap_or_else(|e| panic!("built-in VIM25 catalog is inconsistent: {e}"))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn describe(&self, type_name: &str) -> VsphereResult<&TypeDescriptor> {
        self.types
            .get(type_name)
            .ok_or_else(|| VsphereError::unknown_type(type_name))
    }

    /// Own and inherited properties of `type_name`.
    pub fn resolve_properties(&self, type_name: &str) -> VsphereResult<Arc<PropertySchema>> {
        self.resolved
            .get(type_name)
            .cloned()
            .ok_or_else(|| VsphereError::unknown_type(type_name))
    }

    pub fn property(&self, type_name: &str, property: &str) -> VsphereResult<PropertyDecl> {
        self.resolve_properties(type_name)?
            .get(property)
            .copied()
            .ok_or_else(|| VsphereError::unknown_property(type_name, property))
    }

    /// Declared target type of reference property `property`, looked up
    /// through the parent chain.
    pub fn reference_target(&self, type_name: &str, property: &str) -> Option<&str> {
        let mut current = self.types.get(type_name);
        while let Some(t) = current {
            if let Some(target) = t.references.get(property) {
                return Some(target);
            }
            current = t.parent.as_deref().and_then(|p| self.types.get(p));
        }
        None
    }

    /// Whether `type_name` is `ancestor` or inherits from it.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = self.types.get(type_name);
        while let Some(t) = current {
            if t.name == ancestor {
                return true;
            }
            current = t.parent.as_deref().and_then(|p| self.types.get(p));
        }
        false
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
pub struct TypeCatalogBuilder {
    types: Vec<TypeDescriptor>,
}

impl TypeCatalogBuilder {
    /// Declare a type. `props` is `(name, type, multivalued)`.
    pub fn with_type(
        mut self,
        name: &str,
        parent: Option<&str>,
        props: &[(&str, PropertyType<'_>, bool)],
    ) -> Self {
        let mut properties = BTreeMap::new();
        let mut references = BTreeMap::new();
        for (p, ty, multivalued) in props {
            let kind = match ty {
                PropertyType::Scalar => PropertyKind::Scalar,
                PropertyType::Reference(target) => {
                    references.insert(p.to_string(), target.to_string());
                    PropertyKind::Reference
                }
            };
            properties.insert(
                p.to_string(),
                PropertyDecl {
                    kind,
                    multivalued: *multivalued,
                },
            );
        }
        self.types.push(TypeDescriptor {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            properties,
            references,
        });
        self
    }

    /// Validate parent links and reference targets, then resolve every
    /// type's property union.
    pub fn build(self) -> VsphereResult<TypeCatalog> {
        let mut types = HashMap::new();
        for t in self.types {
            if types.contains_key(&t.name) {
                return Err(VsphereError::invalid_argument(format!(
                    "type '{}' declared twice",
                    t.name
                )));
            }
            types.insert(t.name.clone(), t);
        }

        for t in types.values() {
            for (p, target) in &t.references {
                if !types.contains_key(target) {
                    return Err(VsphereError::new(
                        VsphereErrorKind::UnknownType,
                        format!("'{}.{p}' refers to unregistered type '{target}'", t.name),
                    ));
                }
            }
        }

        let mut resolved = HashMap::with_capacity(types.len());
        for name in types.keys() {
            let mut chain = Vec::new();
            let mut current = Some(name.as_str());
            while let Some(n) = current {
                if chain.contains(&n) {
                    return Err(VsphereError::invalid_argument(format!(
                        "inheritance cycle through '{n}'"
                    )));
                }
                let t = types.get(n).ok_or_else(|| VsphereError::unknown_type(n))?;
                chain.push(n);
                current = t.parent.as_deref();
            }

            // Ancestors first so a subtype's redeclaration wins.
            let mut schema = PropertySchema::new();
            for n in chain.iter().rev() {
                for (p, decl) in &types[*n].properties {
                    schema.insert(p.clone(), *decl);
                }
            }
            resolved.insert(name.clone(), Arc::new(schema));
        }

        Ok(TypeCatalog { types, resolved })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VIM25 tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const S: PropertyType<'static> = PropertyType::Scalar;
use self::PropertyType::Reference as R;

type TypeRow = (
    &'static str,
    Option<&'static str>,
    &'static [(&'static str, PropertyType<'static>, bool)],
);

static VIM25_TYPES: &[TypeRow] = &[
    ("ManagedObject", None, &[]),
    ("ExtensibleManagedObject", Some("ManagedObject"), &[
        ("availableField", S, true),
        ("value", S, true),
    ]),

    // ── Inventory ───────────────────────────────────────────────────
    ("ManagedEntity", Some("ExtensibleManagedObject"), &[
        ("alarmActionsEnabled", S, false),
        ("configIssue", S, true),
        ("configStatus", S, false),
        ("customValue", S, true),
        ("declaredAlarmState", S, true),
        ("disabledMethod", S, true),
        ("effectiveRole", S, true),
        ("name", S, false),
        ("overallStatus", S, false),
        ("parent", R("ManagedEntity"), false),
        ("permission", S, true),
        ("recentTask", R("Task"), true),
        ("tag", S, true),
        ("triggeredAlarmState", S, true),
    ]),
    ("Folder", Some("ManagedEntity"), &[
        ("childEntity", R("ManagedEntity"), true),
        ("childType", S, true),
    ]),
    ("StoragePod", Some("Folder"), &[
        ("podStorageDrsEntry", S, false),
        ("summary", S, false),
    ]),
    ("Datacenter", Some("ManagedEntity"), &[
        ("configuration", S, false),
        ("datastore", R("Datastore"), true),
        ("datastoreFolder", R("Folder"), false),
        ("hostFolder", R("Folder"), false),
        ("network", R("Network"), true),
        ("networkFolder", R("Folder"), false),
        ("vmFolder", R("Folder"), false),
    ]),
    ("ComputeResource", Some("ManagedEntity"), &[
        ("configurationEx", S, false),
        ("datastore", R("Datastore"), true),
        ("environmentBrowser", R("EnvironmentBrowser"), false),
        ("host", R("HostSystem"), true),
        ("network", R("Network"), true),
        ("resourcePool", R("ResourcePool"), false),
        ("summary", S, false),
    ]),
    ("ClusterComputeResource", Some("ComputeResource"), &[
        ("actionHistory", S, true),
        ("configuration", S, false),
        ("drsFault", S, true),
        ("drsRecommendation", S, true),
        ("migrationHistory", S, true),
        ("recommendation", S, true),
    ]),
    ("HostSystem", Some("ManagedEntity"), &[
        ("capability", S, false),
        ("config", S, false),
        ("configManager", S, false),
        ("datastore", R("Datastore"), true),
        ("datastoreBrowser", R("HostDatastoreBrowser"), false),
        ("hardware", S, false),
        ("network", R("Network"), true),
        ("runtime", S, false),
        ("summary", S, false),
        ("systemResources", S, false),
        ("vm", R("VirtualMachine"), true),
    ]),
    ("ResourcePool", Some("ManagedEntity"), &[
        ("childConfiguration", S, true),
        ("config", S, false),
        ("owner", R("ComputeResource"), false),
        ("resourcePool", R("ResourcePool"), true),
        ("runtime", S, false),
        ("summary", S, false),
        ("vm", R("VirtualMachine"), true),
    ]),
    ("VirtualApp", Some("ResourcePool"), &[
        ("childLink", S, true),
        ("datastore", R("Datastore"), true),
        ("network", R("Network"), true),
        ("parentFolder", R("Folder"), false),
        ("parentVApp", R("ManagedEntity"), false),
        ("vAppConfig", S, false),
    ]),
    ("VirtualMachine", Some("ManagedEntity"), &[
        ("capability", S, false),
        ("config", S, false),
        ("datastore", R("Datastore"), true),
        ("environmentBrowser", R("EnvironmentBrowser"), false),
        ("guest", S, false),
        ("guestHeartbeatStatus", S, false),
        ("layout", S, false),
        ("layoutEx", S, false),
        ("network", R("Network"), true),
        ("parentVApp", R("ManagedEntity"), false),
        ("resourceConfig", S, false),
        ("resourcePool", R("ResourcePool"), false),
        ("rootSnapshot", R("VirtualMachineSnapshot"), true),
        ("runtime", S, false),
        ("snapshot", S, false),
        ("storage", S, false),
        ("summary", S, false),
    ]),
    ("Datastore", Some("ManagedEntity"), &[
        ("browser", R("HostDatastoreBrowser"), false),
        ("capability", S, false),
        ("host", S, true),
        ("info", S, false),
        ("iormConfiguration", S, false),
        ("summary", S, false),
        ("vm", R("VirtualMachine"), true),
    ]),
    ("Network", Some("ManagedEntity"), &[
        ("host", R("HostSystem"), true),
        ("name", S, false),
        ("summary", S, false),
        ("vm", R("VirtualMachine"), true),
    ]),
    ("OpaqueNetwork", Some("Network"), &[
        ("capability", S, false),
        ("extraConfig", S, true),
    ]),
    ("DistributedVirtualPortgroup", Some("Network"), &[
        ("config", S, false),
        ("key", S, false),
        ("portKeys", S, true),
    ]),
    ("DistributedVirtualSwitch", Some("ManagedEntity"), &[
        ("capability", S, false),
        ("config", S, false),
        ("networkResourcePool", S, true),
        ("portgroup", R("DistributedVirtualPortgroup"), true),
        ("summary", S, false),
        ("uuid", S, false),
    ]),
    ("VmwareDistributedVirtualSwitch", Some("DistributedVirtualSwitch"), &[]),

    // ── Tasks, alarms, snapshots ────────────────────────────────────
    ("Task", Some("ExtensibleManagedObject"), &[("info", S, false)]),
    ("ScheduledTask", Some("ExtensibleManagedObject"), &[("info", S, false)]),
    ("Alarm", Some("ExtensibleManagedObject"), &[("info", S, false)]),
    ("VirtualMachineSnapshot", Some("ExtensibleManagedObject"), &[
        ("childSnapshot", R("VirtualMachineSnapshot"), true),
        ("config", S, false),
        ("vm", R("VirtualMachine"), false),
    ]),
    ("HistoryCollector", Some("ManagedObject"), &[("filter", S, false)]),
    ("EventHistoryCollector", Some("HistoryCollector"), &[("latestPage", S, true)]),
    ("TaskHistoryCollector", Some("HistoryCollector"), &[("latestPage", S, true)]),
    ("HttpNfcLease", Some("ManagedObject"), &[
        ("error", S, false),
        ("info", S, false),
        ("initializeProgress", S, false),
        ("state", S, false),
    ]),

    // ── Service singletons ──────────────────────────────────────────
    ("ServiceInstance", Some("ManagedObject"), &[
        ("capability", S, false),
        ("content", S, false),
        ("serverClock", S, false),
    ]),
    ("SessionManager", Some("ManagedObject"), &[
        ("currentSession", S, false),
        ("defaultLocale", S, false),
        ("message", S, false),
        ("messageLocaleList", S, true),
        ("sessionList", S, true),
        ("supportedLocaleList", S, true),
    ]),
    ("PropertyCollector", Some("ManagedObject"), &[("filter", R("PropertyFilter"), true)]),
    ("PropertyFilter", Some("ManagedObject"), &[
        ("partialUpdates", S, false),
        ("spec", S, false),
    ]),
    ("TaskManager", Some("ManagedObject"), &[
        ("description", S, false),
        ("maxCollector", S, false),
        ("recentTask", R("Task"), true),
    ]),
    ("ScheduledTaskManager", Some("ManagedObject"), &[
        ("description", S, false),
        ("scheduledTask", R("ScheduledTask"), true),
    ]),
    ("EventManager", Some("ManagedObject"), &[
        ("description", S, false),
        ("latestEvent", S, false),
        ("maxCollector", S, false),
    ]),
    ("AlarmManager", Some("ManagedObject"), &[
        ("defaultExpression", S, true),
        ("description", S, false),
    ]),
    ("AuthorizationManager", Some("ManagedObject"), &[
        ("description", S, false),
        ("privilegeList", S, true),
        ("roleList", S, true),
    ]),
    ("CustomFieldsManager", Some("ManagedObject"), &[("field", S, true)]),
    ("CustomizationSpecManager", Some("ManagedObject"), &[
        ("encryptionKey", S, true),
        ("info", S, true),
    ]),
    ("DiagnosticManager", Some("ManagedObject"), &[]),
    ("DistributedVirtualSwitchManager", Some("ManagedObject"), &[]),
    ("ExtensionManager", Some("ManagedObject"), &[("extensionList", S, true)]),
    ("FileManager", Some("ManagedObject"), &[]),
    ("IpPoolManager", Some("ManagedObject"), &[]),
    ("LicenseAssignmentManager", Some("ManagedObject"), &[]),
    ("LicenseManager", Some("ManagedObject"), &[
        ("diagnostics", S, false),
        ("evaluation", S, false),
        ("featureInfo", S, true),
        ("licenseAssignmentManager", R("LicenseAssignmentManager"), false),
        ("licensedEdition", S, false),
        ("licenses", S, true),
        ("source", S, false),
        ("sourceAvailable", S, false),
    ]),
    ("LocalizationManager", Some("ManagedObject"), &[("catalog", S, true)]),
    ("OptionManager", Some("ManagedObject"), &[
        ("setting", S, true),
        ("supportedOption", S, true),
    ]),
    ("OvfManager", Some("ManagedObject"), &[]),
    ("PerformanceManager", Some("ManagedObject"), &[
        ("description", S, false),
        ("historicalInterval", S, true),
        ("perfCounter", S, true),
    ]),
    ("ResourcePlanningManager", Some("ManagedObject"), &[]),
    ("SearchIndex", Some("ManagedObject"), &[]),
    ("StorageResourceManager", Some("ManagedObject"), &[]),
    ("UserDirectory", Some("ManagedObject"), &[("domainList", S, true)]),
    ("VirtualDiskManager", Some("ManagedObject"), &[]),
    ("VirtualizationManager", Some("ManagedObject"), &[]),
    ("VirtualMachineCompatibilityChecker", Some("ManagedObject"), &[]),
    ("VirtualMachineProvisioningChecker", Some("ManagedObject"), &[]),
    ("EnvironmentBrowser", Some("ManagedObject"), &[
        ("datastoreBrowser", R("HostDatastoreBrowser"), false),
    ]),

    // ── Views ───────────────────────────────────────────────────────
    ("ViewManager", Some("ManagedObject"), &[("viewList", R("View"), true)]),
    ("View", Some("ManagedObject"), &[]),
    ("ManagedObjectView", Some("View"), &[("view", R("ManagedObject"), true)]),
    ("ContainerView", Some("ManagedObjectView"), &[
        ("container", R("ManagedEntity"), false),
        ("recursive", S, false),
        ("type", S, true),
    ]),
    ("InventoryView", Some("ManagedObjectView"), &[]),
    ("ListView", Some("ManagedObjectView"), &[]),

    // ── Profiles ────────────────────────────────────────────────────
    ("Profile", Some("ManagedObject"), &[
        ("complianceStatus", S, false),
        ("config", S, false),
        ("createdTime", S, false),
        ("description", S, false),
        ("entity", R("ManagedEntity"), true),
        ("modifiedTime", S, false),
        ("name", S, false),
    ]),
    ("ClusterProfile", Some("Profile"), &[]),
    ("HostProfile", Some("Profile"), &[("referenceHost", R("HostSystem"), false)]),
    ("ProfileComplianceManager", Some("ManagedObject"), &[]),
    ("ProfileManager", Some("ManagedObject"), &[("profile", R("Profile"), true)]),
    ("ClusterProfileManager", Some("ProfileManager"), &[]),
    ("HostProfileManager", Some("ProfileManager"), &[]),

    // ── Host subsystems ─────────────────────────────────────────────
    ("HostDatastoreBrowser", Some("ManagedObject"), &[
        ("datastore", R("Datastore"), true),
        ("supportedType", S, true),
    ]),
    ("HostDatastoreSystem", Some("ManagedObject"), &[
        ("capabilities", S, false),
        ("datastore", R("Datastore"), true),
    ]),
    ("HostAutoStartManager", Some("ManagedObject"), &[("config", S, false)]),
    ("HostBootDeviceSystem", Some("ManagedObject"), &[]),
    ("HostDateTimeSystem", Some("ManagedObject"), &[("dateTimeInfo", S, false)]),
    ("HostDiagnosticSystem", Some("ManagedObject"), &[("activePartition", S, false)]),
    ("HostFirmwareSystem", Some("ManagedObject"), &[]),
    ("HostHealthStatusSystem", Some("ManagedObject"), &[("runtime", S, false)]),
    ("HostKernelModuleSystem", Some("ManagedObject"), &[]),
    ("HostLocalAccountManager", Some("ManagedObject"), &[]),
    ("HostPatchManager", Some("ManagedObject"), &[]),
    ("HostPowerSystem", Some("ManagedObject"), &[
        ("capability", S, false),
        ("info", S, false),
    ]),
    ("HostSnmpSystem", Some("ManagedObject"), &[
        ("configuration", S, false),
        ("limits", S, false),
    ]),
    ("HostCpuSchedulerSystem", Some("ExtensibleManagedObject"), &[("hyperThreadInfo", S, false)]),
    ("HostFirewallSystem", Some("ExtensibleManagedObject"), &[("firewallInfo", S, false)]),
    ("HostMemorySystem", Some("ExtensibleManagedObject"), &[
        ("consoleReservationInfo", S, false),
        ("virtualMachineReservationInfo", S, false),
    ]),
    ("HostNetworkSystem", Some("ExtensibleManagedObject"), &[
        ("capabilities", S, false),
        ("consoleIpRouteConfig", S, false),
        ("dnsConfig", S, false),
        ("ipRouteConfig", S, false),
        ("networkConfig", S, false),
        ("networkInfo", S, false),
        ("offloadCapabilities", S, false),
    ]),
    ("HostPciPassthruSystem", Some("ExtensibleManagedObject"), &[("pciPassthruInfo", S, true)]),
    ("HostServiceSystem", Some("ExtensibleManagedObject"), &[("serviceInfo", S, false)]),
    ("HostStorageSystem", Some("ExtensibleManagedObject"), &[
        ("fileSystemVolumeInfo", S, false),
        ("multipathStateInfo", S, false),
        ("storageDeviceInfo", S, false),
    ]),
    ("HostVirtualNicManager", Some("ExtensibleManagedObject"), &[("info", S, false)]),
    ("HostVMotionSystem", Some("ExtensibleManagedObject"), &[
        ("ipConfig", S, false),
        ("netConfig", S, false),
    ]),
    ("HostAuthenticationManager", Some("ManagedObject"), &[
        ("info", S, false),
        ("supportedStore", R("HostAuthenticationStore"), true),
    ]),
    ("HostAuthenticationStore", Some("ManagedObject"), &[("info", S, false)]),
    ("HostDirectoryStore", Some("HostAuthenticationStore"), &[]),
    ("HostLocalAuthentication", Some("HostAuthenticationStore"), &[]),
    ("HostActiveDirectoryAuthentication", Some("HostDirectoryStore"), &[]),
];
