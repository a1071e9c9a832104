//! Shared types: object references, decoded wire values, service content.

use crate::error::{VsphereError, VsphereResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Object references
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity of one server-side managed object (e.g. `HostSystem:host-42`).
///
/// Carries no data. Two references are equal iff type and id are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedObjectReference {
    /// Managed-object type name as reported by the server
    #[serde(rename = "type")]
    pub type_name: String,
    /// Opaque server-assigned id (e.g. "vm-42")
    pub value: String,
}

impl ManagedObjectReference {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }

    /// The well-known `ServiceInstance` singleton every session starts from.
    pub fn service_instance() -> Self {
        Self::new("ServiceInstance", "ServiceInstance")
    }
}

impl fmt::Display for ManagedObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.value)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Decoded values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A value as it travels to and from the server.
///
/// References are always `Ref`, never an untyped record.
#[derive(Debug, Clone, PartialEq)]
pub enum VimValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Ref(ManagedObjectReference),
    Object(DataObject),
    List(Vec<VimValue>),
}

/// A structured (non-managed) data object, e.g. `TaskInfo` or a spec.
///
/// Field order is significant on the wire (XSD sequences).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataObject {
    /// `xsi:type`, when the object is polymorphic
    pub type_name: Option<String>,
    pub fields: Vec<(String, VimValue)>,
}

impl DataObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields: Vec::new(),
        }
    }

    /// An object without an `xsi:type` (the element's declared type applies).
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Builder-style field append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VimValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&VimValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Replace the named field, or append it when absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<VimValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }
}

impl VimValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_moref(&self) -> Option<&ManagedObjectReference> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DataObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[VimValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// View any value as a sequence: a list's items, nothing for `Null`,
    /// or the value itself.
    pub fn items(&self) -> &[VimValue] {
        match self {
            Self::List(items) => items,
            Self::Null => &[],
            other => std::slice::from_ref(other),
        }
    }

    /// Field of a data object; `None` for anything else.
    pub fn field(&self, name: &str) -> Option<&VimValue> {
        self.as_object().and_then(|o| o.field(name))
    }

    /// Follow a dotted path through nested data objects
    /// (`"summary.runtime.powerState"`).
    pub fn path(&self, dotted: &str) -> Option<&VimValue> {
        dotted
            .split('.')
            .try_fold(self, |value, segment| value.field(segment))
    }

    /// Every reference contained in this value (a `Ref` or a list of them).
    pub fn references(&self) -> Vec<ManagedObjectReference> {
        match self {
            Self::Ref(r) => vec![r.clone()],
            Self::List(items) => items.iter().flat_map(|v| v.references()).collect(),
            _ => Vec::new(),
        }
    }

    /// Lossy conversion for display / export.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int(i) => J::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Self::String(s) => J::String(s.clone()),
            Self::DateTime(dt) => J::String(dt.to_rfc3339()),
            Self::Ref(r) => serde_json::json!({ "type": r.type_name, "value": r.value }),
            Self::Object(o) => {
                let mut map = serde_json::Map::new();
                if let Some(ref t) = o.type_name {
                    map.insert("_type".into(), J::String(t.clone()));
                }
                for (k, v) in &o.fields {
                    map.insert(k.clone(), v.to_json());
                }
                J::Object(map)
            }
            Self::List(items) => J::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

impl From<&str> for VimValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for VimValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for VimValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for VimValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for VimValue {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<f64> for VimValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<ManagedObjectReference> for VimValue {
    fn from(r: ManagedObjectReference) -> Self {
        Self::Ref(r)
    }
}

impl From<&ManagedObjectReference> for VimValue {
    fn from(r: &ManagedObjectReference) -> Self {
        Self::Ref(r.clone())
    }
}

impl From<DataObject> for VimValue {
    fn from(o: DataObject) -> Self {
        Self::Object(o)
    }
}

impl From<Vec<VimValue>> for VimValue {
    fn from(items: Vec<VimValue>) -> Self {
        Self::List(items)
    }
}

impl<T: Into<VimValue>> From<Option<T>> for VimValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Service content / session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Product information from `ServiceContent.about`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    pub full_name: String,
    pub api_version: String,
    pub api_type: String,
    pub version: String,
    pub build: String,
    pub instance_uuid: Option<String>,
}

/// The well-known managers returned by `RetrieveServiceContent`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceContent {
    pub root_folder: ManagedObjectReference,
    pub property_collector: ManagedObjectReference,
    pub session_manager: Option<ManagedObjectReference>,
    pub search_index: Option<ManagedObjectReference>,
    pub view_manager: Option<ManagedObjectReference>,
    pub task_manager: Option<ManagedObjectReference>,
    pub license_manager: Option<ManagedObjectReference>,
    pub about: AboutInfo,
}

impl ServiceContent {
    /// Decode the `ServiceContent` data object.
    pub fn from_value(value: &VimValue) -> VsphereResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| VsphereError::parse("ServiceContent is not a data object"))?;
        let required = |name: &str| {
            obj.field(name)
                .and_then(VimValue::as_moref)
                .cloned()
                .ok_or_else(|| VsphereError::parse(format!("ServiceContent.{name} missing")))
        };
        let optional = |name: &str| obj.field(name).and_then(VimValue::as_moref).cloned();
        let about = obj.field("about").map(AboutInfo::from_value).unwrap_or_default();

        Ok(Self {
            root_folder: required("rootFolder")?,
            property_collector: required("propertyCollector")?,
            session_manager: optional("sessionManager"),
            search_index: optional("searchIndex"),
            view_manager: optional("viewManager"),
            task_manager: optional("taskManager"),
            license_manager: optional("licenseManager"),
            about,
        })
    }
}

impl AboutInfo {
    fn from_value(value: &VimValue) -> Self {
        let text = |name: &str| {
            value
                .field(name)
                .and_then(VimValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            full_name: text("fullName"),
            api_version: text("apiVersion"),
            api_type: text("apiType"),
            version: text("version"),
            build: text("build"),
            instance_uuid: value
                .field("instanceUuid")
                .and_then(VimValue::as_str)
                .map(str::to_string),
        }
    }
}

/// The `UserSession` returned by `Login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub key: String,
    pub user_name: String,
    pub full_name: String,
    pub login_time: Option<DateTime<Utc>>,
}

impl UserSession {
    pub fn from_value(value: &VimValue) -> Self {
        let text = |name: &str| {
            value
                .field(name)
                .and_then(VimValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            key: text("key"),
            user_name: text("userName"),
            full_name: text("fullName"),
            login_time: match value.field("loginTime") {
                Some(VimValue::DateTime(dt)) => Some(*dt),
                _ => None,
            },
        }
    }
}
