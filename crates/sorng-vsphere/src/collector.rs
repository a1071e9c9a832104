//! Property collector: runs filter specs through `RetrievePropertiesEx` and
//! turns the results into per-object property maps.

use crate::error::{VsphereError, VsphereResult};
use crate::invoker::{arg, Invoker};
use crate::traversal::{self, PropertyFilterSpec, PropertySelection};
use crate::types::{DataObject, ManagedObjectReference, VimValue};

use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Property name to raw (decoded) value.
pub type PropertyMap = BTreeMap<String, VimValue>;

/// One object's slice of a retrieve result.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectContent {
    pub obj: ManagedObjectReference,
    pub props: PropertyMap,
    /// Requested paths the server could not read
    pub missing: Vec<String>,
}

impl ObjectContent {
    fn from_value(value: &VimValue) -> VsphereResult<Self> {
        let obj = value
            .field("obj")
            .and_then(VimValue::as_moref)
            .cloned()
            .ok_or_else(|| VsphereError::parse("ObjectContent without obj"))?;

        let mut props = PropertyMap::new();
        for prop in value.field("propSet").map(VimValue::items).unwrap_or_default() {
            let Some(name) = prop.field("name").and_then(VimValue::as_str) else {
                continue;
            };
            let val = prop.field("val").cloned().unwrap_or(VimValue::Null);
            props.insert(name.to_string(), val);
        }

        let missing = value
            .field("missingSet")
            .map(VimValue::items)
            .unwrap_or_default()
            .iter()
            .filter_map(|m| {
                let path = m.field("path").and_then(VimValue::as_str)?;
                let fault = m
                    .path("fault.fault")
                    .and_then(VimValue::as_object)
                    .and_then(|f| f.type_name.clone())
                    .unwrap_or_else(|| "unknown fault".into());
                debug!("{obj}: property '{path}' not readable ({fault})");
                Some(path.to_string())
            })
            .collect();

        Ok(Self { obj, props, missing })
    }
}

/// Query engine bound to one session's property collector.
#[derive(Clone)]
pub struct PropertyCollector {
    invoker: Arc<dyn Invoker>,
    this: ManagedObjectReference,
    root_folder: ManagedObjectReference,
}

impl PropertyCollector {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        this: ManagedObjectReference,
        root_folder: ManagedObjectReference,
    ) -> Self {
        Self {
            invoker,
            this,
            root_folder,
        }
    }

    pub fn root_folder(&self) -> &ManagedObjectReference {
        &self.root_folder
    }

    /// Run one filter spec, following continuation tokens until the result
    /// set is exhausted.
    pub async fn retrieve(&self, spec: &PropertyFilterSpec) -> VsphereResult<Vec<ObjectContent>> {
        let args = vec![
            arg("specSet", spec.to_value()),
            arg("options", DataObject::untyped()),
        ];
        let mut page = self
            .invoker
            .invoke("RetrievePropertiesEx", &self.this, &args)
            .await?;

        let mut out = Vec::new();
        loop {
            if page.is_null() {
                break;
            }
            for object in page.field("objects").map(VimValue::items).unwrap_or_default() {
                out.push(ObjectContent::from_value(object)?);
            }
            let Some(token) = page.field("token").and_then(VimValue::as_str).map(str::to_string) else {
                break;
            };
            debug!("continuing retrieve after {} object(s)", out.len());
            page = self
                .invoker
                .invoke("ContinueRetrievePropertiesEx", &self.this, &[arg("token", token)])
                .await?;
        }
        Ok(out)
    }

    /// Every object of `type_name` reachable from `start` (root folder by
    /// default), with `selection` populated.
    pub async fn find_all_with(
        &self,
        type_name: &str,
        start: Option<&ManagedObjectReference>,
        selection: PropertySelection,
    ) -> VsphereResult<Vec<ObjectContent>> {
        let start = start.unwrap_or(&self.root_folder);
        let spec = traversal::build_traversal(start, type_name, selection);
        self.retrieve(&spec).await
    }

    /// References of every object of `type_name` reachable from `start`.
    pub async fn find_all(
        &self,
        type_name: &str,
        start: Option<&ManagedObjectReference>,
    ) -> VsphereResult<Vec<ManagedObjectReference>> {
        let found = self
            .find_all_with(type_name, start, PropertySelection::Named(Vec::new()))
            .await?;
        Ok(found.into_iter().map(|c| c.obj).collect())
    }

    /// First object of `type_name` whose properties equal every filter
    /// entry. The whole result set is scanned before giving up.
    pub async fn find_one(
        &self,
        type_name: &str,
        filter: &[(&str, VimValue)],
        start: Option<&ManagedObjectReference>,
    ) -> VsphereResult<ObjectContent> {
        if filter.is_empty() {
            return Err(VsphereError::invalid_argument(format!(
                "Refusing to search {type_name} with an empty filter"
            )));
        }
        let names: Vec<&str> = filter.iter().map(|(k, _)| *k).collect();
        let candidates = self
            .find_all_with(type_name, start, PropertySelection::named(&names))
            .await?;
        let total = candidates.len();

        let mut matches = candidates
            .into_iter()
            .filter(|c| filter.iter().all(|(k, v)| c.props.get(*k) == Some(v)));
        let first = matches.next().ok_or_else(|| {
            VsphereError::not_found(format!(
                "No {type_name} matching {} among {total} candidate(s)",
                describe_filter(filter)
            ))
        })?;
        let extra = matches.count();
        if extra > 0 {
            warn!(
                "{} {type_name} objects match {}; using {}",
                extra + 1,
                describe_filter(filter),
                first.obj
            );
        }
        Ok(first)
    }

    /// Read properties from one or many references in a single request.
    pub async fn fetch_properties(
        &self,
        refs: &[ManagedObjectReference],
        selection: &PropertySelection,
    ) -> VsphereResult<BTreeMap<ManagedObjectReference, PropertyMap>> {
        self.fetch_properties_by_type(refs, |_| selection.clone()).await
    }

    /// Like [`Self::fetch_properties`], choosing the selection per type.
    pub async fn fetch_properties_by_type(
        &self,
        refs: &[ManagedObjectReference],
        selection: impl Fn(&str) -> PropertySelection,
    ) -> VsphereResult<BTreeMap<ManagedObjectReference, PropertyMap>> {
        if refs.is_empty() {
            return Ok(BTreeMap::new());
        }
        let spec = traversal::for_objects(refs, selection);
        let contents = self.retrieve(&spec).await?;
        Ok(contents.into_iter().map(|c| (c.obj, c.props)).collect())
    }
}

fn describe_filter(filter: &[(&str, VimValue)]) -> String {
    filter
        .iter()
        .map(|(k, v)| format!("{k}={}", v.to_json()))
        .collect::<Vec<_>>()
        .join(", ")
}
