//! Datastore lookup and placement checks.

use crate::entity::Entity;
use crate::error::{VsphereError, VsphereResult};
use crate::invoker::arg;
use crate::types::{DataObject, VimValue};
use crate::vsphere::VsphereClient;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

/// One file found by a datastore search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreFile {
    /// `[datastore] folder/` the file sits in
    pub folder_path: String,
    pub path: String,
    pub size: Option<i64>,
    pub modified: Option<DateTime<Utc>>,
}

impl DatastoreFile {
    /// `[datastore] folder/file`
    pub fn full_path(&self) -> String {
        match self.folder_path.chars().last() {
            None | Some('/') => format!("{}{}", self.folder_path, self.path),
            Some(']') => format!("{} {}", self.folder_path, self.path),
            Some(_) => format!("{}/{}", self.folder_path, self.path),
        }
    }
}

/// Datastore operations.
pub struct StorageManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> StorageManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── Datastores ──────────────────────────────────────────────────

    /// The datastore called `name` among those of `compute_resource`
    /// (a host, cluster or anything else with a `datastore` property),
    /// with `info` and `summary` loaded.
    pub async fn find_datastore(&self, compute_resource: &mut Entity, name: &str) -> VsphereResult<Entity> {
        let datastores = compute_resource.preload("datastore", &["info", "summary"]).await?;
        datastores
            .into_iter()
            .find(|ds| summary_field(ds, "name").and_then(VimValue::as_str) == Some(name))
            .ok_or_else(|| {
                VsphereError::not_found(format!(
                    "No datastore '{name}' on {}",
                    compute_resource.moref()
                ))
            })
    }

    /// A datastore of `entity` that is accessible and has at least
    /// `required_kb` free. With `name` only that datastore is considered;
    /// without it the first suitable one wins.
    pub async fn select_datastore(
        &self,
        entity: &mut Entity,
        name: Option<&str>,
        required_kb: i64,
    ) -> VsphereResult<Entity> {
        let datastores = entity.preload("datastore", &["summary"]).await?;

        if let Some(wanted) = name {
            let ds = datastores
                .into_iter()
                .find(|ds| summary_field(ds, "name").and_then(VimValue::as_str) == Some(wanted))
                .ok_or_else(|| {
                    VsphereError::not_found(format!("No datastore '{wanted}' on {}", entity.moref()))
                })?;
            return check_suitable(&ds, required_kb).map(|_| ds);
        }

        for ds in datastores {
            match check_suitable(&ds, required_kb) {
                Ok(()) => return Ok(ds),
                Err(e) => debug!("skipping {}: {}", ds.moref(), e.message),
            }
        }
        Err(VsphereError::not_found(format!(
            "No accessible datastore on {} with {required_kb} KB free",
            entity.moref()
        )))
    }

    // ── Files ───────────────────────────────────────────────────────

    /// Files anywhere on `datastore` whose name matches the glob `pattern`
    /// (`*.vmx`, `*`), found with `SearchDatastoreSubFolders_Task` on the
    /// datastore's browser.
    pub async fn search_files(&self, datastore: &mut Entity, pattern: &str) -> VsphereResult<Vec<DatastoreFile>> {
        self.search(datastore, "", pattern, true).await
    }

    /// Files directly in `folder` (relative to the datastore root) matching
    /// `pattern`, found with `SearchDatastore_Task`.
    pub async fn search_folder(
        &self,
        datastore: &mut Entity,
        folder: &str,
        pattern: &str,
    ) -> VsphereResult<Vec<DatastoreFile>> {
        self.search(datastore, folder, pattern, false).await
    }

    async fn search(
        &self,
        datastore: &mut Entity,
        folder: &str,
        pattern: &str,
        recursive: bool,
    ) -> VsphereResult<Vec<DatastoreFile>> {
        datastore.get_many(&["name", "browser"]).await?;
        let name = datastore
            .cached("name")
            .and_then(VimValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| VsphereError::not_found(format!("{} has no name", datastore.moref())))?;
        let browser = datastore.get_reference("browser").await?.ok_or_else(|| {
            VsphereError::not_found(format!("Datastore '{name}' has no browser"))
        })?;

        let operation = if recursive {
            "SearchDatastoreSubFolders_Task"
        } else {
            "SearchDatastore_Task"
        };
        let path = format!("[{name}] {}", folder.trim_start_matches('/'));
        info!("{operation} {path} for '{pattern}'");
        let task = self
            .client
            .invoke_task(
                operation,
                browser.moref(),
                &[arg("datastorePath", path.as_str()), arg("searchSpec", search_spec(pattern))],
                None,
            )
            .await?;

        let files: Vec<DatastoreFile> = task
            .result
            .as_ref()
            .map(VimValue::items)
            .unwrap_or_default()
            .iter()
            .flat_map(files_of)
            .collect();
        debug!("{operation} on '{name}' found {} file(s)", files.len());
        Ok(files)
    }

    /// `summary.freeSpace` in bytes of the datastore called `name`.
    pub async fn free_space(&self, name: &str) -> VsphereResult<i64> {
        let mut ds = self
            .client
            .find_entity_view("Datastore", &[("name", VimValue::from(name))], None, Some(&["summary"][..]))
            .await?;
        let summary = ds.get_value("summary").await?;
        summary
            .field("freeSpace")
            .and_then(VimValue::as_i64)
            .ok_or_else(|| VsphereError::parse(format!("Datastore '{name}' reports no free space")))
    }
}

/// `HostDatastoreBrowserSearchSpec`, fields in XSD order.
fn search_spec(pattern: &str) -> DataObject {
    DataObject::new("HostDatastoreBrowserSearchSpec")
        .with(
            "details",
            DataObject::new("FileQueryFlags")
                .with("fileType", true)
                .with("fileSize", true)
                .with("modification", true)
                .with("fileOwner", false),
        )
        .with("searchCaseInsensitive", false)
        .with("matchPattern", VimValue::List(vec![pattern.into()]))
        .with("sortFoldersFirst", false)
}

/// Files of one `HostDatastoreBrowserSearchResults`.
fn files_of(results: &VimValue) -> Vec<DatastoreFile> {
    let folder_path = results
        .field("folderPath")
        .and_then(VimValue::as_str)
        .unwrap_or_default();
    results
        .field("file")
        .map(VimValue::items)
        .unwrap_or_default()
        .iter()
        .filter_map(|f| {
            let path = f.field("path").and_then(VimValue::as_str)?;
            Some(DatastoreFile {
                folder_path: folder_path.to_string(),
                path: path.to_string(),
                size: f.field("fileSize").and_then(VimValue::as_i64),
                modified: match f.field("modification") {
                    Some(VimValue::DateTime(t)) => Some(*t),
                    Some(VimValue::String(s)) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc)),
                    _ => None,
                },
            })
        })
        .collect()
}

fn summary_field<'e>(ds: &'e Entity, field: &str) -> Option<&'e VimValue> {
    ds.cached("summary").and_then(|s| s.field(field))
}

fn check_suitable(ds: &Entity, required_kb: i64) -> VsphereResult<()> {
    let label = summary_field(ds, "name")
        .and_then(VimValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| ds.moref().to_string());
    if summary_field(ds, "accessible").and_then(VimValue::as_bool) != Some(true) {
        return Err(VsphereError::invalid_argument(format!(
            "Datastore '{label}' is not accessible"
        )));
    }
    let free_kb = summary_field(ds, "freeSpace")
        .and_then(VimValue::as_i64)
        .unwrap_or(0)
        / 1024;
    if free_kb < required_kb {
        return Err(VsphereError::invalid_argument(format!(
            "Datastore '{label}' has {free_kb} KB free, {required_kb} KB required"
        )));
    }
    Ok(())
}
