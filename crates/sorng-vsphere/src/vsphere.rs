//! vSphere SOAP client with session-based authentication.
//!
//! Talks to vCenter / ESXi via `https://{host}/sdk`. On connect it reads the
//! `ServiceContent` (root folder, property collector, managers) and logs in
//! through the session manager; the session cookie is kept by the transport.

use crate::catalog::{is_task_operation, TypeCatalog};
use crate::collector::PropertyCollector;
use crate::config::VsphereConfig;
use crate::entity::Entity;
use crate::error::{VsphereError, VsphereResult};
use crate::invoker::{arg, Invoker, SoapInvoker};
use crate::task::{PollConfig, Task, TaskInfo};
use crate::transport::HttpTransport;
use crate::traversal::PropertySelection;
use crate::types::{AboutInfo, ManagedObjectReference, ServiceContent, UserSession, VimValue};

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-client behaviour that is not connection detail.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub poll: PollConfig,
    /// How long a cached entity property stays fresh; `None` keeps it
    /// until refreshed
    pub cache_ttl: Option<Duration>,
}

#[cfg(test)]
impl ClientOptions {
    pub(crate) fn fast() -> Self {
        Self {
            poll: PollConfig::default()
                .with_interval(Duration::from_millis(1))
                .with_timeout(Duration::from_secs(5)),
            cache_ttl: None,
        }
    }
}

struct Inner {
    invoker: Arc<dyn Invoker>,
    content: ServiceContent,
    collector: PropertyCollector,
    catalog: &'static TypeCatalog,
    options: ClientOptions,
    session: RwLock<Option<UserSession>>,
}

/// One server session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct VsphereClient {
    inner: Arc<Inner>,
}

impl VsphereClient {
    /// Connect over HTTPS and log in with the configured credentials.
    pub async fn connect(config: &VsphereConfig) -> VsphereResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.sdk_url()?, &config.http_options())?;
        let invoker: Arc<dyn Invoker> = Arc::new(SoapInvoker::new(transport));

        let client = Self::with_invoker(invoker, config.client_options()).await?;
        client.login(&config.username, &config.password).await?;
        Ok(client)
    }

    /// Build a client over any invoker. Reads the service content but does
    /// not log in.
    pub async fn with_invoker(invoker: Arc<dyn Invoker>, options: ClientOptions) -> VsphereResult<Self> {
        let value = invoker
            .invoke("RetrieveServiceContent", &ManagedObjectReference::service_instance(), &[])
            .await?;
        let content = ServiceContent::from_value(&value)?;
        info!(
            "Connected to {} (API {})",
            content.about.full_name, content.about.api_version
        );

        let collector = PropertyCollector::new(
            invoker.clone(),
            content.property_collector.clone(),
            content.root_folder.clone(),
        );
        Ok(Self {
            inner: Arc::new(Inner {
                invoker,
                content,
                collector,
                catalog: TypeCatalog::vim25(),
                options,
                session: RwLock::new(None),
            }),
        })
    }

    pub fn service_content(&self) -> &ServiceContent {
        &self.inner.content
    }

    pub fn about(&self) -> &AboutInfo {
        &self.inner.content.about
    }

    pub fn root_folder(&self) -> &ManagedObjectReference {
        &self.inner.content.root_folder
    }

    pub fn catalog(&self) -> &'static TypeCatalog {
        self.inner.catalog
    }

    pub fn collector(&self) -> &PropertyCollector {
        &self.inner.collector
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    // ── Session management ──────────────────────────────────────────

    fn session_manager(&self) -> VsphereResult<&ManagedObjectReference> {
        self.inner
            .content
            .session_manager
            .as_ref()
            .ok_or_else(|| VsphereError::auth("Server exposes no session manager"))
    }

    /// `Login` on the session manager.
    pub async fn login(&self, username: &str, password: &str) -> VsphereResult<UserSession> {
        let session_manager = self.session_manager()?.clone();
        let value = self
            .invoke(
                "Login",
                &session_manager,
                &[arg("userName", username), arg("password", password)],
            )
            .await?;
        let session = UserSession::from_value(&value);
        info!("Logged in as {}", session.user_name);
        if let Ok(mut slot) = self.inner.session.write() {
            *slot = Some(session.clone());
        }
        Ok(session)
    }

    /// `Logout`; a no-op without a session.
    pub async fn logout(&self) -> VsphereResult<()> {
        if !self.is_logged_in() {
            return Ok(());
        }
        let session_manager = self.session_manager()?.clone();
        self.invoke("Logout", &session_manager, &[]).await?;
        if let Ok(mut slot) = self.inner.session.write() {
            *slot = None;
        }
        debug!("Logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner
            .session
            .read()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn session(&self) -> Option<UserSession> {
        self.inner.session.read().ok().and_then(|s| s.clone())
    }

    /// Server clock.
    pub async fn current_time(&self) -> VsphereResult<DateTime<Utc>> {
        let value = self
            .invoke("CurrentTime", &ManagedObjectReference::service_instance(), &[])
            .await?;
        match value {
            VimValue::DateTime(dt) => Ok(dt),
            VimValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| VsphereError::parse(format!("Bad CurrentTime '{s}': {e}"))),
            other => Err(VsphereError::parse(format!("Unexpected CurrentTime value {other:?}"))),
        }
    }

    /// `QuerySupportedFeatures` on the license manager: one
    /// `LicenseFeatureInfo` per feature.
    pub async fn supported_features(&self) -> VsphereResult<Vec<VimValue>> {
        let license_manager = self
            .inner
            .content
            .license_manager
            .clone()
            .ok_or_else(|| VsphereError::not_found("Server exposes no license manager"))?;
        let value = self.invoke("QuerySupportedFeatures", &license_manager, &[]).await?;
        Ok(value.items().to_vec())
    }

    // ── Views ───────────────────────────────────────────────────────

    /// An empty view of `moref`; nothing is fetched until read.
    pub fn entity(&self, moref: &ManagedObjectReference) -> VsphereResult<Entity> {
        Entity::new(self.clone(), moref.clone())
    }

    pub fn task(&self, moref: &ManagedObjectReference) -> VsphereResult<Task> {
        Task::new(self.entity(moref)?, self.inner.options.poll.clone())
    }

    /// A view of `moref` populated with `properties` (all declared ones when
    /// `None`) in one request.
    pub async fn get_view(
        &self,
        moref: &ManagedObjectReference,
        properties: Option<&[&str]>,
    ) -> VsphereResult<Entity> {
        let mut entity = self.entity(moref)?;
        entity.refresh(properties).await?;
        Ok(entity)
    }

    /// Views of many objects, possibly of different types, populated in one
    /// request. Results keep the order of `morefs`.
    pub async fn get_views(
        &self,
        morefs: &[ManagedObjectReference],
        properties: Option<&[&str]>,
    ) -> VsphereResult<Vec<Entity>> {
        let mut entities = morefs
            .iter()
            .map(|r| self.entity(r))
            .collect::<VsphereResult<Vec<_>>>()?;

        let mut by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entity in &entities {
            if by_type.contains_key(entity.type_name()) {
                continue;
            }
            let names = self.property_names(entity.type_name(), properties)?;
            by_type.insert(entity.type_name().to_string(), names);
        }

        let mut found = self
            .collector()
            .fetch_properties_by_type(morefs, |t| {
                PropertySelection::Named(by_type.get(t).cloned().unwrap_or_default())
            })
            .await?;
        for entity in &mut entities {
            let props = found.remove(entity.moref()).unwrap_or_default();
            let requested = by_type.get(entity.type_name()).cloned().unwrap_or_default();
            entity.set_view_data(&requested, props);
        }
        Ok(entities)
    }

    /// Every `type_name` object under `start` (root folder by default),
    /// populated with `properties` (all declared ones when `None`).
    pub async fn find_entity_views(
        &self,
        type_name: &str,
        start: Option<&ManagedObjectReference>,
        properties: Option<&[&str]>,
    ) -> VsphereResult<Vec<Entity>> {
        let names = self.property_names(type_name, properties)?;
        let contents = self
            .collector()
            .find_all_with(type_name, start, PropertySelection::Named(names.clone()))
            .await?;
        debug!("found {} {type_name} object(s)", contents.len());

        contents
            .into_iter()
            .map(|c| {
                let mut entity = self.entity(&c.obj)?;
                entity.set_view_data(&names, c.props);
                Ok(entity)
            })
            .collect()
    }

    /// The first `type_name` object whose properties equal every `filter`
    /// entry. `properties` are loaded afterwards when given.
    pub async fn find_entity_view(
        &self,
        type_name: &str,
        filter: &[(&str, VimValue)],
        start: Option<&ManagedObjectReference>,
        properties: Option<&[&str]>,
    ) -> VsphereResult<Entity> {
        let filter_names: Vec<&str> = filter.iter().map(|(k, _)| *k).collect();
        let filter_names = self.property_names(type_name, Some(filter_names.as_slice()))?;

        let content = self.collector().find_one(type_name, filter, start).await?;
        let mut entity = self.entity(&content.obj)?;
        entity.set_view_data(&filter_names, content.props);
        if let Some(props) = properties {
            entity.get_many(props).await?;
        }
        Ok(entity)
    }

    /// Requested names checked against the type, or all declared ones.
    fn property_names(&self, type_name: &str, properties: Option<&[&str]>) -> VsphereResult<Vec<String>> {
        let schema = self.catalog().resolve_properties(type_name)?;
        match properties {
            None => Ok(schema.keys().cloned().collect()),
            Some(list) => list
                .iter()
                .map(|p| {
                    if schema.contains_key(*p) {
                        Ok(p.to_string())
                    } else {
                        Err(VsphereError::unknown_property(type_name, p))
                    }
                })
                .collect(),
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    pub async fn invoke(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
    ) -> VsphereResult<VimValue> {
        self.inner.invoker.invoke(operation, this, args).await
    }

    pub async fn invoke_with_cancel(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
        cancel: &CancellationToken,
    ) -> VsphereResult<VimValue> {
        self.inner
            .invoker
            .invoke_with_cancel(operation, this, args, cancel)
            .await
    }

    /// Invoke a `*_Task` operation and wait for the task to finish.
    pub async fn invoke_task(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
        cancel: Option<&CancellationToken>,
    ) -> VsphereResult<TaskInfo> {
        if !is_task_operation(operation) {
            return Err(VsphereError::invalid_argument(format!(
                "{operation} does not return a Task"
            )));
        }
        let value = match cancel {
            Some(token) => self.invoke_with_cancel(operation, this, args, token).await?,
            None => self.invoke(operation, this, args).await?,
        };
        let task_ref = value.as_moref().cloned().ok_or_else(|| {
            VsphereError::parse(format!("{operation} did not return a Task reference"))
        })?;
        debug!("{operation} on {this} started {task_ref}");
        self.task(&task_ref)?.wait(cancel).await
    }
}
