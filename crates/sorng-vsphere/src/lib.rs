//! # SortOfRemote NG – vSphere SOAP Client
//!
//! Typed access to vCenter / ESXi through the VIM25 SOAP API: lazily
//! populated inventory views, batched property retrieval through the
//! property collector, and task polling.
//!
//! ## Modules
//!
//! - **types**: Managed object references, data objects, dynamic values
//! - **error**: Crate-specific error types
//! - **catalog**: VIM25 type hierarchy, declared properties, reference targets
//! - **soap**: Envelope writer, response / fault decoder
//! - **transport**: HTTPS POST to `/sdk` with session cookies
//! - **invoker**: Named-operation calls over a transport
//! - **traversal**: Property filter specs and the inventory traversal graph
//! - **collector**: Property collector queries (find, fetch, paging)
//! - **entity**: Lazy, cached views of managed objects
//! - **task**: Task state polling
//! - **config**: Layered YAML configuration
//! - **template**: YAML templates with `extends` inheritance
//! - **vsphere**: Client with service content and session
//! - **vm** / **host** / **storage**: Inventory conveniences
//! - **service**: Named-session facade + shared state alias

pub mod types;
pub mod error;
pub mod catalog;
pub mod soap;
pub mod transport;
pub mod invoker;
pub mod traversal;
pub mod collector;
pub mod entity;
pub mod task;
pub mod config;
pub mod template;
pub mod vsphere;
pub mod vm;
pub mod host;
pub mod storage;
pub mod service;

#[cfg(test)]
mod fake;

pub use entity::{Entity, PropertyValue};
pub use error::{VsphereError, VsphereErrorKind, VsphereResult};
pub use service::{VsphereService, VsphereServiceState};
pub use types::{DataObject, ManagedObjectReference, VimValue};
pub use vsphere::{ClientOptions, VsphereClient};
