//! Container template discovery.
//!
//! The container module lists installable templates once during `init`.
//! Probing package managers and running queries is delegated to a
//! [`TemplateBackend`].

pub mod module;
pub mod templates;

pub use module::ContainerModule;
pub use templates::{
    discover, MemoryTemplates, PackageQuery, SystemTemplates, TemplateBackend, TemplateError, PACKAGE_QUERIES,
};
