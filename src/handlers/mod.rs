//! Handler catalogue, config-driven assembly and external plugins

mod builtin;
pub mod exec;
pub mod plugins;
pub mod registry;

pub use registry::{CatalogueEntry, HandlerContext, HandlerFactory, HandlerRegistry};
