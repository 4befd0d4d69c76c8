//! On-disk command catalog (`comandos.json`) shown by the web frontend.

pub mod catalog;
pub mod error;

pub use {
    catalog::{CommandCatalog, CommandEntry, ListedCommand, Section},
    error::{Error, Result},
};
