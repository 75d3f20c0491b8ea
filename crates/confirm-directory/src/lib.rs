//! Directory adapters: identity, profile, permission, clinic and device data.
//!
//! The engine depends only on the traits in [`traits`]. [`http`] talks to the
//! peer services; [`memory`] keeps everything in process.

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use error::{DirectoryError, OptionalExt, Result};
pub use memory::MemoryDirectory;
pub use traits::{
    ClinicDirectory, IdentityDirectory, MedicalDataDirectory, PermissionDirectory,
    ProfileDirectory,
};
pub use types::*;

/// The set of directories the engine talks to.
#[derive(Clone)]
pub struct Directories {
    pub identity: Arc<dyn IdentityDirectory>,
    pub profile: Arc<dyn ProfileDirectory>,
    pub permission: Arc<dyn PermissionDirectory>,
    pub clinic: Arc<dyn ClinicDirectory>,
    pub medical_data: Arc<dyn MedicalDataDirectory>,
}

impl Directories {
    /// All five directories backed by one shared in-memory instance.
    pub fn from_memory(dir: &MemoryDirectory) -> Self {
        Self {
            identity: Arc::new(dir.clone()),
            profile: Arc::new(dir.clone()),
            permission: Arc::new(dir.clone()),
            clinic: Arc::new(dir.clone()),
            medical_data: Arc::new(dir.clone()),
        }
    }
}
