// Loading a shared library runs its initializers, which requires unsafe
#![allow(unsafe_code)]

//! Loading energymon shared libraries.
//!
//! Bare names such as `energymon-default` are turned into the platform
//! filename (`libenergymon-default.so`, `libenergymon-default.dylib`,
//! `energymon-default.dll`) and handed to the platform loader, which applies
//! its own search rules (`LD_LIBRARY_PATH`, `DYLD_LIBRARY_PATH`, ...). Names
//! containing a path separator are loaded as paths. This module never
//! changes the search path environment.

use crate::error::{Error, Result};
use libloading::Library;
use std::sync::Arc;
use tracing::debug;

/// Where a backend's library comes from.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    /// Load by name or path.
    Name(String),
    /// Use an already loaded library.
    Loaded(Arc<Library>),
}

impl LibrarySource {
    /// Resolve this source to a loaded library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LibraryNotFound`] if a named library cannot be
    /// loaded.
    pub fn load(self) -> Result<Arc<Library>> {
        match self {
            Self::Name(name) => load_library(&name).map(Arc::new),
            Self::Loaded(library) => Ok(library),
        }
    }
}

impl From<&str> for LibrarySource {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for LibrarySource {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Library> for LibrarySource {
    fn from(library: Library) -> Self {
        Self::Loaded(Arc::new(library))
    }
}

impl From<Arc<Library>> for LibrarySource {
    fn from(library: Arc<Library>) -> Self {
        Self::Loaded(library)
    }
}

/// The platform filename for a library name.
///
/// Names that already look like paths are returned unchanged.
#[must_use]
pub fn library_filename(name: &str) -> String {
    if is_path(name) {
        return name.to_owned();
    }
    libloading::library_filename(name)
        .to_string_lossy()
        .into_owned()
}

fn is_path(name: &str) -> bool {
    name.contains('/') || name.contains(std::path::MAIN_SEPARATOR)
}

/// Load an energymon library by name or path.
///
/// # Errors
///
/// Returns [`Error::LibraryNotFound`] carrying the filename that was tried.
pub fn load_library(name: &str) -> Result<Library> {
    let filename = library_filename(name);
    // SAFETY: loading runs the library's initializers. energymon backends
    // are plain C libraries; trusting the named library is the caller's
    // decision, as with any plugin.
    let library = unsafe { Library::new(&filename) }.map_err(|e| {
        debug!(%name, %filename, error = %e, "Failed to load energymon library");
        Error::library_not_found(name, filename.clone())
    })?;
    debug!(%name, %filename, "Loaded energymon library");
    Ok(library)
}
