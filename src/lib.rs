//! energymon: Safe Rust Interfaces to Energy Monitors
//!
//! energymon backends are native shared libraries that expose a table of
//! function pointers for reading cumulative energy. This crate loads a
//! backend, resolves its getter and wraps the table in a reentrant,
//! reusable handle with typed errors.
//!
//! # Layers
//!
//! | Layer | Module | Responsibility |
//! |-------|--------|----------------|
//! | Binding | [`ffi`] | ABI layout of the call table, `errno` access |
//! | Dispatch | [`dispatch`] | Getter resolution, sentinel and `errno` translation |
//! | Lifecycle | [`context`] | Refcounted init/finish, sessions, leak detection |
//!
//! # Quick Start
//!
//! ```no_run
//! use energymon::EnergyMon;
//!
//! let mut em = EnergyMon::new()?; // energymon-default
//! let reading = em.scoped(|em| em.read_uj())?;
//! println!("{reading} uJ");
//! # Ok::<(), energymon::Error>(())
//! ```
//!
//! Other backends are selected by library name or path plus getter name:
//!
//! ```no_run
//! use energymon::{Config, EnergyMon};
//!
//! let config = Config::new("energymon-rapl", "energymon_get_rapl");
//! let mut em = EnergyMon::with_config(&config)?;
//! println!("{}", em.info()?);
//! # Ok::<(), energymon::Error>(())
//! ```
//!
//! # Safety Guarantees
//!
//! This crate denies unsafe code at the library level. Foreign calls are
//! confined to [`ffi`], [`dispatch`] and [`loader`]; every public operation
//! outside [`dispatch::CallTable::from_getter`] is safe.
//!
//! # Error Handling
//!
//! All operations that can fail return [`Result<T, Error>`]. Backend
//! failures carry the `errno` value reported by the backend.
//!
//! # Thread Safety
//!
//! [`EnergyMon`] is `!Send` and `!Sync`. Backend state is opaque and
//! `errno` is per-thread, so create a monitor on each thread that needs one.

// This crate denies unsafe code at the library level.
// Foreign calls are quarantined in src/ffi/, src/dispatch.rs and src/loader.rs.
// We use deny (not forbid) so those modules can override it.
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)] // Allow energymon, errno, etc. without backticks

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod loader;
pub mod reading;

// Re-export main types for convenience
pub use config::{Config, DecodeErrors, DispatchOptions, ExclusiveCall, SourceEncoding};
pub use context::{EnergyMon, Session};
pub use dispatch::{Backend, CallTable};
pub use error::{Error, Result, Slot, Slots};
pub use loader::LibrarySource;
pub use reading::Reading;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
