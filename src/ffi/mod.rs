//! FFI quarantine zone: the native `energymon.h` ABI.
//!
//! # Safety Architecture
//!
//! This module describes the foreign side of an energymon backend. It holds
//! the call-table layout ([`bindings`]) and access to the thread-local error
//! channel ([`errno`]). Invoking the function pointers is left to the
//! dispatch layer, which wraps every call in typed results.
//!
//! ## Safety Rules
//!
//! - Every `unsafe` block has a `// SAFETY:` comment
//! - The call table is only ever handed to native code by pointer into a
//!   heap allocation that does not move while the backend may reference it
//! - `errno` is read immediately after a foreign call, before any other
//!   code (logging included) can overwrite it
//!
//! # Module Structure
//!
//! ```text
//! ffi/
//! ├── mod.rs          # This file - module router
//! ├── bindings.rs     # energymon struct and function pointer types
//! └── errno.rs        # errno get/set
//! ```

// Allow unsafe in this module only - quarantine zone
#![allow(unsafe_code)]

pub mod bindings;
pub mod errno;

pub use bindings::{
    FinishFn, GetIntervalFn, GetPrecisionFn, GetSourceFn, GetterFn, InitFn, IsExclusiveFn,
    IsExclusiveWithHandleFn, RawEnergyMon, ReadTotalFn,
};
