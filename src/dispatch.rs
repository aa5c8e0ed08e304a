// This module invokes the native call table, which requires unsafe
#![allow(unsafe_code)]

//! Dispatch into a native energymon call table.
//!
//! [`CallTable`] owns one populated `energymon` struct and turns every slot
//! invocation into a typed result. Native backends signal failure through
//! `errno` combined with a sentinel return value, and the sentinel rules
//! differ per slot:
//!
//! | Slot         | Sentinel | Failure when                    |
//! |--------------|----------|---------------------------------|
//! | `finit`      | non-zero | always                          |
//! | `ffinish`    | non-zero | always                          |
//! | `fread`      | `0`      | `errno != 0` after the call     |
//! | `fsource`    | `NULL`   | always                          |
//! | `finterval`  | `0`      | always (valid intervals are >= 1) |
//! | `fprecision` | `0`      | `errno != 0` after the call (`0` alone means unknown) |
//! | `fexclusive` | none     | never                           |
//!
//! `errno` is cleared immediately before every call so a stale value from
//! an unrelated earlier call is never attributed to the backend.

use crate::config::{DecodeErrors, DispatchOptions, ExclusiveCall, SourceEncoding};
use crate::error::{Error, Result, Slot, Slots};
use crate::ffi::{errno, GetterFn, IsExclusiveFn, IsExclusiveWithHandleFn, RawEnergyMon};
use libloading::Library;
use std::ffi::{c_char, c_int};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The operations every energymon backend provides.
///
/// [`CallTable`] implements this for native backends. Operations marked as
/// requiring initialization must only be called between a successful
/// [`init`](Backend::init) and the matching [`finish`](Backend::finish);
/// [`EnergyMon`](crate::EnergyMon) enforces this.
pub trait Backend {
    /// Initialize the backend's private state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized (e.g. sensors
    /// are missing or inaccessible).
    fn init(&mut self) -> Result<()>;

    /// Release the backend's private state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reports a cleanup failure.
    fn finish(&mut self) -> Result<()>;

    /// Total energy in microjoules. Requires initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the reading fails.
    fn read_total_uj(&self) -> Result<u64>;

    /// Human-readable description of the energy source. Does not require
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the text cannot be decoded.
    fn source(&self) -> Result<String>;

    /// Refresh interval in microseconds, at least 1. Requires
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reports no valid interval.
    fn interval_us(&self) -> Result<u64>;

    /// Best possible read precision in microjoules, `0` if unknown.
    /// Requires initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend signals a failure.
    fn precision_uj(&self) -> Result<u64>;

    /// Whether the backend requires exclusive access. Does not require
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is unavailable.
    fn is_exclusive(&self) -> Result<bool>;
}

/// A native energymon call table.
///
/// The table lives in a heap allocation so its address stays fixed while
/// the backend may hold pointers into it. When resolved from a library, the
/// library stays loaded for as long as the table exists.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`: backend state is opaque and `errno`
/// is per-thread.
pub struct CallTable {
    raw: Box<RawEnergyMon>,
    options: DispatchOptions,
    // Dropped after `raw`; keeps every function pointer in `raw` valid.
    library: Option<Arc<Library>>,
}

impl CallTable {
    /// Resolve `getter` in `library` and populate a new call table with it.
    ///
    /// The backend is not initialized.
    ///
    /// # Errors
    ///
    /// - [`Error::SymbolNotFound`] if the getter is not exported
    /// - [`Error::Backend`] if the getter returns non-zero
    /// - [`Error::MalformedBackend`] if the getter leaves slots unset
    pub fn resolve(library: Arc<Library>, getter: &str, options: DispatchOptions) -> Result<Self> {
        // SAFETY: the symbol is assumed to have the conventional getter
        // prototype. This cannot be verified; the populated slots are
        // checked afterwards.
        let getter_fn: GetterFn = unsafe { library.get::<GetterFn>(getter.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|e| {
                debug!(%getter, error = %e, "Getter symbol lookup failed");
                Error::symbol_not_found(getter)
            })?;

        // SAFETY: getter_fn comes from `library`, which the table keeps
        // loaded for its whole lifetime.
        let mut table = unsafe { Self::from_getter(getter_fn, options) }?;
        table.library = Some(library);
        debug!(%getter, "Resolved energymon call table");
        Ok(table)
    }

    /// Populate a new call table by calling `getter` directly.
    ///
    /// This is how backends linked into the process (or test doubles) are
    /// used without a shared library.
    ///
    /// # Safety
    ///
    /// `getter` must follow the energymon getter contract: it writes valid
    /// energymon function pointers into the table it is given, and those
    /// functions must remain callable for the lifetime of the returned
    /// table.
    ///
    /// # Errors
    ///
    /// - [`Error::Backend`] if the getter returns non-zero
    /// - [`Error::MalformedBackend`] if the getter leaves slots unset
    pub unsafe fn from_getter(getter: GetterFn, options: DispatchOptions) -> Result<Self> {
        let mut raw = Box::<RawEnergyMon>::default();
        let em: *mut RawEnergyMon = &mut *raw;
        errno::clear();
        // SAFETY: em points to a zeroed, heap-allocated table; the getter
        // contract is upheld by the caller.
        let rc = unsafe { getter(em) };
        check_status(rc)?;

        let missing = raw.missing_slots();
        if !missing.is_empty() {
            return Err(Error::malformed_backend(missing));
        }
        Ok(Self {
            raw,
            options,
            library: None,
        })
    }

    /// A table whose slots were never populated.
    ///
    /// Every operation on it fails with [`Error::SlotUnset`].
    #[must_use]
    pub fn unpopulated() -> Self {
        Self {
            raw: Box::default(),
            options: DispatchOptions::default(),
            library: None,
        }
    }

    /// The dispatch options fixed into this table.
    #[must_use]
    pub const fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Slots that are unset (empty for any resolved table).
    #[must_use]
    pub fn missing_slots(&self) -> Slots {
        self.raw.missing_slots()
    }

    /// Whether this table keeps a shared library loaded.
    #[must_use]
    pub const fn has_library(&self) -> bool {
        self.library.is_some()
    }

    /// Describe the energy source with an explicit buffer capacity and
    /// decoding.
    ///
    /// # Errors
    ///
    /// - [`Error::SlotUnset`] if `fsource` is unset
    /// - [`Error::InvalidOperation`] if `capacity` is zero
    /// - [`Error::Backend`] if the backend returns `NULL`
    /// - [`Error::Encoding`] if the text cannot be decoded
    pub fn describe_source(
        &self,
        capacity: usize,
        encoding: SourceEncoding,
        errors: DecodeErrors,
    ) -> Result<String> {
        let fsource = self.raw.fsource.ok_or(Error::slot_unset(Slot::Source))?;
        if capacity == 0 {
            return Err(Error::invalid_operation(
                "source buffer capacity must be greater than zero",
            ));
        }
        let mut buffer = vec![0u8; capacity];
        errno::clear();
        // SAFETY: the buffer is valid for `capacity` bytes and outlives the
        // call; fsource writes at most `capacity` bytes including the NUL.
        let ret = unsafe { fsource(buffer.as_mut_ptr().cast::<c_char>(), buffer.len()) };
        if ret.is_null() {
            return Err(Error::from_errno(errno::get()));
        }
        let len = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        encoding.decode(&buffer[..len], errors)
    }

    fn as_ptr(&self) -> *const RawEnergyMon {
        &*self.raw
    }

    fn as_mut_ptr(&mut self) -> *mut RawEnergyMon {
        &mut *self.raw
    }
}

/// Map a native status code to a result, reading `errno` on failure.
fn check_status(rc: c_int) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::from_errno(errno::get()))
    }
}

impl Backend for CallTable {
    fn init(&mut self) -> Result<()> {
        let finit = self.raw.finit.ok_or(Error::slot_unset(Slot::Init))?;
        let em = self.as_mut_ptr();
        errno::clear();
        // SAFETY: finit was populated by the getter for this table and em
        // points to that same table.
        let rc = unsafe { finit(em) };
        check_status(rc)
    }

    fn finish(&mut self) -> Result<()> {
        let ffinish = self.raw.ffinish.ok_or(Error::slot_unset(Slot::Finish))?;
        let em = self.as_mut_ptr();
        errno::clear();
        // SAFETY: as for finit.
        let rc = unsafe { ffinish(em) };
        check_status(rc)
    }

    fn read_total_uj(&self) -> Result<u64> {
        let fread = self.raw.fread.ok_or(Error::slot_unset(Slot::Read))?;
        errno::clear();
        // SAFETY: fread was populated by the getter for this table.
        let value = unsafe { fread(self.as_ptr()) };
        let code = errno::get();
        if value == 0 && code != 0 {
            return Err(Error::from_errno(code));
        }
        Ok(value)
    }

    fn source(&self) -> Result<String> {
        self.describe_source(
            self.options.source_capacity,
            self.options.encoding,
            self.options.errors,
        )
    }

    fn interval_us(&self) -> Result<u64> {
        let finterval = self
            .raw
            .finterval
            .ok_or(Error::slot_unset(Slot::Interval))?;
        errno::clear();
        // SAFETY: finterval was populated by the getter for this table.
        let value = unsafe { finterval(self.as_ptr()) };
        if value == 0 {
            return Err(Error::from_errno(errno::get()));
        }
        Ok(value)
    }

    fn precision_uj(&self) -> Result<u64> {
        let fprecision = self
            .raw
            .fprecision
            .ok_or(Error::slot_unset(Slot::Precision))?;
        errno::clear();
        // SAFETY: fprecision was populated by the getter for this table.
        let value = unsafe { fprecision(self.as_ptr()) };
        let code = errno::get();
        if value == 0 && code != 0 {
            return Err(Error::from_errno(code));
        }
        Ok(value)
    }

    fn is_exclusive(&self) -> Result<bool> {
        let fexclusive = self
            .raw
            .fexclusive
            .ok_or(Error::slot_unset(Slot::Exclusive))?;
        let rc = match self.options.exclusive_call {
            // SAFETY: fexclusive was populated by the getter for this table.
            ExclusiveCall::NoHandle => unsafe { fexclusive() },
            ExclusiveCall::WithHandle => {
                // SAFETY: the backend was declared to take the table
                // pointer; both types are C function pointers of the same
                // size.
                let with_handle: IsExclusiveWithHandleFn =
                    unsafe { std::mem::transmute::<IsExclusiveFn, IsExclusiveWithHandleFn>(fexclusive) };
                // SAFETY: as above, called with this table's pointer.
                unsafe { with_handle(self.as_ptr()) }
            }
        };
        Ok(rc != 0)
    }
}

impl fmt::Debug for CallTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTable")
            .field("missing_slots", &self.missing_slots())
            .field("options", &self.options)
            .field("has_library", &self.has_library())
            .finish_non_exhaustive()
    }
}
