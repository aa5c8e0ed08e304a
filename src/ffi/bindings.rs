//! Bindings for the `energymon` struct from `energymon.h`.
//!
//! The layout is fixed by the native ABI: seven nullable function pointers
//! followed by an opaque state pointer. Field order must not change.

use crate::error::{Slot, Slots};
use std::ffi::{c_char, c_int, c_ulonglong, c_void};
use std::ptr;

/// `int (*energymon_init)(energymon* em)`
pub type InitFn = unsafe extern "C" fn(em: *mut RawEnergyMon) -> c_int;

/// `unsigned long long (*energymon_read_total)(const energymon* em)`
pub type ReadTotalFn = unsafe extern "C" fn(em: *const RawEnergyMon) -> c_ulonglong;

/// `int (*energymon_finish)(energymon* em)`
pub type FinishFn = unsafe extern "C" fn(em: *mut RawEnergyMon) -> c_int;

/// `char* (*energymon_get_source)(char* buffer, size_t n)`
pub type GetSourceFn = unsafe extern "C" fn(buffer: *mut c_char, n: usize) -> *mut c_char;

/// `unsigned long long (*energymon_get_interval)(const energymon* em)`
pub type GetIntervalFn = unsafe extern "C" fn(em: *const RawEnergyMon) -> c_ulonglong;

/// `unsigned long long (*energymon_get_precision)(const energymon* em)`
pub type GetPrecisionFn = unsafe extern "C" fn(em: *const RawEnergyMon) -> c_ulonglong;

/// `int (*energymon_is_exclusive)(void)`
pub type IsExclusiveFn = unsafe extern "C" fn() -> c_int;

/// `fexclusive` as called by backends that expect the table pointer.
pub type IsExclusiveWithHandleFn = unsafe extern "C" fn(em: *const RawEnergyMon) -> c_int;

/// The conventional getter prototype, `int (*)(energymon* em)`.
///
/// The energymon API does not define this prototype, but every known
/// backend's getter uses it.
pub type GetterFn = unsafe extern "C" fn(em: *mut RawEnergyMon) -> c_int;

/// The native `energymon` struct.
///
/// A zeroed instance (see [`Default`]) has every slot unset; a backend
/// getter populates the function pointers and may set `state`.
#[repr(C)]
#[derive(Debug)]
pub struct RawEnergyMon {
    /// Initialize private state.
    pub finit: Option<InitFn>,
    /// Read total energy in microjoules.
    pub fread: Option<ReadTotalFn>,
    /// Clean up private state.
    pub ffinish: Option<FinishFn>,
    /// Describe the energy source.
    pub fsource: Option<GetSourceFn>,
    /// Refresh interval in microseconds.
    pub finterval: Option<GetIntervalFn>,
    /// Read precision in microjoules.
    pub fprecision: Option<GetPrecisionFn>,
    /// Whether the backend requires exclusive access.
    pub fexclusive: Option<IsExclusiveFn>,
    /// Backend-private state.
    pub state: *mut c_void,
}

impl Default for RawEnergyMon {
    fn default() -> Self {
        Self {
            finit: None,
            fread: None,
            ffinish: None,
            fsource: None,
            finterval: None,
            fprecision: None,
            fexclusive: None,
            state: ptr::null_mut(),
        }
    }
}

impl RawEnergyMon {
    /// Check whether a slot holds a function pointer.
    #[must_use]
    pub const fn is_set(&self, slot: Slot) -> bool {
        match slot {
            Slot::Init => self.finit.is_some(),
            Slot::Read => self.fread.is_some(),
            Slot::Finish => self.ffinish.is_some(),
            Slot::Source => self.fsource.is_some(),
            Slot::Interval => self.finterval.is_some(),
            Slot::Precision => self.fprecision.is_some(),
            Slot::Exclusive => self.fexclusive.is_some(),
        }
    }

    /// The set of slots that are still unset.
    #[must_use]
    pub fn missing_slots(&self) -> Slots {
        Slot::ALL
            .into_iter()
            .filter(|&slot| !self.is_set(slot))
            .fold(Slots::empty(), |acc, slot| acc | slot.flag())
    }
}
