//! Error types for energymon.
//!
//! Every failure of the loading, dispatch and lifecycle layers is reported
//! through the single [`Error`] enum. Foreign failures signaled through
//! `errno` become [`Error::Backend`] carrying the raw code and the platform
//! message for it.

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

/// Primary error type for energymon operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No shared library matching the name could be loaded.
    #[error("energymon library not found: {name} (looked for {filename})")]
    LibraryNotFound {
        /// The library name as requested.
        name: String,
        /// Best-guess platform filename, for diagnostics.
        filename: String,
    },

    /// The getter symbol is absent from the loaded library.
    #[error("getter symbol not found: {symbol}")]
    SymbolNotFound {
        /// The symbol that was looked up.
        symbol: String,
    },

    /// The getter succeeded but left call-table slots unset.
    #[error("malformed backend: getter left slots unset: {missing}")]
    MalformedBackend {
        /// Every slot that was still empty after the getter returned.
        missing: Slots,
    },

    /// A slot required by the operation was never populated.
    ///
    /// This is a programming error: the table was not obtained through a
    /// successful getter call.
    #[error("'{slot}' not set - did you 'get' the energymon?")]
    SlotUnset {
        /// The empty slot.
        slot: Slot,
    },

    /// The native backend reported a failure through `errno`.
    #[error("backend error (errno {code}): {message}")]
    Backend {
        /// The raw `errno` value.
        code: i32,
        /// Platform description of `code`.
        message: String,
    },

    /// The operation requires an initialized energymon.
    #[error("energymon is not initialized")]
    NotInitialized,

    /// Explicit initialization of an energymon that is already initialized.
    #[error("energymon is already initialized")]
    AlreadyInitialized,

    /// The source description is not valid text in the configured encoding.
    #[error("invalid source description: {reason}")]
    Encoding {
        /// Decoder failure details.
        reason: String,
    },

    /// The operation is not supported on this value.
    #[error("invalid operation: {operation}")]
    InvalidOperation {
        /// Description of the rejected operation.
        operation: String,
    },
}

/// Result type alias for energymon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single function slot of the native call table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// `finit`.
    Init,
    /// `fread`.
    Read,
    /// `ffinish`.
    Finish,
    /// `fsource`.
    Source,
    /// `finterval`.
    Interval,
    /// `fprecision`.
    Precision,
    /// `fexclusive`.
    Exclusive,
}

impl Slot {
    /// All slots in ABI order.
    pub const ALL: [Self; 7] = [
        Self::Init,
        Self::Read,
        Self::Finish,
        Self::Source,
        Self::Interval,
        Self::Precision,
        Self::Exclusive,
    ];

    /// The native field name of this slot.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Init => "finit",
            Self::Read => "fread",
            Self::Finish => "ffinish",
            Self::Source => "fsource",
            Self::Interval => "finterval",
            Self::Precision => "fprecision",
            Self::Exclusive => "fexclusive",
        }
    }

    /// The flag representing this slot in a [`Slots`] set.
    #[must_use]
    pub const fn flag(self) -> Slots {
        match self {
            Self::Init => Slots::INIT,
            Self::Read => Slots::READ,
            Self::Finish => Slots::FINISH,
            Self::Source => Slots::SOURCE,
            Self::Interval => Slots::INTERVAL,
            Self::Precision => Slots::PRECISION,
            Self::Exclusive => Slots::EXCLUSIVE,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

bitflags! {
    /// A set of call-table slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Slots: u8 {
        /// `finit`.
        const INIT = 1 << 0;
        /// `fread`.
        const READ = 1 << 1;
        /// `ffinish`.
        const FINISH = 1 << 2;
        /// `fsource`.
        const SOURCE = 1 << 3;
        /// `finterval`.
        const INTERVAL = 1 << 4;
        /// `fprecision`.
        const PRECISION = 1 << 5;
        /// `fexclusive`.
        const EXCLUSIVE = 1 << 6;
    }
}

impl Slots {
    /// The individual slots contained in this set, in ABI order.
    pub fn slots(self) -> impl Iterator<Item = Slot> {
        Slot::ALL.into_iter().filter(move |s| self.contains(s.flag()))
    }
}

impl fmt::Display for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, slot) in self.slots().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new `LibraryNotFound` error.
    #[must_use]
    pub fn library_not_found(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::LibraryNotFound {
            name: name.into(),
            filename: filename.into(),
        }
    }

    /// Create a new `SymbolNotFound` error.
    #[must_use]
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    /// Create a new `MalformedBackend` error.
    #[must_use]
    pub const fn malformed_backend(missing: Slots) -> Self {
        Self::MalformedBackend { missing }
    }

    /// Create a new `SlotUnset` error.
    #[must_use]
    pub const fn slot_unset(slot: Slot) -> Self {
        Self::SlotUnset { slot }
    }

    /// Create a new `Backend` error.
    #[must_use]
    pub fn backend(code: i32, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    /// Create a `Backend` error from an `errno` value, using the platform
    /// description as the message.
    #[must_use]
    pub fn from_errno(code: i32) -> Self {
        let message = std::io::Error::from_raw_os_error(code).to_string();
        Self::Backend { code, message }
    }

    /// Create a new `Encoding` error.
    #[must_use]
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidOperation` error.
    #[must_use]
    pub fn invalid_operation(operation: impl Into<String>) -> Self {
        Self::InvalidOperation {
            operation: operation.into(),
        }
    }

    /// Check if the native backend reported this error.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// Check if this error is lifecycle misuse (`NotInitialized` or
    /// `AlreadyInitialized`).
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::AlreadyInitialized)
    }

    /// Check if this error comes from locating the backend (library or
    /// getter symbol missing).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LibraryNotFound { .. } | Self::SymbolNotFound { .. }
        )
    }

    /// Get the `errno` value if this is a `Backend` error.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }
}
