//! Backend selection and dispatch configuration.
//!
//! # Example
//!
//! ```
//! use energymon::config::{Config, DecodeErrors, SourceEncoding};
//!
//! let config = Config::new("energymon-rapl", "energymon_get_rapl")
//!     .with_source_capacity(128)
//!     .with_encoding(SourceEncoding::Latin1)
//!     .with_decode_errors(DecodeErrors::Replace);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};

/// Library loaded by [`Config::default`].
pub const DEFAULT_LIBRARY: &str = "energymon-default";

/// Getter symbol used by [`Config::default`].
pub const DEFAULT_GETTER: &str = "energymon_get_default";

/// Default capacity of the source description buffer, in bytes.
pub const DEFAULT_SOURCE_CAPACITY: usize = 256;

/// Text encoding of the source description written by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceEncoding {
    /// UTF-8.
    #[default]
    Utf8,
    /// ISO-8859-1. Every byte sequence is valid.
    Latin1,
}

/// How malformed byte sequences in the source description are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeErrors {
    /// Fail with [`Error::Encoding`].
    #[default]
    Strict,
    /// Substitute U+FFFD.
    Replace,
}

/// How `fexclusive` is invoked.
///
/// The native prototype takes no arguments, but some backends are called
/// with the table pointer. The convention is fixed once, when the table is
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExclusiveCall {
    /// `fexclusive()`.
    #[default]
    NoHandle,
    /// `fexclusive(em)`.
    WithHandle,
}

impl SourceEncoding {
    /// Decode `bytes` (without the NUL terminator).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the bytes are not valid UTF-8 and
    /// `errors` is [`DecodeErrors::Strict`].
    pub fn decode(self, bytes: &[u8], errors: DecodeErrors) -> Result<String> {
        match (self, errors) {
            (Self::Latin1, _) => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            (Self::Utf8, DecodeErrors::Strict) => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| Error::encoding(e.to_string())),
            (Self::Utf8, DecodeErrors::Replace) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// Options fixed into a call table when it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Capacity of the buffer passed to `fsource`.
    pub source_capacity: usize,
    /// Encoding of the source description.
    pub encoding: SourceEncoding,
    /// Handling of malformed source descriptions.
    pub errors: DecodeErrors,
    /// Calling convention of `fexclusive`.
    pub exclusive_call: ExclusiveCall,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            source_capacity: DEFAULT_SOURCE_CAPACITY,
            encoding: SourceEncoding::Utf8,
            errors: DecodeErrors::Strict,
            exclusive_call: ExclusiveCall::NoHandle,
        }
    }
}

/// Which backend to load and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Library name (e.g. `energymon-default`) or path to a shared library.
    pub library: String,
    /// Name of the getter function that populates the call table.
    pub getter: String,
    /// Dispatch options.
    pub dispatch: DispatchOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY, DEFAULT_GETTER)
    }
}

impl Config {
    /// Create a configuration for the given library and getter, with
    /// default dispatch options.
    #[must_use]
    pub fn new(library: impl Into<String>, getter: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            getter: getter.into(),
            dispatch: DispatchOptions::default(),
        }
    }

    /// Set the source description buffer capacity.
    #[must_use]
    pub const fn with_source_capacity(mut self, capacity: usize) -> Self {
        self.dispatch.source_capacity = capacity;
        self
    }

    /// Set the source description encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.dispatch.encoding = encoding;
        self
    }

    /// Set the handling of malformed source descriptions.
    #[must_use]
    pub const fn with_decode_errors(mut self, errors: DecodeErrors) -> Self {
        self.dispatch.errors = errors;
        self
    }

    /// Set the `fexclusive` calling convention.
    #[must_use]
    pub const fn with_exclusive_call(mut self, exclusive_call: ExclusiveCall) -> Self {
        self.dispatch.exclusive_call = exclusive_call;
        self
    }

    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the library or getter name is
    /// empty, or the source capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.library.is_empty() {
            return Err(Error::invalid_operation("library name cannot be empty"));
        }
        if self.getter.is_empty() {
            return Err(Error::invalid_operation("getter name cannot be empty"));
        }
        if self.dispatch.source_capacity == 0 {
            return Err(Error::invalid_operation(
                "source buffer capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.library, "energymon-default");
        assert_eq!(config.getter, "energymon_get_default");
        assert_eq!(config.dispatch.source_capacity, 256);
        assert_eq!(config.dispatch.encoding, SourceEncoding::Utf8);
        assert_eq!(config.dispatch.errors, DecodeErrors::Strict);
        assert_eq!(config.dispatch.exclusive_call, ExclusiveCall::NoHandle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::new("energymon-dummy", "energymon_get_dummy")
            .with_source_capacity(16)
            .with_encoding(SourceEncoding::Latin1)
            .with_decode_errors(DecodeErrors::Replace)
            .with_exclusive_call(ExclusiveCall::WithHandle);
        assert_eq!(config.dispatch.source_capacity, 16);
        assert_eq!(config.dispatch.encoding, SourceEncoding::Latin1);
        assert_eq!(config.dispatch.errors, DecodeErrors::Replace);
        assert_eq!(config.dispatch.exclusive_call, ExclusiveCall::WithHandle);
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        assert!(Config::new("", "get").validate().is_err());
        assert!(Config::new("lib", "").validate().is_err());
        let err = Config::default()
            .with_source_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn test_decode_utf8_strict() {
        let text = SourceEncoding::Utf8.decode("Dummy – µJ".as_bytes(), DecodeErrors::Strict);
        assert_eq!(text.ok().as_deref(), Some("Dummy – µJ"));

        let err = SourceEncoding::Utf8
            .decode(&[0x66, 0xff, 0x6f], DecodeErrors::Strict)
            .unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn test_decode_utf8_replace() {
        let text = SourceEncoding::Utf8.decode(&[0x66, 0xff, 0x6f], DecodeErrors::Replace);
        assert_eq!(text.ok().as_deref(), Some("f\u{fffd}o"));
    }

    #[test]
    fn test_decode_latin1_never_fails() {
        let text = SourceEncoding::Latin1.decode(&[0x52, 0xb5, 0xff], DecodeErrors::Strict);
        assert_eq!(text.ok().as_deref(), Some("R\u{b5}\u{ff}"));
    }
}
