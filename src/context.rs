//! Reentrant, reusable lifecycle management for an energymon.
//!
//! [`EnergyMon`] owns one backend and counts outstanding acquisitions. The
//! backend is initialized when the count leaves 0 and finished when it
//! returns to 0, so nested acquisitions never initialize twice and a fully
//! released monitor can be acquired again from scratch.
//!
//! # Example
//!
//! ```no_run
//! use energymon::EnergyMon;
//!
//! let mut em = EnergyMon::new()?;
//! println!("source: {}", em.source()?);
//!
//! {
//!     let session = em.session()?;
//!     println!("reading: {} uJ", session.read_uj()?);
//! } // released here, on every exit path
//!
//! assert!(!em.initialized());
//! # Ok::<(), energymon::Error>(())
//! ```
//!
//! # Strict and scoped APIs
//!
//! [`EnergyMon::init`] and [`EnergyMon::finish`] are the explicit API: `init`
//! refuses an already initialized monitor and `finish` always releases
//! completely. [`EnergyMon::session`] and [`EnergyMon::scoped`] are the
//! reentrant API built on [`acquire`](EnergyMon::acquire) and
//! [`release`](EnergyMon::release).
//!
//! # Leak Detection
//!
//! Dropping an initialized monitor logs an `unfinished energymon` warning
//! and finishes the backend, ignoring any error from the finish.

use crate::config::Config;
use crate::dispatch::{Backend, CallTable};
use crate::error::{Error, Result};
use crate::loader::LibrarySource;
use crate::reading::Reading;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, instrument, trace, warn};

/// An energymon backend together with its acquisition depth.
///
/// `EnergyMon` does not implement `Clone`: it exclusively owns foreign
/// state that cannot be duplicated. [`try_clone`](Self::try_clone) and
/// serialization fail with [`Error::InvalidOperation`].
///
/// ```compile_fail
/// fn assert_clone<T: Clone>() {}
/// assert_clone::<energymon::EnergyMon>();
/// ```
///
/// # Thread Safety
///
/// With the native [`CallTable`] backend this type is `!Send` and `!Sync`.
/// Use one `EnergyMon` per thread, and at most one initialized `EnergyMon`
/// system-wide when [`is_exclusive`](Self::is_exclusive) is `true`.
pub struct EnergyMon<B: Backend = CallTable> {
    backend: B,
    depth: usize,
}

impl EnergyMon<CallTable> {
    /// Load the default backend (`energymon-default`,
    /// `energymon_get_default`).
    ///
    /// # Errors
    ///
    /// Returns an error if the library or getter cannot be resolved.
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    /// Load `getter` from a library given by name or already loaded.
    ///
    /// # Errors
    ///
    /// - [`Error::LibraryNotFound`] if a named library cannot be loaded
    /// - any error of [`CallTable::resolve`]
    pub fn open(library: impl Into<LibrarySource>, getter: &str) -> Result<Self> {
        Self::open_with(library, getter, &Config::default())
    }

    /// Load the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for an invalid configuration, or
    /// any error of [`open`](Self::open).
    pub fn with_config(config: &Config) -> Result<Self> {
        Self::open_with(config.library.as_str(), &config.getter, config)
    }

    fn open_with(library: impl Into<LibrarySource>, getter: &str, config: &Config) -> Result<Self> {
        config.validate()?;
        let library = library.into().load()?;
        let table = CallTable::resolve(library, getter, config.dispatch)?;
        Ok(Self::from_backend(table))
    }
}

impl<B: Backend> EnergyMon<B> {
    /// Wrap a backend. The backend must not be initialized.
    #[must_use]
    pub const fn from_backend(backend: B) -> Self {
        Self { backend, depth: 0 }
    }

    /// The wrapped backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of outstanding acquisitions.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// `true` if the backend is initialized.
    #[must_use]
    pub const fn initialized(&self) -> bool {
        self.depth > 0
    }

    /// Acquire the backend, initializing it if this is the first
    /// outstanding acquisition.
    ///
    /// Every successful `acquire` needs a matching [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns the backend's init error; the depth is left unchanged.
    pub fn acquire(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.backend.init()?;
            debug!("energymon initialized");
        }
        self.depth += 1;
        trace!(depth = self.depth, "energymon acquired");
        Ok(())
    }

    /// Release one acquisition, finishing the backend when none remain.
    ///
    /// A no-op if the backend is not initialized (e.g. after an explicit
    /// [`finish`](Self::finish)).
    ///
    /// # Errors
    ///
    /// Returns the backend's finish error. The depth is decremented either
    /// way.
    pub fn release(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Ok(());
        }
        self.depth -= 1;
        trace!(depth = self.depth, "energymon released");
        if self.depth == 0 {
            self.backend.finish()?;
            debug!("energymon finished");
        }
        Ok(())
    }

    /// Initialize the backend.
    ///
    /// Only use this when not using [`session`](Self::session) or
    /// [`scoped`](Self::scoped).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInitialized`] if already initialized
    /// - the backend's init error
    #[instrument(level = "debug", skip(self))]
    pub fn init(&mut self) -> Result<()> {
        if self.depth > 0 {
            return Err(Error::AlreadyInitialized);
        }
        self.acquire()
    }

    /// Finish the backend, releasing every outstanding acquisition at once.
    ///
    /// A no-op if not initialized.
    ///
    /// # Errors
    ///
    /// Returns the backend's finish error. The monitor is uninitialized
    /// either way.
    #[instrument(level = "debug", skip(self))]
    pub fn finish(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Ok(());
        }
        self.depth = 0;
        self.backend.finish()?;
        debug!("energymon finished");
        Ok(())
    }

    fn check_init(&self) -> Result<()> {
        if self.initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Total energy in microjoules.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if not initialized
    /// - the backend's read error
    pub fn read_uj(&self) -> Result<u64> {
        self.check_init()?;
        self.backend.read_total_uj()
    }

    /// Refresh interval in microseconds (at least 1).
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if not initialized
    /// - the backend's error
    pub fn interval_us(&self) -> Result<u64> {
        self.check_init()?;
        self.backend.interval_us()
    }

    /// Best possible read precision in microjoules; `0` if unknown.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if not initialized
    /// - the backend's error
    pub fn precision_uj(&self) -> Result<u64> {
        self.check_init()?;
        self.backend.precision_uj()
    }

    /// Human-readable description of the energy source. Initialization is
    /// not required.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn source(&self) -> Result<String> {
        self.backend.source()
    }

    /// Whether the backend requires exclusive access. Initialization is not
    /// required.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn is_exclusive(&self) -> Result<bool> {
        self.backend.is_exclusive()
    }

    /// Acquire the backend for the lifetime of the returned guard.
    ///
    /// The guard releases exactly once when dropped, including on early
    /// return and unwinding. Sessions nest.
    ///
    /// # Errors
    ///
    /// Returns the backend's init error; nothing is acquired.
    pub fn session(&mut self) -> Result<Session<'_, B>> {
        self.acquire()?;
        Ok(Session {
            mon: self,
            active: true,
        })
    }

    /// Run `f` with the backend acquired, releasing afterwards.
    ///
    /// If `f` fails its error is returned and a release failure is only
    /// logged; if `f` succeeds a release failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the init error, `f`'s error, or the finish error.
    pub fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut session = self.session()?;
        let value = f(&mut *session)?;
        session.end()?;
        Ok(value)
    }

    /// Gather source, exclusivity, interval, precision and a reading.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    #[instrument(level = "debug", skip(self))]
    pub fn info(&mut self) -> Result<Reading> {
        let source = self.source()?;
        let exclusive = self.is_exclusive()?;
        self.scoped(|em| {
            Ok(Reading {
                source,
                exclusive,
                interval_us: em.interval_us()?,
                precision_uj: em.precision_uj()?,
                energy_uj: em.read_uj()?,
            })
        })
    }

    /// Duplicating an energymon is never possible.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::InvalidOperation`].
    pub fn try_clone(&self) -> Result<Self> {
        Err(Error::invalid_operation(
            "cannot clone an energymon: it owns foreign state",
        ))
    }
}

impl<B: Backend> Drop for EnergyMon<B> {
    fn drop(&mut self) {
        if self.depth > 0 {
            warn!(depth = self.depth, "unfinished energymon");
            self.depth = 0;
            if let Err(e) = self.backend.finish() {
                debug!(error = %e, "forced finish failed");
            }
        }
    }
}

impl<B: Backend> Serialize for EnergyMon<B> {
    fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(Error::invalid_operation(
            "cannot serialize an energymon: it holds process-local function pointers",
        )))
    }
}

impl<B: Backend + fmt::Debug> fmt::Debug for EnergyMon<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnergyMon")
            .field("backend", &self.backend)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Guard for one acquisition of an [`EnergyMon`].
///
/// Dereferences to the monitor, so queries and nested sessions go through
/// the guard.
pub struct Session<'a, B: Backend = CallTable> {
    mon: &'a mut EnergyMon<B>,
    active: bool,
}

impl<B: Backend> Session<'_, B> {
    /// Release now, returning the finish error instead of logging it.
    ///
    /// # Errors
    ///
    /// Returns the backend's finish error.
    pub fn end(mut self) -> Result<()> {
        self.active = false;
        self.mon.release()
    }
}

impl<B: Backend> Deref for Session<'_, B> {
    type Target = EnergyMon<B>;

    fn deref(&self) -> &Self::Target {
        self.mon
    }
}

impl<B: Backend> DerefMut for Session<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.mon
    }
}

impl<B: Backend> Drop for Session<'_, B> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.mon.release() {
                warn!(error = %e, "energymon release failed");
            }
        }
    }
}

impl<B: Backend> fmt::Debug for Session<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("depth", &self.mon.depth)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tracing_test::traced_test;

    #[derive(Debug, Default)]
    struct Calls {
        inits: Cell<u32>,
        finishes: Cell<u32>,
    }

    #[derive(Debug, Default)]
    struct MockBackend {
        calls: Rc<Calls>,
        fail_init: bool,
        fail_finish: bool,
        live: bool,
    }

    impl MockBackend {
        fn new() -> (Self, Rc<Calls>) {
            let backend = Self::default();
            let calls = Rc::clone(&backend.calls);
            (backend, calls)
        }
    }

    impl Backend for MockBackend {
        fn init(&mut self) -> Result<()> {
            assert!(!self.live, "double init");
            if self.fail_init {
                return Err(Error::backend(libc::ENODEV, "No such device"));
            }
            self.calls.inits.set(self.calls.inits.get() + 1);
            self.live = true;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            assert!(self.live, "finish without init");
            self.calls.finishes.set(self.calls.finishes.get() + 1);
            self.live = false;
            if self.fail_finish {
                return Err(Error::backend(libc::EIO, "Input/output error"));
            }
            Ok(())
        }

        fn read_total_uj(&self) -> Result<u64> {
            assert!(self.live);
            Ok(1234)
        }

        fn source(&self) -> Result<String> {
            Ok("Mock".to_string())
        }

        fn interval_us(&self) -> Result<u64> {
            assert!(self.live);
            Ok(1000)
        }

        fn precision_uj(&self) -> Result<u64> {
            assert!(self.live);
            Ok(0)
        }

        fn is_exclusive(&self) -> Result<bool> {
            Ok(false)
        }
    }

    fn monitor() -> (EnergyMon<MockBackend>, Rc<Calls>) {
        let (backend, calls) = MockBackend::new();
        (EnergyMon::from_backend(backend), calls)
    }

    #[test]
    fn test_created_uninitialized() {
        let (em, calls) = monitor();
        assert!(!em.initialized());
        assert_eq!(em.depth(), 0);
        assert_eq!(calls.inits.get(), 0);
    }

    #[test]
    fn test_init_finish() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        assert!(em.initialized());
        em.finish().unwrap();
        assert!(!em.initialized());
        assert_eq!((calls.inits.get(), calls.finishes.get()), (1, 1));
    }

    #[test]
    fn test_double_init_rejected() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        assert_eq!(em.init(), Err(Error::AlreadyInitialized));
        assert_eq!(em.depth(), 1);
        assert_eq!(calls.inits.get(), 1);
        em.finish().unwrap();
    }

    #[test]
    fn test_double_finish_is_noop() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        em.finish().unwrap();
        assert!(em.finish().is_ok());
        assert!(em.finish().is_ok());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_init_failure_leaves_depth_zero() {
        let (mut backend, calls) = MockBackend::new();
        backend.fail_init = true;
        let mut em = EnergyMon::from_backend(backend);
        assert!(em.acquire().unwrap_err().is_backend());
        assert_eq!(em.depth(), 0);
        assert!(em.session().is_err());
        assert_eq!(em.depth(), 0);
        assert_eq!(calls.finishes.get(), 0);
    }

    #[test]
    fn test_queries_require_init() {
        let (em, _calls) = monitor();
        assert_eq!(em.read_uj(), Err(Error::NotInitialized));
        assert_eq!(em.interval_us(), Err(Error::NotInitialized));
        assert_eq!(em.precision_uj(), Err(Error::NotInitialized));
        assert_eq!(em.source().as_deref(), Ok("Mock"));
        assert_eq!(em.is_exclusive(), Ok(false));
    }

    #[test]
    fn test_session_reentrant() {
        let (mut em, calls) = monitor();
        {
            let mut outer = em.session().unwrap();
            assert_eq!(outer.depth(), 1);
            {
                let inner = outer.session().unwrap();
                assert_eq!(inner.depth(), 2);
                assert_eq!(inner.read_uj(), Ok(1234));
            }
            assert!(outer.initialized());
            assert_eq!(outer.depth(), 1);
        }
        assert!(!em.initialized());
        assert_eq!((calls.inits.get(), calls.finishes.get()), (1, 1));
    }

    #[test]
    fn test_session_reusable() {
        let (mut em, calls) = monitor();
        for _ in 0..3 {
            let session = em.session().unwrap();
            assert!(session.initialized());
            session.end().unwrap();
            assert!(!em.initialized());
        }
        assert_eq!((calls.inits.get(), calls.finishes.get()), (3, 3));
    }

    #[test]
    fn test_session_after_force_finish() {
        let (mut em, calls) = monitor();
        {
            let mut session = em.session().unwrap();
            session.finish().unwrap();
            assert!(!session.initialized());
        }
        assert!(!em.initialized());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_session_inside_manual_lifecycle() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        {
            let session = em.session().unwrap();
            assert_eq!(session.depth(), 2);
        }
        assert!(em.initialized());
        em.finish().unwrap();
        assert!(!em.initialized());
        assert_eq!((calls.inits.get(), calls.finishes.get()), (1, 1));
    }

    #[test]
    fn test_finish_from_nested_depth_releases_fully() {
        let (mut em, calls) = monitor();
        em.acquire().unwrap();
        em.acquire().unwrap();
        em.acquire().unwrap();
        em.finish().unwrap();
        assert_eq!(em.depth(), 0);
        assert!(em.release().is_ok());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_release_failure_still_uninitializes() {
        let (mut backend, _calls) = MockBackend::new();
        backend.fail_finish = true;
        let mut em = EnergyMon::from_backend(backend);
        em.acquire().unwrap();
        assert!(em.release().unwrap_err().is_backend());
        assert!(!em.initialized());
    }

    #[test]
    fn test_scoped_releases_on_error() {
        let (mut em, calls) = monitor();
        let result: Result<()> = em.scoped(|inner| {
            assert!(inner.initialized());
            Err(Error::encoding("boom"))
        });
        assert_eq!(result, Err(Error::encoding("boom")));
        assert!(!em.initialized());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_scoped_returns_value() {
        let (mut em, _calls) = monitor();
        let value = em.scoped(|inner| inner.read_uj()).unwrap();
        assert_eq!(value, 1234);
        assert!(!em.initialized());
    }

    #[test]
    fn test_session_releases_on_unwind() {
        let (mut em, calls) = monitor();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = em.session().unwrap();
            panic!("unit of work failed");
        }));
        assert!(result.is_err());
        assert!(!em.initialized());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_info_gathers_reading() {
        let (mut em, calls) = monitor();
        let reading = em.info().unwrap();
        assert_eq!(reading.source, "Mock");
        assert!(!reading.exclusive);
        assert_eq!(reading.interval_us, 1000);
        assert_eq!(reading.precision_uj, 0);
        assert_eq!(reading.energy_uj, 1234);
        assert!(!em.initialized());
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    #[traced_test]
    fn test_drop_initialized_warns_and_finishes() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        drop(em);
        assert!(logs_contain("unfinished energymon"));
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    #[traced_test]
    fn test_drop_uninitialized_is_silent() {
        let (mut em, calls) = monitor();
        em.init().unwrap();
        em.finish().unwrap();
        drop(em);
        assert!(!logs_contain("unfinished energymon"));
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    #[traced_test]
    fn test_drop_ignores_forced_finish_error() {
        let (mut backend, calls) = MockBackend::new();
        backend.fail_finish = true;
        let mut em = EnergyMon::from_backend(backend);
        em.acquire().unwrap();
        em.acquire().unwrap();
        drop(em);
        assert!(logs_contain("unfinished energymon"));
        assert_eq!(calls.finishes.get(), 1);
    }

    #[test]
    fn test_try_clone_fails() {
        let (em, _calls) = monitor();
        assert!(matches!(
            em.try_clone(),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_serialize_fails() {
        let (em, _calls) = monitor();
        let err = serde_json::to_string(&em).unwrap_err();
        assert!(err.to_string().contains("invalid operation"));
    }
}
