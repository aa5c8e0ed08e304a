//! A snapshot of everything an energymon reports.

use std::fmt;

/// Source description, capabilities and one energy reading, gathered by
/// [`EnergyMon::info`](crate::EnergyMon::info).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reading {
    /// Human-readable description of the energy source.
    pub source: String,
    /// Whether the backend requires exclusive access.
    pub exclusive: bool,
    /// Refresh interval in microseconds.
    pub interval_us: u64,
    /// Best possible read precision in microjoules; `0` if unknown.
    pub precision_uj: u64,
    /// Total energy in microjoules at the time of the snapshot.
    pub energy_uj: u64,
}

impl Reading {
    /// `true` if the backend reported a precision.
    #[must_use]
    pub const fn precision_known(&self) -> bool {
        self.precision_uj > 0
    }

    /// Energy in joules.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn energy_joules(&self) -> f64 {
        self.energy_uj as f64 / 1_000_000.0
    }

    /// Energy consumed since `earlier`, in microjoules.
    ///
    /// Returns `None` if the counter went backwards, which happens when the
    /// backend was reinitialized between the two readings.
    #[must_use]
    pub const fn energy_since(&self, earlier: &Self) -> Option<u64> {
        self.energy_uj.checked_sub(earlier.energy_uj)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "Exclusive: {}", self.exclusive)?;
        writeln!(f, "Interval (usec): {}", self.interval_us)?;
        if self.precision_known() {
            writeln!(f, "Precision (uJ): {}", self.precision_uj)?;
        } else {
            writeln!(f, "Precision (uJ): unknown")?;
        }
        write!(f, "Reading (uJ): {}", self.energy_uj)
    }
}
