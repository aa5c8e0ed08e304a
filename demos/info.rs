//! energymon Info Example
//!
//! Loads an energymon backend and prints its source, capabilities and a
//! reading.
//!
//! Run with: cargo run --example `info` -- [library] [getter]
//!
//! Defaults to `energymon-default` / `energymon_get_default`. Set
//! `RUST_LOG=energymon=debug` to trace loading and lifecycle transitions.

use energymon::config::{DEFAULT_GETTER, DEFAULT_LIBRARY};
use energymon::{Config, EnergyMon};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), energymon::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let library = args.next().unwrap_or_else(|| DEFAULT_LIBRARY.to_string());
    let getter = args.next().unwrap_or_else(|| DEFAULT_GETTER.to_string());

    println!("energymon {}", energymon::VERSION);
    println!("Library: {library}");
    println!("Getter: {getter}");
    println!();

    let mut em = EnergyMon::with_config(&Config::new(library, getter))?;
    let reading = em.info()?;
    println!("{reading}");

    // A second session reinitializes the backend from scratch.
    let (first, second) = em.scoped(|em| {
        let first = em.read_uj()?;
        std::thread::sleep(std::time::Duration::from_micros(em.interval_us()?));
        Ok((first, em.read_uj()?))
    })?;
    println!("Energy over one interval (uJ): {}", second.saturating_sub(first));
    Ok(())
}
