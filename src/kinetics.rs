//! Seam between the sweep and the chemistry library.
//!
//! The sweep only needs a gas that can be set to a composition and a
//! temperature/pressure, and a reactor built from that gas which can be
//! advanced in time. Kinetics, thermodynamics and time integration all live
//! behind these traits.

use anyhow::Result;

use crate::mixture::MixtureSpec;

/// Gas-phase state owned by one worker
pub trait GasMixture {
    /// Set species mole amounts by name; the backend normalizes them
    fn set_mole_fractions(&mut self, mixture: &MixtureSpec) -> Result<()>;
    fn set_temperature_pressure(&mut self, temperature: f64, pressure: f64) -> Result<()>;
    fn temperature(&self) -> f64;
    fn pressure(&self) -> f64;
    /// Current mole fraction of one species
    fn mole_fraction(&self, species: &str) -> Result<f64>;
}

/// Zero-dimensional reactor integrated by the backend
pub trait Reactor {
    /// Integrate up to absolute simulated time `time` (s)
    fn advance(&mut self, time: f64) -> Result<()>;
    fn temperature(&self) -> f64;
    fn pressure(&self) -> f64;
}

pub trait KineticsBackend: Sync {
    type Gas: GasMixture;
    type Reactor<'g>: Reactor
    where
        Self: 'g;

    fn name(&self) -> &str;

    /// Whether independent gas objects may be driven from several threads
    fn thread_safe(&self) -> bool {
        true
    }

    fn new_gas(&self) -> Result<Self::Gas>;

    /// Reactor starting from the current state of `gas`
    fn new_reactor<'g>(&'g self, gas: &'g mut Self::Gas) -> Result<Self::Reactor<'g>>;
}
