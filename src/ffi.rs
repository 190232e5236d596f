//! Cantera backend through the library's C interface (`ct.h`, `ctreactor.h`).
//!
//! Every Cantera object is an integer handle into tables owned by the
//! library. Negative return codes, and `DERR` for functions returning
//! doubles, signal an error whose text is fetched with `ct_getCanteraError`.

use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_double, c_int};

use anyhow::{anyhow, bail, Context, Result};

use crate::config;
use crate::kinetics::{GasMixture, KineticsBackend, Reactor};
use crate::mixture::MixtureSpec;

const DERR: c_double = -999.999;
const NPOS: usize = usize::MAX;

#[link(name = "cantera")]
extern "C" {
    fn ct_getCanteraError(buflen: c_int, buf: *mut c_char) -> c_int;

    fn soln_newSolution(infile: *const c_char, name: *const c_char, transport: *const c_char) -> c_int;
    fn soln_thermo(n: c_int) -> c_int;
    fn soln_del(n: c_int) -> c_int;

    fn thermo_setMoleFractionsByName(n: c_int, x: *const c_char) -> c_int;
    fn thermo_setState_TP(n: c_int, vals: *mut c_double) -> c_int;
    fn thermo_temperature(n: c_int) -> c_double;
    fn thermo_pressure(n: c_int) -> c_double;
    fn thermo_speciesIndex(n: c_int, nm: *const c_char) -> usize;
    fn thermo_moleFraction(n: c_int, k: usize) -> c_double;

    fn reactor_new(kind: *const c_char, soln: c_int, name: *const c_char) -> c_int;
    fn reactor_del(i: c_int) -> c_int;
    fn reactor_temperature(i: c_int) -> c_double;
    fn reactor_pressure(i: c_int) -> c_double;

    fn reactornet_new() -> c_int;
    fn reactornet_del(i: c_int) -> c_int;
    fn reactornet_addreactor(i: c_int, n: c_int) -> c_int;
    fn reactornet_advance(i: c_int, t: c_double) -> c_int;
}

fn last_error() -> String {
    let mut buf = vec![0u8; 1024];
    let needed = unsafe { ct_getCanteraError(buf.len() as c_int, buf.as_mut_ptr().cast()) };
    if needed as usize > buf.len() {
        buf.resize(needed as usize, 0);
        unsafe { ct_getCanteraError(buf.len() as c_int, buf.as_mut_ptr().cast()) };
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

fn check(code: c_int, what: &str) -> Result<c_int> {
    if code < 0 {
        bail!("cantera: {} failed: {}", what, last_error());
    }
    Ok(code)
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).with_context(|| format!("string {:?} contains a NUL byte", s))
}

pub struct CanteraBackend {
    mechanism: CString,
    phase: CString,
    reactor_kind: CString,
    label: String,
}

impl CanteraBackend {
    pub fn open(solver: &config::Solver) -> Result<Self> {
        let backend = Self {
            mechanism: c_string(&solver.mechanism)?,
            phase: c_string(&solver.phase)?,
            reactor_kind: c_string(&solver.reactor)?,
            label: format!("cantera ({}, {})", solver.mechanism, solver.reactor),
        };
        // load once up front so a bad mechanism fails before the sweep
        drop(backend.new_gas()?);
        Ok(backend)
    }
}

impl KineticsBackend for CanteraBackend {
    type Gas = CanteraGas;
    type Reactor<'g> = CanteraReactor<'g>;

    fn name(&self) -> &str {
        &self.label
    }

    // object tables inside the C interface are shared process-wide
    fn thread_safe(&self) -> bool {
        false
    }

    fn new_gas(&self) -> Result<CanteraGas> {
        let transport = c_string("none")?;
        let soln = check(
            unsafe { soln_newSolution(self.mechanism.as_ptr(), self.phase.as_ptr(), transport.as_ptr()) },
            "soln_newSolution",
        )
        .with_context(|| format!("loading mechanism {:?}", self.mechanism))?;
        let thermo = match check(unsafe { soln_thermo(soln) }, "soln_thermo") {
            Ok(t) => t,
            Err(e) => {
                unsafe { soln_del(soln) };
                return Err(e);
            }
        };
        Ok(CanteraGas { soln, thermo })
    }

    fn new_reactor<'g>(&'g self, gas: &'g mut CanteraGas) -> Result<CanteraReactor<'g>> {
        let name = c_string("cell")?;
        let reactor = check(
            unsafe { reactor_new(self.reactor_kind.as_ptr(), gas.soln, name.as_ptr()) },
            "reactor_new",
        )?;
        let net = match check(unsafe { reactornet_new() }, "reactornet_new") {
            Ok(n) => n,
            Err(e) => {
                unsafe { reactor_del(reactor) };
                return Err(e);
            }
        };
        let out = CanteraReactor {
            reactor,
            net,
            _gas: PhantomData,
        };
        check(unsafe { reactornet_addreactor(net, reactor) }, "reactornet_addreactor")?;
        Ok(out)
    }
}

pub struct CanteraGas {
    soln: c_int,
    thermo: c_int,
}

impl GasMixture for CanteraGas {
    fn set_mole_fractions(&mut self, mixture: &MixtureSpec) -> Result<()> {
        let x = c_string(&mixture.composition_string())?;
        check(
            unsafe { thermo_setMoleFractionsByName(self.thermo, x.as_ptr()) },
            "thermo_setMoleFractionsByName",
        )?;
        Ok(())
    }

    fn set_temperature_pressure(&mut self, temperature: f64, pressure: f64) -> Result<()> {
        let mut tp = [temperature, pressure];
        check(
            unsafe { thermo_setState_TP(self.thermo, tp.as_mut_ptr()) },
            "thermo_setState_TP",
        )?;
        Ok(())
    }

    fn temperature(&self) -> f64 {
        unsafe { thermo_temperature(self.thermo) }
    }

    fn pressure(&self) -> f64 {
        unsafe { thermo_pressure(self.thermo) }
    }

    fn mole_fraction(&self, species: &str) -> Result<f64> {
        let name = c_string(species)?;
        let k = unsafe { thermo_speciesIndex(self.thermo, name.as_ptr()) };
        if k == NPOS {
            bail!("species {} not in mechanism", species);
        }
        let x = unsafe { thermo_moleFraction(self.thermo, k) };
        if x == DERR {
            return Err(anyhow!("cantera: thermo_moleFraction failed: {}", last_error()));
        }
        Ok(x)
    }
}

impl Drop for CanteraGas {
    fn drop(&mut self) {
        unsafe { soln_del(self.soln) };
    }
}

pub struct CanteraReactor<'g> {
    reactor: c_int,
    net: c_int,
    _gas: PhantomData<&'g mut CanteraGas>,
}

impl Reactor for CanteraReactor<'_> {
    fn advance(&mut self, time: f64) -> Result<()> {
        check(unsafe { reactornet_advance(self.net, time) }, "reactornet_advance")
            .with_context(|| format!("integrating to t={}s", time))?;
        Ok(())
    }

    fn temperature(&self) -> f64 {
        unsafe { reactor_temperature(self.reactor) }
    }

    fn pressure(&self) -> f64 {
        unsafe { reactor_pressure(self.reactor) }
    }
}

impl Drop for CanteraReactor<'_> {
    fn drop(&mut self) {
        unsafe {
            reactornet_del(self.net);
            reactor_del(self.reactor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mixture_survives_cantera_round_trip() {
        let backend = CanteraBackend::open(&config::Solver::default()).unwrap();
        let mut gas = backend.new_gas().unwrap();
        for phi in [0.0, 1.0, 10.0] {
            for x_ch4 in [0.0, 0.35, 1.0] {
                let mix = MixtureSpec::new(x_ch4, phi);
                gas.set_mole_fractions(&mix).unwrap();
                let n = mix.normalized();
                for (species, expected) in n.amounts() {
                    let got = gas.mole_fraction(species).unwrap();
                    assert_relative_eq!(got, expected, epsilon = 1e-14, max_relative = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_unknown_species_is_an_error() {
        let backend = CanteraBackend::open(&config::Solver::default()).unwrap();
        let gas = backend.new_gas().unwrap();
        assert!(gas.mole_fraction("XYZ").is_err());
    }
}
