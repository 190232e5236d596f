//! Methane/ethane-air mixture composition for one sweep cell

use serde::Serialize;

/// Moles of N2 accompanying one mole of O2 in air
pub const AIR_N2_PER_O2: f64 = 3.76;

/// Species mole amounts handed to the kinetics backend.
///
/// Amounts are not normalized; the backend normalizes them when the
/// composition is set, the same way it treats any mole-fraction mapping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MixtureSpec {
    pub ch4: f64,
    pub c2h6: f64,
    pub o2: f64,
    pub n2: f64,
}

impl MixtureSpec {
    pub const SPECIES: [&'static str; 4] = ["CH4", "C2H6", "O2", "N2"];

    /// Mixture for a methane share `x_ch4` of the fuel blend at equivalence ratio `phi`.
    ///
    /// `phi == 0` is the fuel-free sentinel: only the oxidizer pair at the
    /// stoichiometric demand of the blend.
    pub fn new(x_ch4: f64, phi: f64) -> Self {
        let o2 = stoichiometric_o2(x_ch4);
        if phi != 0.0 {
            Self {
                ch4: x_ch4,
                c2h6: 1.0 - x_ch4,
                o2: o2 / phi,
                n2: o2 * AIR_N2_PER_O2 / phi,
            }
        } else {
            Self {
                ch4: 0.0,
                c2h6: 0.0,
                o2,
                n2: o2 * AIR_N2_PER_O2,
            }
        }
    }

    /// `(species, amount)` pairs in a fixed order
    pub fn amounts(&self) -> [(&'static str, f64); 4] {
        [
            ("CH4", self.ch4),
            ("C2H6", self.c2h6),
            ("O2", self.o2),
            ("N2", self.n2),
        ]
    }

    pub fn total(&self) -> f64 {
        self.ch4 + self.c2h6 + self.o2 + self.n2
    }

    /// Mole fractions summing to one
    pub fn normalized(&self) -> Self {
        let total = self.total();
        Self {
            ch4: self.ch4 / total,
            c2h6: self.c2h6 / total,
            o2: self.o2 / total,
            n2: self.n2 / total,
        }
    }

    pub fn has_fuel(&self) -> bool {
        self.ch4 > 0.0 || self.c2h6 > 0.0
    }

    /// Composition string in the `"A:x, B:y"` form accepted by kinetics libraries
    pub fn composition_string(&self) -> String {
        self.amounts()
            .iter()
            .map(|(name, x)| format!("{}:{:e}", name, x))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// O2 moles per mole of fuel blend for complete combustion to CO2 and H2O.
///
/// Carbon and hydrogen demands are summed separately:
/// `(x + 2(1-x)) + (2x + 3(1-x)) / 2`, i.e. 2 for pure CH4 and 3.5 for pure C2H6.
pub fn stoichiometric_o2(x_ch4: f64) -> f64 {
    let x_c2h6 = 1.0 - x_ch4;
    (x_ch4 + 2.0 * x_c2h6) + (2.0 * x_ch4 + 3.0 * x_c2h6) / 2.0
}
