//! The fixed registry of named units.
//!
//! Factors follow the constants of the astrophysics environment the workers
//! were written against (e.g. a year of 365.242199 days).

use crate::unit::{Dimension, Unit};

/// SI and astronomical units.
pub mod si {
    use super::{Dimension, Unit};

    const DAY: f64 = 86_400.0;
    const YEAR: f64 = 365.242_199 * DAY;

    /// Kilogram.
    #[must_use]
    pub fn kg() -> Unit {
        Unit::si("kg", Dimension::MASS, 1.0)
    }

    /// Gram.
    #[must_use]
    pub fn g() -> Unit {
        Unit::si("g", Dimension::MASS, 1.0e-3)
    }

    /// Atomic mass unit.
    #[must_use]
    pub fn amu() -> Unit {
        Unit::si("amu", Dimension::MASS, 1.660_538_86e-27)
    }

    /// Solar mass.
    #[must_use]
    pub fn msun() -> Unit {
        Unit::si("MSun", Dimension::MASS, 1.988_92e30)
    }

    /// Metre.
    #[must_use]
    pub fn m() -> Unit {
        Unit::si("m", Dimension::LENGTH, 1.0)
    }

    /// Centimetre.
    #[must_use]
    pub fn cm() -> Unit {
        Unit::si("cm", Dimension::LENGTH, 1.0e-2)
    }

    /// Kilometre.
    #[must_use]
    pub fn km() -> Unit {
        Unit::si("km", Dimension::LENGTH, 1.0e3)
    }

    /// Solar radius.
    #[must_use]
    pub fn rsun() -> Unit {
        Unit::si("RSun", Dimension::LENGTH, 6.955e8)
    }

    /// Astronomical unit.
    #[must_use]
    pub fn au() -> Unit {
        Unit::si("AU", Dimension::LENGTH, 1.495_978_706_91e11)
    }

    /// Parsec.
    #[must_use]
    pub fn parsec() -> Unit {
        Unit::si("parsec", Dimension::LENGTH, 3.085_680_25e16)
    }

    /// Second.
    #[must_use]
    pub fn s() -> Unit {
        Unit::si("s", Dimension::TIME, 1.0)
    }

    /// Day.
    #[must_use]
    pub fn day() -> Unit {
        Unit::si("day", Dimension::TIME, DAY)
    }

    /// Year.
    #[must_use]
    pub fn yr() -> Unit {
        Unit::si("yr", Dimension::TIME, YEAR)
    }

    /// Million years.
    #[must_use]
    pub fn myr() -> Unit {
        Unit::si("Myr", Dimension::TIME, 1.0e6 * YEAR)
    }

    /// Kelvin.
    #[must_use]
    pub fn kelvin() -> Unit {
        Unit::si("K", Dimension::TEMPERATURE, 1.0)
    }

    /// Joule.
    #[must_use]
    pub fn joule() -> Unit {
        Unit::si("J", Dimension::new(1, 2, -2, 0), 1.0)
    }

    /// Erg.
    #[must_use]
    pub fn erg() -> Unit {
        Unit::si("erg", Dimension::new(1, 2, -2, 0), 1.0e-7)
    }

    /// Watt.
    #[must_use]
    pub fn watt() -> Unit {
        Unit::si("W", Dimension::new(1, 2, -3, 0), 1.0)
    }

    /// Solar luminosity.
    #[must_use]
    pub fn lsun() -> Unit {
        Unit::si("LSun", Dimension::new(1, 2, -3, 0), 3.839e26)
    }

    /// Barye, the CGS unit of pressure.
    #[must_use]
    pub fn barye() -> Unit {
        Unit::si("barye", Dimension::new(1, -1, -2, 0), 0.1)
    }
}

/// Generic (code) units: n-body mass, length and time and their
/// combinations.
pub mod generic {
    use super::{Dimension, Unit};

    /// Generic mass unit.
    #[must_use]
    pub fn mass() -> Unit {
        Unit::generic("mass", Dimension::MASS, 1.0)
    }

    /// Generic length unit.
    #[must_use]
    pub fn length() -> Unit {
        Unit::generic("length", Dimension::LENGTH, 1.0)
    }

    /// Generic time unit.
    #[must_use]
    pub fn time() -> Unit {
        Unit::generic("time", Dimension::TIME, 1.0)
    }

    /// Generic speed unit.
    #[must_use]
    pub fn speed() -> Unit {
        (length() / time()).named("speed")
    }

    /// Generic energy unit.
    #[must_use]
    pub fn energy() -> Unit {
        (&mass() * &speed().powi(2)).named("energy")
    }

    /// Generic mass density.
    #[must_use]
    pub fn density() -> Unit {
        (&mass() / &length().powi(3)).named("density")
    }

    /// Generic momentum.
    #[must_use]
    pub fn momentum() -> Unit {
        (&mass() * &speed()).named("momentum")
    }
}

/// Every named unit in the registry.
#[must_use]
pub fn all() -> Vec<Unit> {
    vec![
        Unit::none(),
        si::kg(),
        si::g(),
        si::amu(),
        si::msun(),
        si::m(),
        si::cm(),
        si::km(),
        si::rsun(),
        si::au(),
        si::parsec(),
        si::s(),
        si::day(),
        si::yr(),
        si::myr(),
        si::kelvin(),
        si::joule(),
        si::erg(),
        si::watt(),
        si::lsun(),
        si::barye(),
        generic::mass(),
        generic::length(),
        generic::time(),
        generic::speed(),
        generic::energy(),
        generic::density(),
        generic::momentum(),
    ]
}

/// Look up a registered unit by its symbol.
#[must_use]
pub fn lookup(symbol: &str) -> Option<Unit> {
    all().into_iter().find(|unit| unit.symbol() == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_symbol() {
        assert_eq!(lookup("MSun"), Some(si::msun()));
        assert_eq!(lookup("energy"), Some(generic::energy()));
    }

    #[test]
    fn test_lookup_unknown_symbol() {
        assert!(lookup("furlong").is_none());
    }

    #[test]
    fn test_symbols_are_unique() {
        let units = all();
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                assert_ne!(a.symbol(), b.symbol());
            }
        }
    }

    #[test]
    fn test_barye_is_cgs_pressure() {
        let cgs = &si::g() / &(&si::cm() * &si::s().powi(2));
        let factor = cgs.conversion_factor(&si::barye()).unwrap();
        assert!((factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_generic_energy_dimension() {
        assert_eq!(generic::energy().dimension(), Dimension::new(1, 2, -2, 0));
        assert_eq!(generic::density().dimension(), Dimension::new(1, -3, 0, 0));
    }
}
