//! Unit-safe wrappers for the electrical quantities carried by network variants.
//!
//! Steady-state results written by a load flow (terminal flows, voltages) and
//! the setpoints touched by remedial actions all go through these newtypes so
//! that a current limit in amperes can never be compared against a flow in MW.
//!
//! ```
//! use gat_core::units::{Amperes, Kilovolts, Megavars, Megawatts};
//!
//! let p = Megawatts(300.0);
//! let q = Megavars(100.0);
//! let i = Amperes::from_power(p, q, Kilovolts(380.0));
//! assert!(i.value() > 480.0 && i.value() < 481.0);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Implements the arithmetic shared by every unit type.
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.2} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavolt-amperes reactive (Mvar).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Megavars(pub f64);

impl_unit_ops!(Megavars, "Mvar");

/// Apparent power in megavolt-amperes (MVA).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

/// Voltage magnitude in kilovolts (kV), phase-to-phase.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

/// Current magnitude in amperes (A). Permanent current limits use this unit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Amperes(pub f64);

impl_unit_ops!(Amperes, "A");

impl Megawatts {
    /// S = √(P² + Q²)
    #[inline]
    pub fn apparent_power(self, q: Megavars) -> MegavoltAmperes {
        MegavoltAmperes((self.0.powi(2) + q.0.powi(2)).sqrt())
    }
}

impl Amperes {
    /// Three-phase current magnitude `I = S / (√3 · V)`.
    ///
    /// Returns zero amperes when the voltage is zero (de-energized terminal).
    pub fn from_power(p: Megawatts, q: Megavars, v: Kilovolts) -> Self {
        if v.0.abs() < 1e-9 {
            return Amperes(0.0);
        }
        let s = p.apparent_power(q);
        Amperes(s.0 * 1000.0 / (3f64.sqrt() * v.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megawatts_arithmetic() {
        let p1 = Megawatts(100.0);
        let p2 = Megawatts(50.0);

        assert_eq!((p1 + p2).value(), 150.0);
        assert_eq!((p1 - p2).value(), 50.0);
        assert_eq!((-p1).value(), -100.0);
        assert_eq!((p1 * 2.0).value(), 200.0);
        assert_eq!((p1 / 2.0).value(), 50.0);
        assert_eq!(p1 / p2, 2.0);
    }

    #[test]
    fn test_apparent_power() {
        let s = Megawatts(30.0).apparent_power(Megavars(40.0));
        assert!((s.value() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_current_from_power() {
        // 1 MVA at 1 kV -> 1000 / sqrt(3) A
        let i = Amperes::from_power(Megawatts(1.0), Megavars(0.0), Kilovolts(1.0));
        assert!((i.value() - 1000.0 / 3f64.sqrt()).abs() < 1e-9);
        assert_eq!(
            Amperes::from_power(Megawatts(10.0), Megavars(0.0), Kilovolts(0.0)).value(),
            0.0
        );
    }

    #[test]
    fn test_sum_iterator() {
        let total: Megawatts = vec![Megawatts(10.0), Megawatts(20.0)].into_iter().sum();
        assert_eq!(total.value(), 30.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Amperes(1000.0)), "1000.00 A");
        assert_eq!(format!("{}", Kilovolts(380.0)), "380.00 kV");
    }

    #[test]
    fn test_transparent_serde() {
        let json = serde_json::to_string(&Megawatts(12.5)).unwrap();
        assert_eq!(json, "12.5");
    }
}
