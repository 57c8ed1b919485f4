//! Compile-time unit safety for grid quantities.
//!
//! The canonical model fixes one unit per field (kV for base voltages,
//! MW/Mvar for powers, per-unit for impedances on the system base). Newtype
//! wrappers keep those units from being mixed by accident; parsers convert
//! from format-native units at the boundary using the helpers at the bottom
//! of this module.
//!
//! All types are `#[repr(transparent)]` over `f64`, so the wrappers cost
//! nothing at runtime.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

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

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Absolute value
            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }
        }
    };
}

/// Base voltage in kilovolts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Kilovolts(pub f64);
impl_unit_ops!(Kilovolts, "kV");

/// Dimensionless per-unit quantity (voltage magnitude, impedance, admittance)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct PerUnit(pub f64);
impl_unit_ops!(PerUnit, "pu");

/// Active power in megawatts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Megawatts(pub f64);
impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavars
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Megavars(pub f64);
impl_unit_ops!(Megavars, "Mvar");

/// Apparent power in megavolt-amperes
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MegavoltAmperes(pub f64);
impl_unit_ops!(MegavoltAmperes, "MVA");

/// Stored energy in megawatt-hours
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MegawattHours(pub f64);
impl_unit_ops!(MegawattHours, "MWh");

/// Angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Degrees(pub f64);
impl_unit_ops!(Degrees, "deg");

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Radians(pub f64);
impl_unit_ops!(Radians, "rad");

impl Degrees {
    /// Convert to radians
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

impl Radians {
    /// Convert to degrees
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }
}

/// Convert a physical impedance in ohms to per-unit on the given bases.
///
/// `z_base = base_kv^2 / base_mva`, so `z_pu = z_ohm * base_mva / base_kv^2`.
/// This is the documented boundary conversion for formats that express
/// branch impedance in ohms (DGS, DPX) rather than per-unit (MATPOWER).
pub fn ohms_to_per_unit(z_ohm: f64, base_kv: Kilovolts, base_mva: f64) -> PerUnit {
    let kv = base_kv.value();
    if kv == 0.0 || base_mva == 0.0 {
        return PerUnit(0.0);
    }
    PerUnit(z_ohm * base_mva / (kv * kv))
}

/// Inverse of [`ohms_to_per_unit`].
pub fn per_unit_to_ohms(z_pu: PerUnit, base_kv: Kilovolts, base_mva: f64) -> f64 {
    let kv = base_kv.value();
    if base_mva == 0.0 {
        return 0.0;
    }
    z_pu.value() * kv * kv / base_mva
}

/// Convert a shunt admittance given in siemens to per-unit.
pub fn siemens_to_per_unit(y_s: f64, base_kv: Kilovolts, base_mva: f64) -> PerUnit {
    let kv = base_kv.value();
    if base_mva == 0.0 {
        return PerUnit(0.0);
    }
    PerUnit(y_s * kv * kv / base_mva)
}
