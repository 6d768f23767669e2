//! Numeric unit decoding for platform quantity objects.
//!
//! Platform SDK versions disagree on how a mass, length or energy object
//! exposes its number. Decoding walks a fixed chain of extraction attempts
//! and falls back to a documented per-metric default, so one malformed
//! sample never aborts a batch read.
//!
//! Order of attempts:
//! 1. typed unit conversion (`inUnit(KILOGRAMS)`)
//! 2. plain `value` property
//! 3. unit-specific property (`inKilograms`)
//! 4. zero-argument method (`inKilograms()`, then `getValue()`)
//! 5. first decimal number in the textual form (`"75.5 kg"`)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accessor surfaces a platform quantity object may offer
pub trait QuantitySurface {
    /// Typed conversion API for a named unit constant
    fn in_unit(&self, unit: &str) -> Option<f64>;

    /// Field/property read
    fn property(&self, name: &str) -> Option<f64>;

    /// Zero-argument method call
    fn call(&self, method: &str) -> Option<f64>;

    /// Textual representation
    fn text(&self) -> Option<String>;
}

/// A platform quantity object as captured from the native layer.
///
/// Each map holds whatever the SDK build happened to expose; older builds
/// often only provide a subset, sometimes nothing but `display`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NativeQuantity {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl NativeQuantity {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Object that only renders as text
    pub fn text_only(display: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: &str, value: f64) -> Self {
        self.units.insert(unit.into(), value);
        self
    }

    pub fn with_property(mut self, name: &str, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_method(mut self, name: &str, value: f64) -> Self {
        self.methods.insert(name.into(), value);
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl QuantitySurface for NativeQuantity {
    fn in_unit(&self, unit: &str) -> Option<f64> {
        self.units.get(unit).copied()
    }

    fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    fn call(&self, method: &str) -> Option<f64> {
        self.methods.get(method).copied()
    }

    fn text(&self) -> Option<String> {
        self.display.clone()
    }
}

/// Which attempt produced a decoded value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    TypedUnit,
    ValueProperty,
    NamedProperty,
    Method,
    Text,
    Default,
}

/// Decoded value in canonical units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decoded {
    pub value: f64,
    pub strategy: Strategy,
}

/// How one physical quantity is decoded and encoded
#[derive(Clone, Copy, Debug)]
pub struct UnitSpec {
    /// Label for logs
    pub quantity: &'static str,
    /// Native unit constant for the typed conversion API
    pub unit: &'static str,
    /// Unit-specific accessor name
    pub accessor: &'static str,
    /// Native unit symbol for the textual form
    pub symbol: &'static str,
    /// Native to canonical multiplier
    pub scale: f64,
    /// Canonical value when every attempt fails
    pub default: f64,
}

/// Mass: native kilograms, canonical kilograms
pub const MASS: UnitSpec = UnitSpec {
    quantity: "mass",
    unit: "KILOGRAMS",
    accessor: "inKilograms",
    symbol: "kg",
    scale: 1.0,
    default: 70.0,
};

/// Length: native meters, canonical centimeters
pub const LENGTH: UnitSpec = UnitSpec {
    quantity: "length",
    unit: "METERS",
    accessor: "inMeters",
    symbol: "m",
    scale: 100.0,
    default: 175.0,
};

/// Energy: native kilocalories, canonical kilocalories
pub const ENERGY: UnitSpec = UnitSpec {
    quantity: "energy",
    unit: "KILOCALORIES",
    accessor: "inKilocalories",
    symbol: "kcal",
    scale: 1.0,
    default: 0.0,
};

impl UnitSpec {
    /// Decode to canonical units, never failing
    pub fn decode(&self, quantity: &dyn QuantitySurface) -> f64 {
        self.decode_traced(quantity).value
    }

    /// Decode and report which attempt succeeded
    pub fn decode_traced(&self, quantity: &dyn QuantitySurface) -> Decoded {
        let found = finite(quantity.in_unit(self.unit))
            .map(|v| (Strategy::TypedUnit, v))
            .or_else(|| finite(quantity.property("value")).map(|v| (Strategy::ValueProperty, v)))
            .or_else(|| {
                finite(quantity.property(self.accessor)).map(|v| (Strategy::NamedProperty, v))
            })
            .or_else(|| {
                finite(quantity.call(self.accessor))
                    .or_else(|| finite(quantity.call("getValue")))
                    .map(|v| (Strategy::Method, v))
            })
            .or_else(|| {
                let text = quantity.text()?;
                tracing::debug!("{} toString(): {}", self.quantity, text);
                finite(first_number(&text)).map(|v| (Strategy::Text, v))
            });

        match found {
            Some((strategy, native)) => {
                tracing::debug!(
                    "Decoded {} value {} via {:?}",
                    self.quantity,
                    native,
                    strategy
                );
                Decoded {
                    value: native * self.scale,
                    strategy,
                }
            }
            None => {
                tracing::warn!(
                    "All approaches failed for {} extraction, using default {}",
                    self.quantity,
                    self.default
                );
                Decoded {
                    value: self.default,
                    strategy: Strategy::Default,
                }
            }
        }
    }

    /// Build the object a current SDK produces for a canonical value
    pub fn encode(&self, canonical: f64) -> NativeQuantity {
        let native = canonical / self.scale;
        NativeQuantity::empty()
            .with_unit(self.unit, native)
            .with_property("value", native)
            .with_property(self.accessor, native)
            .with_method(self.accessor, native)
            .with_method("getValue", native)
            .with_display(format!("{} {}", native, self.symbol))
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+\.?\d*)").ok());

/// First unsigned decimal number in `text`
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}
