//! Package-size parsing and comparison.
//!
//! Flyer offers and catalog entries describe their size in free text
//! (`"1,5 l"`, `"6 x 330ml"`, `"500g"`). Sizes are converted to a base unit
//! per dimension so that the ranking engine can apply its size-tolerance
//! bonus across units (`1 l` vs `1000 ml`).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(\d+)\s*x\s*)?(\d+(?:[.,]\d+)?)\s*(kg|gr|g|ml|cl|dl|ltr|l|lb|oz|pcs|pc|pk|ct)\b",
    )
    .expect("package size pattern is valid")
});

/// Base unit a [`PackageSize`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    Gram,
    Millilitre,
    Piece,
}

impl std::fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeUnit::Gram => write!(f, "g"),
            SizeUnit::Millilitre => write!(f, "ml"),
            SizeUnit::Piece => write!(f, "pc"),
        }
    }
}

impl std::str::FromStr for SizeUnit {
    type Err = String;

    /// Parses the short form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "g" => Ok(SizeUnit::Gram),
            "ml" => Ok(SizeUnit::Millilitre),
            "pc" => Ok(SizeUnit::Piece),
            other => Err(format!("unknown size unit: {other}")),
        }
    }
}

/// A package quantity normalized to its base unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackageSize {
    pub value: f64,
    pub unit: SizeUnit,
}

impl PackageSize {
    #[must_use]
    pub fn new(value: f64, unit: SizeUnit) -> Self {
        Self { value, unit }
    }

    /// Returns `true` when both sizes share a unit and differ by at most
    /// `tolerance` relative to the larger of the two.
    #[must_use]
    pub fn within_tolerance(&self, other: &PackageSize, tolerance: f64) -> bool {
        if self.unit != other.unit {
            return false;
        }
        let larger = self.value.max(other.value);
        if larger <= 0.0 {
            return false;
        }
        (self.value - other.value).abs() / larger <= tolerance
    }
}

impl std::fmt::Display for PackageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Extracts the first package size mentioned in `text`.
///
/// Multipacks (`6 x 330 ml`) are multiplied out. Comma decimals are
/// accepted. Returns `None` when no recognised quantity is present or the
/// quantity is zero.
#[must_use]
pub fn parse_package_size(text: &str) -> Option<PackageSize> {
    let normalized = normalize_text(text);
    let caps = SIZE_RE.captures(&normalized)?;

    let multiplier = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(1.0);
    let amount = caps.get(2)?.as_str().replace(',', ".").parse::<f64>().ok()?;

    let (factor, unit) = match caps.get(3)?.as_str() {
        "kg" => (1000.0, SizeUnit::Gram),
        "g" | "gr" => (1.0, SizeUnit::Gram),
        "lb" => (453.592, SizeUnit::Gram),
        "oz" => (28.3495, SizeUnit::Gram),
        "ml" => (1.0, SizeUnit::Millilitre),
        "cl" => (10.0, SizeUnit::Millilitre),
        "dl" => (100.0, SizeUnit::Millilitre),
        "l" | "ltr" => (1000.0, SizeUnit::Millilitre),
        _ => (1.0, SizeUnit::Piece),
    };

    let value = multiplier * amount * factor;
    if value <= 0.0 {
        return None;
    }
    Some(PackageSize::new(value, unit))
}
