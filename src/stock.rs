//! Roll Stock

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

/// Errors raised while building a [`RollStock`].
#[derive(Debug, Error, PartialEq)]
pub enum StockError {
    /// A roll was supplied with a negative or non-numeric length.
    #[error("Roll {roll} has invalid length {length}")]
    InvalidLength {
        /// Offending roll
        roll: RollRef,

        /// Supplied length
        length: f64,
    },

    /// The same roll id was supplied twice for one width and material.
    #[error("Roll {0} appears more than once")]
    DuplicateRoll(RollRef),
}

/// Identity of a physical roll: its width, material and roll number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RollRef {
    /// Roll width as written on the stock list
    pub width: String,

    /// Paper material code
    pub material: String,

    /// Roll number
    pub roll_id: String,
}

impl RollRef {
    /// Create a roll reference.
    pub fn new(
        width: impl Into<String>,
        material: impl Into<String>,
        roll_id: impl Into<String>,
    ) -> Self {
        Self {
            width: width.into(),
            material: material.into(),
            roll_id: roll_id.into(),
        }
    }
}

impl fmt::Display for RollRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.width, self.material, self.roll_id)
    }
}

/// A physical roll of paper with its remaining length.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalRoll {
    /// Roll number
    pub id: String,

    /// Remaining length
    pub length: f64,
}

impl PhysicalRoll {
    /// Create a roll.
    pub fn new(id: impl Into<String>, length: f64) -> Self {
        Self {
            id: id.into(),
            length,
        }
    }
}

/// One row of a stock list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockRecord {
    /// Roll width
    #[serde(deserialize_with = "text_or_number")]
    pub roll_size: String,

    /// Paper material code
    #[serde(deserialize_with = "text_or_number")]
    pub roll_type: String,

    /// Remaining length
    pub length: f64,

    /// Roll number
    #[serde(default, deserialize_with = "text_or_number")]
    pub roll_number: String,
}

/// Stock spreadsheets mix numeric and textual cells for the same column.
fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Cell::deserialize(deserializer)? {
        Cell::Text(text) => text,
        Cell::Int(value) => value.to_string(),
        Cell::Float(value) => value.to_string(),
    })
}

/// Inventory of physical rolls grouped by width, then material.
///
/// Rolls keep the order in which they were loaded; that order is the roll sequence the allocator
/// walks. Cloning a `RollStock` yields an independent deep copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollStock {
    widths: FxHashMap<String, FxHashMap<String, Vec<PhysicalRoll>>>,
}

impl RollStock {
    /// Create an empty stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stock from stock-list rows.
    ///
    /// Rows without a roll number are skipped with a warning. Width and material codes are trimmed.
    ///
    /// # Errors
    ///
    /// Returns a [`StockError`] for negative lengths or repeated roll numbers.
    pub fn from_records(
        records: impl IntoIterator<Item = StockRecord>,
    ) -> Result<Self, StockError> {
        let mut stock = Self::new();

        for (row, record) in records.into_iter().enumerate() {
            let roll_id = record.roll_number.trim();

            if roll_id.is_empty() {
                warn!(row, roll_size = %record.roll_size, roll_type = %record.roll_type, "skipping stock row without roll number");
                continue;
            }

            stock.insert(
                record.roll_size.trim(),
                record.roll_type.trim(),
                roll_id,
                record.length,
            )?;
        }

        Ok(stock)
    }

    /// Add a roll under a width and material.
    ///
    /// # Errors
    ///
    /// Returns a [`StockError`] if the length is invalid or the roll already exists.
    pub fn insert(
        &mut self,
        width: &str,
        material: &str,
        roll_id: &str,
        length: f64,
    ) -> Result<(), StockError> {
        if !(length.is_finite() && length >= 0.0) {
            return Err(StockError::InvalidLength {
                roll: RollRef::new(width, material, roll_id),
                length,
            });
        }

        let rolls = self
            .widths
            .entry(width.to_string())
            .or_default()
            .entry(material.to_string())
            .or_default();

        if rolls.iter().any(|roll| roll.id == roll_id) {
            return Err(StockError::DuplicateRoll(RollRef::new(
                width, material, roll_id,
            )));
        }

        rolls.push(PhysicalRoll::new(roll_id, length));

        Ok(())
    }

    /// Add a roll, builder style.
    ///
    /// # Errors
    ///
    /// Returns a [`StockError`] if the length is invalid or the roll already exists.
    pub fn with_roll(
        mut self,
        width: &str,
        material: &str,
        roll_id: &str,
        length: f64,
    ) -> Result<Self, StockError> {
        self.insert(width, material, roll_id, length)?;

        Ok(self)
    }

    /// Rolls for a width and material, in load order.
    pub fn rolls(&self, width: &str, material: &str) -> &[PhysicalRoll] {
        self.widths
            .get(width)
            .and_then(|materials| materials.get(material))
            .map_or(&[], Vec::as_slice)
    }

    pub(crate) fn rolls_mut(&mut self, width: &str, material: &str) -> Option<&mut [PhysicalRoll]> {
        self.widths
            .get_mut(width)
            .and_then(|materials| materials.get_mut(material))
            .map(Vec::as_mut_slice)
    }

    /// Look up a single roll.
    pub fn roll(&self, width: &str, material: &str, roll_id: &str) -> Option<&PhysicalRoll> {
        self.rolls(width, material)
            .iter()
            .find(|roll| roll.id == roll_id)
    }

    /// Remaining length of a single roll.
    pub fn remaining(&self, width: &str, material: &str, roll_id: &str) -> Option<f64> {
        self.roll(width, material, roll_id).map(|roll| roll.length)
    }

    /// Sum of remaining length over all rolls of a width and material.
    pub fn total_length(&self, width: &str, material: &str) -> f64 {
        self.rolls(width, material)
            .iter()
            .map(|roll| roll.length)
            .sum()
    }

    /// Widths present in the stock, sorted numerically (non-digits ignored).
    pub fn widths(&self) -> Vec<&str> {
        let mut widths: Vec<&str> = self.widths.keys().map(String::as_str).collect();

        widths.sort_by_key(|width| (numeric_width(width), *width));

        widths
    }

    /// Whether a width stocks every listed material (with at least one roll each).
    pub fn has_materials<'m>(&self, width: &str, materials: impl IntoIterator<Item = &'m str>) -> bool {
        materials
            .into_iter()
            .all(|material| !self.rolls(width, material).is_empty())
    }

    /// Number of rolls across the whole stock.
    pub fn roll_count(&self) -> usize {
        self.widths
            .values()
            .flat_map(FxHashMap::values)
            .map(Vec::len)
            .sum()
    }
}

/// Numeric value of a width label such as `"100"` or `"100 cm"`; labels without digits sort first.
pub fn numeric_width(width: &str) -> u64 {
    let digits: String = width.chars().filter(char::is_ascii_digit).collect();

    digits.parse().unwrap_or(0)
}
