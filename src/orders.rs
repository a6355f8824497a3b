//! Orders

use std::fmt;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use smallvec::SmallVec;
use thiserror::Error;

/// Order validation errors. These are precondition violations raised before planning.
#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    /// Order at the given backlog position has no id.
    #[error("Order at position {0} has no id")]
    MissingId(usize),

    /// Width is negative or not a number.
    #[error("Order {id} has invalid width {width}")]
    InvalidWidth {
        /// Order id
        id: String,

        /// Offending width
        width: f64,
    },

    /// Length is negative or not a number.
    #[error("Order {id} has invalid length {length}")]
    InvalidLength {
        /// Order id
        id: String,

        /// Offending length
        length: f64,
    },

    /// The same id appears twice in the backlog.
    #[error("Order {0} appears more than once in the backlog")]
    DuplicateId(String),
}

/// One of the five material layers of corrugated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Outer liner
    Front,

    /// First fluted layer
    C,

    /// Middle liner
    Middle,

    /// Second fluted layer
    B,

    /// Inner liner
    Back,
}

impl Layer {
    /// All layers, outermost first.
    pub const ALL: [Layer; 5] = [Layer::Front, Layer::C, Layer::Middle, Layer::B, Layer::Back];

    /// Short lowercase name used in logs and tables.
    pub fn name(self) -> &'static str {
        match self {
            Layer::Front => "front",
            Layer::C => "c",
            Layer::Middle => "middle",
            Layer::B => "b",
            Layer::Back => "back",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-shape record with one optional slot per [`Layer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct MaterialLayers<T> {
    /// Outer liner
    #[serde(default)]
    pub front: Option<T>,

    /// First fluted layer
    #[serde(default)]
    pub c: Option<T>,

    /// Middle liner
    #[serde(default)]
    pub middle: Option<T>,

    /// Second fluted layer
    #[serde(default)]
    pub b: Option<T>,

    /// Inner liner
    #[serde(default)]
    pub back: Option<T>,
}

impl<T> MaterialLayers<T> {
    /// Borrow the slot for a layer.
    pub fn get(&self, layer: Layer) -> Option<&T> {
        match layer {
            Layer::Front => self.front.as_ref(),
            Layer::C => self.c.as_ref(),
            Layer::Middle => self.middle.as_ref(),
            Layer::B => self.b.as_ref(),
            Layer::Back => self.back.as_ref(),
        }
    }

    /// Mutably borrow the slot for a layer.
    pub fn slot_mut(&mut self, layer: Layer) -> &mut Option<T> {
        match layer {
            Layer::Front => &mut self.front,
            Layer::C => &mut self.c,
            Layer::Middle => &mut self.middle,
            Layer::B => &mut self.b,
            Layer::Back => &mut self.back,
        }
    }

    /// Iterate over filled slots, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &T)> {
        Layer::ALL
            .into_iter()
            .filter_map(move |layer| self.get(layer).map(|value| (layer, value)))
    }

    /// Transform every filled slot.
    pub fn map<U>(&self, mut f: impl FnMut(Layer, &T) -> U) -> MaterialLayers<U> {
        let mut out = MaterialLayers {
            front: None,
            c: None,
            middle: None,
            b: None,
            back: None,
        };

        for (layer, value) in self.iter() {
            *out.slot_mut(layer) = Some(f(layer, value));
        }

        out
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// The five-layer material tuple shared by orders that can run on the same board.
pub type MaterialSpec = MaterialLayers<String>;

impl MaterialLayers<String> {
    /// Trim material names and turn blank names into empty slots.
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
        };

        Self {
            front: clean(self.front),
            c: clean(self.c),
            middle: clean(self.middle),
            b: clean(self.b),
            back: clean(self.back),
        }
    }

    /// Distinct material names with the number of layers using each, in first-use order.
    pub fn material_usage(&self) -> SmallVec<[(&str, usize); 5]> {
        let mut usage: SmallVec<[(&str, usize); 5]> = SmallVec::new();

        for (_, material) in self.iter() {
            if let Some(entry) = usage.iter_mut().find(|(name, _)| *name == material.as_str()) {
                entry.1 += 1;
            } else {
                usage.push((material.as_str(), 1));
            }
        }

        usage
    }
}

impl fmt::Display for MaterialLayers<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: SmallVec<[String; 5]> = self
            .iter()
            .map(|(layer, material)| format!("{layer}: {material}"))
            .collect();

        f.write_str(&parts.join(", "))
    }
}

/// A production order waiting to be slit from a roll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    /// Order number
    pub id: String,

    /// Cut width, in roll width units
    pub width: f64,

    /// Sheet length, in order length units
    pub length: f64,

    /// Quantity to produce
    pub quantity: u32,

    /// Quantity sold (informational)
    #[serde(default)]
    pub demand: u32,

    /// Crease type
    #[serde(rename = "type", default)]
    pub order_type: String,

    /// Component type
    #[serde(default)]
    pub component_type: String,

    /// Material of each layer
    #[serde(flatten)]
    pub layers: MaterialLayers<String>,
}

impl Order {
    /// Create an order without type information or materials.
    pub fn new(id: impl Into<String>, width: f64, length: f64, quantity: u32) -> Self {
        Self {
            id: id.into(),
            width,
            length,
            quantity,
            demand: quantity,
            order_type: String::new(),
            component_type: String::new(),
            layers: MaterialLayers::default(),
        }
    }

    /// Set the crease type.
    #[must_use]
    pub fn with_type(mut self, order_type: impl Into<String>) -> Self {
        self.order_type = order_type.into();
        self
    }

    /// Set the component type.
    #[must_use]
    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = component_type.into();
        self
    }

    /// Set the material layers. Blank names become empty slots.
    #[must_use]
    pub fn with_layers(mut self, layers: MaterialLayers<String>) -> Self {
        self.layers = layers.normalized();
        self
    }

    /// Whether either type column carries the restricted marker.
    pub fn is_restricted(&self, marker: &str) -> bool {
        self.order_type.trim() == marker || self.component_type.trim() == marker
    }

    /// Material spec of this order.
    pub fn material_spec(&self) -> MaterialSpec {
        self.layers.clone().normalized()
    }

    /// Check that the numeric fields are usable by the solver.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] naming the offending field.
    pub fn validate(&self, position: usize) -> Result<(), OrderError> {
        if self.id.trim().is_empty() {
            return Err(OrderError::MissingId(position));
        }

        if !(self.width.is_finite() && self.width >= 0.0) {
            return Err(OrderError::InvalidWidth {
                id: self.id.clone(),
                width: self.width,
            });
        }

        if !(self.length.is_finite() && self.length >= 0.0) {
            return Err(OrderError::InvalidLength {
                id: self.id.clone(),
                length: self.length,
            });
        }

        Ok(())
    }
}

/// Validate a whole backlog: every order individually, and ids unique.
///
/// # Errors
///
/// Returns the first [`OrderError`] found.
pub fn validate_backlog(orders: &[Order]) -> Result<(), OrderError> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    for (position, order) in orders.iter().enumerate() {
        order.validate(position)?;

        if !seen.insert(order.id.as_str()) {
            return Err(OrderError::DuplicateId(order.id.clone()));
        }
    }

    Ok(())
}
