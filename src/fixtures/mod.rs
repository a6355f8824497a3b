//! Fixtures
//!
//! Named sets of orders and stock stored as YAML under a fixture directory:
//! `orders/<set>.yml` holds an `orders:` list and `stock/<set>.yml` a `rolls:` list.

use std::{fs, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::{ConfigError, PlannerConfig},
    orders::Order,
    stock::{RollStock, StockError, StockRecord},
};

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Stock rows could not be turned into a stock
    #[error("Invalid stock: {0}")]
    Stock(#[from] StockError),

    /// Planner configuration could not be loaded
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    /// No orders loaded
    #[error("No orders loaded")]
    NoOrders,
}

#[derive(Debug, Deserialize)]
struct OrdersFixture {
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct StockFixture {
    rolls: Vec<StockRecord>,
}

/// Fixture
#[derive(Debug, Default)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    /// Backlog, in file order
    orders: Vec<Order>,

    /// Stock-list rows, in file order
    rolls: Vec<StockRecord>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            orders: Vec::new(),
            rolls: Vec::new(),
        }
    }

    /// Load orders from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_orders(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("orders").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: OrdersFixture = serde_norway::from_str(&contents)?;

        // Spreadsheet exports leave blank material cells as empty strings.
        self.orders.extend(fixture.orders.into_iter().map(|mut order| {
            order.layers = order.layers.normalized();
            order
        }));

        Ok(self)
    }

    /// Load stock rows from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_stock(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("stock").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: StockFixture = serde_norway::from_str(&contents)?;

        self.rolls.extend(fixture.rolls);

        Ok(self)
    }

    /// Load planner configuration from `config/<name>.yml`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_config(&self, name: &str) -> Result<PlannerConfig, FixtureError> {
        let file_path = self.base_path.join("config").join(format!("{name}.yml"));

        Ok(PlannerConfig::from_yaml_file(file_path)?)
    }

    /// Load orders and stock from the same fixture set name
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        let mut fixture = Self::new();

        fixture.load_orders(name)?.load_stock(name)?;

        Ok(fixture)
    }

    /// Get all loaded orders
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// The first `n` orders (all when `None`)
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NoOrders`] if nothing was loaded.
    pub fn backlog(&self, n: Option<usize>) -> Result<&[Order], FixtureError> {
        if self.orders.is_empty() {
            return Err(FixtureError::NoOrders);
        }

        let n = n.unwrap_or(self.orders.len()).min(self.orders.len());

        Ok(self.orders.get(..n).unwrap_or_default())
    }

    /// Get all loaded stock rows
    pub fn rolls(&self) -> &[StockRecord] {
        &self.rolls
    }

    /// Build a fresh stock from the loaded rows
    ///
    /// # Errors
    ///
    /// Returns an error if the rows are inconsistent.
    pub fn stock(&self) -> Result<RollStock, FixtureError> {
        Ok(RollStock::from_records(self.rolls.iter().cloned())?)
    }
}
