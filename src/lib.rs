//! Slitplan
//!
//! Slitplan plans how paper rolls are slit for a backlog of corrugated-board orders. Each iteration
//! solves a small mixed-integer program that picks one order and a number of parallel cuts for the
//! roll width, then charges the consumed length against the physical roll inventory layer by layer.

pub mod allocator;
pub mod config;
pub mod fixtures;
pub mod orders;
pub mod planner;
pub mod prelude;
pub mod report;
pub mod solvers;
pub mod stock;
pub mod suggestions;
