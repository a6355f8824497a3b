//! Roll Allocator
//!
//! Maps the length a material layer needs onto physical stock rolls. The allocator prefers to keep
//! consuming the roll it used last for a (width, material) pair, tops that roll up with the largest
//! remaining rolls when it runs short, and otherwise opens the first roll in sequence that covers the
//! requirement on its own. Only when no single roll is long enough are several rolls spliced
//! together, largest first.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::stock::{PhysicalRoll, RollRef, RollStock};

type RollIndexList = SmallVec<[usize; 8]>;

/// Before/after lengths of one roll touched by an allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RollUsage {
    /// Roll number
    pub roll_id: String,

    /// Remaining length before the allocation
    pub before: f64,

    /// Remaining length after the allocation
    pub after: f64,
}

impl RollUsage {
    /// Length taken from the roll.
    pub fn consumed(&self) -> f64 {
        self.before - self.after
    }
}

impl fmt::Display for RollUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (length {} m, remaining {} m)",
            self.roll_id,
            format_length(self.before),
            format_length(self.after)
        )
    }
}

/// Outcome of one allocation call.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationTrace {
    /// Nothing had to be drawn.
    NotRequired,

    /// The stock has no rolls for this width and material.
    NoStock,

    /// The unused rolls cannot cover the requirement. Nothing was deducted.
    Insufficient {
        /// Length that was needed
        required: f64,

        /// Length available from usable rolls
        available: f64,
    },

    /// The active roll covered the requirement on its own.
    Continued(RollUsage),

    /// A fresh roll covered the requirement on its own.
    Opened(RollUsage),

    /// Several rolls were spliced together, in consumption order.
    Spliced(SmallVec<[RollUsage; 4]>),
}

impl AllocationTrace {
    /// Whether the requirement could not be met from stock.
    pub fn is_shortfall(&self) -> bool {
        matches!(
            self,
            AllocationTrace::NoStock | AllocationTrace::Insufficient { .. }
        )
    }

    /// Rolls touched, in consumption order.
    pub fn usages(&self) -> &[RollUsage] {
        match self {
            AllocationTrace::Continued(usage) | AllocationTrace::Opened(usage) => {
                std::slice::from_ref(usage)
            }
            AllocationTrace::Spliced(usages) => usages.as_slice(),
            AllocationTrace::NotRequired
            | AllocationTrace::NoStock
            | AllocationTrace::Insufficient { .. } => &[],
        }
    }

    /// Total length deducted from stock.
    pub fn consumed(&self) -> f64 {
        self.usages().iter().map(RollUsage::consumed).sum()
    }
}

impl fmt::Display for AllocationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationTrace::NotRequired => f.write_str("-> (nothing required)"),
            AllocationTrace::NoStock => f.write_str("-> (no stock data)"),
            AllocationTrace::Insufficient {
                required,
                available,
            } => write!(
                f,
                "-> (insufficient stock: need {} m, available {} m)",
                format_length(*required),
                format_length(*available)
            ),
            AllocationTrace::Continued(usage) => write!(f, "-> continued roll: {usage}"),
            AllocationTrace::Opened(usage) => write!(f, "-> opened new roll: {usage}"),
            AllocationTrace::Spliced(usages) => {
                f.write_str("-> spliced rolls: ")?;

                for (idx, usage) in usages.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{usage}")?;
                }

                Ok(())
            }
        }
    }
}

/// Whole lengths print without decimals, everything else with two.
fn format_length(length: f64) -> String {
    if (length - length.round()).abs() < 1e-9 {
        format!("{length:.0}")
    } else {
        format!("{length:.2}")
    }
}

/// Per (width, material) continuation bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationState {
    /// Roll currently preferred for continued consumption
    pub active_roll_id: Option<String>,

    /// Index into the roll sequence where the next fresh search starts
    pub position: usize,

    /// Order that last drew from this pair
    pub last_order_id: Option<String>,
}

/// Rolls already charged within one cut.
///
/// The planner clears this before each pattern so a roll can serve the next cut, but not two layers
/// of the same one.
#[derive(Debug, Clone, Default)]
pub struct UsedRolls {
    rolls: FxHashSet<RollRef>,
}

impl UsedRolls {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a roll was already charged.
    pub fn contains(&self, width: &str, material: &str, roll_id: &str) -> bool {
        self.rolls.contains(&RollRef::new(width, material, roll_id))
    }

    /// Mark a roll as charged.
    pub fn insert(&mut self, width: &str, material: &str, roll_id: &str) {
        self.rolls.insert(RollRef::new(width, material, roll_id));
    }

    /// Forget all charged rolls.
    pub fn clear(&mut self) {
        self.rolls.clear();
    }

    /// Whether no roll was charged.
    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }
}

/// Stateful roll allocator. One instance lives for one planning run.
#[derive(Debug, Default)]
pub struct RollAllocator {
    states: FxHashMap<(String, String), AllocationState>,
}

impl RollAllocator {
    /// Create an allocator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continuation state for a width and material, if it was ever allocated.
    pub fn state(&self, width: &str, material: &str) -> Option<&AllocationState> {
        self.states.get(&(width.to_string(), material.to_string()))
    }

    /// Draw `required_length` of `material` at `width` from `stock`.
    ///
    /// Deducts from the chosen rolls, marks them in `used`, and returns a trace of what happened.
    /// Shortfalls are reported in the trace and leave the stock untouched.
    pub fn allocate(
        &mut self,
        stock: &mut RollStock,
        width: &str,
        material: &str,
        required_length: f64,
        used: &mut UsedRolls,
        order_id: Option<&str>,
    ) -> AllocationTrace {
        if required_length.is_nan() || required_length <= 0.0 {
            return AllocationTrace::NotRequired;
        }

        let Some(rolls) = stock
            .rolls_mut(width, material)
            .filter(|rolls| !rolls.is_empty())
        else {
            warn!(width, material, "no stock data");
            return AllocationTrace::NoStock;
        };

        let state = self
            .states
            .entry((width.to_string(), material.to_string()))
            .or_default();

        if state.last_order_id.as_deref() != order_id {
            state.position = 0;
            state.last_order_id = order_id.map(str::to_string);
        }

        let mut pass = Pass {
            rolls,
            used,
            state,
            width,
            material,
        };

        let trace = pass.run(required_length);

        if trace.is_shortfall() {
            warn!(width, material, required_length, %trace, "allocation shortfall");
        } else {
            debug!(width, material, required_length, %trace, "allocated");
        }

        trace
    }
}

/// One allocation call over the rolls of a single width and material.
struct Pass<'a> {
    rolls: &'a mut [PhysicalRoll],
    used: &'a mut UsedRolls,
    state: &'a mut AllocationState,
    width: &'a str,
    material: &'a str,
}

impl Pass<'_> {
    fn run(&mut self, required: f64) -> AllocationTrace {
        let active = self
            .state
            .active_roll_id
            .as_deref()
            .and_then(|id| self.rolls.iter().position(|roll| roll.id == id));

        if let Some(idx) = active {
            let length = self.rolls.get(idx).map_or(0.0, |roll| roll.length);

            if self.is_used(idx) {
                // Already charged in this cut: the next fresh search starts one roll further.
                self.state.position = self.state.position.saturating_add(1);
            } else if length >= required {
                return self
                    .consume(idx, required)
                    .map_or(AllocationTrace::NoStock, AllocationTrace::Continued);
            } else if length > 0.0 {
                return self.top_up(idx, length, required);
            }
        }

        self.open_fresh(required)
    }

    /// Exhaust the active roll and cover the shortfall with the largest unused rolls.
    fn top_up(&mut self, active: usize, active_length: f64, required: f64) -> AllocationTrace {
        let shortfall = required - active_length;
        let candidates = self.largest_first(Some(active));

        let Some(chosen) = self.covering_prefix(&candidates, shortfall) else {
            return AllocationTrace::Insufficient {
                required,
                available: active_length + self.total_length(&candidates),
            };
        };

        let mut usages: SmallVec<[RollUsage; 4]> = SmallVec::new();
        usages.extend(self.consume(active, active_length));
        usages.extend(self.splice(&chosen, shortfall));

        AllocationTrace::Spliced(usages)
    }

    /// Open the first unused roll in sequence (from the current position) that covers the
    /// requirement alone; splice largest-first when none does.
    fn open_fresh(&mut self, required: f64) -> AllocationTrace {
        let count = self.rolls.len();
        let start = self.state.position.min(count);

        let fit = (start..count).chain(0..start).find(|&idx| {
            !self.is_used(idx)
                && self
                    .rolls
                    .get(idx)
                    .is_some_and(|roll| roll.length > 0.0 && roll.length >= required)
        });

        if let Some(idx) = fit {
            return self
                .consume(idx, required)
                .map_or(AllocationTrace::NoStock, AllocationTrace::Opened);
        }

        let candidates = self.largest_first(None);

        let Some(chosen) = self.covering_prefix(&candidates, required) else {
            return AllocationTrace::Insufficient {
                required,
                available: self.total_length(&candidates),
            };
        };

        AllocationTrace::Spliced(self.splice(&chosen, required))
    }

    /// Consume `chosen` rolls in order until `need` is covered.
    fn splice(&mut self, chosen: &[usize], need: f64) -> SmallVec<[RollUsage; 4]> {
        let mut remaining = need;
        let mut usages = SmallVec::new();

        for &idx in chosen {
            if remaining <= 0.0 {
                break;
            }

            let available = self.rolls.get(idx).map_or(0.0, |roll| roll.length);
            let take = available.min(remaining);

            if let Some(usage) = self.consume(idx, take) {
                remaining -= take;
                usages.push(usage);
            }
        }

        usages
    }

    /// Deduct from one roll, mark it used and make it the active roll.
    fn consume(&mut self, idx: usize, amount: f64) -> Option<RollUsage> {
        let roll = self.rolls.get_mut(idx)?;

        let before = roll.length;
        roll.length = (roll.length - amount).max(0.0);

        let usage = RollUsage {
            roll_id: roll.id.clone(),
            before,
            after: roll.length,
        };

        self.used.insert(self.width, self.material, &roll.id);
        self.state.active_roll_id = Some(roll.id.clone());
        self.state.position = idx;

        Some(usage)
    }

    fn is_used(&self, idx: usize) -> bool {
        self.rolls
            .get(idx)
            .is_some_and(|roll| self.used.contains(self.width, self.material, &roll.id))
    }

    /// Unused rolls with length left, longest first; ties keep sequence order.
    fn largest_first(&self, exclude: Option<usize>) -> RollIndexList {
        let mut candidates: RollIndexList = self
            .rolls
            .iter()
            .enumerate()
            .filter(|&(idx, roll)| Some(idx) != exclude && roll.length > 0.0 && !self.is_used(idx))
            .map(|(idx, _)| idx)
            .collect();

        candidates.sort_by(|&a, &b| {
            let la = self.rolls.get(a).map_or(0.0, |roll| roll.length);
            let lb = self.rolls.get(b).map_or(0.0, |roll| roll.length);

            lb.total_cmp(&la)
        });

        candidates
    }

    /// Shortest prefix of `candidates` whose combined length covers `need`.
    fn covering_prefix(&self, candidates: &[usize], need: f64) -> Option<RollIndexList> {
        let mut total = 0.0;
        let mut prefix = RollIndexList::new();

        for &idx in candidates {
            total += self.rolls.get(idx).map_or(0.0, |roll| roll.length);
            prefix.push(idx);

            if total >= need {
                return Some(prefix);
            }
        }

        None
    }

    fn total_length(&self, candidates: &[usize]) -> f64 {
        candidates
            .iter()
            .filter_map(|&idx| self.rolls.get(idx))
            .map(|roll| roll.length)
            .sum()
    }
}
