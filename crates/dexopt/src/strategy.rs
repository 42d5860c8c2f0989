mod constant;
mod dead;
mod peephole;
mod unreflect;

use std::fmt;

use hashbrown::HashMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::manipulator::{Manipulator, ManipulatorError};

pub use self::constant::ConstantPropagation;
pub use self::dead::DeadCodeRemoval;
pub use self::peephole::Peephole;
pub use self::unreflect::Unreflection;

/// What kind of rewrite a strategy performed, as named in reports.
#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ConstantPropagation,
    ConstantPredicate,
    ConstantSwitch,
    DeadUnreachable,
    DeadUselessGoto,
    DeadNop,
    DeadUnusedAssignment,
    DeadUnusedResult,
    PeepClassForName,
    PeepStringInit,
    PeepCheckCast,
    Unreflection,
}

/// Rewrite counts by category. Counts only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts(HashMap<Category, usize>);

impl Counts {
    pub fn add(&mut self, category: Category, count: usize) {
        if count > 0 {
            *self.0.entry(category).or_default() += count;
        }
    }

    pub fn get(&self, category: Category) -> usize {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &Counts) {
        for (&category, &count) in &other.0 {
            self.add(category, count);
        }
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries sorted by category name.
    pub fn sorted(&self) -> Vec<(Category, usize)> {
        let mut entries = self
            .0
            .iter()
            .map(|(&category, &count)| (category, count))
            .collect::<Vec<_>>();
        entries.sort_unstable_by_key(|&(category, _)| <&'static str>::from(category));

        entries
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        for (idx, (category, count)) in self.sorted().into_iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }

            write!(f, "{category}={count}")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Changed,
    /// The rewrite changed what the graph would say; it must be rebuilt before anything
    /// else consults it.
    ReexecuteNeeded,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

pub trait Strategy {
    fn name(&self) -> &'static str;

    fn perform(&mut self, manipulator: &mut Manipulator<'_>) -> Result<Outcome, ManipulatorError>;

    fn counts(&self) -> &Counts;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sort_by_name() {
        let mut counts = Counts::default();
        counts.add(Category::PeepCheckCast, 1);
        counts.add(Category::ConstantPropagation, 2);
        counts.add(Category::DeadNop, 0);
        counts.add(Category::ConstantPropagation, 1);

        assert_eq!(counts.to_string(), "ConstantPropagation=3, PeepCheckCast=1");
        assert_eq!(counts.total(), 4);
        assert_eq!(Counts::default().to_string(), "none");
    }
}
