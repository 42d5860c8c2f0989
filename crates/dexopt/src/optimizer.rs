use anyhow::{Context, Result};
use log::{debug, trace};

use dexvm::{ExecutionGraph, Method, Vm};

use crate::manipulator::Manipulator;
use crate::strategy::{
    ConstantPropagation, Counts, DeadCodeRemoval, Outcome, Peephole, Strategy, Unreflection,
};

#[derive(Debug, Clone, Default)]
pub struct OptimizerOptions {
    /// Also remove side-effect-free instructions whose results are never read.
    pub remove_weak_dead_code: bool,
}

/// Runs the strategies over one method's graph in sweeps until nothing changes.
pub struct Optimizer<'a> {
    vm: &'a Vm,
    graph: ExecutionGraph,
    /// Strategies whose rewrites keep the graph usable within a sweep.
    reoptimize: Vec<Box<dyn Strategy>>,
    /// Strategies whose rewrites invalidate the graph.
    reexecute: Vec<Box<dyn Strategy>>,
    made_changes: bool,
    should_reexecute: bool,
}

impl<'a> Optimizer<'a> {
    pub fn new(vm: &'a Vm, graph: ExecutionGraph, options: &OptimizerOptions) -> Self {
        Self {
            vm,
            graph,
            reoptimize: vec![
                Box::new(DeadCodeRemoval::new(options.remove_weak_dead_code)),
                Box::new(ConstantPropagation::new()),
                Box::new(Peephole::new()),
            ],
            reexecute: vec![Box::new(Unreflection::new())],
            made_changes: false,
            should_reexecute: false,
        }
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    pub fn method(&self) -> &Method {
        self.graph.method()
    }

    pub fn into_method(self) -> Method {
        self.graph.into_method()
    }

    /// Whether the last [`Self::simplify`] rewrote anything.
    pub fn made_changes(&self) -> bool {
        self.made_changes
    }

    /// Whether the last [`Self::simplify`] ran out of sweeps with a stale graph. The
    /// caller should execute the method afresh and optimize again.
    pub fn should_reexecute(&self) -> bool {
        self.should_reexecute
    }

    pub fn simplify(&mut self, max_sweeps: usize) -> Result<()> {
        self.made_changes = false;
        self.should_reexecute = false;

        for sweep in 0..max_sweeps {
            let (changed, reexecute) = self.sweep()?;
            trace!("sweep {sweep}: changed = {changed}, reexecute = {reexecute}");

            if !changed && !reexecute {
                break;
            }

            self.made_changes = true;

            if !reexecute {
                continue;
            }

            if sweep + 1 == max_sweeps {
                self.should_reexecute = true;

                break;
            }

            self.graph = self
                .vm
                .execute(self.graph.method(), self.graph.entry().clone())
                .context("failed to re-execute the method")?;
        }

        debug!("optimized {}: {}", self.graph.method().reference, self.counts());

        Ok(())
    }

    /// One pass of every strategy. Stops early once the graph goes stale.
    fn sweep(&mut self) -> Result<(bool, bool)> {
        let mut manipulator = Manipulator::new(self.vm, &mut self.graph);
        let mut changed = false;
        let mut reexecute = false;

        for strategy in &mut self.reoptimize {
            let outcome = strategy
                .perform(&mut manipulator)
                .with_context(|| format!("{} failed", strategy.name()))?;
            changed |= outcome.changed();
            reexecute |= outcome == Outcome::ReexecuteNeeded || manipulator.reexecution_requested();

            if reexecute {
                return Ok((changed, reexecute));
            }
        }

        for strategy in &mut self.reexecute {
            let outcome = strategy
                .perform(&mut manipulator)
                .with_context(|| format!("{} failed", strategy.name()))?;
            reexecute |= outcome.changed() || manipulator.reexecution_requested();

            if reexecute {
                break;
            }
        }

        Ok((changed, reexecute))
    }

    /// Rewrites performed so far, by category.
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();

        for strategy in self.reoptimize.iter().chain(&self.reexecute) {
            counts.merge(strategy.counts());
        }

        counts
    }

    pub fn report(&self) -> String {
        format!("Optimizations: {}", self.counts())
    }
}
