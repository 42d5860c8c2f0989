mod args;

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use dexopt::{Counts, Optimizer, OptimizerOptions};
use dexvm::{asm, ClassManager, Method, Vm};

use crate::args::Args;

/// Fresh executions of one method after the optimizer ran out of sweeps.
const MAX_ROUNDS: usize = 10;

fn optimize(vm: &Vm, method: &Method, args: &Args) -> Result<(Method, Counts)> {
    let options = OptimizerOptions {
        remove_weak_dead_code: args.remove_weak,
    };
    let mut method = method.clone();
    let mut counts = Counts::default();

    for round in 0..MAX_ROUNDS {
        let graph = vm.execute(&method, vm.initial_state(&method))?;
        let mut optimizer = Optimizer::new(vm, graph, &options);
        optimizer.simplify(args.max_sweeps)?;
        counts.merge(&optimizer.counts());

        let again = optimizer.should_reexecute();
        method = optimizer.into_method();

        if !again {
            break;
        }

        info!("re-executing {} (round {})", method.reference, round + 1);
    }

    Ok((method, counts))
}

fn run(args: &Args) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("could not read {}", args.input.display()))?;
    let class = asm::parse_class(&text).context("could not parse the input class")?;
    let class_name = class.name.clone();
    let references = class
        .methods
        .iter()
        .map(|method| method.reference.clone())
        .collect::<Vec<_>>();

    let mut classes = ClassManager::new();
    classes.add_class(class);
    let mut vm = Vm::new(classes, args.vm_options());
    let mut total = Counts::default();

    for reference in references {
        if let Some(include) = &args.include {
            if !include.is_match(&reference.to_string()) {
                continue;
            }
        }

        let Some(method) = vm.classes().method(&reference).filter(|method| !method.is_empty()) else {
            continue;
        };

        match optimize(&vm, method, args) {
            Ok((method, counts)) => {
                eprintln!("{reference}\n  Optimizations: {counts}");
                total.merge(&counts);
                vm.classes_mut().update_method(&method);
            }

            Err(e) => warn!("left {reference} unmodified: {e:#}"),
        }
    }

    eprintln!("Total optimizations: {total}");

    let class = vm
        .classes()
        .class(&class_name)
        .context("the input class went missing")?;
    let output = asm::print_class(class).to_string();

    match &args.output {
        Some(path) => fs::write(path, output).with_context(|| format!("could not write {}", path.display()))?,
        None => print!("{output}"),
    }

    Ok(())
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,

        Err(e) => {
            eprintln!("error: {e:?}");

            ExitCode::FAILURE
        }
    }
}
