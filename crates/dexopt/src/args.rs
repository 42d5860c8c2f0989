use std::path::PathBuf;

use clap::Parser;
use regex::Regex;

use dexvm::VmOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Class in text assembly.
    pub input: PathBuf,

    /// Where to write the optimized class. Defaults to stdout.
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    pub max_sweeps: usize,

    /// Remove side-effect-free instructions whose results are never read.
    #[arg(long)]
    pub remove_weak: bool,

    #[arg(long, default_value_t = 50_000)]
    pub max_nodes: usize,

    #[arg(long, default_value_t = 500)]
    pub max_address_visits: usize,

    #[arg(long, default_value_t = 10)]
    pub max_call_depth: usize,

    /// Only optimize methods whose reference matches.
    #[arg(long, value_parser = Regex::new)]
    pub include: Option<Regex>,
}

impl Args {
    pub fn vm_options(&self) -> VmOptions {
        VmOptions {
            max_nodes: self.max_nodes,
            max_address_visits: self.max_address_visits,
            max_call_depth: self.max_call_depth,
        }
    }
}
