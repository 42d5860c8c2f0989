#![allow(dead_code)]

use dexopt::{Manipulator, Optimizer, OptimizerOptions, Outcome, Strategy};
use dexvm::asm;
use dexvm::{ClassManager, ExecutionGraph, Insn, Method, Value, Vm, VmOptions};

/// Parses `text` (a class body, with or without a `.class` header) and returns a VM
/// that knows the class along with its first method.
pub fn load(text: &str) -> (Vm, Method) {
    load_with(text, VmOptions::default())
}

pub fn load_with(text: &str, options: VmOptions) -> (Vm, Method) {
    let text = if text.trim_start().starts_with(".class") {
        text.to_owned()
    } else {
        format!(".class Ltest;\n{text}")
    };

    let class = asm::parse_class(&text).unwrap_or_else(|e| panic!("invalid test class: {e}"));
    let method = class.methods[0].clone();
    let mut classes = ClassManager::new();
    classes.add_class(class);

    (Vm::new(classes, options), method)
}

/// Executes `method` with the given parameter values, `None` standing for unknown.
pub fn execute(vm: &Vm, method: &Method, args: &[Option<Value>]) -> ExecutionGraph {
    let mut state = vm.initial_state(method);

    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg {
            state.assign_param(idx as u16, value.clone()).unwrap();
        }
    }

    vm.execute(method, state)
        .unwrap_or_else(|e| panic!("execution failed: {e:?}"))
}

/// Optimizes `method` to a fixpoint with unknown parameters.
pub fn optimize<'a>(vm: &'a Vm, method: &Method, remove_weak: bool) -> Optimizer<'a> {
    let graph = execute(vm, method, &[]);
    let options = OptimizerOptions {
        remove_weak_dead_code: remove_weak,
    };
    let mut optimizer = Optimizer::new(vm, graph, &options);
    optimizer.simplify(100).unwrap();

    optimizer
}

/// Runs a single strategy over the graph.
pub fn perform(strategy: &mut impl Strategy, vm: &Vm, graph: &mut ExecutionGraph) -> Outcome {
    let mut manipulator = Manipulator::new(vm, graph);

    strategy
        .perform(&mut manipulator)
        .unwrap_or_else(|e| panic!("{} failed: {e}", strategy.name()))
}

/// The values returned by terminal `return` nodes, in no particular order.
pub fn returned(graph: &ExecutionGraph) -> Vec<Value> {
    graph
        .terminal_nodes()
        .filter_map(|node| match graph.method().insn_at(node.addr) {
            Some(Insn::Return { src }) => Some(node.state.read(*src).unwrap()),
            _ => None,
        })
        .collect()
}

pub fn opcodes(method: &Method) -> Vec<String> {
    method.insns().iter().map(Insn::opcode_name).collect()
}

pub fn listing(method: &Method) -> String {
    asm::print_method(method).to_string()
}
