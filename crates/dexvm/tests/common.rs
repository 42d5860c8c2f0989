#![allow(dead_code)]

use dexvm::asm;
use dexvm::{Addr, ClassManager, ExecutionGraph, Method, Value, Vm, VmOptions};

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

pub fn addr_of(method: &Method, idx: usize) -> Addr {
    method.addrs()[idx]
}

/// The values returned by terminal `return` nodes, in no particular order.
pub fn returned(graph: &ExecutionGraph) -> Vec<Value> {
    graph
        .terminal_nodes()
        .filter_map(|node| match graph.method().insn_at(node.addr) {
            Some(dexvm::Insn::Return { src }) => Some(node.state.read(*src).unwrap()),
            _ => None,
        })
        .collect()
}
