mod common;

use dexopt::{Manipulator, ManipulatorError};
use dexvm::value::Literal;
use dexvm::{Addr, Insn};

const SUM: &str = r#"
.method static sum(I)I
    .locals 1
    const v0, 1
    nop
    add-int v0, v0, p0
    return v0
.end method
"#;

const SKIP: &str = r#"
.method static skip(I)V
    .locals 0
    if-eqz p0, :end
    nop
  :end
    return-void
.end method
"#;

#[test]
fn test_remove_links_parents_to_children() {
    let (vm, method) = common::load(SUM);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    manipulator.remove(Addr(3)).unwrap();

    assert!(!manipulator.method().insns().contains(&Insn::Nop));
    assert_eq!(manipulator.addresses(), vec![Addr(0), Addr(3), Addr(5)]);

    let root = graph.root().unwrap();
    let children = &graph.node(root).children;
    assert_eq!(children.len(), 1);
    assert_eq!(graph.node(children[0]).addr, Addr(3));
    assert_eq!(graph.node(children[0]).parents, vec![root]);
    assert_eq!(graph.node_count(), 3);
}

#[test]
fn test_replace_keeps_the_pile() {
    let (vm, method) = common::load(SUM);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    let replacement = Insn::Const {
        dst: 0,
        value: Literal::Int(1),
    };
    let relocation = manipulator.replace(Addr(3), replacement.clone()).unwrap();

    assert_eq!(relocation.insn(Addr(4)), Some(Addr(6)));
    assert_eq!(manipulator.get_instruction(Addr(3)).unwrap(), &replacement);
    assert!(manipulator.was_address_reached(Addr(3)));
    assert_eq!(manipulator.get_node_pile(Addr(6)).count(), 1);
    assert_eq!(manipulator.get_node_pile(Addr(8)).count(), 1);
}

#[test]
fn test_insert_before_takes_over_jumps() {
    let (vm, method) = common::load(SKIP);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    manipulator.insert_before(Addr(3), Insn::Nop).unwrap();

    let Insn::If { target, .. } = manipulator.method().insns()[0] else {
        panic!("expected a branch");
    };
    assert_eq!(target, Addr(3));
    assert_eq!(manipulator.get_instruction(Addr(4)).unwrap(), &Insn::ReturnVoid);
    assert!(!manipulator.was_address_reached(Addr(3)));
    assert!(manipulator.was_address_reached(Addr(4)));
}

#[test]
fn test_insert_after_is_skipped_by_jumps() {
    let (vm, method) = common::load(SKIP);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    manipulator.insert_after(Addr(2), Insn::Nop).unwrap();

    let Insn::If { target, .. } = manipulator.method().insns()[0] else {
        panic!("expected a branch");
    };
    assert_eq!(target, Addr(4));
    assert_eq!(manipulator.method().len(), 4);
}

#[test]
fn test_disconnecting_removals_are_refused() {
    let (vm, method) = common::load(SKIP);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);
    let before = common::listing(manipulator.method());

    // the branch target has nothing after it
    assert!(matches!(
        manipulator.remove(Addr(3)),
        Err(ManipulatorError::WouldDisconnect(Addr(3)))
    ));

    // the branch continues at its target as well as the next instruction
    assert!(matches!(
        manipulator.remove(Addr(0)),
        Err(ManipulatorError::WouldDisconnect(Addr(0)))
    ));

    assert_eq!(common::listing(manipulator.method()), before);
}

#[test]
fn test_missing_address() {
    let (vm, method) = common::load(SUM);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    assert!(matches!(
        manipulator.get_instruction(Addr(1)),
        Err(ManipulatorError::NoInstruction(Addr(1)))
    ));
    assert!(manipulator.remove(Addr(1)).is_err());
}

#[test]
fn test_add_locals_shifts_parameters() {
    let (vm, method) = common::load(SUM);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut manipulator = Manipulator::new(&vm, &mut graph);

    manipulator.add_locals(2);

    assert_eq!(manipulator.method().locals(), 3);
    assert_eq!(
        manipulator.get_instruction(Addr(4)).unwrap().reads(),
        vec![0, 3]
    );
    assert_eq!(graph.entry().locals(), 3);
    assert!(graph.nodes().all(|(_, node)| node.state.locals() == 3));
}
