mod common;

use dexopt::strategy::DeadCodeRemoval;
use dexopt::{Category, Outcome, Strategy};
use dexvm::{Addr, Value, VmOptions};

const MAX: &str = r#"
.method public static max(II)I
    .locals 1
    if-ge p0, p1, :first
    move v0, p1
    goto :done
  :first
    move v0, p0
  :done
    return v0
.end method
"#;

#[test]
fn test_unreached_code_is_removed() {
    let (vm, method) = common::load(MAX);
    let mut graph = common::execute(&vm, &method, &[Some(Value::Int(0)), Some(Value::Int(0))]);
    let mut dead = DeadCodeRemoval::new(false);

    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["if-ge", "move", "return"]);
    assert_eq!(dead.counts().get(Category::DeadUnreachable), 2);

    // everything left was reached, so a second pass finds nothing
    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Unchanged);
}

#[test]
fn test_forked_code_is_kept() {
    let (vm, method) = common::load(MAX);
    let mut graph = common::execute(&vm, &method, &[None, None]);
    let mut dead = DeadCodeRemoval::new(false);

    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(graph.method().len(), 5);
}

#[test]
fn test_aborted_graph_proves_nothing_unreachable() {
    let options = VmOptions {
        max_nodes: 1,
        ..VmOptions::default()
    };
    let (vm, method) = common::load_with(MAX, options);
    let mut graph = common::execute(&vm, &method, &[None, None]);
    let mut dead = DeadCodeRemoval::new(false);

    assert!(!graph.is_complete());
    assert!(!graph.was_address_reached(Addr(7)));
    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(graph.method().len(), 5);
}

#[test]
fn test_nops_and_fallthrough_gotos() {
    let text = r#"
.method static idle()V
    .locals 0
    nop
    goto :next
  :next
    return-void
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut dead = DeadCodeRemoval::new(false);

    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["return-void"]);
    assert_eq!(dead.counts().get(Category::DeadNop), 1);
    assert_eq!(dead.counts().get(Category::DeadUselessGoto), 1);
    assert!(graph.was_address_reached(Addr(0)));
}

const UNUSED: &str = r#"
.method static unused(I)I
    .locals 1
    add-int/lit v0, p0, 1
    return p0
.end method
"#;

#[test]
fn test_weak_removal_is_opt_in() {
    let (vm, method) = common::load(UNUSED);

    let mut graph = common::execute(&vm, &method, &[None]);
    let mut dead = DeadCodeRemoval::new(false);
    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Unchanged);

    let mut graph = common::execute(&vm, &method, &[None]);
    let mut dead = DeadCodeRemoval::new(true);
    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["return"]);
    assert_eq!(dead.counts().get(Category::DeadUnusedAssignment), 1);
}

#[test]
fn test_read_on_one_path_keeps_the_assignment() {
    let text = r#"
.method static partial(I)I
    .locals 1
    const v0, 5
    if-eqz p0, :use
    return p0
  :use
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut dead = DeadCodeRemoval::new(true);

    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(graph.method().len(), 4);
}

#[test]
fn test_overwritten_assignment_is_weak() {
    let text = r#"
.method static overwritten()I
    .locals 1
    const v0, 5
    const v0, 6
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut dead = DeadCodeRemoval::new(true);

    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["const", "return"]);
    assert_eq!(common::returned(&graph), vec![Value::Int(6)]);
}
