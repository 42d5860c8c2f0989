mod common;

use dexopt::strategy::{ConstantPropagation, DeadCodeRemoval};
use dexopt::{Category, Optimizer, OptimizerOptions, Outcome, Strategy};
use dexvm::value::Literal;
use dexvm::{Ceiling, GraphStatus, Insn, Value, VmOptions};

#[test]
fn test_known_result_becomes_a_constant() {
    let text = r#"
.method static product()I
    .locals 2
    const v0, 6
    const v1, 7
    mul-int v0, v0, v1
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Changed);
    assert_eq!(
        graph.method().insns()[2],
        Insn::Const {
            dst: 0,
            value: Literal::Int(42)
        }
    );
    assert_eq!(constant.counts().get(Category::ConstantPropagation), 1);
}

#[test]
fn test_disagreeing_pile_is_left_alone() {
    let text = r#"
.method static pick(I)I
    .locals 1
    if-eqz p0, :zero
    const v0, 1
    goto :done
  :zero
    const v0, 2
  :done
    add-int/lit v0, v0, 1
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let before = common::listing(graph.method());
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::listing(graph.method()), before);
    assert!(constant.counts().is_empty());
}

#[test]
fn test_agreeing_forks_are_folded() {
    let text = r#"
.method static same(I)I
    .locals 1
    if-eqz p0, :zero
    const v0, 1
    goto :done
  :zero
    const v0, 1
  :done
    add-int/lit v0, v0, 1
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Changed);
    assert_eq!(
        graph.method().insns()[4],
        Insn::Const {
            dst: 0,
            value: Literal::Int(2)
        }
    );
}

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
fn test_decided_branch_becomes_a_jump() {
    let (vm, method) = common::load(MAX);
    let mut graph = common::execute(&vm, &method, &[Some(Value::Int(0)), Some(Value::Int(0))]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Changed);

    let method = graph.method();
    assert_eq!(common::opcodes(method), ["goto/32", "move", "goto/32", "const", "return"]);
    assert_eq!(
        method.insns()[0],
        Insn::Goto {
            target: method.addrs()[3]
        }
    );
    assert_eq!(constant.counts().get(Category::ConstantPredicate), 1);
    assert_eq!(constant.counts().get(Category::ConstantPropagation), 1);

    // the false branch was never reached and goes next
    let mut dead = DeadCodeRemoval::new(false);
    assert_eq!(common::perform(&mut dead, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["goto/32", "const", "return"]);
}

#[test]
fn test_decided_branch_is_optimized_away() {
    let (vm, method) = common::load(MAX);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(0)), Some(Value::Int(0))]);
    let mut optimizer = Optimizer::new(&vm, graph, &OptimizerOptions::default());
    optimizer.simplify(100).unwrap();

    assert!(optimizer.made_changes());
    assert_eq!(common::opcodes(optimizer.method()), ["const", "return"]);
    assert_eq!(common::returned(optimizer.graph()), vec![Value::Int(0)]);
}

#[test]
fn test_known_switch_is_decided() {
    let text = r#"
.method static choose()I
    .locals 1
    const v0, 2
    switch v0, {1 -> :one, 2 -> :two}
  :one
    const v0, 10
    return v0
  :two
    const v0, 20
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Changed);
    assert_eq!(constant.counts().get(Category::ConstantSwitch), 1);

    let method = graph.method();
    assert_eq!(
        method.insns()[1],
        Insn::Goto {
            target: method.addrs()[4]
        }
    );
}

const SCAN: &str = r#"
.method static scan(I)I
    .locals 2
    const v0, 0
  :loop
    if-ge v0, p0, :done
    const v1, 20
    if-eq v0, v1, :hit
    add-int/lit v0, v0, 1
    goto :loop
  :hit
    const v0, -1
  :done
    return v0
.end method
"#;

fn scan_options() -> VmOptions {
    VmOptions {
        max_address_visits: 10,
        ..VmOptions::default()
    }
}

#[test]
fn test_aborted_graph_decides_nothing() {
    let (vm, method) = common::load_with(SCAN, scan_options());
    let mut graph = common::execute(&vm, &method, &[None]);
    let before = common::listing(graph.method());
    let mut constant = ConstantPropagation::new();

    // every explored pass through the loop saw v0 != 20
    assert_eq!(graph.status(), GraphStatus::Aborted(Ceiling::AddressVisits));
    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::listing(graph.method()), before);
    assert!(constant.counts().is_empty());
}

#[test]
fn test_optimizer_keeps_branches_of_an_aborted_graph() {
    let (vm, method) = common::load_with(SCAN, scan_options());
    let graph = common::execute(&vm, &method, &[None]);
    let mut optimizer = Optimizer::new(&vm, graph, &OptimizerOptions::default());
    optimizer.simplify(100).unwrap();

    assert!(!optimizer.made_changes());
    assert!(common::opcodes(optimizer.method()).contains(&"if-eq".to_owned()));
}

#[test]
fn test_fresh_string_keeps_its_identity() {
    let text = r#"
.method static copy()Ljava/lang/String;
    .locals 3
    const v0, 2
    new-array v0, v0, [B
    fill-array-data v0, [104, 105]
    new-instance v1, Ljava/lang/String;
    invoke-direct {v1, v0}, Ljava/lang/String;-><init>([B)V
    move-object v2, v1
    return-object v2
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::opcodes(graph.method())[5], "move");
}

#[test]
fn test_interned_string_is_propagated() {
    let text = r#"
.method static copy()Ljava/lang/String;
    .locals 2
    const-string v0, "hi"
    move-object v1, v0
    return-object v1
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut constant = ConstantPropagation::new();

    assert_eq!(common::perform(&mut constant, &vm, &mut graph), Outcome::Changed);
    assert_eq!(
        graph.method().insns()[1],
        Insn::Const {
            dst: 1,
            value: Literal::String("hi".into())
        }
    );
}
