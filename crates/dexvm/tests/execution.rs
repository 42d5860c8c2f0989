mod common;

use dexvm::{Addr, Ceiling, GraphStatus, Ty, Value, VmOptions};

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
fn test_known_condition_takes_one_path() {
    let (vm, method) = common::load(MAX);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(0)), Some(Value::Int(0))]);

    assert!(graph.is_complete());
    assert_eq!(graph.addresses(), vec![Addr(0), Addr(6), Addr(7)]);
    assert_eq!(graph.pile(Addr(6)).len(), 1);
    assert_eq!(graph.pile(Addr(7)).len(), 1);
    assert_eq!(graph.consensus(Addr(7), 0), Some(Value::Int(0)));
    assert_eq!(common::returned(&graph), vec![Value::Int(0)]);
}

#[test]
fn test_unknown_condition_forks() {
    let (vm, method) = common::load(MAX);
    let graph = common::execute(&vm, &method, &[None, Some(Value::Int(3))]);

    for addr in [0, 2, 3, 6, 7] {
        assert!(graph.was_address_reached(Addr(addr)), "{addr} not reached");
    }

    assert_eq!(graph.pile(Addr(7)).len(), 2);
    assert_eq!(graph.consensus(Addr(7), 0), None);
    assert_eq!(graph.terminal_nodes().count(), 2);
}

#[test]
fn test_execution_is_deterministic() {
    let (vm, method) = common::load(MAX);

    let summarize = || {
        let graph = common::execute(&vm, &method, &[None, None]);
        let mut returned = common::returned(&graph)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        returned.sort();

        (graph.node_count(), graph.addresses(), returned)
    };

    assert_eq!(summarize(), summarize());
}

#[test]
fn test_known_loop_runs_to_completion() {
    let text = r#"
.method static count(I)I
    .locals 1
    const v0, 0
  :top
    add-int/lit v0, v0, 1
    if-lt v0, p0, :top
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(5))]);

    assert!(graph.is_complete());
    assert_eq!(graph.pile(Addr(3)).len(), 5);
    assert_eq!(common::returned(&graph), vec![Value::Int(5)]);
}

#[test]
fn test_unbounded_loop_hits_the_ceiling() {
    let text = r#"
.method static spin(I)V
    .locals 1
    const v0, 0
  :top
    add-int/lit v0, v0, 1
    if-ne v0, p0, :top
    return-void
.end method
"#;

    let options = VmOptions {
        max_address_visits: 10,
        ..VmOptions::default()
    };
    let (vm, method) = common::load_with(text, options);
    let graph = common::execute(&vm, &method, &[None]);

    assert_eq!(graph.status(), GraphStatus::Aborted(Ceiling::AddressVisits));
    assert!(graph.nodes().any(|(_, node)| node.truncated));
    assert!(graph.was_address_reached(Addr(7)));
}

#[test]
fn test_node_ceiling() {
    let (vm, method) = common::load_with(
        MAX,
        VmOptions {
            max_nodes: 2,
            ..VmOptions::default()
        },
    );
    let graph = common::execute(&vm, &method, &[None, None]);

    assert_eq!(graph.status(), GraphStatus::Aborted(Ceiling::Nodes));
    assert_eq!(graph.node_count(), 2);
}

const DIV: &str = r#"
.method static div(II)I
    .locals 1
  :start
    div-int v0, p0, p1
  :end
    return v0
  :handler
    const v0, -1
    return v0
    .catch Ljava/lang/ArithmeticException; {:start .. :end} :handler
.end method
"#;

#[test]
fn test_division_routes_to_handler() {
    let (vm, method) = common::load(DIV);

    let graph = common::execute(&vm, &method, &[Some(Value::Int(7)), Some(Value::Int(2))]);
    assert_eq!(common::returned(&graph), vec![Value::Int(3)]);
    assert!(!graph.was_address_reached(Addr(3)));

    let graph = common::execute(&vm, &method, &[Some(Value::Int(7)), Some(Value::Int(0))]);
    assert_eq!(common::returned(&graph), vec![Value::Int(-1)]);
    assert!(!graph.was_address_reached(Addr(2)));

    let graph = common::execute(&vm, &method, &[None, None]);
    assert!(graph.was_address_reached(Addr(2)));
    assert!(graph.was_address_reached(Addr(3)));
}

#[test]
fn test_uncaught_throw_is_terminal() {
    let text = r#"
.method static boom(I)I
    .locals 1
    const v0, 0
    div-int v0, p0, v0
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[None]);

    assert!(graph.is_complete());
    assert!(!graph.was_address_reached(Addr(5)));
    assert_eq!(graph.terminal_nodes().count(), 1);
}

#[test]
fn test_arrays_track_elements() {
    let text = r#"
.method static arrays()I
    .locals 3
    const v0, 2
    new-array v1, v0, [I
    const v2, 1
    const v0, 7
    aput v0, v1, v2
    aget v0, v1, v2
    array-length v2, v1
    add-int v0, v0, v2
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[]);

    assert_eq!(common::returned(&graph), vec![Value::Int(9)]);
}

#[test]
fn test_opaque_call_clobbers_aliases() {
    let text = r#"
.method static clobber()I
    .locals 3
    const v0, 1
    new-array v1, v0, [I
    move-object v2, v1
    invoke-static {v1}, Lother;->touch([I)V
    const v0, 0
    aget v0, v2, v0
    return v0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[]);

    assert_eq!(common::returned(&graph), vec![Value::unknown("I")]);
}

#[test]
fn test_emulated_for_name() {
    let text = r#"
.method static lookup()Ljava/lang/Class;
    .locals 1
    const-string v0, "java.lang.String"
    invoke-static {v0}, Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;
    move-result-object v0
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[]);

    assert_eq!(common::returned(&graph), vec![Value::Class(Ty::string())]);
}

#[test]
fn test_local_static_call_is_executed() {
    let text = r#"
.class Ltest;

.method static caller()I
    .locals 1
    const v0, 4
    invoke-static {v0}, Ltest;->twice(I)I
    move-result v0
    return v0
.end method

.method static twice(I)I
    .locals 0
    add-int/2addr p0, p0
    return p0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[]);

    assert_eq!(common::returned(&graph), vec![Value::Int(8)]);
}

#[test]
fn test_recursion_is_bounded() {
    let text = r#"
.class Ltest;

.method static forever(I)I
    .locals 0
    invoke-static {p0}, Ltest;->forever(I)I
    move-result p0
    return p0
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(1))]);

    assert!(graph.is_complete());
    assert_eq!(common::returned(&graph), vec![Value::unknown("I")]);
}

#[test]
fn test_nested_calls_share_the_node_budget() {
    let text = r#"
.class Ltest;

.method static walk(I)I
    .locals 1
    const v0, 0
  :loop
    if-ge v0, p0, :done
    invoke-static {v0}, Ltest;->walk(I)I
    add-int/lit v0, v0, 1
    goto :loop
  :done
    return v0
.end method
"#;

    let options = VmOptions {
        max_nodes: 2_000,
        max_address_visits: 50,
        max_call_depth: 10,
    };
    let (vm, method) = common::load_with(text, options);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(40))]);

    assert_eq!(graph.status(), GraphStatus::Aborted(Ceiling::Nodes));
    assert!(graph.node_count() < 2_000);
}

#[test]
fn test_state_display() {
    let text = r#"
.method static show(I)V
    .locals 1
    const v0, 5
    return-void
.end method
"#;

    let (vm, method) = common::load(text);
    let graph = common::execute(&vm, &method, &[Some(Value::Int(2))]);
    let node = graph.node_pile(Addr(0)).next().unwrap();

    assert_eq!(
        node.state.to_string(),
        "params: 1, locals: 1\nv0: type=I, value=5\np0: type=I, value=2"
    );
}

#[test]
fn test_dot_lists_edges() {
    let (vm, method) = common::load(MAX);
    let graph = common::execute(&vm, &method, &[None, None]);
    let dot = graph.dot().to_string();

    assert!(dot.starts_with("digraph execution {"));
    assert_eq!(dot.matches(" -> ").count(), graph.node_count() - 1);
}
