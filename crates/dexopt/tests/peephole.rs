mod common;

use dexopt::strategy::Peephole;
use dexopt::{Category, Outcome, Strategy};
use dexvm::value::Literal;
use dexvm::{Insn, Ty, Value, VmOptions};

#[test]
fn test_for_name_with_known_name() {
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
    let mut graph = common::execute(&vm, &method, &[]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["const-string", "const-class", "return"]);
    assert_eq!(
        graph.method().insns()[1],
        Insn::Const {
            dst: 0,
            value: Literal::Class(Ty::string())
        }
    );
    assert_eq!(peephole.counts().get(Category::PeepClassForName), 1);
    assert_eq!(common::returned(&graph), vec![Value::Class(Ty::string())]);
}

#[test]
fn test_for_name_with_imaginary_class() {
    let text = r#"
.method static lookup()Ljava/lang/Class;
    .locals 1
    const-string v0, "com.funky.imaginary.class"
    invoke-static {v0}, Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;
    move-result-object v0
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["const-string", "const-class", "return"]);
    assert_eq!(
        graph.method().insns()[1],
        Insn::Const {
            dst: 0,
            value: Literal::Class(Ty::new("Lcom/funky/imaginary/class;"))
        }
    );
}

#[test]
fn test_for_name_with_local_class() {
    let text = r#"
.class Lcom/example/Local;

.method static lookup()Ljava/lang/Class;
    .locals 1
    const-string v0, "com.example.Local"
    invoke-static {v0}, Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;
    move-result-object v0
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Changed);
    assert_eq!(
        graph.method().insns()[1],
        Insn::Const {
            dst: 0,
            value: Literal::Class(Ty::new("Lcom/example/Local;"))
        }
    );
    assert_eq!(peephole.counts().get(Category::PeepClassForName), 1);
}

#[test]
fn test_for_name_in_aborted_graph() {
    let text = r#"
.method static lookup(I)Ljava/lang/Class;
    .locals 1
    const-string v0, "java.lang.String"
    invoke-static {v0}, Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;
    move-result-object v0
  :spin
    add-int/lit p0, p0, 1
    if-nez p0, :spin
    return-object v0
.end method
"#;

    let options = VmOptions {
        max_address_visits: 3,
        ..VmOptions::default()
    };
    let (vm, method) = common::load_with(text, options);
    let mut graph = common::execute(&vm, &method, &[None]);
    let before = common::listing(graph.method());
    let mut peephole = Peephole::new();

    assert!(!graph.is_complete());
    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::listing(graph.method()), before);
}

#[test]
fn test_for_name_with_unknown_name() {
    let text = r#"
.method static lookup(Ljava/lang/String;)Ljava/lang/Class;
    .locals 1
    invoke-static {p0}, Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;
    move-result-object v0
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::opcodes(graph.method()), ["invoke-static", "move-result", "return"]);
}

#[test]
fn test_string_from_known_bytes() {
    let text = r#"
.method static greet()Ljava/lang/String;
    .locals 2
    const v0, 2
    new-array v0, v0, [B
    fill-array-data v0, [104, 105]
    new-instance v1, Ljava/lang/String;
    invoke-direct {v1, v0}, Ljava/lang/String;-><init>([B)V
    return-object v1
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Changed);
    assert_eq!(
        graph.method().insns()[4],
        Insn::Const {
            dst: 1,
            value: Literal::String("hi".into())
        }
    );
    assert_eq!(peephole.counts().get(Category::PeepStringInit), 1);
}

#[test]
fn test_string_from_unknown_bytes() {
    let text = r#"
.method static decode([B)Ljava/lang/String;
    .locals 1
    new-instance v0, Ljava/lang/String;
    invoke-direct {v0, p0}, Ljava/lang/String;-><init>([B)V
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let before = common::listing(graph.method());
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Unchanged);
    assert_eq!(common::listing(graph.method()), before);
}

#[test]
fn test_redundant_cast() {
    let text = r#"
.method static cast(Ljava/lang/Object;)Ljava/lang/String;
    .locals 1
    const-string v0, "x"
    check-cast v0, Ljava/lang/String;
    check-cast p0, Ljava/lang/String;
    return-object v0
.end method
"#;

    let (vm, method) = common::load(text);
    let mut graph = common::execute(&vm, &method, &[None]);
    let mut peephole = Peephole::new();

    assert_eq!(common::perform(&mut peephole, &vm, &mut graph), Outcome::Changed);
    assert_eq!(common::opcodes(graph.method()), ["const-string", "check-cast", "return"]);
    assert_eq!(peephole.counts().get(Category::PeepCheckCast), 1);
}
