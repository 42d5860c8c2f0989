use std::fmt::{self, Display};

use slotmap::Key;

use super::{ExecutionGraph, NodeId};

impl ExecutionGraph {
    pub fn dot(&self) -> impl Display + '_ {
        struct NodeIdPrinter(NodeId);

        impl Display for NodeIdPrinter {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let id = self.0.data().as_ffi();

                write!(f, "n{}_{}", id as u32, id >> 32)
            }
        }

        struct DotPrinter<'a>(&'a ExecutionGraph);

        impl Display for DotPrinter<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let graph = self.0;
                let locals = Some(graph.method.locals());

                writeln!(f, "digraph execution {{")?;
                writeln!(f, "  node [shape=rect];")?;
                writeln!(f, "  edge [minlen=1; dir=forward];")?;
                writeln!(f)?;

                for (node_id, node) in &graph.nodes {
                    let insn = match graph.method.insn_at(node.addr) {
                        Some(insn) => insn.display(locals).to_string(),
                        None => "?".into(),
                    };

                    writeln!(
                        f,
                        "  {} [label = \"{}: {}\"{}];",
                        NodeIdPrinter(node_id),
                        node.addr,
                        insn.replace('\\', "\\\\").replace('"', "\\\""),
                        if node.truncated { ", style=dashed" } else { "" },
                    )?;
                }

                writeln!(f)?;

                for (node_id, node) in &graph.nodes {
                    for &child_id in &node.children {
                        writeln!(
                            f,
                            "  {} -> {};",
                            NodeIdPrinter(node_id),
                            NodeIdPrinter(child_id),
                        )?;
                    }
                }

                writeln!(f, "}}")
            }
        }

        DotPrinter(self)
    }
}
