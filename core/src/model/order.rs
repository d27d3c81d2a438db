//! Evaluation order of the nodes reachable from a set of output tensors.
use crate::internal::*;
use bit_set::BitSet;

/// Nodes an input of `node` directly depends on, when the walk stops at the
/// `inputs` tensors.
///
/// The producer of a stopping tensor is kept only if it is a source node: it
/// contributes its layer to the container but needs nothing.
pub fn node_deps(graph: &Graph, node: &Node, inputs: &[TensorId]) -> TVec<NodeId> {
    let mut deps = tvec!();
    for ix in 0..node.input_tensors.len() {
        let producer =
            graph.layer(node.inbound_layers[ix]).inbound_nodes[node.node_indices[ix]];
        if inputs.contains(&node.input_tensors[ix].id) && !graph.node(producer).is_source() {
            continue;
        }
        if !deps.contains(&producer) {
            deps.push(producer);
        }
    }
    deps
}

/// Depth-first backward walk from `targets`, returning the visited nodes,
/// producers first.
pub fn eval_order_for_nodes(
    graph: &Graph,
    inputs: &[TensorId],
    targets: &[NodeId],
) -> TesselResult<Vec<NodeId>> {
    let mut done = BitSet::with_capacity(graph.nodes().len());
    let mut needed: Vec<NodeId> = targets.iter().rev().copied().collect();
    let mut order: Vec<NodeId> = vec![];
    while let Some(&node) = needed.last() {
        if done.contains(node.0) {
            needed.pop();
            continue;
        }
        let deps = node_deps(graph, graph.node(node), inputs);
        if deps.iter().all(|d| done.contains(d.0)) {
            order.push(node);
            needed.pop();
            done.insert(node.0);
        } else {
            for dep in deps.iter().rev() {
                if !done.contains(dep.0) {
                    needed.push(*dep);
                }
            }
        }
    }
    Ok(order)
}

/// Depth of each node of `order` relative to the walk: zero for nodes with
/// no visited predecessor, one more than their deepest predecessor otherwise.
pub fn depths_for_order(graph: &Graph, order: &[NodeId], inputs: &[TensorId]) -> HashMap<NodeId, usize> {
    let mut depths = HashMap::with_capacity(order.len());
    for &node in order {
        let depth = node_deps(graph, graph.node(node), inputs)
            .iter()
            .filter_map(|d| depths.get(d))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depths.insert(node, depth);
    }
    depths
}
