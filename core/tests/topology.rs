use proptest::prelude::*;
use std::collections::HashSet;
use tessel_core::internal::*;
use tessel_core::layers::{Activation, ActivationFn, Dense, Merge, MergeMode};

const WIDTH: usize = 4;

#[derive(Clone, Debug)]
enum Step {
    Unary(usize),
    Binary(usize, usize),
    Shared(usize),
}

#[derive(Clone, Debug)]
struct Problem {
    inputs: usize,
    steps: Vec<Step>,
    outputs: Vec<usize>,
    batch: usize,
}

fn step() -> BoxedStrategy<Step> {
    prop_oneof![
        any::<usize>().prop_map(Step::Unary),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Binary(a, b)),
        any::<usize>().prop_map(Step::Shared),
    ]
    .boxed()
}

impl Arbitrary for Problem {
    type Parameters = ();
    type Strategy = BoxedStrategy<Problem>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        let steps = proptest::collection::vec(step(), 1..12);
        let outputs = proptest::collection::vec(any::<usize>(), 0..3);
        (1usize..4, steps, outputs, 1usize..4)
            .prop_map(|(inputs, steps, outputs, batch)| Problem { inputs, steps, outputs, batch })
            .boxed()
    }
}

impl Problem {
    /// Wires a random DAG. A single Dense layer is shared by every `Shared`
    /// step.
    fn wire(&self) -> TesselResult<(Graph, TVec<TensorHandle>, TVec<TensorHandle>)> {
        let mut graph = Graph::default();
        let mut tensors: Vec<TensorHandle> = vec![];
        for _ in 0..self.inputs {
            tensors.push(graph.input(TypedFact::shape::<f32>(shapefact!(_, WIDTH)))?);
        }
        let inputs: TVec<TensorHandle> = tensors.iter().cloned().collect();
        let shared = graph.add_layer(Dense::new(WIDTH));
        for step in &self.steps {
            let pick = |ix: usize| tensors[ix % tensors.len()].clone();
            let output = match *step {
                Step::Unary(a) => {
                    let layer = graph.add_layer(Activation::new(ActivationFn::Tanh));
                    graph.chain(layer, &pick(a))?
                }
                Step::Binary(a, b) => {
                    let layer = graph.add_layer(Merge::new(MergeMode::Sum));
                    graph.wire(layer, &[pick(a), pick(b)])?.remove(0)
                }
                Step::Shared(a) => graph.chain(shared, &pick(a))?,
            };
            tensors.push(output);
        }
        let mut outputs: TVec<TensorHandle> = tvec!(tensors[tensors.len() - 1].clone());
        for o in &self.outputs {
            let candidate = tensors[o % tensors.len()].clone();
            if !outputs.contains(&candidate) {
                outputs.push(candidate);
            }
        }
        Ok((graph, inputs, outputs))
    }

    fn check(&self) -> TesselResult<()> {
        let (graph, inputs, outputs) = self.wire()?;
        let mut model = Container::new(&graph, &inputs, &outputs)?;
        let graph = model.graph();

        // producers are strictly shallower than their consumers
        for node in model.container_nodes() {
            let depth = model.depth_of(*node).context("node without depth")?;
            for input in &graph.node(*node).input_tensors {
                let producer = graph.producer(input)?.id;
                let producer_depth = model.depth_of(producer).context("producer without depth")?;
                ensure!(producer_depth < depth, "{} at {} consumes {} at {}", node, depth, producer, producer_depth);
            }
        }

        // every node is needed by some output
        let mut reached: HashSet<NodeId> = HashSet::new();
        let mut todo: Vec<NodeId> =
            outputs.iter().map(|o| graph.producer(o).map(|n| n.id)).collect::<TesselResult<_>>()?;
        while let Some(node) = todo.pop() {
            if reached.insert(node) {
                for input in &graph.node(node).input_tensors {
                    todo.push(graph.producer(input)?.id);
                }
            }
        }
        ensure!(model.container_nodes().iter().all(|n| reached.contains(n)));
        let bucketed: usize = model.nodes_by_depth().iter().map(|b| b.len()).sum();
        ensure!(bucketed == model.container_nodes().len());

        let feed: TVec<Arc<Tensor>> = (0..self.inputs)
            .map(|i| Tensor::from_shape(&[self.batch, WIDTH], &vec![i as f32 * 0.1; self.batch * WIDTH]))
            .map(|t| t.map(|t| t.into_arc_tensor()))
            .collect::<TesselResult<_>>()?;
        let values = model.call(feed)?;
        ensure!(values.len() == outputs.len());
        for v in values {
            ensure!(v.shape() == &[self.batch, WIDTH]);
        }
        let batch = self.batch;
        let shapes = model.get_output_shape_for(&vec![shapefact!(batch, WIDTH); self.inputs])?;
        ensure!(shapes.iter().all(|s| *s == shapefact!(batch, WIDTH)));
        Ok(())
    }
}

proptest! {
    #[test]
    fn random_dags(problem in any::<Problem>()) {
        problem.check().unwrap()
    }
}

#[test]
fn shared_layer_upstream_and_downstream() {
    let problem = Problem {
        inputs: 1,
        steps: vec![Step::Shared(0), Step::Unary(1), Step::Shared(2), Step::Binary(1, 3)],
        outputs: vec![],
        batch: 2,
    };
    problem.check().unwrap();
}

#[test]
fn output_is_an_input() {
    let problem =
        Problem { inputs: 2, steps: vec![Step::Unary(0)], outputs: vec![1], batch: 1 };
    problem.check().unwrap();
}
