use crate::internal::*;

/// A linear stack of single-input, single-output layers.
#[derive(Debug)]
pub struct Sequential<'g> {
    graph: &'g mut Graph,
    input: TensorHandle,
    output: TensorHandle,
    layers: Vec<LayerId>,
}

impl<'g> Sequential<'g> {
    pub fn new(graph: &'g mut Graph, input: TypedFact) -> TesselResult<Sequential<'g>> {
        let input = graph.input(input)?;
        let output = input.clone();
        Ok(Sequential { graph, input, output, layers: vec![] })
    }

    /// Applies a layer on the current output.
    pub fn add(&mut self, layer: impl Into<Box<dyn Layer>>) -> TesselResult<LayerId> {
        let id = self.graph.add_layer(layer);
        self.output = self.graph.chain(id, &self.output)?;
        self.layers.push(id);
        Ok(id)
    }

    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        layer: impl Into<Box<dyn Layer>>,
    ) -> TesselResult<LayerId> {
        let id = self.graph.add_named_layer(name, layer);
        self.output = self.graph.chain(id, &self.output)?;
        self.layers.push(id);
        Ok(id)
    }

    pub fn input(&self) -> &TensorHandle {
        &self.input
    }

    pub fn output(&self) -> &TensorHandle {
        &self.output
    }

    /// Stacked layers, excluding the input layer.
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn into_container(self) -> TesselResult<Container> {
        Container::new(self.graph, &[self.input], &[self.output])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Activation, Dense};

    #[test]
    fn stack() {
        let mut graph = Graph::default();
        let mut seq = Sequential::new(&mut graph, TypedFact::shape::<f32>(shapefact!(_, 8))).unwrap();
        seq.add(Dense::new(4)).unwrap();
        seq.add(Activation::new("relu".parse().unwrap())).unwrap();
        seq.add(Dense::new(2)).unwrap();
        assert_eq!(seq.output().shape(), &shapefact!(_, 2));
        let mut model = seq.into_container().unwrap();
        assert_eq!(model.layers().count(), 4);
        assert_eq!(model.count_params().unwrap(), 8 * 4 + 4 + 4 * 2 + 2);
        let out = model.call(tvec!(Tensor::zero::<f32>(&[3, 8]).into_arc_tensor())).unwrap();
        assert_eq!(out[0].shape(), &[3, 2]);
    }
}
