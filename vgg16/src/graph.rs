//! Render a [`Network`] as an NNEF graph document.
//!
//! The network is described in NHWC like its converted weights, while NNEF
//! convolutions and pools run on NCHW inputs with OIHW filters. The graph
//! transposes activations on the way in and back before flattening, and
//! every variable records how its TensorFlow-layout parameter must be
//! rearranged to fit.
use std::fmt::Write;

use anyhow::bail;
use tract_nnef::prelude::*;

use crate::network::{Activation, FeatureShape, Layer, Network, ParamSpec};

pub const GRAPH_NAME: &str = "network";
pub const INPUT_NAME: &str = "input";

/// A graph variable, bound to a parameter from the dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    /// Parameter name and shape, in TensorFlow layout.
    pub param: ParamSpec,
    pub identifier: String,
    /// Shape of the NNEF tensor.
    pub shape: TVec<usize>,
    /// Axes permutation from the parameter to the NNEF tensor, applied before
    /// reshaping to `shape`.
    pub permutation: Option<TVec<usize>>,
}

impl Variable {
    pub fn label(&self) -> &str {
        &self.param.name
    }
}

#[derive(Clone, Debug)]
pub struct GraphDef {
    pub text: String,
    pub variables: Vec<Variable>,
    pub output: String,
}

struct Renderer {
    body: String,
    variables: Vec<Variable>,
    wire: String,
    nchw: bool,
}

impl Renderer {
    fn line(&mut self, line: impl AsRef<str>) -> TractResult<()> {
        writeln!(self.body, "    {};", line.as_ref())?;
        Ok(())
    }

    fn variable(
        &mut self,
        layer: &str,
        name: &str,
        param_shape: TVec<usize>,
        shape: TVec<usize>,
        permutation: Option<TVec<usize>>,
    ) -> TractResult<String> {
        let identifier = format!("{layer}_{name}");
        let param = ParamSpec { name: format!("{layer}/{name}"), shape: param_shape };
        self.line(format!(
            "{identifier} = variable<scalar>(label = \"{}\", shape = {})",
            param.name,
            list(&shape)
        ))?;
        self.variables.push(Variable { param, identifier: identifier.clone(), shape, permutation });
        Ok(identifier)
    }

    fn ensure_nchw(&mut self) -> TractResult<()> {
        if !self.nchw {
            let wire = format!("{}_nchw", self.wire);
            self.line(format!("{wire} = transpose({}, axes = [0, 3, 1, 2])", self.wire))?;
            self.wire = wire;
            self.nchw = true;
        }
        Ok(())
    }

    fn ensure_nhwc(&mut self) -> TractResult<()> {
        if self.nchw {
            let wire = format!("{}_nhwc", self.wire);
            self.line(format!("{wire} = transpose({}, axes = [0, 2, 3, 1])", self.wire))?;
            self.wire = wire;
            self.nchw = false;
        }
        Ok(())
    }

    fn layer(&mut self, layer: &Layer, input: FeatureShape) -> TractResult<()> {
        match (layer, input) {
            (Layer::Conv { name, filters }, FeatureShape::Spatial(_, _, c)) => {
                let f = *filters;
                self.ensure_nchw()?;
                let kernel = self.variable(
                    name,
                    "kernel",
                    tvec!(3, 3, c, f),
                    tvec!(f, c, 3, 3),
                    Some(tvec!(3, 2, 0, 1)),
                )?;
                let bias = self.variable(name, "bias", tvec!(f), tvec!(1, f, 1, 1), None)?;
                self.line(format!("{name}_conv = conv({}, {kernel})", self.wire))?;
                self.line(format!("{name}_biased = add({name}_conv, {bias})"))?;
                self.line(format!("{name} = relu({name}_biased)"))?;
                self.wire = name.clone();
            }
            (Layer::MaxPool { name }, FeatureShape::Spatial(..)) => {
                self.ensure_nchw()?;
                self.line(format!(
                    "{name} = max_pool({}, size = [1, 1, 2, 2], stride = [1, 1, 2, 2], border = \"ignore\")",
                    self.wire
                ))?;
                self.wire = name.clone();
            }
            (Layer::Flatten, FeatureShape::Spatial(..)) => {
                self.ensure_nhwc()?;
                self.line(format!("flatten = reshape({}, shape = [1, {}])", self.wire, input.volume()))?;
                self.wire = "flatten".to_string();
            }
            (Layer::Flatten, FeatureShape::Flat(_)) => (),
            (Layer::Dense { name, units, activation }, FeatureShape::Flat(n)) => {
                let u = *units;
                let kernel = self.variable(name, "kernel", tvec!(n, u), tvec!(n, u), None)?;
                let bias = self.variable(name, "bias", tvec!(u), tvec!(1, u), None)?;
                self.line(format!("{name}_matmul = matmul({}, {kernel})", self.wire))?;
                match activation {
                    Activation::Relu => {
                        self.line(format!("{name}_biased = add({name}_matmul, {bias})"))?;
                        self.line(format!("{name} = relu({name}_biased)"))?;
                    }
                    Activation::Identity => {
                        self.line(format!("{name} = add({name}_matmul, {bias})"))?;
                    }
                }
                self.wire = name.clone();
            }
            (Layer::Dropout { name }, _) => {
                debug!("Dropout {name} is a no-op at inference time");
            }
            (Layer::Softmax { name }, FeatureShape::Flat(_)) => {
                self.line(format!("{name} = softmax({}, axes = [1])", self.wire))?;
                self.wire = name.clone();
            }
            (layer, shape) => bail!("Can not render {:?} on {} features", layer, shape),
        }
        Ok(())
    }
}

fn list(values: &[usize]) -> String {
    format!("[{}]", values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))
}

pub fn render(network: &Network) -> TractResult<GraphDef> {
    let shapes = network.walk()?;
    let mut renderer =
        Renderer { body: String::new(), variables: vec![], wire: INPUT_NAME.to_string(), nchw: false };
    let size = network.input_size();
    renderer.line(format!(
        "{INPUT_NAME} = external<scalar>(shape = {})",
        list(&[1, size, size, network.input_channels()])
    ))?;
    for (layer, input) in network.layers().iter().zip(shapes.iter()) {
        renderer.layer(layer, *input)?;
    }
    renderer.ensure_nhwc()?;

    let Renderer { body, variables, wire, .. } = renderer;
    let text = format!("version 1.0;\n\ngraph {GRAPH_NAME}( {INPUT_NAME} ) -> ( {wire} )\n{{\n{body}}}\n");
    Ok(GraphDef { text, variables, output: wire })
}
