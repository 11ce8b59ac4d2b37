//! Hand-written network topologies.
use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, ensure};
use tract_nnef::prelude::*;

pub const VGG16_INPUT_SIZE: usize = 224;
pub const VGG16_CLASSES: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Identity,
}

/// One step of a sequential network.
///
/// Convolutions are 3x3, stride 1, "same" padding, followed by a ReLU.
/// Pools are 2x2 max pools with stride 2. Dropout is the identity: the
/// network is only ever used for inference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layer {
    Conv { name: String, filters: usize },
    MaxPool { name: String },
    Flatten,
    Dense { name: String, units: usize, activation: Activation },
    Dropout { name: String },
    Softmax { name: String },
}

impl Layer {
    pub fn conv(name: &str, filters: usize) -> Layer {
        Layer::Conv { name: name.to_string(), filters }
    }

    pub fn max_pool(name: &str) -> Layer {
        Layer::MaxPool { name: name.to_string() }
    }

    pub fn dense(name: &str, units: usize, activation: Activation) -> Layer {
        Layer::Dense { name: name.to_string(), units, activation }
    }

    pub fn dropout(name: &str) -> Layer {
        Layer::Dropout { name: name.to_string() }
    }

    pub fn softmax(name: &str) -> Layer {
        Layer::Softmax { name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        match self {
            Layer::Conv { name, .. }
            | Layer::MaxPool { name }
            | Layer::Dense { name, .. }
            | Layer::Dropout { name }
            | Layer::Softmax { name } => name,
            Layer::Flatten => "flatten",
        }
    }
}

/// Shape of the activations flowing between layers, batch axis excluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureShape {
    /// height, width, channels
    Spatial(usize, usize, usize),
    Flat(usize),
}

impl FeatureShape {
    pub fn volume(&self) -> usize {
        match self {
            FeatureShape::Spatial(h, w, c) => h * w * c,
            FeatureShape::Flat(n) => *n,
        }
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeatureShape::Spatial(h, w, c) => write!(f, "{h}x{w}x{c}"),
            FeatureShape::Flat(n) => write!(f, "{n}"),
        }
    }
}

/// A trainable tensor the network expects to find in the parameter dictionary,
/// in TensorFlow layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: TVec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    input_size: usize,
    input_channels: usize,
    layers: Vec<Layer>,
}

impl Network {
    pub fn new(input_size: usize, input_channels: usize, layers: Vec<Layer>) -> TractResult<Network> {
        let net = Network { input_size, input_channels, layers };
        net.walk()?;
        Ok(net)
    }

    pub fn vgg16() -> Network {
        use Activation::*;
        let mut layers = vec![];
        let blocks: [(usize, usize, usize); 5] =
            [(1, 2, 64), (2, 2, 128), (3, 3, 256), (4, 3, 512), (5, 3, 512)];
        for (block, convs, filters) in blocks {
            for conv in 1..=convs {
                layers.push(Layer::conv(&format!("conv{block}_{conv}"), filters));
            }
            layers.push(Layer::max_pool(&format!("pool{block}")));
        }
        layers.extend([
            Layer::Flatten,
            Layer::dense("fc6", 4096, Relu),
            Layer::dropout("drop0"),
            Layer::dense("fc7", 4096, Relu),
            Layer::dropout("drop1"),
            Layer::dense("fc8", VGG16_CLASSES, Identity),
            Layer::softmax("prob"),
        ]);
        Network { input_size: VGG16_INPUT_SIZE, input_channels: 3, layers }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_shape(&self) -> FeatureShape {
        FeatureShape::Spatial(self.input_size, self.input_size, self.input_channels)
    }

    /// Input shape of every layer, followed by the network output shape.
    pub fn walk(&self) -> TractResult<Vec<FeatureShape>> {
        let mut shapes = vec![self.input_shape()];
        let mut current = self.input_shape();
        let mut seen = HashSet::new();
        for (ix, layer) in self.layers.iter().enumerate() {
            let name = layer.name();
            ensure!(is_identifier(name), "Layer #{} has an invalid name: {:?}", ix, name);
            ensure!(seen.insert(name), "Layer name {:?} is used twice", name);
            if ix + 1 < self.layers.len() && matches!(layer, Layer::Softmax { .. }) {
                bail!("Softmax {:?} must be the last layer", name);
            }
            current = match (layer, current) {
                (Layer::Conv { filters, .. }, FeatureShape::Spatial(h, w, _)) => {
                    ensure!(*filters > 0, "Convolution {:?} needs at least one filter", name);
                    FeatureShape::Spatial(h, w, *filters)
                }
                (Layer::MaxPool { .. }, FeatureShape::Spatial(h, w, c)) => {
                    if h % 2 != 0 || w % 2 != 0 {
                        bail!("Pool {:?} got odd-sized {}x{} features", name, h, w);
                    }
                    FeatureShape::Spatial(h / 2, w / 2, c)
                }
                (Layer::Flatten, shape) => FeatureShape::Flat(shape.volume()),
                (Layer::Dense { units, .. }, FeatureShape::Flat(_)) => {
                    ensure!(*units > 0, "Dense layer {:?} needs at least one unit", name);
                    FeatureShape::Flat(*units)
                }
                (Layer::Dropout { .. }, shape) => shape,
                (Layer::Softmax { .. }, FeatureShape::Flat(n)) => FeatureShape::Flat(n),
                (layer, shape) => bail!("Layer {:?} can not be applied to {} features", layer, shape),
            };
            shapes.push(current);
        }
        Ok(shapes)
    }

    pub fn output_shape(&self) -> TractResult<FeatureShape> {
        Ok(*self.walk()?.last().unwrap_or(&self.input_shape()))
    }

    /// Every trainable tensor, in wiring order.
    pub fn parameters(&self) -> TractResult<Vec<ParamSpec>> {
        let shapes = self.walk()?;
        let mut params = vec![];
        for (layer, input) in self.layers.iter().zip(shapes.iter()) {
            match (layer, input) {
                (Layer::Conv { name, filters }, FeatureShape::Spatial(_, _, c)) => {
                    params.push(ParamSpec::new(name, "kernel", tvec!(3, 3, *c, *filters)));
                    params.push(ParamSpec::new(name, "bias", tvec!(*filters)));
                }
                (Layer::Dense { name, units, .. }, FeatureShape::Flat(n)) => {
                    params.push(ParamSpec::new(name, "kernel", tvec!(*n, *units)));
                    params.push(ParamSpec::new(name, "bias", tvec!(*units)));
                }
                _ => (),
            }
        }
        Ok(params)
    }
}

impl ParamSpec {
    fn new(layer: &str, variable: &str, shape: TVec<usize>) -> ParamSpec {
        ParamSpec { name: format!("{layer}/{variable}"), shape }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
