//! # VGG16 inference from converted Caffe weights
//!
//! Rebuilds the VGG16 topology by hand, binds a parameter dictionary
//! produced by the Caffe converter (`conv1_1/W`, `conv1_1/b`, ...) to it, and
//! runs it with tract through its NNEF front-end.
//!
//! ```no_run
//! # fn main() -> tract_nnef::prelude::TractResult<()> {
//! let options = vgg16::Options::new("vgg16.npz", "cat.jpg");
//! let report = vgg16::classify(&options)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate log;

pub mod bundle;
pub mod graph;
pub mod labels;
pub mod network;
pub mod pipeline;
pub mod predict;
pub mod preprocess;
pub mod weights;

pub use bundle::Bundle;
pub use network::{Activation, Layer, Network};
pub use pipeline::{Options, Report, classify, classify_with, load_model};
pub use predict::{Prediction, Predictor, top_k};
pub use weights::{ParamDict, remap_name};
