//! Bind a parameter dictionary to a rendered graph, and hand the result over
//! to tract's NNEF front-end.
use std::io::{Cursor, Write};
use std::path::Path;

use anyhow::{Context, ensure};
use ndarray::{ArrayD, IxDyn};
use tract_nnef::prelude::*;

use crate::graph::{self, GraphDef, Variable};
use crate::network::Network;
use crate::weights::ParamDict;

pub const GRAPH_FILE: &str = "graph.nnef";

/// A graph document and the tensors backing its variables, keyed by label.
#[derive(Debug)]
pub struct Bundle {
    graph: GraphDef,
    tensors: Vec<(String, Tensor)>,
}

impl Bundle {
    /// `params` must already be remapped to layer variable names.
    pub fn new(network: &Network, mut params: ParamDict) -> TractResult<Bundle> {
        let graph = graph::render(network)?;
        let mut tensors = Vec::with_capacity(graph.variables.len());
        for var in &graph.variables {
            let array = params.take(var.label()).with_context(|| {
                format!("Network needs {:?} with shape {:?}", var.label(), var.param.shape)
            })?;
            ensure!(
                array.shape() == &*var.param.shape,
                "Wrong shape for {:?}: expected {:?}, parameter dictionary says {:?}",
                var.label(),
                var.param.shape,
                array.shape()
            );
            trace!("Binding {} as {} {:?}", var.label(), var.identifier, var.shape);
            tensors.push((var.label().to_string(), relayout(array, var)?));
        }
        for unused in params.names() {
            warn!("Parameter {unused:?} is not used by the network");
        }
        Ok(Bundle { graph, tensors })
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    pub fn tensor(&self, label: &str) -> Option<&Tensor> {
        self.tensors.iter().find(|(l, _)| l == label).map(|(_, t)| t)
    }

    pub fn write_to_tar<W: Write>(&self, w: W) -> TractResult<W> {
        let mut ar = tar::Builder::new(w);
        append(&mut ar, GRAPH_FILE, self.graph.text.as_bytes())?;
        for (label, tensor) in &self.tensors {
            let mut data = vec![];
            tract_nnef::tensors::write_tensor(&mut data, tensor)?;
            append(&mut ar, &format!("{label}.dat"), &data)?;
        }
        Ok(ar.into_inner()?)
    }

    /// Write the bundle as an NNEF directory. Labels are relative paths, so
    /// `conv1_1/kernel` ends up in `conv1_1/kernel.dat`.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> TractResult<()> {
        let dir = dir.as_ref();
        fs_err::create_dir_all(dir)?;
        fs_err::write(dir.join(GRAPH_FILE), &self.graph.text)?;
        for (label, tensor) in &self.tensors {
            let path = dir.join(format!("{label}.dat"));
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            let mut file = std::io::BufWriter::new(fs_err::File::create(&path)?);
            tract_nnef::tensors::write_tensor(&mut file, tensor)
                .with_context(|| format!("Writing {path:?}"))?;
            file.flush()?;
        }
        info!("Wrote {} tensors and {} to {:?}", self.tensors.len(), GRAPH_FILE, dir);
        Ok(())
    }

    pub fn into_model(self) -> TractResult<TypedModel> {
        let archive = self.write_to_tar(vec![])?;
        drop(self);
        debug!("Loading {} bytes of NNEF archive", archive.len());
        tract_nnef::nnef()
            .model_for_read(&mut Cursor::new(archive))
            .context("Loading generated NNEF graph")
    }
}

fn append<W: Write>(ar: &mut tar::Builder<W>, path: &str, data: &[u8]) -> TractResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    ar.append_data(&mut header, path, data)?;
    Ok(())
}

fn relayout(array: ArrayD<f32>, var: &Variable) -> TractResult<Tensor> {
    let array = match &var.permutation {
        Some(axes) => array.permuted_axes(IxDyn(axes)),
        None => array,
    };
    if let Some(slice) = array.as_slice() {
        Tensor::from_shape(&var.shape, slice)
    } else {
        let data: Vec<f32> = array.iter().copied().collect();
        Tensor::from_shape(&var.shape, &data)
    }
}
