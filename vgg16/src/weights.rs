//! Parameter dictionaries, as produced by the caffe-to-npz converter.
//!
//! Entries are named after the TensorFlow-style variables of the converted
//! Caffe network (`conv1_1/W`, `fc8/b`, ...) and must be renamed to the
//! layer variable names (`conv1_1/kernel`, `fc8/bias`) before they can be
//! wired in the graph.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use ndarray::ArrayD;
use tract_nnef::prelude::*;

/// Rename a converted Caffe parameter to its layer variable name.
///
/// This is a plain substring replacement, applied to every occurrence,
/// `/W` first then `/b`.
pub fn remap_name(name: &str) -> String {
    name.replace("/W", "/kernel").replace("/b", "/bias")
}

#[derive(Clone, Debug, Default)]
pub struct ParamDict {
    params: BTreeMap<String, ArrayD<f32>>,
}

impl ParamDict {
    pub fn open(path: impl AsRef<Path>) -> TractResult<ParamDict> {
        let path = path.as_ref();
        let file = fs_err::File::open(path)?;
        let mut npz = ndarray_npy::NpzReader::new(file)
            .with_context(|| format!("Reading {path:?} as a npz archive"))?;
        let mut params = BTreeMap::new();
        for entry in npz.names()? {
            let array: ArrayD<f32> = npz
                .by_name(&entry)
                .with_context(|| format!("Reading {entry:?} from {path:?} (expected f32 data)"))?;
            let name = entry.strip_suffix(".npy").unwrap_or(&entry).to_string();
            debug!("Loaded {} {:?} from {:?}", name, array.shape(), path);
            params.insert(name, array);
        }
        info!("Loaded {} parameters from {:?}", params.len(), path);
        Ok(ParamDict { params })
    }

    /// Rename every entry with [`remap_name`].
    pub fn remapped(self) -> TractResult<ParamDict> {
        let mut params = BTreeMap::new();
        for (name, array) in self.params {
            let renamed = remap_name(&name);
            if params.contains_key(&renamed) {
                bail!("Parameter {:?} collides with another one once renamed to {:?}", name, renamed);
            }
            if renamed != name {
                trace!("Renamed {:?} to {:?}", name, renamed);
            }
            params.insert(renamed, array);
        }
        Ok(ParamDict { params })
    }

    pub fn insert(&mut self, name: impl Into<String>, array: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.params.insert(name.into(), array)
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.get(name)
    }

    pub fn take(&mut self, name: &str) -> TractResult<ArrayD<f32>> {
        self.params.remove(name).with_context(|| format!("Parameter {name:?} not found"))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<(String, ArrayD<f32>)> for ParamDict {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        ParamDict { params: iter.into_iter().collect() }
    }
}
