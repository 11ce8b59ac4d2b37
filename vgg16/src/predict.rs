use std::cmp::Ordering;

use anyhow::ensure;
use serde::Serialize;
use tract_nnef::prelude::*;

/// An optimized, runnable model with a single image input and a single
/// probability output.
pub struct Predictor {
    plan: TypedRunnableModel<TypedModel>,
}

impl Predictor {
    pub fn new(model: TypedModel) -> TractResult<Predictor> {
        ensure!(model.inputs.len() == 1, "Expected a single input, got {}", model.inputs.len());
        ensure!(model.outputs.len() == 1, "Expected a single output, got {}", model.outputs.len());
        info!("Input: {:?}, output: {:?}", model.input_fact(0)?, model.output_fact(0)?);
        let plan = model.into_optimized()?.into_runnable()?;
        Ok(Predictor { plan })
    }

    /// Probabilities for the first, and only, image of the batch.
    pub fn predict(&self, image: Tensor) -> TractResult<Vec<f32>> {
        let start = std::time::Instant::now();
        let outputs = self.plan.run(tvec!(image.into()))?;
        debug!("Forward pass ran in {:?}", start.elapsed());
        let probs = outputs[0].to_array_view::<f32>()?;
        ensure!(
            probs.ndim() == 2 && probs.shape()[0] == 1,
            "Expected probabilities as [1, classes], got {:?}",
            probs.shape()
        );
        Ok(probs.iter().copied().collect())
    }
}

/// Indices of the `k` highest values, highest first.
///
/// Equal values come out highest index first. NaN ranks below everything.
pub fn top_k(probs: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| match (probs[a].is_nan(), probs[b].is_nan()) {
        (true, true) => b.cmp(&a),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            probs[b].partial_cmp(&probs[a]).unwrap_or(Ordering::Equal).then_with(|| b.cmp(&a))
        }
    });
    order.truncate(k);
    order
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub rank: usize,
    pub class_id: usize,
    pub probability: f32,
    pub label: Option<String>,
}
