use std::path::Path;

use anyhow::Context;
use image::RgbImage;
use image::imageops::{self, FilterType};
use tract_nnef::prelude::*;

/// Channel-wise mean of the Caffe training set, in BGR order.
pub const VGG_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

pub fn load_image(path: impl AsRef<Path>) -> TractResult<RgbImage> {
    let path = path.as_ref();
    let image = image::open(path).with_context(|| format!("Could not load image {path:?}"))?;
    debug!("Loaded {:?}: {}x{} {:?}", path, image.width(), image.height(), image.color());
    Ok(image.to_rgb8())
}

/// Resize to `size`x`size` and subtract the channel mean, without any scaling.
///
/// Produces a `[1, size, size, 3]` NHWC tensor with RGB channels.
pub fn preprocess(image: &RgbImage, size: usize) -> Tensor {
    let resized = imageops::resize(image, size as u32, size as u32, FilterType::Triangle);
    let mean = [VGG_MEAN[2], VGG_MEAN[1], VGG_MEAN[0]];
    tract_ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
        resized[(x as u32, y as u32)][c] as f32 - mean[c]
    })
    .into()
}

pub fn image_tensor(path: impl AsRef<Path>, size: usize) -> TractResult<Tensor> {
    Ok(preprocess(&load_image(path)?, size))
}
