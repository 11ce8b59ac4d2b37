use std::path::Path;

use approx::assert_relative_eq;
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use tract_nnef::prelude::*;
use vgg16::*;

const SIZE: usize = 4;
const CHANNELS: usize = 3;
const FILTERS: usize = 2;
const HIDDEN: usize = 4;
const CLASSES: usize = 3;

fn network() -> Network {
    Network::new(
        SIZE,
        CHANNELS,
        vec![
            Layer::conv("conv1", FILTERS),
            Layer::max_pool("pool1"),
            Layer::Flatten,
            Layer::dense("fc1", HIDDEN, Activation::Relu),
            Layer::dropout("drop0"),
            Layer::dense("fc2", CLASSES, Activation::Identity),
            Layer::softmax("prob"),
        ],
    )
    .unwrap()
}

fn values(n: usize, seed: usize, scale: f32) -> Vec<f32> {
    (0..n).map(|i| (((i * 7919 + seed * 104729) % 201) as f32 - 100.0) / 100.0 * scale).collect()
}

struct Weights {
    conv_w: Vec<f32>,
    conv_b: Vec<f32>,
    fc1_w: Vec<f32>,
    fc1_b: Vec<f32>,
    fc2_w: Vec<f32>,
    fc2_b: Vec<f32>,
}

const FLAT: usize = SIZE / 2 * SIZE / 2 * FILTERS;

fn weights() -> Weights {
    Weights {
        conv_w: values(3 * 3 * CHANNELS * FILTERS, 1, 0.01),
        conv_b: values(FILTERS, 2, 1.0),
        fc1_w: values(FLAT * HIDDEN, 3, 0.1),
        fc1_b: values(HIDDEN, 4, 0.5),
        fc2_w: values(HIDDEN * CLASSES, 5, 0.8),
        fc2_b: values(CLASSES, 6, 0.5),
    }
}

fn array(shape: &[usize], data: &[f32]) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(shape), data.to_vec()).unwrap()
}

fn write_npz(path: &Path, w: &Weights) -> TractResult<()> {
    let mut npz = ndarray_npy::NpzWriter::new(std::fs::File::create(path)?);
    npz.add_array("conv1/W", &array(&[3, 3, CHANNELS, FILTERS], &w.conv_w))?;
    npz.add_array("conv1/b", &array(&[FILTERS], &w.conv_b))?;
    npz.add_array("fc1/W", &array(&[FLAT, HIDDEN], &w.fc1_w))?;
    npz.add_array("fc1/b", &array(&[HIDDEN], &w.fc1_b))?;
    npz.add_array("fc2/W", &array(&[HIDDEN, CLASSES], &w.fc2_w))?;
    npz.add_array("fc2/b", &array(&[CLASSES], &w.fc2_b))?;
    npz.finish()?;
    Ok(())
}

fn write_image(path: &Path) -> TractResult<()> {
    let image = RgbImage::from_fn(6, 5, |x, y| {
        Rgb([(x * 40) as u8, (y * 50) as u8, ((x + y) * 20) as u8])
    });
    image.save(path)?;
    Ok(())
}

fn dense(input: &[f32], w: &[f32], b: &[f32], relu: bool) -> Vec<f32> {
    let units = b.len();
    (0..units)
        .map(|u| {
            let sum = b[u] + input.iter().enumerate().map(|(n, x)| x * w[n * units + u]).sum::<f32>();
            if relu { sum.max(0.0) } else { sum }
        })
        .collect()
}

/// Straightforward NHWC forward pass.
fn reference(input: &[f32], w: &Weights) -> Vec<f32> {
    let mut conv = vec![0f32; SIZE * SIZE * FILTERS];
    for y in 0..SIZE {
        for x in 0..SIZE {
            for o in 0..FILTERS {
                let mut sum = w.conv_b[o];
                for ky in 0..3 {
                    for kx in 0..3 {
                        let (iy, ix) = (y + ky, x + kx);
                        if iy < 1 || ix < 1 || iy > SIZE || ix > SIZE {
                            continue;
                        }
                        let (iy, ix) = (iy - 1, ix - 1);
                        for i in 0..CHANNELS {
                            sum += input[(iy * SIZE + ix) * CHANNELS + i]
                                * w.conv_w[((ky * 3 + kx) * CHANNELS + i) * FILTERS + o];
                        }
                    }
                }
                conv[(y * SIZE + x) * FILTERS + o] = sum.max(0.0);
            }
        }
    }
    let half = SIZE / 2;
    let mut pooled = vec![0f32; FLAT];
    for y in 0..half {
        for x in 0..half {
            for o in 0..FILTERS {
                let at = |dy: usize, dx: usize| conv[((2 * y + dy) * SIZE + 2 * x + dx) * FILTERS + o];
                pooled[(y * half + x) * FILTERS + o] =
                    at(0, 0).max(at(0, 1)).max(at(1, 0)).max(at(1, 1));
            }
        }
    }
    let hidden = dense(&pooled, &w.fc1_w, &w.fc1_b, true);
    let logits = dense(&hidden, &w.fc2_w, &w.fc2_b, false);
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

struct Fixture {
    dir: tempfile::TempDir,
    weights: Weights,
}

impl Fixture {
    fn new() -> TractResult<Fixture> {
        let dir = tempfile::tempdir()?;
        let weights = weights();
        write_npz(&dir.path().join("tiny.npz"), &weights)?;
        write_image(&dir.path().join("image.png"))?;
        fs_err::write(
            dir.path().join("synset_words.txt"),
            "n00000000 zero\nn00000001 one\nn00000002 two\n",
        )?;
        Ok(Fixture { dir, weights })
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn options(&self) -> Options {
        let mut options = Options::new(self.path("tiny.npz"), self.path("image.png"));
        options.meta_dir = Some(self.dir.path().to_path_buf());
        options.download = false;
        options
    }

    fn expected(&self) -> TractResult<Vec<f32>> {
        let input = vgg16::preprocess::image_tensor(self.path("image.png"), SIZE)?;
        let input: Vec<f32> = input.to_array_view::<f32>()?.iter().copied().collect();
        Ok(reference(&input, &self.weights))
    }

    fn predict(&self, load: &Path, export: Option<&Path>) -> TractResult<Vec<f32>> {
        let model = load_model(load, &network(), export)?;
        let input = vgg16::preprocess::image_tensor(self.path("image.png"), SIZE)?;
        Predictor::new(model)?.predict(input)
    }
}

#[test]
fn matches_reference_forward_pass() -> TractResult<()> {
    let fixture = Fixture::new()?;
    let expected = fixture.expected()?;
    let found = fixture.predict(&fixture.path("tiny.npz"), None)?;
    assert_eq!(found.len(), CLASSES);
    for (f, e) in found.iter().zip(expected.iter()) {
        assert_relative_eq!(*f, *e, max_relative = 1e-3, epsilon = 1e-6);
    }
    assert_relative_eq!(found.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    Ok(())
}

#[test]
fn report_ranks_classes() -> TractResult<()> {
    let fixture = Fixture::new()?;
    let expected = fixture.expected()?;
    let report = classify_with(&network(), &fixture.options())?;
    assert_eq!(report.predictions.len(), CLASSES);
    assert_eq!(
        report.predictions.iter().map(|p| p.class_id).collect::<Vec<_>>(),
        top_k(&expected, 10)
    );
    let best = &report.predictions[0];
    let names = ["n00000000 zero", "n00000001 one", "n00000002 two"];
    assert_eq!(best.label.as_deref(), Some(names[best.class_id]));
    assert!(report.to_string().starts_with("Top10 predictions: ["));
    Ok(())
}

#[test]
fn exported_nnef_reloads() -> TractResult<()> {
    let fixture = Fixture::new()?;
    let export = fixture.path("exported");
    let first = fixture.predict(&fixture.path("tiny.npz"), Some(&export))?;
    assert!(export.join("graph.nnef").is_file());
    assert!(export.join("fc2/bias.dat").is_file());
    let second = fixture.predict(&export, None)?;
    for (a, b) in first.iter().zip(second.iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-6);
    }
    Ok(())
}

#[test]
fn missing_image_is_reported() -> TractResult<()> {
    let fixture = Fixture::new()?;
    let mut options = fixture.options();
    options.input = fixture.path("nope.jpg");
    let err = classify_with(&network(), &options).unwrap_err();
    assert!(format!("{err:?}").contains("nope.jpg"));
    Ok(())
}

#[test]
fn wrong_network_for_weights() -> TractResult<()> {
    let fixture = Fixture::new()?;
    let wider = Network::new(
        SIZE,
        CHANNELS,
        vec![Layer::conv("conv1", FILTERS + 1), Layer::max_pool("pool1")],
    )?;
    let err = load_model(&fixture.path("tiny.npz"), &wider, None).unwrap_err();
    assert!(format!("{err:?}").contains("conv1/kernel"));
    Ok(())
}
