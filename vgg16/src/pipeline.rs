use std::fmt;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use tract_nnef::prelude::*;

use crate::bundle::Bundle;
use crate::labels::{IlsvrcMeta, SynsetWords};
use crate::network::Network;
use crate::predict::{Prediction, Predictor, top_k};
use crate::preprocess;
use crate::weights::ParamDict;

pub const DEFAULT_TOP: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Converted `.npz` parameters, or a directory written by `export_nnef`.
    pub load: PathBuf,
    pub input: PathBuf,
    pub meta_dir: Option<PathBuf>,
    pub download: bool,
    pub top: usize,
    pub export_nnef: Option<PathBuf>,
}

impl Options {
    pub fn new(load: impl Into<PathBuf>, input: impl Into<PathBuf>) -> Options {
        Options {
            load: load.into(),
            input: input.into(),
            meta_dir: None,
            download: true,
            top: DEFAULT_TOP,
            export_nnef: None,
        }
    }

    pub fn meta(&self) -> TractResult<IlsvrcMeta> {
        match &self.meta_dir {
            Some(dir) => Ok(IlsvrcMeta::new(dir)),
            None => Ok(IlsvrcMeta::new(IlsvrcMeta::default_dir()?)),
        }
    }
}

/// Build the model from converted parameters, or reload an exported one.
pub fn load_model(load: &Path, network: &Network, export: Option<&Path>) -> TractResult<TypedModel> {
    if load.is_dir() {
        info!("Loading NNEF model from {:?}", load);
        if export.is_some() {
            warn!("{:?} is already an NNEF directory, not exporting it again", load);
        }
        return tract_nnef::nnef().model_for_path(load);
    }
    let params = ParamDict::open(load)?.remapped()?;
    let bundle = Bundle::new(network, params)?;
    if let Some(dir) = export {
        bundle.write_to_dir(dir)?;
    }
    bundle.into_model()
}

pub fn classify(options: &Options) -> TractResult<Report> {
    classify_with(&Network::vgg16(), options)
}

pub fn classify_with(network: &Network, options: &Options) -> TractResult<Report> {
    let model = load_model(&options.load, network, options.export_nnef.as_deref())?;
    let predictor = Predictor::new(model)?;
    let image = preprocess::image_tensor(&options.input, network.input_size())?;
    let probs = predictor.predict(image)?;

    let meta = options.meta()?;
    if options.download {
        meta.ensure_downloaded()?;
    }
    let words = meta.synset_words_1000()?;
    Ok(Report::new(&probs, options.top, Some(&words)))
}

#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub top: usize,
    pub predictions: Vec<Prediction>,
}

impl Report {
    pub fn new(probs: &[f32], top: usize, words: Option<&SynsetWords>) -> Report {
        let predictions = top_k(probs, top)
            .into_iter()
            .enumerate()
            .map(|(rank, class_id)| Prediction {
                rank,
                class_id,
                probability: probs[class_id],
                label: words.and_then(|w| w.get(class_id)).map(|s| s.to_string()),
            })
            .collect();
        Report { top, predictions }
    }

    pub fn to_json(&self) -> TractResult<String> {
        Ok(serde_json::to_string_pretty(&self.predictions)?)
    }
}

fn quoted(s: &str) -> String {
    if s.contains('\'') && !s.contains('"') {
        format!("\"{s}\"")
    } else {
        format!("'{}'", s.replace('\'', "\\'"))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids = self.predictions.iter().map(|p| p.class_id).join(", ");
        writeln!(f, "Top{} predictions: [{}]", self.top, ids)?;
        let names = self
            .predictions
            .iter()
            .map(|p| quoted(&p.label.clone().unwrap_or_else(|| p.class_id.to_string())))
            .join(", ");
        write!(f, "Top{} class names: [{}]", self.top, names)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn report_lines() {
        let words = SynsetWords(vec![
            "n01 zero".to_string(),
            "n02 jack-o'-lantern".to_string(),
            "n03 two".to_string(),
        ]);
        let report = Report::new(&[0.2, 0.5, 0.3], 2, Some(&words));
        assert_eq!(
            report.to_string(),
            "Top2 predictions: [1, 2]\nTop2 class names: [\"n02 jack-o'-lantern\", 'n03 two']"
        );
        assert_eq!(report.predictions[0].rank, 0);
        assert_eq!(report.predictions[1].probability, 0.3);
    }

    #[test]
    fn unknown_labels_fall_back_to_ids() {
        let report = Report::new(&[0.9, 0.1], 10, None);
        assert_eq!(report.to_string(), "Top10 predictions: [0, 1]\nTop10 class names: ['0', '1']");
    }

    #[test]
    fn json_report() -> TractResult<()> {
        let words = SynsetWords(vec!["n01 zero".to_string()]);
        let report = Report::new(&[1.0, 0.0], 2, Some(&words));
        let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        assert_eq!(json[0]["class_id"], 0);
        assert_eq!(json[0]["label"], "n01 zero");
        assert_eq!(json[1]["label"], serde_json::Value::Null);
        Ok(())
    }
}
