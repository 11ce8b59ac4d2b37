//! ILSVRC-2012 class metadata, as distributed with the Caffe reference models.
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tract_nnef::prelude::*;

pub const CAFFE_ILSVRC12_URL: &str = "http://dl.caffe.berkeleyvision.org/caffe_ilsvrc12.tar.gz";
pub const SYNSET_WORDS_FILE: &str = "synset_words.txt";
pub const SYNSETS_FILE: &str = "synsets.txt";
pub const DATASET_ENV: &str = "TENSORPACK_DATASET";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IlsvrcMeta {
    dir: PathBuf,
}

impl IlsvrcMeta {
    pub fn new(dir: impl Into<PathBuf>) -> IlsvrcMeta {
        IlsvrcMeta { dir: dir.into() }
    }

    /// `$TENSORPACK_DATASET/ilsvrc_metadata`, or `~/tensorpack_data/ilsvrc_metadata`.
    pub fn default_dir() -> TractResult<PathBuf> {
        let root = match std::env::var_os(DATASET_ENV) {
            Some(root) => PathBuf::from(root),
            None => home::home_dir()
                .context("Could not find home directory, set TENSORPACK_DATASET")?
                .join("tensorpack_data"),
        };
        Ok(root.join("ilsvrc_metadata"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch and unpack the Caffe ILSVRC-2012 metadata archive, unless the
    /// class names are already there.
    pub fn ensure_downloaded(&self) -> TractResult<()> {
        if self.dir.join(SYNSET_WORDS_FILE).is_file() {
            return Ok(());
        }
        fs_err::create_dir_all(&self.dir)?;
        info!("Downloading {} to {:?}", CAFFE_ILSVRC12_URL, self.dir);
        let response = reqwest::blocking::get(CAFFE_ILSVRC12_URL)
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Downloading {CAFFE_ILSVRC12_URL}"))?;
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(response));
        archive.unpack(&self.dir).with_context(|| format!("Extracting into {:?}", self.dir))?;
        if !self.dir.join(SYNSET_WORDS_FILE).is_file() {
            bail!("{} did not contain {}", CAFFE_ILSVRC12_URL, SYNSET_WORDS_FILE);
        }
        Ok(())
    }

    /// Human readable class names, one per class, like
    /// `"n01440764 tench, Tinca tinca"`.
    pub fn synset_words_1000(&self) -> TractResult<SynsetWords> {
        let words = self.read_lines(SYNSET_WORDS_FILE)?;
        if words.len() != 1000 {
            warn!("{} has {} classes, expected 1000", SYNSET_WORDS_FILE, words.len());
        }
        Ok(SynsetWords(words))
    }

    /// WordNet ids, one per class, like `"n01440764"`.
    pub fn synset_1000(&self) -> TractResult<Vec<String>> {
        self.read_lines(SYNSETS_FILE)
    }

    fn read_lines(&self, file: &str) -> TractResult<Vec<String>> {
        let path = self.dir.join(file);
        let content = fs_err::read_to_string(&path)?;
        Ok(content.lines().map(|l| l.trim().to_string()).collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynsetWords(pub Vec<String>);

impl SynsetWords {
    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(class_id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
