#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::process;

use anyhow::format_err;
use clap::{Arg, ArgMatches, Command};
use tract_nnef::prelude::*;
use vgg16::Options;

fn main() {
    let matches = Command::new("vgg16")
        .version(clap::crate_version!())
        .about("Classify an image with VGG16 weights converted from Caffe")
        .arg(
            Arg::new("load")
                .long("load")
                .takes_value(true)
                .required(true)
                .help(".npz model file generated by the Caffe converter, or an exported NNEF directory"),
        )
        .arg(Arg::new("input").long("input").takes_value(true).required(true).help("an input image"))
        .arg(
            Arg::new("gpu")
                .long("gpu")
                .takes_value(true)
                .help("comma separated list of GPU(s) to use (ignored, inference runs on CPU)"),
        )
        .arg(
            Arg::new("meta-dir")
                .long("meta-dir")
                .takes_value(true)
                .help("ILSVRC metadata directory [default: $TENSORPACK_DATASET/ilsvrc_metadata]"),
        )
        .arg(
            Arg::new("no-download")
                .long("no-download")
                .help("Fail instead of downloading missing ILSVRC metadata"),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .takes_value(true)
                .default_value("10")
                .help("Number of classes to report"),
        )
        .arg(
            Arg::new("export-nnef")
                .long("export-nnef")
                .takes_value(true)
                .help("Also write the converted model as an NNEF directory, usable with --load"),
        )
        .arg(Arg::new("json").long("json").help("Print predictions as JSON"))
        .arg(
            Arg::new("verbosity")
                .short('v')
                .multiple_occurrences(true)
                .help("Sets the level of verbosity."),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbosity") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level);
    env_logger::Builder::from_env(env).format_timestamp_nanos().init();

    if let Err(e) = handle(&matches) {
        error!("{e:?}");
        process::exit(1)
    }
}

fn options(matches: &ArgMatches) -> TractResult<Options> {
    let mut options = Options::new(
        matches.value_of("load").unwrap_or_default(),
        matches.value_of("input").unwrap_or_default(),
    );
    options.meta_dir = matches.value_of("meta-dir").map(PathBuf::from);
    options.download = !matches.is_present("no-download");
    options.export_nnef = matches.value_of("export-nnef").map(PathBuf::from);
    if let Some(top) = matches.value_of("top") {
        options.top = top.parse().map_err(|e| format_err!("Invalid --top {:?}: {}", top, e))?;
    }
    Ok(options)
}

fn handle(matches: &ArgMatches) -> TractResult<()> {
    if let Some(gpu) = matches.value_of("gpu") {
        warn!("Ignoring --gpu {gpu}: inference runs on CPU");
    }
    let options = options(matches)?;
    info!("{options:?}");
    let report = vgg16::classify(&options)?;
    if matches.is_present("json") {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }
    Ok(())
}
