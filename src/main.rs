use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::{debug, info, LevelFilter};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use matrix_chain::{name_from_path, read_matrix, Array, DType, Limits, Matrix};

fn cli() -> Command {
    Command::new("matrix-chain")
        .version(clap::crate_version!())
        .about("Multiply a chain of dense matrices read from text files")
        .arg(
            Arg::new("files")
                .help("Matrix files: `rows cols` followed by rows*cols values, row-major")
                .required(true)
                .num_args(2..)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("dtype")
                .short('t')
                .long("dtype")
                .help("Element type: int, float or double")
                .default_value("double")
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON file overriding the default limits")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("max_rows")
                .long("max-rows")
                .help("Largest accepted row count. Overrides the config file.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max_cols")
                .long("max-cols")
                .help("Largest accepted column count. Overrides the config file.")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn load_limits(matches: &ArgMatches) -> Result<Limits> {
    let mut limits = match matches.get_one::<PathBuf>("config") {
        Some(path) => Limits::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Limits::default(),
    };
    if let Some(&n) = matches.get_one::<usize>("max_rows") {
        limits.max_rows = n;
    }
    if let Some(&n) = matches.get_one::<usize>("max_cols") {
        limits.max_cols = n;
    }
    debug!("limits: {:?}", limits);
    Ok(limits)
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Warn)
        .parse_env(env_logger::Env::default().filter_or("MATRIX_CHAIN_LOG", "warn"))
        .init();

    let matches = cli().get_matches();
    let limits = load_limits(&matches)?;
    let dtype: DType = matches
        .get_one::<String>("dtype")
        .map(String::as_str)
        .unwrap_or("double")
        .parse()?;

    let paths: Vec<PathBuf> = matches
        .get_many::<PathBuf>("files")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if paths.len() > limits.max_files {
        bail!("Too many files ({} > {})", paths.len(), limits.max_files);
    }

    // open everything up front so a missing file fails before any parsing
    let mut files = Array::<File>::new(paths.len())?;
    for path in &paths {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        files.append(file)?;
    }

    let mut matrices = Array::<Matrix>::new(paths.len())?;
    for (path, file) in paths.iter().zip(files.iter()) {
        let name = name_from_path(path, &limits)?;
        let m = read_matrix(BufReader::new(file), dtype, Some(&name), &limits)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!("loaded {} ({} x {})", name, m.rows(), m.cols());
        println!("{}", m);
        matrices.append(m)?;
    }
    files.free();

    let (first, rest) = match matrices.as_slice().split_first() {
        Some(split) => split,
        None => bail!("no matrices loaded"),
    };
    let mut product: Option<Matrix> = None;
    for rhs in rest {
        let lhs = product.as_ref().unwrap_or(first);
        let next = lhs.matmul(rhs).with_context(|| {
            format!(
                "cannot multiply {} ({} x {}) by {} ({} x {})",
                lhs.name().unwrap_or("NULL"),
                lhs.rows(),
                lhs.cols(),
                rhs.name().unwrap_or("NULL"),
                rhs.rows(),
                rhs.cols()
            )
        })?;
        println!("{}", next);
        product = Some(next);
    }
    info!("multiplied {} matrices", matrices.len());
    Ok(())
}
