use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use matmul_verifier::load_config::{VerifierConfig, load_config};
use matmul_verifier::stage;

#[derive(Parser)]
#[command(name = "matmul_verifier", version)]
/// Verify a matrix-multiplication accelerator against a golden model.
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draw random operands and write the input memory image.
    Generate {
        #[command(flatten)]
        common: CommonOpts,

        #[arg(long)]
        /// Override the generator seed.
        seed: Option<u64>,
    },
    /// Compute the result image in software from the input memory image.
    Emulate {
        #[command(flatten)]
        common: CommonOpts,
    },
    /// Compare a result memory image against the golden product.
    Check {
        #[command(flatten)]
        common: CommonOpts,

        #[arg(long)]
        /// Override the absolute tolerance.
        atol: Option<f64>,

        #[arg(long)]
        /// Override the relative tolerance.
        rtol: Option<f64>,
    },
}

#[derive(Args)]
struct CommonOpts {
    #[arg(long)]
    /// Path to the settings file.
    config: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    /// Directory holding the memory images and snapshots.
    out_dir: PathBuf,

    #[arg(long, short)]
    /// Quiet mode: skip the matrix dumps and only print the summary.
    quiet: bool,
}

impl Command {
    fn common(&self) -> &CommonOpts {
        match self {
            Command::Generate { common, .. }
            | Command::Emulate { common }
            | Command::Check { common, .. } => common,
        }
    }
}

fn setup_logging(quiet: bool) {
    let level = if quiet { "warn" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_for(common: &CommonOpts) -> Result<VerifierConfig> {
    Ok(load_config(common.config.as_deref())?)
}

fn main() -> Result<ExitCode> {
    let opts = Opts::parse();
    setup_logging(opts.command.common().quiet);

    match opts.command {
        Command::Generate { common, seed } => {
            let mut config = config_for(&common)?;
            if let Some(seed) = seed {
                config.generator.seed.value = seed;
            }
            run_generate(&config, &common.out_dir, common.quiet)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Emulate { common } => {
            let config = config_for(&common)?;
            run_emulate(&config, &common.out_dir, common.quiet)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { common, atol, rtol } => {
            let mut config = config_for(&common)?;
            if let Some(atol) = atol {
                config.tolerance.atol.value = atol;
            }
            if let Some(rtol) = rtol {
                config.tolerance.rtol.value = rtol;
            }
            config.validate()?;

            let passed = run_check(&config, &common.out_dir, common.quiet)?;
            Ok(if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn run_generate(config: &VerifierConfig, dir: &Path, quiet: bool) -> Result<()> {
    let generated = stage::generate(config, dir)?;
    if !quiet {
        println!("Matrix A:\n{}", generated.a);
        println!("Matrix B:\n{}", generated.b);
    }
    println!(
        "Generated {dim}x{dim} operands (seed {}), {} lines in {}",
        config.generator.seed.value,
        generated.lines,
        generated.paths.input_image.display(),
        dim = config.matrix_dim(),
    );
    Ok(())
}

fn run_emulate(config: &VerifierConfig, dir: &Path, quiet: bool) -> Result<()> {
    let emulated = stage::emulate(config, dir)?;
    if !quiet {
        println!("Product:\n{}", emulated.product);
    }
    println!(
        "Emulated {dim}x{dim} product, {} lines in {}",
        emulated.lines,
        emulated.paths.result_image.display(),
        dim = config.matrix_dim(),
    );
    Ok(())
}

fn run_check(config: &VerifierConfig, dir: &Path, quiet: bool) -> Result<bool> {
    let checked = stage::check(config, dir)?;
    if !quiet {
        println!("Golden:\n{}", checked.golden);
        println!("Hardware:\n{}", checked.hw.matrix);
    }
    if !checked.hw.skipped.is_empty() {
        println!("Skipped {} malformed lines:", checked.hw.skipped.len());
        for line in &checked.hw.skipped {
            println!("  {line}");
        }
    }
    print!("{}", checked.report);
    Ok(checked.report.passed())
}
