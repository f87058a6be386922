//! The three pipeline stages. Each reads and writes files under one directory and returns what it produced;
//! printing is left to the caller.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use golden::ComparisonReport;
use quantize::{Matrix, npy};
use tiling::{DecodedMatrix, InputImage};

use crate::generate;
use crate::load_config::{FilePaths, VerifierConfig};

pub struct Generated {
    pub a: Matrix<i8>,
    pub b: Matrix<i8>,
    pub lines: usize,
    pub paths: FilePaths,
}

/// Draw both operands, write the input memory image and the operand snapshots.
pub fn generate(config: &VerifierConfig, dir: &Path) -> Result<Generated> {
    let paths = config.paths(dir);
    let dim = config.matrix_dim();
    let image = InputImage::new(config.layout()?);

    let (a, b) = generate::operands(dim, &config.generator());
    let lines = image.encode(&a, &b)?;

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    memory::write_lines(&paths.input_image, &lines)?;
    npy::write_matrix(&paths.snapshot_a, &a)
        .with_context(|| format!("writing {}", paths.snapshot_a.display()))?;
    npy::write_matrix(&paths.snapshot_b, &b)
        .with_context(|| format!("writing {}", paths.snapshot_b.display()))?;
    tracing::info!(
        "wrote {} lines to {}",
        lines.len(),
        paths.input_image.display()
    );

    Ok(Generated {
        a,
        b,
        lines: lines.len(),
        paths,
    })
}

pub struct Emulated {
    pub a: Matrix<i8>,
    pub b: Matrix<i8>,
    pub product: Matrix<f32>,
    pub lines: usize,
    pub paths: FilePaths,
}

/// Stand in for the accelerator: read the input image, multiply, and write the result image.
pub fn emulate(config: &VerifierConfig, dir: &Path) -> Result<Emulated> {
    let paths = config.paths(dir);
    let dim = config.matrix_dim();
    let image = InputImage::new(config.layout()?);

    let lines = memory::read_lines(&paths.input_image)?;
    let input = image
        .decode(&lines, (dim, dim), (dim, dim))
        .with_context(|| format!("decoding {}", paths.input_image.display()))?;
    let product = golden::matmul(&input.a, &input.b)?;

    let result = tiling::encode_result(&product, config.output_type()?)?;
    memory::write_lines(&paths.result_image, &result)?;
    tracing::info!(
        "wrote {} lines to {}",
        result.len(),
        paths.result_image.display()
    );

    Ok(Emulated {
        a: input.a,
        b: input.b,
        product,
        lines: result.len(),
        paths,
    })
}

pub struct Checked {
    pub golden: Matrix<f32>,
    pub hw: DecodedMatrix,
    pub report: ComparisonReport,
}

/// Recompute the golden product from the snapshots and compare the result image against it.
pub fn check(config: &VerifierConfig, dir: &Path) -> Result<Checked> {
    let paths = config.paths(dir);

    let a: Matrix<i8> = npy::read_matrix(&paths.snapshot_a)
        .with_context(|| format!("reading {}", paths.snapshot_a.display()))?;
    let b: Matrix<i8> = npy::read_matrix(&paths.snapshot_b)
        .with_context(|| format!("reading {}", paths.snapshot_b.display()))?;
    let golden = golden::matmul(&a, &b)?;

    let lines = memory::read_lines(&paths.result_image)?;
    let hw = config
        .result_decoder()?
        .decode(&lines, config.matrix_dim())
        .with_context(|| format!("decoding {}", paths.result_image.display()))?;
    if !hw.skipped.is_empty() {
        tracing::warn!(
            "skipped {} malformed lines in {}",
            hw.skipped.len(),
            paths.result_image.display()
        );
    }

    let report = golden::compare(
        &golden,
        &hw.matrix,
        &config.tolerance(),
        config.max_reported_mismatches(),
    );
    tracing::info!(verdict = %report.verdict(), "comparison finished");

    Ok(Checked { golden, hw, report })
}
