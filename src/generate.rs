use quantize::Matrix;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// How random operands are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Fraction of the elements that receive a drawn value.
    pub non_zero_ratio: f64,
    pub seed: u64,
    /// Inclusive lower bound of drawn values.
    pub min_value: i8,
    /// Exclusive upper bound of drawn values.
    pub max_value: i8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            non_zero_ratio: 0.35,
            seed: 42,
            min_value: -10,
            max_value: 10,
        }
    }
}

/// Draw a sparse `rows x cols` matrix.
///
/// `floor(rows * cols * non_zero_ratio)` values are drawn from `[min_value, max_value)`. When that range spans zero,
/// the first half of them is forced negative so both signs are exercised. The values land on distinct positions
/// picked by shuffling all flat indices; every other element is zero.
pub fn sparse_matrix<R: Rng>(
    rows: usize,
    cols: usize,
    config: &GeneratorConfig,
    rng: &mut R,
) -> Matrix<i8> {
    let len = rows * cols;
    let count = ((len as f64 * config.non_zero_ratio).floor() as usize).min(len);

    let mut values: Vec<i8> = (0..count)
        .map(|_| rng.random_range(config.min_value..config.max_value))
        .collect();
    if config.min_value < 0 && config.max_value > 0 {
        for value in values.iter_mut().take(count / 2) {
            if *value > 0 {
                *value = -*value;
            } else if *value == 0 {
                *value = rng.random_range(config.min_value..0);
            }
        }
    }

    let mut positions: Vec<usize> = (0..len).collect();
    positions.shuffle(rng);

    let mut matrix = Matrix::zeros(rows, cols);
    for (&position, &value) in positions.iter().zip(&values) {
        matrix.set(position / cols, position % cols, value);
    }
    matrix
}

/// Draw the operand pair for one run, A before B, from a generator seeded with `config.seed`.
pub fn operands(dim: usize, config: &GeneratorConfig) -> (Matrix<i8>, Matrix<i8>) {
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let a = sparse_matrix(dim, dim, config, &mut rng);
    let b = sparse_matrix(dim, dim, config, &mut rng);
    (a, b)
}
