use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use golden::{DEFAULT_MAX_REPORTED, Tolerance};
use quantize::{DataType, FpType, IntType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiling::{LayoutError, ResultDecoder, TileLayout};

use crate::generate::GeneratorConfig;

/// Settings file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "settings/verifier_settings.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("MATRIX_DIM must be non-zero")]
    ZeroMatrixDim,
    #[error("INPUT_TYPE must be an integer type, got {0}")]
    InputType(DataType),
    #[error("OUTPUT_TYPE must be a floating-point type, got {0}")]
    OutputType(DataType),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("NON_ZERO_RATIO must lie in [0, 1], got {0}")]
    NonZeroRatio(f64),
    #[error("generator range [{min}, {max}) is empty")]
    EmptyRange { min: i8, max: i8 },
    #[error("tolerances must be finite and non-negative (atol={atol}, rtol={rtol})")]
    Tolerance { atol: f64, rtol: f64 },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigValue<T> {
    pub value: T,
}

impl<T> From<T> for ConfigValue<T> {
    fn from(value: T) -> Self {
        Self { value }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FpTypeConfig {
    pub sign: bool,
    pub exponent: u8,
    pub mantissa: u8,
}

fn signed_by_default() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IntTypeConfig {
    pub width: u32,
    #[serde(default = "signed_by_default")]
    pub signed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum DataTypeConfig {
    Fp(FpTypeConfig),
    Int(IntTypeConfig),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VerifierConfig {
    #[serde(rename = "CONFIG")]
    pub config: ConfigSection,
    #[serde(rename = "PRECISION")]
    pub precision: PrecisionSection,
    #[serde(rename = "TOLERANCE")]
    pub tolerance: ToleranceSection,
    #[serde(rename = "GENERATOR")]
    pub generator: GeneratorSection,
    #[serde(rename = "FILES")]
    pub files: FilesSection,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfigSection {
    #[serde(rename = "MATRIX_DIM")]
    pub matrix_dim: ConfigValue<usize>,
    #[serde(rename = "TILE_DIM")]
    pub tile_dim: ConfigValue<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PrecisionSection {
    #[serde(rename = "INPUT_TYPE")]
    pub input_type: DataTypeConfig,
    #[serde(rename = "OUTPUT_TYPE")]
    pub output_type: DataTypeConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToleranceSection {
    #[serde(rename = "ATOL")]
    pub atol: ConfigValue<f64>,
    #[serde(rename = "RTOL")]
    pub rtol: ConfigValue<f64>,
    #[serde(rename = "MAX_REPORTED_MISMATCHES")]
    pub max_reported_mismatches: ConfigValue<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratorSection {
    #[serde(rename = "NON_ZERO_RATIO")]
    pub non_zero_ratio: ConfigValue<f64>,
    #[serde(rename = "SEED")]
    pub seed: ConfigValue<u64>,
    #[serde(rename = "MIN_VALUE")]
    pub min_value: ConfigValue<i8>,
    #[serde(rename = "MAX_VALUE")]
    pub max_value: ConfigValue<i8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FilesSection {
    #[serde(rename = "INPUT_IMAGE")]
    pub input_image: ConfigValue<PathBuf>,
    #[serde(rename = "RESULT_IMAGE")]
    pub result_image: ConfigValue<PathBuf>,
    #[serde(rename = "SNAPSHOT_A")]
    pub snapshot_a: ConfigValue<PathBuf>,
    #[serde(rename = "SNAPSHOT_B")]
    pub snapshot_b: ConfigValue<PathBuf>,
}

impl Default for ConfigSection {
    fn default() -> Self {
        ConfigSection {
            matrix_dim: 16.into(),
            tile_dim: 16.into(),
        }
    }
}

impl Default for PrecisionSection {
    fn default() -> Self {
        PrecisionSection {
            input_type: DataTypeConfig::Int(IntTypeConfig {
                width: 8,
                signed: true,
            }),
            output_type: DataTypeConfig::Fp(FpTypeConfig {
                sign: true,
                exponent: 8,
                mantissa: 7,
            }),
        }
    }
}

impl Default for ToleranceSection {
    fn default() -> Self {
        let tolerance = Tolerance::default();
        ToleranceSection {
            atol: tolerance.atol.into(),
            rtol: tolerance.rtol.into(),
            max_reported_mismatches: DEFAULT_MAX_REPORTED.into(),
        }
    }
}

impl Default for GeneratorSection {
    fn default() -> Self {
        let generator = GeneratorConfig::default();
        GeneratorSection {
            non_zero_ratio: generator.non_zero_ratio.into(),
            seed: generator.seed.into(),
            min_value: generator.min_value.into(),
            max_value: generator.max_value.into(),
        }
    }
}

impl Default for FilesSection {
    fn default() -> Self {
        FilesSection {
            input_image: PathBuf::from("input_mem.csv").into(),
            result_image: PathBuf::from("result_mem.csv").into(),
            snapshot_a: PathBuf::from("matrix_a.npy").into(),
            snapshot_b: PathBuf::from("matrix_b.npy").into(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            config: ConfigSection::default(),
            precision: PrecisionSection::default(),
            tolerance: ToleranceSection::default(),
            generator: GeneratorSection::default(),
            files: FilesSection::default(),
        }
    }
}

impl From<FpTypeConfig> for FpType {
    fn from(config: FpTypeConfig) -> Self {
        FpType {
            sign: config.sign,
            exponent: config.exponent,
            mantissa: config.mantissa,
        }
    }
}

impl From<IntTypeConfig> for IntType {
    fn from(config: IntTypeConfig) -> Self {
        IntType {
            width: config.width,
            signed: config.signed,
        }
    }
}

impl From<DataTypeConfig> for DataType {
    fn from(config: DataTypeConfig) -> Self {
        match config {
            DataTypeConfig::Fp(fp_config) => DataType::Fp(fp_config.into()),
            DataTypeConfig::Int(int_config) => DataType::Int(int_config.into()),
        }
    }
}

impl From<&GeneratorSection> for GeneratorConfig {
    fn from(section: &GeneratorSection) -> Self {
        GeneratorConfig {
            non_zero_ratio: section.non_zero_ratio.value,
            seed: section.seed.value,
            min_value: section.min_value.value,
            max_value: section.max_value.value,
        }
    }
}

/// Where each stage reads and writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePaths {
    pub input_image: PathBuf,
    pub result_image: PathBuf,
    pub snapshot_a: PathBuf,
    pub snapshot_b: PathBuf,
}

impl VerifierConfig {
    pub fn matrix_dim(&self) -> usize {
        self.config.matrix_dim.value
    }

    pub fn input_type(&self) -> Result<IntType, ConfigError> {
        match DataType::from(self.precision.input_type.clone()) {
            DataType::Int(int_type) => Ok(int_type),
            other => Err(ConfigError::InputType(other)),
        }
    }

    pub fn output_type(&self) -> Result<FpType, ConfigError> {
        match DataType::from(self.precision.output_type.clone()) {
            DataType::Fp(fp_type) => Ok(fp_type),
            other => Err(ConfigError::OutputType(other)),
        }
    }

    pub fn layout(&self) -> Result<TileLayout, ConfigError> {
        let layout = TileLayout::new(self.config.tile_dim.value, self.input_type()?)?;
        layout.check(self.matrix_dim(), self.matrix_dim())?;
        Ok(layout)
    }

    pub fn result_decoder(&self) -> Result<ResultDecoder, ConfigError> {
        Ok(ResultDecoder::new(self.output_type()?)?)
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            atol: self.tolerance.atol.value,
            rtol: self.tolerance.rtol.value,
        }
    }

    pub fn max_reported_mismatches(&self) -> usize {
        self.tolerance.max_reported_mismatches.value
    }

    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig::from(&self.generator)
    }

    /// Resolve the configured file names against `dir`. Absolute names are kept as they are.
    pub fn paths(&self, dir: &Path) -> FilePaths {
        FilePaths {
            input_image: dir.join(&self.files.input_image.value),
            result_image: dir.join(&self.files.result_image.value),
            snapshot_a: dir.join(&self.files.snapshot_a.value),
            snapshot_b: dir.join(&self.files.snapshot_b.value),
        }
    }

    /// Check everything the stages rely on, so they can fail early with a config error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matrix_dim() == 0 {
            return Err(ConfigError::ZeroMatrixDim);
        }
        self.layout()?;
        self.result_decoder()?;

        let generator = self.generator();
        if !(0.0..=1.0).contains(&generator.non_zero_ratio) {
            return Err(ConfigError::NonZeroRatio(generator.non_zero_ratio));
        }
        if generator.min_value >= generator.max_value {
            return Err(ConfigError::EmptyRange {
                min: generator.min_value,
                max: generator.max_value,
            });
        }

        let Tolerance { atol, rtol } = self.tolerance();
        if !(atol.is_finite() && rtol.is_finite() && atol >= 0.0 && rtol >= 0.0) {
            return Err(ConfigError::Tolerance { atol, rtol });
        }
        Ok(())
    }
}

pub fn load_config_from_file(path: &Path) -> Result<VerifierConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the settings for one run.
///
/// An explicit path must load. Without one, [`DEFAULT_CONFIG_PATH`] is tried and any problem with it falls back to
/// the defaults with a warning. The result is always validated.
pub fn load_config(explicit: Option<&Path>) -> Result<VerifierConfig, ConfigError> {
    let config = match explicit {
        Some(path) => load_config_from_file(path)?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config_from_file(path).unwrap_or_else(|e| {
                    tracing::warn!("Failed to load config: {e}. Using defaults.");
                    VerifierConfig::default()
                })
            } else {
                tracing::debug!("no settings file at {DEFAULT_CONFIG_PATH}, using defaults");
                VerifierConfig::default()
            }
        }
    };

    config.validate()?;
    tracing::debug!(
        matrix_dim = config.matrix_dim(),
        tile_dim = config.config.tile_dim.value,
        "loaded config"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VerifierConfig::default();
        config.validate().unwrap();

        assert_eq!(config.matrix_dim(), 16);
        assert_eq!(config.layout().unwrap(), TileLayout::int8(16).unwrap());
        assert_eq!(config.output_type().unwrap(), FpType::BF16);
        assert_eq!(config.tolerance(), Tolerance::default());
        assert_eq!(config.max_reported_mismatches(), 10);
        assert_eq!(config.generator(), GeneratorConfig::default());
    }

    #[test]
    fn parses_the_settings_layout() {
        let config: VerifierConfig = toml::from_str(
            r#"
            [CONFIG]
            MATRIX_DIM = { value = 32 }
            TILE_DIM = { value = 8 }

            [PRECISION.INPUT_TYPE]
            type = "Int"
            width = 8

            [PRECISION.OUTPUT_TYPE]
            type = "Fp"
            sign = true
            exponent = 8
            mantissa = 7

            [TOLERANCE]
            ATOL = { value = 0.01 }
            RTOL = { value = 0.001 }
            MAX_REPORTED_MISMATCHES = { value = 5 }
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.matrix_dim(), 32);
        assert_eq!(config.layout().unwrap().tile_dim(), 8);
        assert_eq!(config.input_type().unwrap(), IntType::I8);
        assert_eq!(config.tolerance().atol, 0.01);
        assert_eq!(config.max_reported_mismatches(), 5);
        // Sections left out keep their defaults.
        assert_eq!(config.generator, GeneratorSection::default());
        assert_eq!(config.files, FilesSection::default());
    }

    #[test]
    fn validate_rejects_bad_layouts() {
        let mut config = VerifierConfig::default();
        config.config.tile_dim.value = 24;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Layout(LayoutError::DimensionMismatch { .. }))
        ));

        config.config.matrix_dim.value = 6;
        config.config.tile_dim.value = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Layout(LayoutError::PartialWord { .. }))
        ));

        config.config.matrix_dim.value = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMatrixDim)));
    }

    #[test]
    fn validate_rejects_bad_types_and_ranges() {
        let mut config = VerifierConfig::default();
        config.precision.input_type = config.precision.output_type.clone();
        assert!(matches!(config.validate(), Err(ConfigError::InputType(_))));

        // Operands are int8, so the element has to be signed and at least as wide.
        for (width, signed) in [(264, true), (4, true), (8, false)] {
            let mut config = VerifierConfig::default();
            config.precision.input_type = DataTypeConfig::Int(IntTypeConfig { width, signed });
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Layout(LayoutError::UnsupportedElement(_)))
                ),
                "width {width}, signed {signed}"
            );
        }

        let mut config = VerifierConfig::default();
        config.precision.input_type = DataTypeConfig::Int(IntTypeConfig {
            width: 16,
            signed: true,
        });
        config.validate().unwrap();

        let mut config = VerifierConfig::default();
        config.generator.min_value.value = 5;
        config.generator.max_value.value = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRange { min: 5, max: 5 })
        ));

        let mut config = VerifierConfig::default();
        config.generator.non_zero_ratio.value = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::NonZeroRatio(_))));

        let mut config = VerifierConfig::default();
        config.tolerance.rtol.value = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Tolerance { .. })));
    }

    #[test]
    fn explicit_config_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[CONFIG\nMATRIX_DIM = 3").unwrap();
        assert!(matches!(
            load_config(Some(&broken)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn paths_resolve_against_the_output_dir() {
        let config = VerifierConfig::default();
        let paths = config.paths(Path::new("/tmp/run"));
        assert_eq!(paths.input_image, Path::new("/tmp/run/input_mem.csv"));
        assert_eq!(paths.snapshot_b, Path::new("/tmp/run/matrix_b.npy"));
    }

    #[test]
    fn bundled_settings_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = load_config_from_file(&path).unwrap();
        assert_eq!(config, VerifierConfig::default());
    }
}
