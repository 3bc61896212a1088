//! Trainer configuration
//!
//! The parent pipeline hands the trainer two JSON blobs (global settings
//! and known file paths) plus the classifier kind and the problem type.
//! These are parsed into a [`TrainerConfig`], which is the only input the
//! [`Trainer`](crate::pipeline::Trainer) needs.

use crate::error::{GridfitError, Result};
use crate::export::SerializationFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of learning problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemType {
    /// Class labels (binary or multi-class)
    Category,
    /// Continuous target
    Regression,
}

impl ProblemType {
    pub fn is_classification(&self) -> bool {
        matches!(self, ProblemType::Category)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Category => "category",
            ProblemType::Regression => "regression",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = GridfitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" | "classification" | "multi-category" | "multicategory" => {
                Ok(ProblemType::Category)
            }
            "regression" => Ok(ProblemType::Regression),
            other => Err(GridfitError::ConfigError(format!(
                "unknown problem type: {}",
                other
            ))),
        }
    }
}

/// Global settings shared by every trainer subprocess
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalArgs {
    /// Base installation path of the parent pipeline
    #[serde(rename = "ppCompleteLocation", default)]
    pub pp_complete_location: Option<PathBuf>,
    /// Worker count for the grid search (<= 0 means all cores)
    #[serde(rename = "numCPUs", default)]
    pub num_cpus: Option<i64>,
    /// Fast-iteration mode
    #[serde(default)]
    pub dev: bool,
}

impl GlobalArgs {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            GridfitError::ConfigError(format!("invalid global settings: {}", e))
        })
    }

    /// Worker count normalized for rayon (0 lets rayon pick)
    pub fn n_jobs(&self) -> usize {
        match self.num_cpus {
            Some(n) if n > 0 => n as usize,
            _ => 0,
        }
    }
}

/// Paths to the files produced by the data-formatting step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileNames {
    /// Features normalized for neural networks
    #[serde(rename = "X_train_nn", default)]
    pub x_train_nn: Option<PathBuf>,
    /// Standard features
    #[serde(rename = "X_train", default)]
    pub x_train: Option<PathBuf>,
    /// Labels
    #[serde(rename = "y_train", default)]
    pub y_train: Option<PathBuf>,
}

impl FileNames {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            GridfitError::ConfigError(format!("invalid file names: {}", e))
        })
    }

    /// Feature file for a classifier; `normalized` selects the nn variant
    pub fn features(&self, normalized: bool) -> Result<&Path> {
        let (key, path) = if normalized {
            ("X_train_nn", &self.x_train_nn)
        } else {
            ("X_train", &self.x_train)
        };
        path.as_deref()
            .ok_or_else(|| GridfitError::ConfigError(format!("missing file name: {}", key)))
    }

    pub fn labels(&self) -> Result<&Path> {
        self.y_train
            .as_deref()
            .ok_or_else(|| GridfitError::ConfigError("missing file name: y_train".to_string()))
    }
}

/// Everything a single trainer run needs
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub global: GlobalArgs,
    pub files: FileNames,
    /// Classifier kind tag, e.g. `clRandomForest`
    pub classifier: String,
    pub problem_type: ProblemType,
    /// Root under which `bestClassifiers/` is written
    pub output_root: PathBuf,
    /// Cross-validation folds
    pub cv_folds: usize,
    /// Seed for the train/test split and the estimators
    pub random_state: u64,
    /// Artifact format
    pub format: SerializationFormat,
}

impl TrainerConfig {
    /// Create a new configuration
    pub fn new(
        global: GlobalArgs,
        files: FileNames,
        classifier: impl Into<String>,
        problem_type: ProblemType,
    ) -> Self {
        let output_root = default_output_root(&global);
        Self {
            global,
            files,
            classifier: classifier.into(),
            problem_type,
            output_root,
            cv_folds: 5,
            random_state: 0,
            format: SerializationFormat::Binary,
        }
    }

    /// Parse the four positional arguments the parent passes
    pub fn from_args(
        global_json: &str,
        files_json: &str,
        classifier: &str,
        problem_type: &str,
    ) -> Result<Self> {
        Ok(Self::new(
            GlobalArgs::from_json(global_json)?,
            FileNames::from_json(files_json)?,
            classifier,
            problem_type.parse()?,
        ))
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_cv(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    pub fn dev(&self) -> bool {
        self.global.dev
    }

    /// Directory holding per-kind parameter grid overrides, if a base path is set
    pub fn param_override_dir(&self) -> Option<PathBuf> {
        self.global
            .pp_complete_location
            .as_ref()
            .map(|base| base.join("pySetup").join("parameterMakers"))
    }
}

fn default_output_root(global: &GlobalArgs) -> PathBuf {
    match &global.pp_complete_location {
        Some(base) => base.join("pySetup"),
        None => PathBuf::from("pySetup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_args() {
        let global = GlobalArgs::from_json(
            r#"{"ppCompleteLocation": "/opt/pp", "numCPUs": 4, "dev": true, "other": 1}"#,
        )
        .unwrap();
        assert_eq!(global.pp_complete_location, Some(PathBuf::from("/opt/pp")));
        assert_eq!(global.n_jobs(), 4);
        assert!(global.dev);
    }

    #[test]
    fn test_non_positive_cpus_means_all_cores() {
        let global = GlobalArgs::from_json(r#"{"numCPUs": -1}"#).unwrap();
        assert_eq!(global.n_jobs(), 0);
        assert!(!global.dev);
    }

    #[test]
    fn test_file_names_select_nn_variant() {
        let files = FileNames::from_json(
            r#"{"X_train": "x.csv", "X_train_nn": "x_nn.csv", "y_train": "y.csv"}"#,
        )
        .unwrap();
        assert_eq!(files.features(false).unwrap(), Path::new("x.csv"));
        assert_eq!(files.features(true).unwrap(), Path::new("x_nn.csv"));
        assert_eq!(files.labels().unwrap(), Path::new("y.csv"));
    }

    #[test]
    fn test_missing_file_name() {
        let files = FileNames::from_json(r#"{"y_train": "y.csv"}"#).unwrap();
        assert!(matches!(files.features(false), Err(GridfitError::ConfigError(_))));
    }

    #[test]
    fn test_problem_type_parsing() {
        assert_eq!("category".parse::<ProblemType>().unwrap(), ProblemType::Category);
        assert_eq!("Regression".parse::<ProblemType>().unwrap(), ProblemType::Regression);
        assert!("clustering".parse::<ProblemType>().is_err());
    }

    #[test]
    fn test_default_output_root() {
        let config = TrainerConfig::from_args(
            r#"{"ppCompleteLocation": "/opt/pp"}"#,
            "{}",
            "clRandomForest",
            "category",
        )
        .unwrap();
        assert_eq!(config.output_root, PathBuf::from("/opt/pp/pySetup"));
        assert_eq!(config.cv_folds, 5);
        assert_eq!(
            config.param_override_dir(),
            Some(PathBuf::from("/opt/pp/pySetup/parameterMakers"))
        );
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = TrainerConfig::from_args("{not json", "{}", "clKNeighbors", "category");
        assert!(matches!(err, Err(GridfitError::ConfigError(_))));
    }
}
