use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use scansort_core::{ControllerOptions, FamilyFolders, MergeStrategy, OrientationStrategy};
use scansort_ocr::{DetOptions, OcrConfig};
use scansort_render::RenderOptions;
use scansort_rules::{Classifier, RuleError, RuleSpec};

pub const DEFAULT_DPI: u32 = 200;
const DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=600;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    // ============ OCR models ============
    /// Text detection model; `<models dir>/det.onnx` when unset
    pub det_model_path: Option<PathBuf>,
    /// Text recognition model; `<models dir>/rec.onnx` when unset
    pub rec_model_path: Option<PathBuf>,
    /// Recognition charset, one symbol per line
    pub dict_path: Option<PathBuf>,
    /// Optional document orientation classifier
    pub cls_model_path: Option<PathBuf>,

    // ============ Rendering ============
    /// Directory holding the pdfium shared library
    pub pdfium_dir: Option<PathBuf>,
    pub dpi: u32,

    // ============ Pipeline ============
    pub export_dir: Option<PathBuf>,
    pub merge: MergeStrategy,
    pub orientation: OrientationStrategy,
    pub folders: FamilyFolders,
    /// Replaces the built-in rule list when present
    pub rules: Option<Vec<RuleSpec>>,
    /// Parent of the per-run scratch directories
    pub workspace_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            det_model_path: None,
            rec_model_path: None,
            dict_path: None,
            cls_model_path: None,
            pdfium_dir: None,
            dpi: DEFAULT_DPI,
            export_dir: None,
            merge: MergeStrategy::default(),
            orientation: OrientationStrategy::default(),
            folders: FamilyFolders::default(),
            rules: None,
            workspace_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config dir unavailable")]
    NoConfigDir,
    #[error("data dir unavailable")]
    NoDataDir,
    #[error("dpi {0} outside 72..=600")]
    InvalidDpi(u32),
    #[error("invalid rules: {0}")]
    Rules(#[from] RuleError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("scansort").join("config.json"))
}

pub fn models_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(base.join("scansort").join("models"))
}

/// Missing file means defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !DPI_RANGE.contains(&self.dpi) {
            return Err(ConfigError::InvalidDpi(self.dpi));
        }
        self.classifier()?;
        Ok(())
    }

    /// Model locations, unset ones resolved under [`models_dir`]. The
    /// orientation classifier is only used if it exists.
    pub fn ocr_config(&self) -> Result<OcrConfig, ConfigError> {
        let resolve = |explicit: &Option<PathBuf>, file: &str| -> Result<PathBuf, ConfigError> {
            match explicit {
                Some(path) => Ok(path.clone()),
                None => Ok(models_dir()?.join(file)),
            }
        };

        let cls_model_path = match &self.cls_model_path {
            Some(path) => Some(path.clone()),
            None => models_dir()
                .ok()
                .map(|dir| dir.join("cls.onnx"))
                .filter(|path| path.exists()),
        };

        Ok(OcrConfig {
            det_model_path: resolve(&self.det_model_path, "det.onnx")?,
            rec_model_path: resolve(&self.rec_model_path, "rec.onnx")?,
            dict_path: resolve(&self.dict_path, "dict.txt")?,
            cls_model_path,
            det_options: DetOptions::default(),
        })
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.dpi,
            library_dir: self.pdfium_dir.clone(),
        }
    }

    pub fn classifier(&self) -> Result<Classifier, ConfigError> {
        match &self.rules {
            Some(specs) => Ok(Classifier::from_specs(specs)?),
            None => Ok(Classifier::standard()),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            merge: self.merge,
            orientation: self.orientation,
            folders: self.folders.clone(),
            workspace_parent: self.workspace_dir.clone(),
        }
    }
}
