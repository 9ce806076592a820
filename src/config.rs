use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::training::TrainConfig;
use crate::types::{Truncation, DEFAULT_MAX_LEN};

/// Configuración completa del entrenamiento: entradas, preprocesado y partición
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub labels_path: PathBuf,
    pub out_dir: PathBuf,
    pub max_len: usize,
    pub truncation: Truncation,
    pub test_fraction: f64,
    /// Fracción final del conjunto de entrenamiento usada para validar
    pub validation_fraction: f64,
    pub train: TrainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("gesture_data.csv"),
            labels_path: PathBuf::from("gesture_labels.csv"),
            out_dir: PathBuf::from("."),
            max_len: DEFAULT_MAX_LEN,
            truncation: Truncation::default(),
            test_fraction: 0.2,
            validation_fraction: 0.2,
            train: TrainConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Lee un JSON parcial; los campos ausentes toman el valor por defecto
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la configuración {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Configuración inválida en {:?}", path))?;
        info!(path = %path.display(), "configuración cargada");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_len > 0, "max_len debe ser mayor que 0");
        ensure!(
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "test_fraction debe estar en (0, 1), recibido {}",
            self.test_fraction
        );
        ensure!(
            (0.0..1.0).contains(&self.validation_fraction),
            "validation_fraction debe estar en [0, 1), recibido {}",
            self.validation_fraction
        );
        ensure!(self.train.epochs > 0, "epochs debe ser mayor que 0");
        ensure!(self.train.batch_size > 0, "batch_size debe ser mayor que 0");
        ensure!(
            self.train.learning_rate > 0.0,
            "learning_rate debe ser positivo"
        );
        ensure!(
            !self.train.hidden.is_empty() && self.train.hidden.iter().all(|&h| h > 0),
            "las capas ocultas deben tener tamaño mayor que 0"
        );
        Ok(())
    }
}
