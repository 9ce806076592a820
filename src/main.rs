/*
Entrenamiento del clasificador denso de gestos IMU

1. Lee lecturas (session_id, ax..gz) y etiquetas (session_id, label)
2. Agrupa por sesión, elimina duplicados y ajusta a MAX_LEN muestras
3. Entrena Dense(64) → Dense(32) → softmax y evalúa sobre prueba
4. Guarda pesos, contrato y codificador en --out-dir

Ejemplo:
    RUST_LOG=info ./target/release/train_dense_model \
        --data gesture_data.csv --labels gesture_labels.csv --out-dir model/

Después:
    ./target/release/convert_model --model model/gesture_model.safetensors
*/

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gesture_trainer::config::PipelineConfig;
use gesture_trainer::logging;
use gesture_trainer::pipeline::run_training;
use gesture_trainer::types::Truncation;

#[derive(Parser, Debug)]
#[command(name = "train_dense_model", about = "Entrena el clasificador denso de gestos")]
struct Cli {
    /// CSV de lecturas: session_id, ax, ay, az, gx, gy, gz
    #[arg(long)]
    data: Option<PathBuf>,

    /// CSV de etiquetas: session_id, label
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Directorio donde se escriben los artefactos
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Configuración JSON; los flags la sobrescriben
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    max_len: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// post (conserva el inicio) | pre (conserva el final)
    #[arg(long)]
    truncation: Option<Truncation>,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.data {
            config.data_path = v;
        }
        if let Some(v) = self.labels {
            config.labels_path = v;
        }
        if let Some(v) = self.out_dir {
            config.out_dir = v;
        }
        if let Some(v) = self.epochs {
            config.train.epochs = v;
        }
        if let Some(v) = self.batch_size {
            config.train.batch_size = v;
        }
        if let Some(v) = self.max_len {
            config.max_len = v;
        }
        if let Some(v) = self.seed {
            config.train.seed = v;
        }
        if let Some(v) = self.truncation {
            config.truncation = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    logging::init();
    let config = Cli::parse().into_config()?;
    let outcome = run_training(&config)?;
    println!(
        "✅ Test accuracy {:.2}% ({} secuencias de prueba)",
        outcome.summary.test_accuracy * 100.0,
        outcome.summary.num_test
    );
    Ok(())
}
