//! Orquestación del entrenamiento completo: CSV → secuencias → modelo → artefactos.

use std::fs;

use anyhow::{Context, Result};
use candle_core::Device;
use serde::Serialize;
use tracing::info;

use crate::artifacts::{save_model_artifacts, ArtifactPaths};
use crate::config::PipelineConfig;
use crate::csv_loader::load_sessions;
use crate::label_encoder::LabelEncoder;
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::model::ModelSpec;
use crate::sequence::{build_sequences, flatten_sequences};
use crate::split::{gather_rows, train_test_split, validation_tail};
use crate::training::{evaluate, train, Dataset, EpochMetrics};

/// Contenido de `evaluation.json`
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub test_loss: f64,
    pub test_accuracy: f64,
    pub num_sequences: usize,
    pub num_train: usize,
    pub num_validation: usize,
    pub num_test: usize,
    pub classes: Vec<String>,
    pub report: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    pub history: Vec<EpochMetrics>,
}

/// Resultado de una ejecución de entrenamiento
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub paths: ArtifactPaths,
    pub summary: EvaluationSummary,
}

/// Ejecuta el pipeline de principio a fin. Cualquier error aborta sin
/// escribir artefactos parciales del modelo.
pub fn run_training(config: &PipelineConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let device = Device::Cpu;

    let sessions = load_sessions(&config.data_path, &config.labels_path)?;
    let sequences = build_sequences(&sessions, config.max_len, config.truncation)?;

    let labels: Vec<&str> = sequences.iter().map(|s| s.label.as_str()).collect();
    let encoder = LabelEncoder::fit(&labels)?;
    let encoded = encoder.transform(&labels)?;
    let one_hot = encoder.one_hot(&encoded)?;
    info!(
        sequences = sequences.len(),
        classes = ?encoder.classes(),
        "etiquetas codificadas"
    );

    let spec = ModelSpec::new(
        config.max_len,
        config.train.hidden.clone(),
        encoder.classes().to_vec(),
    )
    .with_truncation(config.truncation);
    spec.validate()?;

    let inputs = flatten_sequences(&sequences);
    let row_len = spec.input_dim();
    let k = spec.num_classes();

    let split = train_test_split(sequences.len(), config.test_fraction, config.train.seed)?;
    let (fit_idx, val_idx) = validation_tail(&split.train, config.validation_fraction)?;
    info!(
        train = fit_idx.len(),
        validation = val_idx.len(),
        test = split.test.len(),
        "partición"
    );

    let subset = |idx: &[usize]| -> Result<Dataset> {
        Dataset::from_flat(
            gather_rows(&inputs, row_len, idx),
            gather_rows(&one_hot, k, idx),
            &spec,
            &device,
        )
    };
    let fit = subset(&fit_idx)?;
    let validation = subset(&val_idx)?;
    let test = subset(&split.test)?;

    let trained = train(&config.train, spec.clone(), &fit, Some(&validation), &device)?;

    let eval = evaluate(&trained.model, &test)?;
    let confusion = ConfusionMatrix::from_predictions(&eval.actual, &eval.predicted, k)?;
    let report = ClassificationReport::from_confusion(&confusion, encoder.classes())?;

    println!("\nTest Accuracy: {:.2}%", eval.accuracy * 100.0);
    println!("\n=== Classification Report ===");
    println!("{}", report);
    println!("=== Confusion Matrix ===");
    println!("{}", confusion.render(encoder.classes()));

    let paths = save_model_artifacts(&config.out_dir, &trained.varmap, &spec, &encoder)?;
    confusion.write_csv(&paths.confusion_matrix, encoder.classes())?;

    let summary = EvaluationSummary {
        test_loss: eval.loss,
        test_accuracy: eval.accuracy,
        num_sequences: sequences.len(),
        num_train: fit_idx.len(),
        num_validation: val_idx.len(),
        num_test: split.test.len(),
        classes: encoder.classes().to_vec(),
        report,
        confusion_matrix: confusion,
        history: trained.history,
    };
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(&paths.evaluation, json)
        .with_context(|| format!("No se pudo escribir {:?}", paths.evaluation))?;

    info!(
        loss = eval.loss,
        accuracy = eval.accuracy,
        out_dir = %config.out_dir.display(),
        "entrenamiento completado"
    );
    println!("Model saved at: {}", paths.model.display());

    Ok(TrainingOutcome { paths, summary })
}
