//! Bucle de entrenamiento con número fijo de épocas.

use anyhow::{ensure, Context, Result};
use candle_core::{Device, Tensor, D};
use candle_nn::{AdamW, Module, Optimizer, ParamsAdamW, VarMap};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{GestureMlp, ModelSpec, DEFAULT_HIDDEN};
use crate::split::BatchIterator;
use crate::types::NUM_CHANNELS;

/// Hiperparámetros del entrenamiento
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden: Vec<usize>,
    /// Semilla para pesos iniciales, partición y barajado
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 16,
            learning_rate: 1e-3,
            hidden: DEFAULT_HIDDEN.to_vec(),
            seed: 42,
        }
    }
}

/// Métricas registradas al final de cada época
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Entradas [n, max_len, 6] y objetivos one-hot [n, k] ya en el dispositivo
pub struct Dataset {
    pub inputs: Tensor,
    pub targets: Tensor,
}

impl Dataset {
    pub fn from_flat(
        inputs: Vec<f32>,
        targets: Vec<f32>,
        spec: &ModelSpec,
        device: &Device,
    ) -> Result<Self> {
        let row_len = spec.input_dim();
        let k = spec.num_classes();
        ensure!(
            inputs.len() % row_len == 0,
            "Buffer de entrada de {} valores no es múltiplo de {}",
            inputs.len(),
            row_len
        );
        let n = inputs.len() / row_len;
        ensure!(
            targets.len() == n * k,
            "Se esperaban {} objetivos one-hot, hay {}",
            n * k,
            targets.len()
        );

        Ok(Self {
            inputs: Tensor::from_vec(inputs, (n, spec.max_len, NUM_CHANNELS), device)?,
            targets: Tensor::from_vec(targets, (n, k), device)?,
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resultado de evaluar el modelo sobre un conjunto
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub predicted: Vec<usize>,
    pub actual: Vec<usize>,
}

/// Modelo entrenado junto a las variables que lo respaldan
pub struct TrainedModel {
    pub model: GestureMlp,
    pub varmap: VarMap,
    pub history: Vec<EpochMetrics>,
}

/// Entropía cruzada categórica contra objetivos one-hot
pub fn categorical_cross_entropy(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    targets.mul(&log_probs)?.sum(1)?.mean_all()?.neg()
}

fn argmax_rows(tensor: &Tensor) -> candle_core::Result<Vec<usize>> {
    let idx: Vec<u32> = tensor.argmax(D::Minus1)?.to_vec1()?;
    Ok(idx.into_iter().map(|i| i as usize).collect())
}

fn count_correct(predicted: &[usize], actual: &[usize]) -> usize {
    predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count()
}

/// Pérdida, exactitud y predicciones sobre un conjunto completo
pub fn evaluate(model: &GestureMlp, data: &Dataset) -> Result<Evaluation> {
    ensure!(!data.is_empty(), "No se puede evaluar un conjunto vacío");
    let logits = model.forward(&data.inputs)?;
    let loss = categorical_cross_entropy(&logits, &data.targets)?.to_scalar::<f32>()? as f64;
    let predicted = argmax_rows(&logits)?;
    let actual = argmax_rows(&data.targets)?;
    let accuracy = count_correct(&predicted, &actual) as f64 / actual.len() as f64;
    Ok(Evaluation {
        loss,
        accuracy,
        predicted,
        actual,
    })
}

/// Entrena durante exactamente `config.epochs` épocas. Cualquier error aborta.
pub fn train(
    config: &TrainConfig,
    spec: ModelSpec,
    fit: &Dataset,
    validation: Option<&Dataset>,
    device: &Device,
) -> Result<TrainedModel> {
    ensure!(config.epochs > 0, "epochs debe ser mayor que 0");
    ensure!(!fit.is_empty(), "No hay secuencias para entrenar");
    let validation = validation.filter(|v| !v.is_empty());
    if validation.is_none() {
        warn!("sin tramo de validación: val_loss/val_accuracy no se reportan");
    }

    let mut varmap = VarMap::new();
    let model = GestureMlp::new_trainable(spec, &mut varmap, config.seed, device)
        .context("No se pudo crear el modelo entrenable")?;

    let mut optimizer = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            weight_decay: 0.0,
        },
    )?;

    let mut batches =
        BatchIterator::new(fit.inputs.clone(), fit.targets.clone(), config.batch_size)?;

    info!(
        epochs = config.epochs,
        batch_size = config.batch_size,
        lr = config.learning_rate,
        train = fit.len(),
        val = validation.map(Dataset::len).unwrap_or(0),
        "inicio del entrenamiento"
    );

    let mut history = Vec::with_capacity(config.epochs);
    for epoch in 0..config.epochs {
        batches.reshuffle(config.seed, epoch);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        while let Some((xs, ys)) = batches.next_batch()? {
            let logits = model.forward(&xs)?;
            let loss = categorical_cross_entropy(&logits, &ys)?;
            optimizer.backward_step(&loss)?;

            let rows = xs.dim(0)?;
            loss_sum += loss.to_scalar::<f32>()? as f64 * rows as f64;
            correct += count_correct(&argmax_rows(&logits)?, &argmax_rows(&ys)?);
            seen += rows;
        }

        let loss = loss_sum / seen as f64;
        let accuracy = correct as f64 / seen as f64;
        let (val_loss, val_accuracy) = match validation {
            Some(val) => {
                let eval = evaluate(&model, val)?;
                (Some(eval.loss), Some(eval.accuracy))
            }
            None => (None, None),
        };

        info!(
            "época {:3}/{} | loss={:.4} acc={:.4} | val_loss={} val_acc={}",
            epoch + 1,
            config.epochs,
            loss,
            accuracy,
            val_loss.map_or("-".to_string(), |v| format!("{:.4}", v)),
            val_accuracy.map_or("-".to_string(), |v| format!("{:.4}", v)),
        );

        history.push(EpochMetrics {
            epoch: epoch + 1,
            loss,
            accuracy,
            val_loss,
            val_accuracy,
        });
    }

    Ok(TrainedModel {
        model,
        varmap,
        history,
    })
}
