use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use thiserror::Error;
use tracing::info;

use crate::converter::MobileModel;
use crate::label_encoder::{LabelEncoder, LabelEncoderError};
use crate::model::ModelError;
use crate::sequence::{dedup_samples, pad_or_truncate};
use crate::types::{GestureSequence, SensorSample, Truncation, NUM_CHANNELS};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Label encoder error: {0}")]
    Labels(#[from] LabelEncoderError),

    #[error("Invalid sequence length: expected {expected}, got {actual}")]
    InvalidSequenceLength { expected: usize, actual: usize },

    #[error("No output probabilities")]
    NoOutput,
}

/// Clasificador de secuencias sobre el artefacto móvil + codificador
pub struct GestureClassifier {
    model: MobileModel,
    encoder: LabelEncoder,
    device: Device,
}

impl GestureClassifier {
    pub fn new(
        model_path: impl AsRef<Path>,
        classes_path: impl AsRef<Path>,
    ) -> Result<Self, ClassifierError> {
        let device = Device::Cpu;
        let encoder = LabelEncoder::load(classes_path)?;
        let model = MobileModel::load(model_path.as_ref(), &device)?;
        crate::converter::check_encoder(model.spec(), &encoder)?;

        info!(
            model = %model_path.as_ref().display(),
            classes = ?encoder.classes(),
            input = ?model.spec().input_shape(),
            precision = model.precision().as_str(),
            "clasificador cargado"
        );

        Ok(Self {
            model,
            encoder,
            device,
        })
    }

    /// Longitud de secuencia que espera el modelo
    pub fn max_len(&self) -> usize {
        self.model.spec().max_len
    }

    /// Truncado con el que se entrenó el modelo
    pub fn truncation(&self) -> Truncation {
        self.model.spec().truncation
    }

    /// Deduplica y ajusta muestras crudas a la forma de entrada del modelo.
    /// Sin `truncation` explícito usa el del contrato.
    pub fn prepare(
        &self,
        samples: &[SensorSample],
        truncation: Option<Truncation>,
    ) -> GestureSequence {
        let unique = dedup_samples(samples);
        pad_or_truncate(
            &unique,
            self.max_len(),
            truncation.unwrap_or_else(|| self.truncation()),
        )
    }

    /// Probabilidades en el orden de índices del codificador
    fn probabilities(&self, sequence: &GestureSequence) -> Result<Vec<f32>, ClassifierError> {
        let expected = self.max_len();
        if sequence.len() != expected {
            return Err(ClassifierError::InvalidSequenceLength {
                expected,
                actual: sequence.len(),
            });
        }

        let flat: Vec<f32> = sequence.iter().flat_map(|f| f.iter().copied()).collect();
        let input = Tensor::from_vec(flat, (1, expected, NUM_CHANNELS), &self.device)?;
        let probs: Vec<Vec<f32>> = self.model.model().predict_proba(&input)?.to_vec2()?;
        probs.into_iter().next().ok_or(ClassifierError::NoOutput)
    }

    /// Probabilidades para todas las clases
    pub fn predict_scores(
        &self,
        sequence: &GestureSequence,
    ) -> Result<HashMap<String, f32>, ClassifierError> {
        let row = self.probabilities(sequence)?;
        let mut scores = HashMap::with_capacity(row.len());
        for (idx, score) in row.into_iter().enumerate() {
            scores.insert(self.encoder.decode(idx)?.to_string(), score);
        }
        Ok(scores)
    }

    /// Clase más probable y su probabilidad. En empate gana el índice menor.
    pub fn predict_single(
        &self,
        sequence: &GestureSequence,
    ) -> Result<(String, f32), ClassifierError> {
        let row = self.probabilities(sequence)?;
        let (idx, score) = argmax(&row).ok_or(ClassifierError::NoOutput)?;
        Ok((self.encoder.decode(idx)?.to_string(), score))
    }

    pub fn get_labels(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }
}

/// Primer índice con el valor máximo
fn argmax(row: &[f32]) -> Option<(usize, f32)> {
    row.iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::save_model_artifacts;
    use crate::converter::{convert_to_mobile, Precision};
    use crate::model::{GestureMlp, ModelSpec, DEFAULT_HIDDEN};
    use candle_nn::VarMap;

    fn build(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        build_with(dir, Truncation::Post)
    }

    fn build_with(
        dir: &Path,
        truncation: Truncation,
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let encoder = LabelEncoder::fit(&["circle", "wave"]).unwrap();
        let spec = ModelSpec::new(4, DEFAULT_HIDDEN.to_vec(), encoder.classes().to_vec())
            .with_truncation(truncation);
        let mut varmap = VarMap::new();
        GestureMlp::new_trainable(spec.clone(), &mut varmap, 9, &Device::Cpu).unwrap();
        let paths = save_model_artifacts(dir, &varmap, &spec, &encoder).unwrap();
        let mobile = dir.join("mobile.safetensors");
        convert_to_mobile(&paths.model, &spec, None, &mobile, Precision::F16).unwrap();
        (mobile, paths.encoder)
    }

    #[test]
    fn test_scores_cover_all_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (model, classes) = build(dir.path());
        let classifier = GestureClassifier::new(&model, &classes).unwrap();

        let sequence: GestureSequence = vec![[0.5; NUM_CHANNELS]; 4];
        let scores = classifier.predict_scores(&sequence).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores.values().sum::<f32>() - 1.0).abs() < 1e-3);

        let (label, conf) = classifier.predict_single(&sequence).unwrap();
        assert!(classifier.get_labels().contains(&label));
        assert!((conf - scores[&label]).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (model, classes) = build(dir.path());
        let classifier = GestureClassifier::new(&model, &classes).unwrap();
        let sequence: GestureSequence = vec![[0.0; NUM_CHANNELS]; 3];
        assert!(matches!(
            classifier.predict_scores(&sequence),
            Err(ClassifierError::InvalidSequenceLength {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_mismatched_classes_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (model, _) = build(dir.path());
        let other = dir.path().join("other.json");
        LabelEncoder::fit(&["a", "b", "c"]).unwrap().save(&other).unwrap();
        assert!(GestureClassifier::new(&model, &other).is_err());
    }

    #[test]
    fn test_prepare_follows_trained_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let (model, classes) = build_with(dir.path(), Truncation::Pre);
        let classifier = GestureClassifier::new(&model, &classes).unwrap();
        assert_eq!(classifier.truncation(), Truncation::Pre);

        let samples: Vec<SensorSample> = (1..=6)
            .map(|v| SensorSample::new([v as f32; NUM_CHANNELS]))
            .collect();
        let kept = classifier.prepare(&samples, None);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0][0], 3.0);
        assert_eq!(kept[3][0], 6.0);

        let overridden = classifier.prepare(&samples, Some(Truncation::Post));
        assert_eq!(overridden[0][0], 1.0);
    }

    #[test]
    fn test_argmax_breaks_ties_by_lowest_index() {
        assert_eq!(argmax(&[0.25, 0.5, 0.5]), Some((1, 0.5)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[]), None);
    }
}
