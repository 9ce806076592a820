use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_nn::VarMap;
use tracing::info;

use crate::label_encoder::LabelEncoder;
use crate::model::ModelSpec;

pub const NATIVE_MODEL_FILE: &str = "gesture_model.safetensors";
pub const MODEL_SPEC_FILE: &str = "gesture_model.json";
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
pub const MOBILE_MODEL_FILE: &str = "gesture_model.mobile.safetensors";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";
pub const EVALUATION_FILE: &str = "evaluation.json";

/// Rutas de todo lo que escribe el entrenamiento dentro del directorio de salida
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub spec: PathBuf,
    pub encoder: PathBuf,
    pub confusion_matrix: PathBuf,
    pub evaluation: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(NATIVE_MODEL_FILE),
            spec: dir.join(MODEL_SPEC_FILE),
            encoder: dir.join(LABEL_ENCODER_FILE),
            confusion_matrix: dir.join(CONFUSION_MATRIX_FILE),
            evaluation: dir.join(EVALUATION_FILE),
        }
    }
}

/// Escribe pesos f32, contrato y codificador. Se sobrescriben si existen.
pub fn save_model_artifacts(
    dir: impl AsRef<Path>,
    varmap: &VarMap,
    spec: &ModelSpec,
    encoder: &LabelEncoder,
) -> Result<ArtifactPaths> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("No se pudo crear {:?}", dir))?;
    let paths = ArtifactPaths::in_dir(dir);

    varmap
        .save(&paths.model)
        .with_context(|| format!("No se pudo guardar el modelo en {:?}", paths.model))?;
    spec.save(&paths.spec)
        .with_context(|| format!("No se pudo guardar el contrato en {:?}", paths.spec))?;
    encoder
        .save(&paths.encoder)
        .with_context(|| format!("No se pudo guardar el codificador en {:?}", paths.encoder))?;

    info!(
        model = %paths.model.display(),
        spec = %paths.spec.display(),
        encoder = %paths.encoder.display(),
        "artefactos guardados"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GestureMlp, DEFAULT_HIDDEN};
    use candle_core::Device;

    #[test]
    fn test_saved_artifacts_reload() {
        let dir = tempfile::tempdir().unwrap();
        let device = Device::Cpu;
        let encoder = LabelEncoder::fit(&["circle", "wave"]).unwrap();
        let spec = ModelSpec::new(8, DEFAULT_HIDDEN.to_vec(), encoder.classes().to_vec());
        let mut varmap = VarMap::new();
        GestureMlp::new_trainable(spec.clone(), &mut varmap, 42, &device).unwrap();

        let out = dir.path().join("nested");
        let paths = save_model_artifacts(&out, &varmap, &spec, &encoder).unwrap();
        assert_eq!(paths, ArtifactPaths::in_dir(&out));
        assert!(paths.model.exists());

        assert_eq!(ModelSpec::load(&paths.spec).unwrap(), spec);
        assert_eq!(LabelEncoder::load(&paths.encoder).unwrap(), encoder);
        let model = GestureMlp::load_native(spec, &paths.model, &device).unwrap();
        assert_eq!(model.spec().num_classes(), 2);
    }
}
