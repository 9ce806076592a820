//! Conversión del modelo nativo al artefacto móvil.
//!
//! El artefacto móvil es un único safetensors con los pesos en la precisión
//! pedida (f16 por defecto) y el contrato del modelo en los metadatos de la
//! cabecera, de modo que el dispositivo conoce la forma de entrada y las
//! clases sin archivos adicionales.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::label_encoder::LabelEncoder;
use crate::model::{GestureMlp, ModelError, ModelSpec};

pub const MOBILE_FORMAT: &str = "gesture-mobile";
pub const MOBILE_FORMAT_VERSION: &str = "1";

const META_FORMAT: &str = "format";
const META_VERSION: &str = "format_version";
const META_PRECISION: &str = "precision";
const META_SPEC: &str = "spec";

/// Precisión de almacenamiento de los pesos en el artefacto móvil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F16,
    F32,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Precision::F16 => DType::F16,
            Precision::F32 => DType::F32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Precision::F16 => "f16",
            Precision::F32 => "f32",
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f16" => Ok(Precision::F16),
            "f32" => Ok(Precision::F32),
            other => Err(format!("Precisión desconocida '{}' (usa f16|f32)", other)),
        }
    }
}

/// Resumen de una conversión
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub precision: Precision,
    pub input_shape: [usize; 2],
    pub num_classes: usize,
    pub bytes: u64,
}

/// Comprueba que los tensores son exactamente los que describe el contrato
pub fn validate_weights(
    spec: &ModelSpec,
    tensors: &HashMap<String, Tensor>,
) -> Result<(), ModelError> {
    let expected = spec.tensor_shapes();
    for (name, shape) in &expected {
        let tensor = tensors
            .get(name)
            .ok_or_else(|| ModelError::MissingTensor(name.clone()))?;
        if tensor.dims() != shape.as_slice() {
            return Err(ModelError::ShapeMismatch {
                name: name.clone(),
                expected: shape.clone(),
                actual: tensor.dims().to_vec(),
            });
        }
    }
    if let Some(extra) = tensors
        .keys()
        .find(|k| !expected.iter().any(|(name, _)| name == *k))
    {
        return Err(ModelError::UnexpectedTensor(extra.clone()));
    }
    Ok(())
}

/// Comprueba que el codificador y el contrato describen las mismas clases
pub fn check_encoder(spec: &ModelSpec, encoder: &LabelEncoder) -> Result<(), ModelError> {
    if encoder.num_classes() != spec.num_classes() {
        return Err(ModelError::ClassCountMismatch {
            contract: spec.num_classes(),
            encoder: encoder.num_classes(),
        });
    }
    if encoder.classes() != spec.classes.as_slice() {
        return Err(ModelError::InvalidSpec(
            "las clases del contrato no coinciden con el codificador".into(),
        ));
    }
    Ok(())
}

/// Carga el modelo nativo, valida contra el contrato y escribe el artefacto móvil
pub fn convert_to_mobile(
    weights_path: impl AsRef<Path>,
    spec: &ModelSpec,
    encoder: Option<&LabelEncoder>,
    output: impl AsRef<Path>,
    precision: Precision,
) -> Result<ConversionReport, ModelError> {
    let weights_path = weights_path.as_ref();
    let output = output.as_ref();
    spec.validate()?;
    if let Some(encoder) = encoder {
        check_encoder(spec, encoder)?;
    }

    let device = Device::Cpu;
    let tensors = candle_core::safetensors::load(weights_path, &device)?;
    validate_weights(spec, &tensors)?;
    debug!(tensors = tensors.len(), "pesos nativos validados");

    let mut converted = BTreeMap::new();
    for (name, tensor) in tensors {
        converted.insert(name, tensor.to_dtype(precision.dtype())?);
    }

    let mut metadata = HashMap::new();
    metadata.insert(META_FORMAT.to_string(), MOBILE_FORMAT.to_string());
    metadata.insert(META_VERSION.to_string(), MOBILE_FORMAT_VERSION.to_string());
    metadata.insert(META_PRECISION.to_string(), precision.as_str().to_string());
    metadata.insert(META_SPEC.to_string(), serde_json::to_string(spec)?);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    safetensors::tensor::serialize_to_file(
        converted.iter().map(|(name, tensor)| (name.as_str(), tensor)),
        &Some(metadata),
        output,
    )
    .map_err(|e| ModelError::SafeTensors(e.to_string()))?;

    let bytes = fs::metadata(output)?.len();
    info!(
        input = %weights_path.display(),
        output = %output.display(),
        precision = precision.as_str(),
        bytes,
        "modelo convertido a formato móvil"
    );

    Ok(ConversionReport {
        output: output.to_path_buf(),
        precision,
        input_shape: spec.input_shape(),
        num_classes: spec.num_classes(),
        bytes,
    })
}

/// Modelo reconstruido desde el artefacto móvil, listo para inferencia en f32
pub struct MobileModel {
    model: GestureMlp,
    precision: Precision,
}

impl MobileModel {
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self, ModelError> {
        let buffer = fs::read(path)?;
        let (_, header) =
            SafeTensors::read_metadata(&buffer).map_err(|e| ModelError::SafeTensors(e.to_string()))?;
        let info = header
            .metadata()
            .as_ref()
            .ok_or(ModelError::MissingMetadata("__metadata__"))?;

        let format = info
            .get(META_FORMAT)
            .ok_or(ModelError::MissingMetadata(META_FORMAT))?;
        if format != MOBILE_FORMAT {
            return Err(ModelError::InvalidSpec(format!(
                "formato '{}' no es {}",
                format, MOBILE_FORMAT
            )));
        }
        let precision = info
            .get(META_PRECISION)
            .ok_or(ModelError::MissingMetadata(META_PRECISION))?
            .parse::<Precision>()
            .map_err(ModelError::InvalidSpec)?;
        let spec: ModelSpec = serde_json::from_str(
            info.get(META_SPEC)
                .ok_or(ModelError::MissingMetadata(META_SPEC))?,
        )?;
        spec.validate()?;

        let tensors = candle_core::safetensors::load_buffer(&buffer, device)?;
        validate_weights(&spec, &tensors)?;

        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Ok(Self {
            model: GestureMlp::new(spec, vb)?,
            precision,
        })
    }

    pub fn model(&self) -> &GestureMlp {
        &self.model
    }

    pub fn spec(&self) -> &ModelSpec {
        self.model.spec()
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::save_model_artifacts;
    use crate::model::DEFAULT_HIDDEN;
    use crate::types::{Truncation, NUM_CHANNELS};
    use candle_nn::VarMap;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        spec: ModelSpec,
        encoder: LabelEncoder,
        weights: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let device = Device::Cpu;
        let encoder = LabelEncoder::fit(&["circle", "punch", "wave"]).unwrap();
        let spec = ModelSpec::new(10, DEFAULT_HIDDEN.to_vec(), encoder.classes().to_vec());
        let mut varmap = VarMap::new();
        GestureMlp::new_trainable(spec.clone(), &mut varmap, 5, &device).unwrap();
        let paths = save_model_artifacts(&root, &varmap, &spec, &encoder).unwrap();
        Fixture {
            _dir: dir,
            root,
            spec,
            encoder,
            weights: paths.model,
        }
    }

    #[test]
    fn test_conversion_preserves_input_shape_and_classes() {
        let fx = fixture();
        let out = fx.root.join("mobile").join("gesture.safetensors");
        let report =
            convert_to_mobile(&fx.weights, &fx.spec, Some(&fx.encoder), &out, Precision::F16)
                .unwrap();
        assert_eq!(report.input_shape, [10, NUM_CHANNELS]);
        assert_eq!(report.num_classes, 3);

        let mobile = MobileModel::load(&out, &Device::Cpu).unwrap();
        assert_eq!(mobile.spec().input_shape(), [10, NUM_CHANNELS]);
        assert_eq!(mobile.spec().num_classes(), 3);
        assert_eq!(mobile.spec().classes, fx.encoder.classes().to_vec());
        assert_eq!(mobile.precision(), Precision::F16);
        assert_eq!(mobile.spec().truncation, Truncation::Post);
    }

    #[test]
    fn test_truncation_travels_in_mobile_metadata() {
        let fx = fixture();
        let spec = fx.spec.clone().with_truncation(Truncation::Pre);
        let out = fx.root.join("pre.safetensors");
        convert_to_mobile(&fx.weights, &spec, None, &out, Precision::F16).unwrap();
        let mobile = MobileModel::load(&out, &Device::Cpu).unwrap();
        assert_eq!(mobile.spec().truncation, Truncation::Pre);
    }

    #[test]
    fn test_half_precision_artifact_is_smaller_and_close() {
        let fx = fixture();
        let half = fx.root.join("half.safetensors");
        let full = fx.root.join("full.safetensors");
        let r16 = convert_to_mobile(&fx.weights, &fx.spec, None, &half, Precision::F16).unwrap();
        let r32 = convert_to_mobile(&fx.weights, &fx.spec, None, &full, Precision::F32).unwrap();
        assert!(r16.bytes < r32.bytes);

        let device = Device::Cpu;
        let native = GestureMlp::load_native(fx.spec.clone(), &fx.weights, &device).unwrap();
        let mobile = MobileModel::load(&half, &device).unwrap();
        let xs = Tensor::rand(-1.0f32, 1.0, (6, 10, NUM_CHANNELS), &device).unwrap();

        let a: Vec<Vec<f32>> = native.predict_proba(&xs).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = mobile.model().predict_proba(&xs).unwrap().to_vec2().unwrap();
        for (ra, rb) in a.iter().zip(b.iter()) {
            for (pa, pb) in ra.iter().zip(rb.iter()) {
                assert!((pa - pb).abs() < 1e-2, "{} vs {}", pa, pb);
            }
        }
    }

    #[test]
    fn test_encoder_class_count_mismatch_is_rejected() {
        let fx = fixture();
        let other = LabelEncoder::fit(&["circle", "wave"]).unwrap();
        let err = convert_to_mobile(
            &fx.weights,
            &fx.spec,
            Some(&other),
            fx.root.join("x.safetensors"),
            Precision::F16,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::ClassCountMismatch {
                contract: 3,
                encoder: 2
            }
        ));
    }

    #[test]
    fn test_contract_shape_mismatch_is_rejected() {
        let fx = fixture();
        let mut wrong = fx.spec.clone();
        wrong.max_len = 12;
        let err = convert_to_mobile(
            &fx.weights,
            &wrong,
            None,
            fx.root.join("x.safetensors"),
            Precision::F16,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_native_file_is_not_a_mobile_artifact() {
        let fx = fixture();
        assert!(MobileModel::load(&fx.weights, &Device::Cpu).is_err());
    }

    #[test]
    fn test_precision_from_str() {
        assert_eq!("F32".parse::<Precision>().unwrap(), Precision::F32);
        assert!("int8".parse::<Precision>().is_err());
    }
}
