//! Clasificador denso de gestos y su contrato de inferencia.
//!
//! ```text
//! Input (max_len x 6) -> Flatten -> Dense(64, ReLU) -> Dense(32, ReLU) -> Dense(k) -> Softmax
//! ```
//!
//! El contrato ([`ModelSpec`]) viaja junto al modelo en ambos formatos para
//! que el conversor y el clasificador puedan validar forma de entrada y
//! número de clases en lugar de suponerlos.

use std::fs;
use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Truncation, NUM_CHANNELS};

pub const DEFAULT_HIDDEN: [usize; 2] = [64, 32];
const OUTPUT_LAYER: &str = "output";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Safetensors error: {0}")]
    SafeTensors(String),

    #[error("Contrato de modelo inválido: {0}")]
    InvalidSpec(String),

    #[error("Falta el tensor '{0}' en el modelo")]
    MissingTensor(String),

    #[error("Forma inesperada en '{name}': esperado {expected:?}, encontrado {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Tensor inesperado '{0}' no descrito por el contrato")]
    UnexpectedTensor(String),

    #[error("Falta el metadato '{0}' en el artefacto móvil")]
    MissingMetadata(&'static str),

    #[error("El contrato declara {contract} clases pero el codificador tiene {encoder}")]
    ClassCountMismatch { contract: usize, encoder: usize },
}

/// Contrato de inferencia: forma de entrada fija y vocabulario fijo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub max_len: usize,
    pub num_channels: usize,
    pub hidden: Vec<usize>,
    pub classes: Vec<String>,
    /// Truncado aplicado en el entrenamiento; la inferencia debe repetirlo
    #[serde(default)]
    pub truncation: Truncation,
}

impl ModelSpec {
    pub fn new(max_len: usize, hidden: Vec<usize>, classes: Vec<String>) -> Self {
        Self {
            max_len,
            num_channels: NUM_CHANNELS,
            hidden,
            classes,
            truncation: Truncation::default(),
        }
    }

    pub fn with_truncation(mut self, truncation: Truncation) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn input_shape(&self) -> [usize; 2] {
        [self.max_len, self.num_channels]
    }

    pub fn input_dim(&self) -> usize {
        self.max_len * self.num_channels
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_len == 0 {
            return Err(ModelError::InvalidSpec("max_len = 0".into()));
        }
        if self.num_channels != NUM_CHANNELS {
            return Err(ModelError::InvalidSpec(format!(
                "num_channels = {} (se esperan {})",
                self.num_channels, NUM_CHANNELS
            )));
        }
        if self.hidden.iter().any(|&h| h == 0) {
            return Err(ModelError::InvalidSpec("capa oculta de tamaño 0".into()));
        }
        if self.classes.is_empty() {
            return Err(ModelError::InvalidSpec("sin clases".into()));
        }
        Ok(())
    }

    /// Nombre y forma [salida, entrada] de cada capa densa
    pub fn layers(&self) -> Vec<(String, usize, usize)> {
        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut fan_in = self.input_dim();
        for (i, &width) in self.hidden.iter().enumerate() {
            layers.push((format!("hidden{}", i + 1), width, fan_in));
            fan_in = width;
        }
        layers.push((OUTPUT_LAYER.to_string(), self.num_classes(), fan_in));
        layers
    }

    /// Nombre y forma de todos los tensores de parámetros
    pub fn tensor_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.layers()
            .into_iter()
            .flat_map(|(name, out, inp)| {
                [
                    (format!("{}.weight", name), vec![out, inp]),
                    (format!("{}.bias", name), vec![out]),
                ]
            })
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        let spec: ModelSpec = serde_json::from_str(&content)?;
        spec.validate()?;
        Ok(spec)
    }
}

/// Red densa Flatten → Dense → ... → Dense(k)
pub struct GestureMlp {
    layers: Vec<Linear>,
    spec: ModelSpec,
}

impl GestureMlp {
    /// Construye las capas a partir de un VarBuilder (entrenable o cargado)
    pub fn new(spec: ModelSpec, vb: VarBuilder) -> Result<Self, ModelError> {
        spec.validate()?;
        let mut layers = Vec::new();
        for (name, out, inp) in spec.layers() {
            layers.push(candle_nn::linear(inp, out, vb.pp(&name))?);
        }
        Ok(Self { layers, spec })
    }

    /// Modelo entrenable: las variables viven en `varmap` con inicialización
    /// Glorot-uniforme (sesgos a cero) reproducible por `seed`.
    pub fn new_trainable(
        spec: ModelSpec,
        varmap: &mut VarMap,
        seed: u64,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let model = {
            let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
            Self::new(spec, vb)?
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for (name, out, inp) in model.spec.layers() {
            let limit = (6.0 / (inp + out) as f64).sqrt() as f32;
            let dist = Uniform::new_inclusive(-limit, limit);
            let weights: Vec<f32> = (0..out * inp).map(|_| dist.sample(&mut rng)).collect();
            varmap.set_one(
                format!("{}.weight", name),
                Tensor::from_vec(weights, (out, inp), device)?,
            )?;
            varmap.set_one(
                format!("{}.bias", name),
                Tensor::zeros(out, DType::F32, device)?,
            )?;
        }
        Ok(model)
    }

    /// Carga pesos f32 desde un safetensors nativo
    pub fn load_native(
        spec: ModelSpec,
        weights_path: impl AsRef<Path>,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let tensors = candle_core::safetensors::load(weights_path, device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Self::new(spec, vb)
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Probabilidades por clase: [n, num_classes]
    pub fn predict_proba(&self, xs: &Tensor) -> Result<Tensor, ModelError> {
        let logits = self.forward(xs)?;
        Ok(candle_nn::ops::softmax(&logits, D::Minus1)?)
    }
}

impl Module for GestureMlp {
    /// Acepta [n, max_len, 6] o ya aplanado [n, max_len * 6]; devuelve logits
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = if xs.rank() > 2 {
            xs.flatten_from(1)?
        } else {
            xs.clone()
        };
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h)?;
            if i < last {
                h = h.relu()?;
            }
        }
        Ok(h)
    }
}
