use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelEncoderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Etiqueta desconocida: '{0}' no estaba en el ajuste")]
    UnknownLabel(String),

    #[error("Índice de clase {index} fuera de rango (clases: {num_classes})")]
    UnknownIndex { index: usize, num_classes: usize },

    #[error("No se puede ajustar el codificador sin etiquetas")]
    Empty,

    #[error("Archivo de clases inválido: {0}")]
    InvalidMapping(String),
}

/// Formato en disco, compatible con classes.json
#[derive(Debug, Serialize, Deserialize)]
struct ClassesJson {
    index_to_class: BTreeMap<String, String>,
    #[serde(default)]
    class_to_index: BTreeMap<String, usize>,
}

/// Biyección etiqueta <-> índice. Las clases quedan ordenadas
/// alfabéticamente y el índice es su posición.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Ajusta el vocabulario con todas las etiquetas distintas
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self, LabelEncoderError> {
        let distinct: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        if distinct.is_empty() {
            return Err(LabelEncoderError::Empty);
        }
        Ok(Self::from_classes(
            distinct.into_iter().map(str::to_string).collect(),
        ))
    }

    fn from_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, index }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Result<usize, LabelEncoderError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| LabelEncoderError::UnknownLabel(label.to_string()))
    }

    pub fn decode(&self, index: usize) -> Result<&str, LabelEncoderError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(LabelEncoderError::UnknownIndex {
                index,
                num_classes: self.classes.len(),
            })
    }

    /// Codifica una lista completa; falla en la primera etiqueta desconocida
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, LabelEncoderError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Vectores one-hot aplanados en formato [fila * num_clases + clase]
    pub fn one_hot(&self, indices: &[usize]) -> Result<Vec<f32>, LabelEncoderError> {
        let k = self.classes.len();
        let mut flat = vec![0.0f32; indices.len() * k];
        for (row, &idx) in indices.iter().enumerate() {
            if idx >= k {
                return Err(LabelEncoderError::UnknownIndex {
                    index: idx,
                    num_classes: k,
                });
            }
            flat[row * k + idx] = 1.0;
        }
        Ok(flat)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LabelEncoderError> {
        let data = ClassesJson {
            index_to_class: self
                .classes
                .iter()
                .enumerate()
                .map(|(i, c)| (i.to_string(), c.clone()))
                .collect(),
            class_to_index: self
                .classes
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), i))
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&data)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelEncoderError> {
        let content = fs::read_to_string(path)?;
        let data: ClassesJson = serde_json::from_str(&content)?;

        let mut pairs: Vec<(usize, String)> = Vec::with_capacity(data.index_to_class.len());
        for (k, v) in data.index_to_class {
            let idx = k
                .parse::<usize>()
                .map_err(|_| LabelEncoderError::InvalidMapping(format!("índice '{}'", k)))?;
            pairs.push((idx, v));
        }
        if pairs.is_empty() {
            return Err(LabelEncoderError::Empty);
        }
        pairs.sort_by_key(|(idx, _)| *idx);

        for (expected, (idx, _)) in pairs.iter().enumerate() {
            if *idx != expected {
                return Err(LabelEncoderError::InvalidMapping(format!(
                    "índices no contiguos: falta {}",
                    expected
                )));
            }
        }

        let encoder = Self::from_classes(pairs.into_iter().map(|(_, name)| name).collect());
        if encoder.index.len() != encoder.classes.len() {
            return Err(LabelEncoderError::InvalidMapping(
                "clases repetidas".to_string(),
            ));
        }
        for (name, idx) in &data.class_to_index {
            if encoder.index.get(name) != Some(idx) {
                return Err(LabelEncoderError::InvalidMapping(format!(
                    "class_to_index no coincide para '{}'",
                    name
                )));
            }
        }
        Ok(encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fit_sorts_distinct_labels() {
        let enc = LabelEncoder::fit(&["wave", "circle", "wave", "punch"]).unwrap();
        assert_eq!(enc.classes(), &["circle", "punch", "wave"]);
    }

    #[test]
    fn test_encode_decode_is_bijective() {
        let enc = LabelEncoder::fit(&["wave", "circle", "punch"]).unwrap();
        for label in enc.classes() {
            let idx = enc.encode(label).unwrap();
            assert_eq!(enc.decode(idx).unwrap(), label.as_str());
        }
    }

    #[test]
    fn test_unknown_label_is_error() {
        let enc = LabelEncoder::fit(&["wave"]).unwrap();
        assert!(matches!(
            enc.encode("shake"),
            Err(LabelEncoderError::UnknownLabel(_))
        ));
        assert!(matches!(
            enc.decode(3),
            Err(LabelEncoderError::UnknownIndex { index: 3, .. })
        ));
    }

    #[test]
    fn test_one_hot_rows_sum_to_one() {
        let enc = LabelEncoder::fit(&["a", "b", "c"]).unwrap();
        let idx = enc.transform(&["c", "a", "b", "c"]).unwrap();
        let flat = enc.one_hot(&idx).unwrap();
        for row in flat.chunks(3) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
        assert_eq!(&flat[0..3], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_fit_empty_fails() {
        let labels: Vec<String> = Vec::new();
        assert!(matches!(
            LabelEncoder::fit(&labels),
            Err(LabelEncoderError::Empty)
        ));
    }

    #[test]
    fn test_save_load_keeps_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("label_encoder.json");
        let enc = LabelEncoder::fit(&["wave", "circle", "punch"]).unwrap();
        enc.save(&path).unwrap();
        let loaded = LabelEncoder::load(&path).unwrap();
        assert_eq!(loaded, enc);
    }

    #[test]
    fn test_load_rejects_gaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.json");
        fs::write(&path, r#"{"index_to_class": {"0": "a", "2": "b"}}"#).unwrap();
        assert!(matches!(
            LabelEncoder::load(&path),
            Err(LabelEncoderError::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_load_accepts_index_only_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.json");
        fs::write(
            &path,
            r#"{"index_to_class": {"1": "gesto-grab", "0": "gesto-drop"}}"#,
        )
        .unwrap();
        let enc = LabelEncoder::load(&path).unwrap();
        assert_eq!(enc.decode(1).unwrap(), "gesto-grab");
    }
}
