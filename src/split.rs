//! Partición entrenamiento/prueba, tramo de validación y mini-batches.

use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Índices de cada partición sobre el conjunto completo de secuencias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Permutación con semilla; `ceil(n * test_fraction)` van a prueba.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    ensure!(
        test_fraction > 0.0 && test_fraction < 1.0,
        "test_fraction debe estar en (0, 1), recibido {}",
        test_fraction
    );
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    ensure!(
        n_test >= 1 && n_test < n,
        "Con {} secuencias y test_fraction={} alguna partición queda vacía",
        n,
        test_fraction
    );

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: indices,
    })
}

/// Separa el tramo final de `train` como validación, sin barajar.
/// Devuelve (ajuste, validación).
pub fn validation_tail(train: &[usize], fraction: f64) -> Result<(Vec<usize>, Vec<usize>)> {
    ensure!(
        (0.0..1.0).contains(&fraction),
        "validation_fraction debe estar en [0, 1), recibido {}",
        fraction
    );
    let split_at = (train.len() as f64 * (1.0 - fraction)) as usize;
    ensure!(split_at > 0, "No quedan secuencias para ajustar el modelo");
    Ok((train[..split_at].to_vec(), train[split_at..].to_vec()))
}

/// Copia las filas seleccionadas de un buffer plano [n * row_len]
pub fn gather_rows(flat: &[f32], row_len: usize, indices: &[usize]) -> Vec<f32> {
    let mut out = Vec::with_capacity(indices.len() * row_len);
    for &i in indices {
        out.extend_from_slice(&flat[i * row_len..(i + 1) * row_len]);
    }
    out
}

/// Mini-batches sobre tensores ya cargados. Rebaraja en cada época.
pub struct BatchIterator {
    inputs: Tensor,
    targets: Tensor,
    indices: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl BatchIterator {
    pub fn new(inputs: Tensor, targets: Tensor, batch_size: usize) -> Result<Self> {
        ensure!(batch_size > 0, "batch_size debe ser mayor que 0");
        let n = inputs.dim(0)?;
        Ok(Self {
            inputs,
            targets,
            indices: (0..n).collect(),
            batch_size,
            pos: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Nueva época: semilla derivada de la base + número de época
    pub fn reshuffle(&mut self, seed: u64, epoch: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
        self.indices.shuffle(&mut rng);
        self.pos = 0;
    }

    /// Siguiente mini-batch, o None al terminar la época
    pub fn next_batch(&mut self) -> Result<Option<(Tensor, Tensor)>> {
        let n = self.indices.len();
        if self.pos >= n {
            return Ok(None);
        }

        let end = (self.pos + self.batch_size).min(n);
        let batch_idx: Vec<u32> = self.indices[self.pos..end]
            .iter()
            .map(|&i| i as u32)
            .collect();
        self.pos = end;

        let device: Device = self.inputs.device().clone();
        let idx_tensor = Tensor::new(batch_idx.as_slice(), &device)?;
        let batch_inputs = self.inputs.index_select(&idx_tensor, 0)?;
        let batch_targets = self.targets.index_select(&idx_tensor, 0)?;
        Ok(Some((batch_inputs, batch_targets)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use std::collections::HashSet;

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let split = train_test_split(23, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 5); // ceil(23 * 0.2)
        assert_eq!(split.train.len() + split.test.len(), 23);

        let train: HashSet<usize> = split.train.iter().copied().collect();
        let test: HashSet<usize> = split.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.union(&test).count(), 23);
    }

    #[test]
    fn test_split_is_reproducible_with_seed() {
        let a = train_test_split(40, 0.2, 7).unwrap();
        let b = train_test_split(40, 0.2, 7).unwrap();
        let c = train_test_split(40, 0.2, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_rejects_degenerate_sizes() {
        assert!(train_test_split(1, 0.2, 42).is_err());
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
    }

    #[test]
    fn test_validation_tail_takes_last_rows_in_order() {
        let train: Vec<usize> = vec![9, 3, 5, 1, 7, 2, 8, 0, 4, 6];
        let (fit, val) = validation_tail(&train, 0.2).unwrap();
        assert_eq!(fit, vec![9, 3, 5, 1, 7, 2, 8, 0]);
        assert_eq!(val, vec![4, 6]);
    }

    #[test]
    fn test_validation_tail_can_be_empty() {
        let (fit, val) = validation_tail(&[1, 2, 3], 0.0).unwrap();
        assert_eq!(fit.len(), 3);
        assert!(val.is_empty());
    }

    #[test]
    fn test_gather_rows() {
        let flat = vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1];
        assert_eq!(gather_rows(&flat, 2, &[2, 0]), vec![2.0, 2.1, 0.0, 0.1]);
    }

    #[test]
    fn test_batch_iterator_exhausts() {
        let device = Device::Cpu;
        let inputs = Tensor::zeros((10, 4), DType::F32, &device).unwrap();
        let targets = Tensor::zeros((10, 2), DType::F32, &device).unwrap();

        let mut iter = BatchIterator::new(inputs, targets, 3).unwrap();
        iter.reshuffle(42, 0);

        let mut count = 0;
        let mut rows = 0;
        while let Some((x, y)) = iter.next_batch().unwrap() {
            assert_eq!(x.dim(0).unwrap(), y.dim(0).unwrap());
            rows += x.dim(0).unwrap();
            count += 1;
        }
        assert_eq!(count, 4); // ceil(10/3) = 4
        assert_eq!(rows, 10);
    }
}
