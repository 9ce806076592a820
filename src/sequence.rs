use std::collections::HashSet;

use anyhow::{ensure, Result};
use tracing::debug;

use crate::types::{
    GestureSequence, LabeledSequence, RawSession, SensorSample, Truncation, NUM_CHANNELS,
};

/// Elimina filas con los 6 canales repetidos dentro de una sesión,
/// conservando la primera aparición y el orden original.
pub fn dedup_samples(samples: &[SensorSample]) -> Vec<SensorSample> {
    let mut seen = HashSet::with_capacity(samples.len());
    samples
        .iter()
        .filter(|s| seen.insert(s.dedup_key()))
        .copied()
        .collect()
}

/// Ajusta la secuencia a exactamente `max_len` filas: rellena con ceros al
/// final o trunca según `truncation`.
pub fn pad_or_truncate(
    samples: &[SensorSample],
    max_len: usize,
    truncation: Truncation,
) -> GestureSequence {
    let kept: &[SensorSample] = if samples.len() > max_len {
        match truncation {
            Truncation::Post => &samples[..max_len],
            Truncation::Pre => &samples[samples.len() - max_len..],
        }
    } else {
        samples
    };

    let mut frames: GestureSequence = kept.iter().map(|s| s.channels).collect();
    frames.resize(max_len, [0.0; NUM_CHANNELS]);
    frames
}

/// Construye una secuencia etiquetada por sesión
pub fn build_sequences(
    sessions: &[RawSession],
    max_len: usize,
    truncation: Truncation,
) -> Result<Vec<LabeledSequence>> {
    ensure!(max_len > 0, "max_len debe ser mayor que 0");

    let mut sequences = Vec::with_capacity(sessions.len());
    for session in sessions {
        ensure!(
            !session.samples.is_empty(),
            "La sesión {} no tiene muestras",
            session.id
        );
        let unique = dedup_samples(&session.samples);
        if unique.len() != session.samples.len() {
            debug!(
                session = %session.id,
                removed = session.samples.len() - unique.len(),
                "filas duplicadas eliminadas"
            );
        }

        sequences.push(LabeledSequence {
            session: session.id.clone(),
            label: session.label.clone(),
            original_len: unique.len(),
            frames: pad_or_truncate(&unique, max_len, truncation),
        });
    }
    Ok(sequences)
}

/// Aplana todas las secuencias en un buffer [n * max_len * 6]
pub fn flatten_sequences(sequences: &[LabeledSequence]) -> Vec<f32> {
    let per_sequence = sequences.first().map(|s| s.frames.len()).unwrap_or(0) * NUM_CHANNELS;
    let mut flat = Vec::with_capacity(sequences.len() * per_sequence);
    for sequence in sequences {
        sequence.flatten_into(&mut flat);
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionKey;

    fn sample(v: f32) -> SensorSample {
        SensorSample::new([v, v + 1.0, v + 2.0, v + 3.0, v + 4.0, v + 5.0])
    }

    fn session(id: i64, values: &[f32]) -> RawSession {
        RawSession {
            id: SessionKey::Numeric(id),
            label: "wave".into(),
            samples: values.iter().map(|&v| sample(v)).collect(),
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_in_order() {
        let rows = vec![sample(3.0), sample(1.0), sample(3.0), sample(2.0), sample(1.0)];
        let unique = dedup_samples(&rows);
        let firsts: Vec<f32> = unique.iter().map(|s| s.channels[0]).collect();
        assert_eq!(firsts, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_dedup_ignores_timestamp() {
        let mut a = sample(1.0);
        a.timestamp = Some(0.0);
        let mut b = sample(1.0);
        b.timestamp = Some(1.0);
        assert_eq!(dedup_samples(&[a, b]).len(), 1);
    }

    #[test]
    fn test_short_sequence_is_zero_padded_after_samples() {
        let frames = pad_or_truncate(&[sample(1.0), sample(2.0)], 5, Truncation::Post);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0][0], 1.0);
        assert_eq!(frames[1][0], 2.0);
        for frame in &frames[2..] {
            assert_eq!(*frame, [0.0; NUM_CHANNELS]);
        }
    }

    #[test]
    fn test_long_sequence_keeps_leading_samples() {
        let rows: Vec<SensorSample> = (0..8).map(|i| sample(i as f32)).collect();
        let frames = pad_or_truncate(&rows, 3, Truncation::Post);
        let firsts: Vec<f32> = frames.iter().map(|f| f[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_pre_truncation_keeps_trailing_samples() {
        let rows: Vec<SensorSample> = (0..8).map(|i| sample(i as f32)).collect();
        let frames = pad_or_truncate(&rows, 3, Truncation::Pre);
        let firsts: Vec<f32> = frames.iter().map(|f| f[0]).collect();
        assert_eq!(firsts, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_every_sequence_has_fixed_shape() {
        let sessions = vec![
            session(1, &[1.0]),
            session(2, &(0..120).map(|i| i as f32).collect::<Vec<_>>()),
            session(3, &[1.0, 1.0, 1.0, 2.0]),
        ];
        let sequences = build_sequences(&sessions, 50, Truncation::Post).unwrap();
        assert_eq!(sequences.len(), 3);
        for seq in &sequences {
            assert_eq!(seq.frames.len(), 50);
            assert!(seq.frames.iter().all(|f| f.len() == NUM_CHANNELS));
        }
        assert_eq!(sequences[2].original_len, 2);
        assert_eq!(flatten_sequences(&sequences).len(), 3 * 50 * NUM_CHANNELS);
    }

    #[test]
    fn test_zero_max_len_is_rejected() {
        assert!(build_sequences(&[session(1, &[1.0])], 0, Truncation::Post).is_err());
    }

    #[test]
    fn test_empty_session_is_rejected() {
        let empty = RawSession {
            id: SessionKey::Numeric(7),
            label: "wave".into(),
            samples: Vec::new(),
        };
        assert!(build_sequences(&[empty], 10, Truncation::Post).is_err());
    }
}
