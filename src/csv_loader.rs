use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::types::{
    KeyScheme, RawSession, SensorSample, SessionKey, CHANNEL_COLUMNS, LABEL_COLUMN,
    NUM_CHANNELS, SESSION_COLUMN, TIMESTAMP_COLUMN,
};

/// Muestras agrupadas por sesión, en el orden en que aparecen en el archivo
pub type SessionSamples = BTreeMap<SessionKey, Vec<SensorSample>>;

/// Etiqueta de cada sesión
pub type SessionLabels = BTreeMap<SessionKey, String>;

fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| format!("Falta la columna '{}' en {:?}", name, path))
}

fn parse_f32(record: &StringRecord, idx: usize, column: &str, row: usize) -> Result<f32> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f32>()
        .with_context(|| format!("{} inválido '{}' en fila {}", column, raw, row))
}

fn open_csv(path: &Path) -> Result<(csv::Reader<std::fs::File>, StringRecord)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Cabecera inválida en {:?}", path))?
        .clone();
    Ok((reader, headers))
}

/// Filas del CSV de lecturas con el session_id tal cual (recortado)
fn read_sensor_rows(path: &Path) -> Result<Vec<(String, SensorSample)>> {
    let (mut reader, headers) = open_csv(path)?;
    let session_idx = column_index(&headers, SESSION_COLUMN, path)?;
    let mut channel_idx = [0usize; NUM_CHANNELS];
    for (slot, name) in channel_idx.iter_mut().zip(CHANNEL_COLUMNS.iter()) {
        *slot = column_index(&headers, name, path)?;
    }
    let timestamp_idx = headers.iter().position(|h| h.trim() == TIMESTAMP_COLUMN);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row, path))?;

        let session_raw = record.get(session_idx).unwrap_or("").trim();
        if session_raw.is_empty() {
            bail!("session_id vacío en fila {} de {:?}", row, path);
        }

        let mut sample = SensorSample::default();
        for (c, &idx) in channel_idx.iter().enumerate() {
            sample.channels[c] = parse_f32(&record, idx, CHANNEL_COLUMNS[c], row)?;
        }
        if let Some(idx) = timestamp_idx {
            let raw = record.get(idx).unwrap_or("").trim();
            if !raw.is_empty() {
                sample.timestamp = Some(
                    raw.parse::<f64>()
                        .with_context(|| format!("timestamp inválido en fila {}", row))?,
                );
            }
        }
        rows.push((session_raw.to_string(), sample));
    }

    ensure!(!rows.is_empty(), "El CSV {:?} no contiene datos", path);
    Ok(rows)
}

/// Filas (session_id, label) del CSV de etiquetas en orden de archivo
fn read_label_rows(path: &Path) -> Result<Vec<(String, String)>> {
    let (mut reader, headers) = open_csv(path)?;
    let session_idx = column_index(&headers, SESSION_COLUMN, path)?;
    let label_idx = column_index(&headers, LABEL_COLUMN, path)?;

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row, path))?;
        let session_raw = record.get(session_idx).unwrap_or("").trim();
        let label = record.get(label_idx).unwrap_or("").trim();
        if session_raw.is_empty() {
            bail!("session_id vacío en fila {} de {:?}", row, path);
        }
        if label.is_empty() {
            bail!("Etiqueta vacía en fila {} de {:?}", row, path);
        }
        rows.push((session_raw.to_string(), label.to_string()));
    }

    ensure!(!rows.is_empty(), "El CSV {:?} no contiene etiquetas", path);
    Ok(rows)
}

fn session_key(raw: &str, scheme: KeyScheme) -> Result<SessionKey> {
    SessionKey::from_raw(raw, scheme)
        .with_context(|| format!("session_id '{}' no es entero", raw))
}

fn group_samples(rows: Vec<(String, SensorSample)>, scheme: KeyScheme) -> Result<SessionSamples> {
    let total = rows.len();
    let mut sessions: SessionSamples = BTreeMap::new();
    for (raw, sample) in rows {
        sessions
            .entry(session_key(&raw, scheme)?)
            .or_default()
            .push(sample);
    }
    debug!(rows = total, sessions = sessions.len(), "lecturas agrupadas");
    Ok(sessions)
}

/// Si una sesión aparece varias veces se queda la primera etiqueta
fn group_labels(rows: Vec<(String, String)>, scheme: KeyScheme) -> Result<SessionLabels> {
    let mut labels = BTreeMap::new();
    for (raw, label) in rows {
        match labels.entry(session_key(&raw, scheme)?) {
            Entry::Vacant(slot) => {
                slot.insert(label);
            }
            Entry::Occupied(slot) => {
                if *slot.get() != label {
                    warn!(
                        session = %slot.key(),
                        kept = %slot.get(),
                        ignored = %label,
                        "sesión con etiquetas contradictorias"
                    );
                }
            }
        }
    }
    Ok(labels)
}

/// Carga el CSV de lecturas con columnas session_id,ax,ay,az,gx,gy,gz
/// (timestamp opcional) y agrupa las filas por sesión.
pub fn load_sensor_samples(path: impl AsRef<Path>) -> Result<SessionSamples> {
    let rows = read_sensor_rows(path.as_ref())?;
    let scheme = KeyScheme::detect(rows.iter().map(|(id, _)| id.as_str()));
    group_samples(rows, scheme)
}

/// Carga el CSV session_id,label. Si una sesión aparece varias veces se
/// queda la primera etiqueta.
pub fn load_session_labels(path: impl AsRef<Path>) -> Result<SessionLabels> {
    let rows = read_label_rows(path.as_ref())?;
    let scheme = KeyScheme::detect(rows.iter().map(|(id, _)| id.as_str()));
    group_labels(rows, scheme)
}

/// Carga lecturas y etiquetas con un único esquema de claves para ambos
/// archivos: numérico sólo si todos los ids de los dos son enteros.
pub fn load_labeled_samples(
    data_path: impl AsRef<Path>,
    labels_path: impl AsRef<Path>,
) -> Result<(SessionSamples, SessionLabels)> {
    let sample_rows = read_sensor_rows(data_path.as_ref())?;
    let label_rows = read_label_rows(labels_path.as_ref())?;
    let scheme = KeyScheme::detect(
        sample_rows
            .iter()
            .map(|(id, _)| id.as_str())
            .chain(label_rows.iter().map(|(id, _)| id.as_str())),
    );
    debug!(?scheme, "esquema de session_id");
    Ok((
        group_samples(sample_rows, scheme)?,
        group_labels(label_rows, scheme)?,
    ))
}

/// Join interno por session_id. Las sesiones sin etiqueta y las etiquetas
/// sin lecturas se descartan.
pub fn merge_sessions(
    samples: SessionSamples,
    labels: &SessionLabels,
) -> Result<Vec<RawSession>> {
    let mut merged = Vec::with_capacity(samples.len());
    let mut unlabeled = 0usize;

    for (id, rows) in samples {
        match labels.get(&id) {
            Some(label) => merged.push(RawSession {
                id,
                label: label.clone(),
                samples: rows,
            }),
            None => {
                debug!(session = %id, "sesión sin etiqueta, descartada");
                unlabeled += 1;
            }
        }
    }

    if unlabeled > 0 {
        warn!(unlabeled, "sesiones sin etiqueta descartadas en el join");
    }
    let orphan_labels = labels.len().saturating_sub(merged.len());
    if orphan_labels > 0 {
        warn!(orphan_labels, "etiquetas sin lecturas descartadas en el join");
    }

    ensure!(
        !merged.is_empty(),
        "Ninguna sesión coincide entre lecturas y etiquetas"
    );
    Ok(merged)
}

/// Carga ambos CSV y devuelve las sesiones unidas, ordenadas por id
pub fn load_sessions(
    data_path: impl AsRef<Path>,
    labels_path: impl AsRef<Path>,
) -> Result<Vec<RawSession>> {
    let (samples, labels) = load_labeled_samples(data_path, labels_path)?;
    let sessions = merge_sessions(samples, &labels)?;
    info!(sessions = sessions.len(), "sesiones unidas con su etiqueta");
    Ok(sessions)
}
