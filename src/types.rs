use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canales de una muestra IMU: [ax, ay, az, gx, gy, gz]
pub type SensorChannels = [f32; NUM_CHANNELS];

/// Secuencia de muestras ya lista para la red: [max_len x 6]
pub type GestureSequence = Vec<SensorChannels>;

/// Constantes del sistema
pub const NUM_CHANNELS: usize = 6; // ax, ay, az, gx, gy, gz
pub const DEFAULT_MAX_LEN: usize = 50;
pub const SESSION_COLUMN: &str = "session_id";
pub const LABEL_COLUMN: &str = "label";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const CHANNEL_COLUMNS: [&str; NUM_CHANNELS] = ["ax", "ay", "az", "gx", "gy", "gz"];

/// Una lectura del sensor: aceleración en 3 ejes + velocidad angular en 3 ejes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSample {
    /// Valor de la columna `timestamp` si el CSV la trae
    pub timestamp: Option<f64>,
    pub channels: SensorChannels,
}

impl SensorSample {
    pub fn new(channels: SensorChannels) -> Self {
        Self {
            timestamp: None,
            channels,
        }
    }

    /// Clave de deduplicación: bits de los 6 canales, con -0.0 normalizado a 0.0
    pub fn dedup_key(&self) -> [u32; NUM_CHANNELS] {
        let mut key = [0u32; NUM_CHANNELS];
        for (slot, value) in key.iter_mut().zip(self.channels.iter()) {
            let v = if *value == 0.0 { 0.0f32 } else { *value };
            *slot = v.to_bits();
        }
        key
    }
}

/// Interpretación de los session_id de una carga. Se decide una sola vez
/// sobre todos los ids: numérica si todos son enteros, textual si no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    Numeric,
    Text,
}

impl KeyScheme {
    pub fn detect<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        if ids.into_iter().all(|id| id.trim().parse::<i64>().is_ok()) {
            KeyScheme::Numeric
        } else {
            KeyScheme::Text
        }
    }
}

/// Identificador de sesión. Todas las claves de una carga comparten esquema,
/// así que el orden es numérico o lexicográfico, nunca mezclado.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Numeric(i64),
    Text(String),
}

impl SessionKey {
    /// None si el esquema es numérico y el id no es entero
    pub fn from_raw(raw: &str, scheme: KeyScheme) -> Option<Self> {
        let trimmed = raw.trim();
        match scheme {
            KeyScheme::Numeric => trimmed.parse::<i64>().ok().map(SessionKey::Numeric),
            KeyScheme::Text => Some(SessionKey::Text(trimmed.to_string())),
        }
    }
}

impl Ord for SessionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SessionKey::Numeric(a), SessionKey::Numeric(b)) => a.cmp(b),
            (SessionKey::Numeric(_), SessionKey::Text(_)) => Ordering::Less,
            (SessionKey::Text(_), SessionKey::Numeric(_)) => Ordering::Greater,
            (SessionKey::Text(a), SessionKey::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SessionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Numeric(n) => write!(f, "{}", n),
            SessionKey::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Sesión cruda tras el join: todas sus filas en orden de archivo + etiqueta
#[derive(Debug, Clone)]
pub struct RawSession {
    pub id: SessionKey,
    pub label: String,
    pub samples: Vec<SensorSample>,
}

/// Sesión ya deduplicada y ajustada a longitud fija
#[derive(Debug, Clone)]
pub struct LabeledSequence {
    pub session: SessionKey,
    pub label: String,
    /// Número de muestras reales antes de rellenar/truncar
    pub original_len: usize,
    pub frames: GestureSequence,
}

impl LabeledSequence {
    /// Aplana la secuencia en formato [t * 6 + canal]
    pub fn flatten_into(&self, output: &mut Vec<f32>) {
        for frame in &self.frames {
            output.extend_from_slice(frame);
        }
    }
}

/// Política de truncado para secuencias más largas que `max_len`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    /// Conserva las primeras muestras y descarta las finales
    #[default]
    Post,
    /// Conserva las últimas muestras
    Pre,
}

impl std::str::FromStr for Truncation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "post" => Ok(Truncation::Post),
            "pre" => Ok(Truncation::Pre),
            other => Err(format!("Truncado desconocido '{}' (usa post|pre)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_sessions_sort_numerically() {
        let ids = ["10", "2", "1"];
        let scheme = KeyScheme::detect(ids);
        assert_eq!(scheme, KeyScheme::Numeric);
        let mut keys: Vec<SessionKey> = ids
            .iter()
            .map(|id| SessionKey::from_raw(id, scheme).unwrap())
            .collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SessionKey::Numeric(1),
                SessionKey::Numeric(2),
                SessionKey::Numeric(10)
            ]
        );
    }

    #[test]
    fn test_one_text_id_makes_every_key_text() {
        let ids = ["07", "7", "a", "10"];
        let scheme = KeyScheme::detect(ids);
        assert_eq!(scheme, KeyScheme::Text);
        let mut keys: Vec<SessionKey> = ids
            .iter()
            .map(|id| SessionKey::from_raw(id, scheme).unwrap())
            .collect();
        keys.sort();
        let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["07", "10", "7", "a"]);
    }

    #[test]
    fn test_numeric_scheme_rejects_text_id() {
        assert!(SessionKey::from_raw("a", KeyScheme::Numeric).is_none());
    }

    #[test]
    fn test_negative_zero_shares_dedup_key() {
        let a = SensorSample::new([0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = SensorSample::new([-0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_truncation_from_str() {
        assert_eq!("PRE".parse::<Truncation>().unwrap(), Truncation::Pre);
        assert!("middle".parse::<Truncation>().is_err());
    }
}
