//! Métricas de evaluación: exactitud, reporte por clase y matriz de confusión.
//!
//! Todo se calcula sobre índices de clase ya decodificados; no toca el modelo.

use std::fmt;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Serialize;

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Filas = clase real, columnas = clase predicha
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(
        actual: &[usize],
        predicted: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        ensure!(
            actual.len() == predicted.len(),
            "actual ({}) y predicted ({}) deben tener la misma longitud",
            actual.len(),
            predicted.len()
        );
        let mut counts = vec![vec![0usize; num_classes]; num_classes];
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            ensure!(
                a < num_classes && p < num_classes,
                "Índice de clase fuera de rango ({}, {}) con {} clases",
                a,
                p,
                num_classes
            );
            counts[a][p] += 1;
        }
        Ok(Self { counts })
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|row| row.iter().sum::<usize>()).sum()
    }

    fn row_sum(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    fn col_sum(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Tabla de texto con etiquetas en filas (real) y columnas (predicho)
    pub fn render(&self, classes: &[String]) -> String {
        let name_width = classes
            .iter()
            .map(|c| c.chars().count())
            .max()
            .unwrap_or(0)
            .max("real \\ pred".len());
        let cell_width = classes
            .iter()
            .map(|c| c.chars().count())
            .chain(std::iter::once(self.total().to_string().len()))
            .max()
            .unwrap_or(1)
            .max(3);

        let mut out = format!("{:>width$}", "real \\ pred", width = name_width);
        for class in classes {
            out.push_str(&format!(" {:>width$}", class, width = cell_width));
        }
        out.push('\n');
        for (i, row) in self.counts.iter().enumerate() {
            let name = classes.get(i).map(String::as_str).unwrap_or("?");
            out.push_str(&format!("{:>width$}", name, width = name_width));
            for count in row {
                out.push_str(&format!(" {:>width$}", count, width = cell_width));
            }
            out.push('\n');
        }
        out
    }

    /// Exporta la matriz como CSV con cabecera de clases predichas
    pub fn write_csv(&self, path: impl AsRef<Path>, classes: &[String]) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("No se pudo crear {:?}", path))?;
        let mut header = vec!["actual".to_string()];
        header.extend(classes.iter().cloned());
        writer.write_record(&header)?;
        for (i, row) in self.counts.iter().enumerate() {
            let mut record = vec![classes.get(i).cloned().unwrap_or_default()];
            record.extend(row.iter().map(|c| c.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Métricas de una clase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Reporte por clase con exactitud y promedios macro/ponderado
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Incluye todas las clases del codificador aunque no aparezcan en prueba.
    /// Divisiones por cero valen 0.
    pub fn from_confusion(matrix: &ConfusionMatrix, labels: &[String]) -> Result<Self> {
        ensure!(
            matrix.num_classes() == labels.len(),
            "La matriz tiene {} clases y hay {} nombres",
            matrix.num_classes(),
            labels.len()
        );

        let mut classes = Vec::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            let tp = matrix.counts[i][i];
            let precision = ratio(tp, matrix.col_sum(i));
            let recall = ratio(tp, matrix.row_sum(i));
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            classes.push(ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1,
                support: matrix.row_sum(i),
            });
        }

        let total = matrix.total();
        let correct: usize = (0..matrix.num_classes()).map(|i| matrix.counts[i][i]).sum();
        let k = classes.len().max(1) as f64;

        let macro_avg = ClassMetrics {
            label: "macro avg".into(),
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| f(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            label: "weighted avg".into(),
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Ok(Self {
            accuracy: ratio(correct, total),
            classes,
            macro_avg,
            weighted_avg,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.chars().count())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;

        for class in &self.classes {
            write_row(f, class, width)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width
        )?;
        write_row(f, &self.macro_avg, width)?;
        write_row(f, &self.weighted_avg, width)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, m: &ClassMetrics, width: usize) -> fmt::Result {
    writeln!(
        f,
        "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
        m.label,
        m.precision,
        m.recall,
        m.f1,
        m.support,
        width = width
    )
}
