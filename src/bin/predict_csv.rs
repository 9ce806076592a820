use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gesture_trainer::artifacts::{LABEL_ENCODER_FILE, MOBILE_MODEL_FILE};
use gesture_trainer::classifier::GestureClassifier;
use gesture_trainer::csv_loader::{load_labeled_samples, load_sensor_samples};
use gesture_trainer::logging;
use gesture_trainer::types::Truncation;

#[derive(Parser, Debug)]
#[command(name = "predict_csv", about = "Clasifica cada sesión de un CSV de lecturas")]
struct Cli {
    #[arg(long, default_value = MOBILE_MODEL_FILE)]
    model: PathBuf,

    #[arg(long, default_value = LABEL_ENCODER_FILE)]
    classes: PathBuf,

    /// CSV de lecturas: session_id, ax, ay, az, gx, gy, gz
    #[arg(long)]
    data: PathBuf,

    /// CSV de etiquetas para calcular exactitud (opcional)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// post | pre; por defecto el truncado registrado en el modelo
    #[arg(long)]
    truncation: Option<Truncation>,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let classifier = GestureClassifier::new(&cli.model, &cli.classes)?;
    let (sessions, truth) = match &cli.labels {
        Some(path) => {
            let (sessions, labels) = load_labeled_samples(&cli.data, path)?;
            (sessions, Some(labels))
        }
        None => (load_sensor_samples(&cli.data)?, None),
    };
    let truncation = cli.truncation.unwrap_or_else(|| classifier.truncation());

    println!("🎞️  Clasificando {} sesiones de {:?}", sessions.len(), cli.data);

    let mut hits = 0usize;
    let mut compared = 0usize;
    for (session, samples) in &sessions {
        let sequence = classifier.prepare(samples, Some(truncation));

        let (best_label, best_conf) = classifier.predict_single(&sequence)?;

        let expected = truth.as_ref().and_then(|t| t.get(session));
        match expected {
            Some(label) => {
                // una etiqueta real fuera del codificador no se puede comparar
                classifier.encoder().encode(label)?;
                compared += 1;
                let ok = *label == best_label;
                if ok {
                    hits += 1;
                }
                println!(
                    "  {:>8} {:<20} {:>6.2}%  real={} {}",
                    session.to_string(),
                    best_label,
                    best_conf * 100.0,
                    label,
                    if ok { "✓" } else { "✗" }
                );
            }
            None => println!(
                "  {:>8} {:<20} {:>6.2}%",
                session.to_string(),
                best_label,
                best_conf * 100.0
            ),
        }
    }

    if compared > 0 {
        println!(
            "\nExactitud: {}/{} ({:.2}%)",
            hits,
            compared,
            hits as f64 / compared as f64 * 100.0
        );
    }
    Ok(())
}
