use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use gesture_trainer::artifacts::{
    LABEL_ENCODER_FILE, MOBILE_MODEL_FILE, MODEL_SPEC_FILE, NATIVE_MODEL_FILE,
};
use gesture_trainer::converter::{convert_to_mobile, Precision};
use gesture_trainer::label_encoder::LabelEncoder;
use gesture_trainer::logging;
use gesture_trainer::model::ModelSpec;

#[derive(Parser, Debug)]
#[command(name = "convert_model", about = "Convierte el modelo entrenado al formato móvil")]
struct Cli {
    /// Pesos nativos (safetensors f32)
    #[arg(long, default_value = NATIVE_MODEL_FILE)]
    model: PathBuf,

    /// Contrato del modelo; por defecto el JSON junto a los pesos
    #[arg(long)]
    contract: Option<PathBuf>,

    /// Codificador para verificar las clases (opcional)
    #[arg(long)]
    encoder: Option<PathBuf>,

    #[arg(long, default_value = MOBILE_MODEL_FILE)]
    output: PathBuf,

    /// f16 | f32
    #[arg(long, default_value = "f16")]
    precision: Precision,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let contract = cli.contract.unwrap_or_else(|| {
        cli.model
            .parent()
            .map(|dir| dir.join(MODEL_SPEC_FILE))
            .unwrap_or_else(|| PathBuf::from(MODEL_SPEC_FILE))
    });
    let spec = ModelSpec::load(&contract)
        .with_context(|| format!("No se pudo leer el contrato {:?}", contract))?;

    let encoder = match &cli.encoder {
        Some(path) => Some(
            LabelEncoder::load(path)
                .with_context(|| format!("No se pudo leer el codificador {:?}", path))?,
        ),
        None => {
            let sibling = contract.with_file_name(LABEL_ENCODER_FILE);
            if sibling.exists() {
                Some(LabelEncoder::load(&sibling)?)
            } else {
                None
            }
        }
    };

    let report = convert_to_mobile(
        &cli.model,
        &spec,
        encoder.as_ref(),
        &cli.output,
        cli.precision,
    )
    .with_context(|| format!("Conversión de {:?} fallida", cli.model))?;

    println!(
        "✅ {} guardado ({} bytes, {}, entrada {:?}, {} clases)",
        report.output.display(),
        report.bytes,
        report.precision.as_str(),
        report.input_shape,
        report.num_classes
    );
    Ok(())
}
