use tracing_subscriber::EnvFilter;

/// Suscriptor de consola; `RUST_LOG` manda, por defecto `info`.
/// Llamar una sola vez al arrancar cada binario.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // try_init: los tests pueden llamarlo varias veces en el mismo proceso
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
