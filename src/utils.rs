use crate::constants::SERVICE_NAME;

pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

pub fn service_name() -> String {
    format!("{SERVICE_NAME}, version {}", env!("CARGO_PKG_VERSION"))
}
