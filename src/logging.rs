// 📜 Logging - tracing subscriber setup for the binaries
//
// Library code only emits tracing events; installing a subscriber is left to
// whoever owns the process. RUST_LOG, when set, wins over the configured level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

pub fn init_tracing(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    // Events go to stderr so command output on stdout stays machine-readable
    let (json_layer, text_layer) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    Ok(())
}
