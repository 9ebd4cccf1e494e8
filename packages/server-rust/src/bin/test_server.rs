//! Runnable gateway with an echo engine attached to each requested filter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use gabriel_core::{EngineResult, FromClient, ResultWrapper};
use gabriel_server::network::{ConnectionConfig, NetworkConfig, TlsConfig, DEFAULT_PORT};
use gabriel_server::{attach_engine, LocalEngineTransport, NetworkModule, Relay, RelayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Gabriel gateway with echo engines.
#[derive(Parser, Debug)]
#[command(name = "test-server", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "GABRIEL_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port clients connect to
    #[arg(short, long, env = "GABRIEL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Tokens each client gets per consumed filter
    #[arg(long, env = "GABRIEL_TOKENS_PER_FILTER", default_value_t = 2)]
    tokens: u32,

    /// Capacity of each engine input queue
    #[arg(long, env = "GABRIEL_INPUT_QUEUE_CAPACITY", default_value_t = 2)]
    input_queue: usize,

    /// Largest accepted client message, in bytes
    #[arg(long, env = "GABRIEL_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Filters to attach an echo engine to (comma-separated)
    #[arg(
        long = "filter",
        env = "GABRIEL_FILTERS",
        value_delimiter = ',',
        default_value = "echo"
    )]
    filters: Vec<String>,

    /// TLS certificate (PEM); requires --tls-key
    #[arg(long, env = "GABRIEL_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key (PEM); requires --tls-cert
    #[arg(long, env = "GABRIEL_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Seconds an HTTP request (including the upgrade) may take
    #[arg(long, env = "GABRIEL_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    #[arg(long, env = "GABRIEL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            connection: ConnectionConfig {
                max_message_size: self.max_message_size,
                ..ConnectionConfig::default()
            },
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            num_tokens_per_filter: self.tokens,
            input_queue_capacity: self.input_queue,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Returns every payload of the frame unchanged.
fn echo(input: FromClient) -> ResultWrapper {
    let results = input
        .payloads_for_frame
        .into_iter()
        .map(|payload| EngineResult {
            payload_type: input.payload_type,
            payload: payload.into_vec(),
        })
        .collect();
    ResultWrapper::success(input.frame_id, input.filter_passed, results)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let relay_config = args.relay_config();
    let network_config = args.network_config();

    let transport = Arc::new(LocalEngineTransport::from_config(&relay_config));
    let relay = Arc::new(Relay::new(
        relay_config,
        network_config.connection.clone(),
        Arc::clone(&transport) as Arc<dyn gabriel_server::EngineTransport>,
    ));

    for filter in args.filters.iter().filter(|f| !f.is_empty()) {
        attach_engine(&relay, &transport, filter, echo)?;
    }
    info!(filters = ?relay.filters_consumed(), "Echo engines attached");

    let mut module = NetworkModule::new(network_config, Arc::clone(&relay));
    module.start().await?;
    module
        .serve(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;

    transport.close();
    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use gabriel_core::{PayloadType, Status};
    use serde_bytes::ByteBuf;

    use super::*;

    #[test]
    fn echo_returns_payloads() {
        let mut input = FromClient::new(3, "echo", b"abc".to_vec());
        input.payloads_for_frame.push(ByteBuf::from(b"def".to_vec()));
        input.payload_type = PayloadType::TEXT;

        let result = echo(input);
        assert_eq!(result.status, Status::SUCCESS);
        assert_eq!(result.frame_id, 3);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[1].payload, b"def");
        assert_eq!(result.results[0].payload_type, PayloadType::TEXT);
    }

    #[test]
    fn filters_split_on_commas() {
        let args = Args::parse_from(["test-server", "--filter", "faces,ocr", "--tokens", "4"]);
        assert_eq!(args.filters, vec!["faces", "ocr"]);
        assert_eq!(args.relay_config().num_tokens_per_filter, 4);
        assert!(args.network_config().tls.is_none());
    }
}
