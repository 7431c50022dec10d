use clap::Parser;

use presence_relay::relay::DEFAULT_PORT;
use presence_relay::{server, Relay, RelayConfig, SeenLookup};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "presence-relay", version, about = "Presence and message relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    port: u16,

    /// Browser origin allowed by CORS (e.g. "http://localhost:3000").
    /// Any origin is allowed when unset.
    #[arg(long, env = "CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Where seen receipts look up the message they refer to
    #[arg(long, value_enum, default_value_t = SeenLookup::Recipient, env = "SEEN_LOOKUP")]
    seen_lookup: SeenLookup,

    /// Do not replay buffered messages when a user comes back online
    #[arg(long, env = "NO_REPLAY")]
    no_replay: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            cors_origin: args.cors_origin,
            seen_lookup: args.seen_lookup,
            replay_on_connect: !args.no_replay,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "presence_relay=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = RelayConfig::from(args);
    tracing::info!(
        seen_lookup = ?config.seen_lookup,
        replay_on_connect = config.replay_on_connect,
        cors_origin = config.cors_origin.as_deref().unwrap_or("*"),
        "Relay configured"
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let app = server::router(Relay::new(config));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = addr.as_str(), error = %e, "Failed to bind address");
            std::process::exit(1);
        }
    };
    tracing::info!("Server is running on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["presence-relay"]).unwrap();
        let config = RelayConfig::from(args);
        assert_eq!(config.seen_lookup, SeenLookup::Recipient);
        assert!(config.replay_on_connect);
    }

    #[test]
    fn test_explicit_args() {
        let args = Args::try_parse_from([
            "presence-relay",
            "--port",
            "9000",
            "--seen-lookup",
            "sender-bucket",
            "--no-replay",
            "--cors-origin",
            "http://localhost:3000",
        ])
        .unwrap();
        let config = RelayConfig::from(args);
        assert_eq!(config.port, 9000);
        assert_eq!(config.seen_lookup, SeenLookup::SenderBucket);
        assert!(!config.replay_on_connect);
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:3000"));
    }
}
