//! # Allserver CLI Entry Point
//!
//! Calls procedures on any Allserver server from the command line and prints
//! the raw JSON envelope, so the output can be piped to `jq` and friends.
//!
//! ## Usage
//!
//! ```bash
//! # Call a procedure (resolved through introspection)
//! allserver call http://127.0.0.1:4000 sayHello -a '{"name": "world"}'
//!
//! # Call a gRPC server with a 5 second deadline
//! allserver call grpc://127.0.0.1:50051 sayHello --timeout 5000
//!
//! # Send custom headers to an HTTP server
//! allserver call https://api.example.com/rpc sayHello -H 'authorization: Bearer xyz'
//!
//! # List the server's procedures
//! allserver introspect http://127.0.0.1:4000
//! ```
//!
//! The process exits with status 1 when the returned envelope is a failure.
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::sync::Arc;
use std::time::Duration;

use allserver_client::transport::{ClientTransport, HttpClientTransport};
use allserver_client::{AllserverClient, ClientFactory, Envelope};
use anyhow::Result;
use argh::FromArgs;

#[derive(FromArgs)]
/// Allserver - call procedures over HTTP, gRPC and other transports
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Introspect(IntrospectArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a remote procedure
struct CallArgs {
    /// server URI, e.g. http://127.0.0.1:4000 or grpc://127.0.0.1:50051
    #[argh(positional)]
    uri: String,

    /// procedure name
    #[argh(positional)]
    procedure: String,

    /// JSON argument object
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// call timeout in milliseconds, 0 disables it
    #[argh(option, short = 't', long = "timeout", default = "0")]
    timeout_ms: u64,

    /// extra HTTP header as `name: value`, may be repeated
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "introspect")]
/// print the procedures a server exposes
struct IntrospectArgs {
    /// server URI
    #[argh(positional)]
    uri: String,

    /// introspection timeout in milliseconds, 0 disables it
    #[argh(option, short = 't', long = "timeout", default = "0")]
    timeout_ms: u64,

    /// extra HTTP header as `name: value`, may be repeated
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,
}

/// Splits a `name: value` header argument.
fn parse_header(header: &str) -> Result<(String, String)> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid header '{}': expected 'name: value'", header))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow::anyhow!("Invalid header '{}': empty name", header));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Builds a client factory carrying the command-line options.
///
/// Headers only apply to `http`/`https` URIs, so the HTTP transports are
/// re-registered to attach them.
fn factory(timeout_ms: u64, headers: &[String]) -> Result<ClientFactory> {
    let headers = headers
        .iter()
        .map(|header| parse_header(header))
        .collect::<Result<Vec<_>>>()?;

    let mut factory = ClientFactory::new().timeout(Duration::from_millis(timeout_ms));
    if !headers.is_empty() {
        let headers = Arc::new(headers);
        for scheme in ["http", "https"] {
            let headers = headers.clone();
            factory = factory.add_transport(scheme, move |uri| {
                let mut transport = HttpClientTransport::new(uri)?;
                for (name, value) in headers.iter() {
                    transport = transport.with_header(name, value)?;
                }
                Ok(Arc::new(transport) as Arc<dyn ClientTransport>)
            });
        }
    }
    Ok(factory)
}

/// Prints the envelope as a single line of JSON.
fn print(envelope: &Envelope) -> Result<()> {
    println!("{}", serde_json::to_string(&envelope.to_value())?);
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<bool> {
    let arg: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let client: AllserverClient = factory(args.timeout_ms, &args.headers)?.connect(&args.uri)?;
    tracing::debug!("Calling {} on {}", args.procedure, args.uri);

    let result = client.resolve_and_call(&args.procedure, arg).await?;
    print(&result)?;
    Ok(result.success)
}

async fn run_introspect(args: IntrospectArgs) -> Result<bool> {
    let client = factory(args.timeout_ms, &args.headers)?.connect(&args.uri)?;
    tracing::debug!("Introspecting {}", args.uri);

    let result = client.introspect().await?;
    print(&result)?;
    Ok(result.success)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so stdout stays pure JSON
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let success = match cli.command {
        Commands::Call(args) => run_call(args).await?,
        Commands::Introspect(args) => run_introspect(args).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_call() {
        let args: Cli =
            Cli::from_args(&["allserver"], &["call", "http://127.0.0.1:4000", "sayHello"]).unwrap();
        match args.command {
            Commands::Call(CallArgs { uri, procedure, args, timeout_ms, headers }) => {
                assert_eq!(uri, "http://127.0.0.1:4000");
                assert_eq!(procedure, "sayHello");
                assert_eq!(args, "{}"); // default
                assert_eq!(timeout_ms, 0);
                assert!(headers.is_empty());
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_call_with_options() {
        let args: Cli = Cli::from_args(
            &["allserver"],
            &[
                "call",
                "grpc://127.0.0.1:50051",
                "sayHello",
                "-a", r#"{"name": "Ann"}"#,
                "--timeout", "5000",
                "-H", "x-tenant: acme",
                "-H", "authorization: Bearer xyz",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Call(CallArgs { args, timeout_ms, headers, .. }) => {
                assert_eq!(args, r#"{"name": "Ann"}"#);
                assert_eq!(timeout_ms, 5000);
                assert_eq!(headers, vec!["x-tenant: acme", "authorization: Bearer xyz"]);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_introspect() {
        let args: Cli =
            Cli::from_args(&["allserver"], &["introspect", "http://127.0.0.1:4000"]).unwrap();
        match args.command {
            Commands::Introspect(IntrospectArgs { uri, timeout_ms, .. }) => {
                assert_eq!(uri, "http://127.0.0.1:4000");
                assert_eq!(timeout_ms, 0);
            }
            _ => panic!("Expected Introspect command"),
        }
    }

    #[test]
    fn test_cli_parse_call_missing_procedure() {
        assert!(Cli::from_args(&["allserver"], &["call", "http://127.0.0.1:4000"]).is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("authorization: Bearer a:b").unwrap(),
            ("authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_factory_rejects_bad_headers() {
        assert!(factory(0, &["broken".to_string()]).is_err());

        let factory = factory(1500, &[]).unwrap();
        assert_eq!(factory.options().timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_factory_unknown_scheme() {
        let factory = factory(0, &[]).unwrap();
        assert!(factory.connect("ftp://example.com").is_err());
        assert!(factory.connect("example.com").is_err());
    }
}
