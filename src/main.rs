//! fakeredis - interactive shell
//!
//! Runs an in-process server and reads commands from stdin, one per line,
//! printing each reply redis-cli style. Arguments are split on whitespace.

use fakeredis::{start_expiry_sweeper, Server, ServerConfig, Session};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Shell configuration
struct Config {
    /// Number of databases
    databases: usize,
    /// Whether to run the background expiry sweeper
    sweep: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            databases: fakeredis::config::DEFAULT_DATABASES,
            sweep: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--databases" | "-d" => {
                    if i + 1 < args.len() {
                        config.databases = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid database count");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --databases requires a value");
                        std::process::exit(1);
                    }
                }
                "--sweep" => {
                    config.sweep = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("fakeredis version {}", fakeredis::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

fn print_help() {
    println!(
        r#"
fakeredis - in-process Redis test double, interactive shell

USAGE:
    fakeredis [OPTIONS]

OPTIONS:
    -d, --databases <N>  Number of databases (default: 16)
        --sweep          Run the background expiry sweeper
    -v, --version        Print version information
    -h, --help           Print this help message

EXAMPLE:
    $ fakeredis
    > SET name alice
    OK
    > GET name
    "alice"

Type QUIT or press Ctrl+D to leave. Set RUST_LOG=debug to see engine logs.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Logs go to stderr so they never interleave with replies
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let server = Arc::new(Server::new(ServerConfig::with_databases(config.databases)));
    let _sweeper = config.sweep.then(|| start_expiry_sweeper(Arc::clone(&server)));
    let session = Session::connect(Arc::clone(&server))?;
    info!(databases = config.databases, "Shell started");

    tokio::select! {
        result = repl(session) => result?,
        _ = signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    Ok(())
}

/// Reads commands until end of input or QUIT.
async fn repl(mut session: Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let args: Vec<String> = parts.map(str::to_string).collect();
        let output = match session.execute_async(name, args).await {
            Ok(reply) => reply.to_string(),
            Err(err) => format!("(error) {}", err),
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;

        // pub/sub messages that arrived meanwhile
        while let Some(message) = session.try_recv_message() {
            stdout.write_all(message.to_reply().to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
    }

    Ok(())
}
