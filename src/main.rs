//! flashkv-cli - One-Shot Command-Line Client
//!
//! Connects, runs a single command, prints the reply and exits.
//!
//! ```text
//! $ flashkv-cli -p 6379 SET name Ariz
//! OK
//! $ flashkv-cli GET name
//! "Ariz"
//! ```

use anyhow::{bail, Context};
use flashkv_client::{ClientConfig, ClientError, Command, Connection, ReplyKind};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line configuration
#[derive(Debug)]
struct Config {
    /// Connection settings
    client: ClientConfig,
    /// Log at debug level
    verbose: bool,
    /// Command name followed by its arguments
    words: Vec<String>,
}

/// What the command line asked for
#[derive(Debug)]
enum Action {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();

        match parse_args(&args) {
            Ok(Action::Run(config)) => config,
            Ok(Action::Help) => {
                print_help();
                std::process::exit(0);
            }
            Ok(Action::Version) => {
                println!("flashkv-cli version {}", flashkv_client::VERSION);
                std::process::exit(0);
            }
            Err(message) => {
                eprintln!("Error: {}", message);
                print_help();
                std::process::exit(1);
            }
        }
    }
}

fn parse_args(args: &[String]) -> Result<Action, String> {
    let mut builder = ClientConfig::builder();
    let mut verbose = false;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--host" | "-h" => {
                let host = value.ok_or("--host requires a value")?;
                builder = builder.host(host.as_str());
                i += 2;
            }
            "--port" | "-p" => {
                let port = value
                    .ok_or("--port requires a value")?
                    .parse::<u16>()
                    .map_err(|_| "invalid port number".to_string())?;
                builder = builder.port(port);
                i += 2;
            }
            "--timeout" | "-t" => {
                let ms = value
                    .ok_or("--timeout requires a value")?
                    .parse::<u64>()
                    .map_err(|_| "invalid timeout".to_string())?;
                builder = builder.timeout(Duration::from_millis(ms));
                i += 2;
            }
            "--verbose" | "-v" => {
                verbose = true;
                i += 1;
            }
            "--help" => return Ok(Action::Help),
            "--version" => return Ok(Action::Version),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown argument: {}", flag));
            }
            _ => break,
        }
    }

    let words = args[i..].to_vec();
    if words.is_empty() {
        return Err("no command given".to_string());
    }

    Ok(Action::Run(Config {
        client: builder.build(),
        verbose,
        words,
    }))
}

/// Reply kind a command answers with.
fn expected_kind(name: &str) -> Option<ReplyKind> {
    let kind = match name {
        "PING" | "SET" | "RENAME" | "TYPE" | "LSET" | "SELECT" | "FLUSHDB" | "FLUSHALL"
        | "SAVE" | "BGSAVE" | "SHUTDOWN" | "SLAVEOF" => ReplyKind::Status,
        "INCR" | "DECR" | "INCRBY" | "DECRBY" | "SETNX" | "EXISTS" | "DEL" | "RENAMENX"
        | "DBSIZE" | "EXPIRE" | "TTL" | "LPUSH" | "RPUSH" | "LLEN" | "LREM" | "MOVE"
        | "LASTSAVE" => ReplyKind::Integer,
        "GET" | "GETSET" | "RANDOMKEY" | "LINDEX" | "LPOP" | "RPOP" | "INFO" | "ECHO" => {
            ReplyKind::Bulk
        }
        "MGET" | "KEYS" | "LRANGE" | "SORT" => ReplyKind::MultiBulk,
        _ => return None,
    };
    Some(kind)
}

/// Builds the command, sending the stored value of value-taking commands
/// as a bulk value so it may contain spaces.
fn build_command(name: &str, args: &[String]) -> Command {
    let takes_value = matches!(
        name,
        "SET" | "GETSET" | "SETNX" | "LPUSH" | "RPUSH" | "LSET" | "LREM"
    );
    match args.split_last() {
        Some((value, inline)) if takes_value && !inline.is_empty() => inline
            .iter()
            .fold(Command::new(name), |command, word| command.arg(word))
            .value(value),
        _ => args
            .iter()
            .fold(Command::new(name), |command, word| command.arg(word)),
    }
}

fn print_help() {
    println!(
        r#"
flashkv-cli - Command-line client for FlashKV

USAGE:
    flashkv-cli [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>      Server host (default: 127.0.0.1)
    -p, --port <PORT>      Server port (default: 6379)
    -t, --timeout <MS>     Send/receive timeout in milliseconds (default: 2000)
    -v, --verbose          Log each command cycle to stderr
        --help             Print this help message
        --version          Print version information

EXAMPLES:
    flashkv-cli PING
    flashkv-cli SET name Ariz
    flashkv-cli SET greeting "hello world"
    flashkv-cli -p 6380 LRANGE mylist 0 -1
"#
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging on stderr so replies stay alone on stdout
    let level = if config.verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let name = config.words[0].to_uppercase();
    let Some(expected) = expected_kind(&name) else {
        bail!("unknown command '{}'", config.words[0]);
    };
    let command = build_command(&name, &config.words[1..]);

    let mut conn = Connection::connect(&config.client)
        .with_context(|| format!("could not connect to {}", config.client.address()))?;
    debug!(%command, %expected, "Sending command");

    match conn.execute(expected, &command) {
        Ok(reply) => println!("{}", reply.into_owned()),
        Err(e) => match e.server_message() {
            Some(message) => println!("(error) {}", message),
            None if name == "SHUTDOWN" && matches!(e, ClientError::PeerClosed) => {}
            None => return Err(e).with_context(|| format!("{} failed", name)),
        },
    }

    conn.close()?;
    Ok(())
}
