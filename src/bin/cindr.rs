/*!
 * cindr server entry point: parse the small CLI surface, build the shared
 * server state, and run the reactor until SHUTDOWN.
 */

use anyhow::{bail, Context, Result};
use cindr::config::Config;
use cindr::server::Server;
use std::net::ToSocketAddrs;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

struct Args {
    host: String,
    port: u16,
    databases: Option<String>,
    requirepass: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        host: "127.0.0.1".to_string(),
        port: 6379,
        databases: None,
        requirepass: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .with_context(|| format!("missing value for {}", name))
        };
        match arg.as_str() {
            "--host" => args.host = value("--host")?,
            "--port" => args.port = value("--port")?.parse().context("invalid --port")?,
            "--databases" => args.databases = Some(value("--databases")?),
            "--requirepass" => args.requirepass = Some(value("--requirepass")?),
            "--help" | "-h" => {
                println!("usage: cindr [--host HOST] [--port PORT] [--databases N] [--requirepass PASSWORD]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    // RUST_LOG=debug cindr ... for verbose logging
    env_logger::init();

    let args = parse_args()?;
    let config = Config::new();
    if let Some(n) = &args.databases {
        n.parse::<usize>().context("invalid --databases")?;
        config.seed("databases", n);
    }
    if let Some(pass) = &args.requirepass {
        config.seed("requirepass", pass);
    }

    let addr = format!("{}:{}", args.host, args.port)
        .to_socket_addrs()?
        .next()
        .context("could not resolve listen address")?;

    let server = Server::new(config);
    log::info!(
        "cindr {} starting with {} databases",
        env!("CARGO_PKG_VERSION"),
        server.db_count()
    );

    // blocks until SHUTDOWN; a clean return is exit code 0
    cindr::net::run_server(addr, server)
}
