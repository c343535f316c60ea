use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use watchparty::{Config, Registry, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Server port
  #[arg(short, long, env, default_value_t = 5000, value_parser = clap::value_parser!(u16).range(1025..))]
  port: u16,
}

fn init_tracing() {
  let default_level = if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO };
  let filter = EnvFilter::builder()
    .with_default_directive(default_level.into())
    .from_env_lossy()
    .add_directive("hyper=off".parse().unwrap())
    .add_directive("tungstenite=off".parse().unwrap());

  let builder = tracing_subscriber::fmt().with_env_filter(filter);
  if cfg!(debug_assertions) {
    builder.without_time().init();
  } else {
    builder.init();
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();
  let registry = Registry::new(Config::default());
  Server::new(args.port, registry).listen().await
}
