use chrono::TimeDelta;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use ttlfleet_controlplane::Authorizer;
use ttlfleetd::config::{Cli, Commands, TokenArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve(args) => ttlfleetd::server::run(args).await,
        Commands::Token(args) => issue_token(args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn issue_token(args: TokenArgs) -> anyhow::Result<()> {
    let authorizer = Authorizer::new(args.jwt_secret.as_bytes())?;
    let lifetime = TimeDelta::from_std(args.ttl)?;
    let token = authorizer.issue(&args.subject, &args.roles, lifetime)?;
    // stdout carries only the token so it can be captured by scripts
    println!("{}", token);
    Ok(())
}
