use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use sweeps_simulator::{Api, Simulator};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Seed for game outcomes
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Username of a demo account to create at start-up
    #[arg(long, default_value = "demo")]
    demo_user: String,

    #[arg(long, default_value_t = 10_000.0)]
    demo_gc: f64,

    #[arg(long, default_value_t = 25.0)]
    demo_sc: f64,

    /// Comma-separated words rejected by chat moderation
    #[arg(long, value_delimiter = ',')]
    banned_words: Vec<String>,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let simulator = Arc::new(Simulator::new(args.seed));
    simulator.set_banned_words(args.banned_words);
    let (profile, token) = simulator.register_user(&args.demo_user, args.demo_gc, args.demo_sc);
    info!(user = profile.id, username = %profile.username, %token, "demo account ready");

    let api = Api::new(simulator);
    let app = api.router();

    // Start server
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
