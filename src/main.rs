use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gator::app::AppContext;
use gator::cli::{commands, Cli, Commands};
use gator::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gator=info")))
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    let mut ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Register { name } => {
            commands::register(&mut ctx, &name)?;
        }
        Commands::Login { name } => {
            commands::login(&mut ctx, &name)?;
        }
        Commands::Users => {
            commands::list_users(&ctx)?;
        }
        Commands::Reset => {
            commands::reset(&ctx)?;
        }
        Commands::AddFeed { name, url } => {
            commands::add_feed(&ctx, &name, &url)?;
        }
        Commands::Feeds => {
            commands::list_feeds(&ctx)?;
        }
        Commands::Follow { url } => {
            commands::follow(&ctx, &url)?;
        }
        Commands::Unfollow { url } => {
            commands::unfollow(&ctx, &url)?;
        }
        Commands::Following => {
            commands::list_following(&ctx)?;
        }
        Commands::Browse { limit } => {
            commands::browse(&ctx, limit)?;
        }
        Commands::Poll { interval } => {
            commands::poll(&ctx, interval.as_deref()).await?;
        }
    }

    Ok(())
}
