use clap::Parser;
use meshcache::cli::{commands, Cli, Commands};
use meshcache::types::config::Config;
use meshcache::MeshCacheResult;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> MeshCacheResult<()> {
    let cli = Cli::parse();

    // Configuração é carregada antes do logging para usar o nível definido nela.
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    // Flags da CLI têm precedência sobre a config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let directive: Directive = format!("meshcache={}", log_level)
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::from_default_env().add_directive(directive);
    let registry = tracing_subscriber::registry().with(filter);

    if config.general.log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::debug!(
        config = ?cli.config,
        cache_dir = %config.cache.dir.display(),
        "Configuration loaded"
    );

    let json = cli.json;
    match cli.command {
        Commands::Init { path } => commands::init(path)?,
        Commands::Generate { input, output_dir } => {
            commands::generate(&input, output_dir, &config, json).await?
        }
        Commands::Lookup { input } => commands::lookup(&input, &config, json)?,
        Commands::Store {
            input,
            artifact,
            quality,
            cost,
        } => commands::store(&input, &artifact, quality, cost, &config, json)?,
        Commands::Evaluate {
            artifact,
            input,
            request_id,
        } => commands::evaluate(&artifact, &input, request_id.as_deref(), &config, json)?,
        Commands::Feedback {
            request_id,
            rating,
            text,
            categories,
        } => commands::feedback(&request_id, rating, &text, &categories, &config)?,
        Commands::Stats => commands::stats(&config, json)?,
        Commands::Report => commands::report(&config, json)?,
        Commands::Evict {
            max_age_days,
            max_size_gb,
        } => commands::evict(max_age_days, max_size_gb, &config, json)?,
        Commands::Version => commands::version(),
    }

    Ok(())
}
