use anyhow::Context;
use position_analytics::replay::parse_csv;
use position_analytics::{config::Config, MemoryStateStore, Replayer};
use std::fs::File;
use std::io::BufReader;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let file = File::open(&config.replay_input)
        .with_context(|| format!("failed to open {}", config.replay_input))?;
    let observations = parse_csv(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", config.replay_input))?;

    tracing::info!(
        observations = observations.len(),
        window_secs = config.apr_window.num_seconds(),
        daily_entries = config.daily_avg_entries,
        "Replaying observations"
    );

    let mut replayer = Replayer::new(MemoryStateStore::new(), config);
    replayer.run(&observations);
    let report = replayer.report();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
