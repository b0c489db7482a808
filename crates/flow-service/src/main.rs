//! Main entry point for the TradeFlow service.
//!
//! This binary wires the configured backends into the order pipeline and
//! runs it: intake and queries are served by the order service handle, the
//! settlement worker consumes the event log until interrupted.

use clap::Parser;
use flow_config::Config;
use flow_core::{Pipeline, PipelineBuilder, PipelineError, PipelineFactories};
use std::collections::HashMap;
use std::path::PathBuf;

use flow_cache::implementations::memory::create_cache;
use flow_events::implementations::memory::create_event_log;
use flow_store::implementations::memory::create_store;

/// Command-line arguments for the TradeFlow service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
	fmt().with_env_filter(env_filter).with_target(true).init();

	let config = Config::from_file(&args.config)?;
	tracing::info!("Loaded configuration [{}]", config.pipeline.id);

	let pipeline = build_pipeline(config)?;
	tracing::info!("Started pipeline");

	pipeline.run().await?;

	tracing::info!("Stopped pipeline");
	Ok(())
}

/// Builds the pipeline with the backend implementations this binary ships.
fn build_pipeline(config: Config) -> Result<Pipeline, PipelineError> {
	let mut store_factories: HashMap<String, flow_store::StoreFactory> = HashMap::new();
	store_factories.insert("memory".to_string(), create_store);

	let mut cache_factories: HashMap<String, flow_cache::CacheFactory> = HashMap::new();
	cache_factories.insert("memory".to_string(), create_cache);

	let mut event_log_factories: HashMap<String, flow_events::EventLogFactory> = HashMap::new();
	event_log_factories.insert("memory".to_string(), create_event_log);

	PipelineBuilder::new(config).build(PipelineFactories {
		store_factories,
		cache_factories,
		event_log_factories,
	})
}
