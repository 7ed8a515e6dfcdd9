pub mod sync;

mod error;

pub use error::{Error, Result};

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use arca_store::{
	content::{ContentStoreClient, HttpTransport},
	ledger::HttpLedger,
};

use crate::sync::Synchronizer;

#[derive(Debug, Parser)]
#[command(
	version = arca_cli::VERSION,
	rename_all = "kebab",
	styles = arca_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = arca_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let transport = Arc::new(HttpTransport::new(&config.content_store)?);
	let content = Arc::new(ContentStoreClient::new(transport, &config.content_store));
	let ledger = Arc::new(HttpLedger::new(&config.ledger)?);
	let (index, checkpoint) =
		sync::restore_index(&config.index, &config.sync.snapshot_pointer_path, &content).await;
	let synchronizer = Synchronizer::new(
		index.into_shared(),
		ledger,
		content,
		config.sync,
		checkpoint,
	);

	synchronizer.start().await;
	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown requested.");
	synchronizer.stop().await;

	Ok(())
}
