use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = arca_syncd::Args::parse();
	arca_syncd::run(args).await
}
