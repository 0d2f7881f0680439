use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = mnem_ctl::Args::parse();
	mnem_ctl::run(args).await
}
