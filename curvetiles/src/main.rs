mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<InfoLevel>,

	/// KEY=value settings file overlaid onto the environment
	/// (existing environment variables win)
	#[arg(long, value_name = "FILE", global = true)]
	env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Run the full build pipeline for one or more regions
	Generate(tools::generate::Subcommand),

	/// Publish a local tile pyramid to the object store
	Upload(tools::upload::Subcommand),

	/// Extract road bounding boxes from an existing pyramid
	Extract(tools::extract::Subcommand),

	/// Insert a checkpointed roads file into the relational store
	InsertGeometries(tools::insert_geometries::Subcommand),

	/// Merge regional pyramids into the global pyramid
	Merge(tools::merge::Subcommand),

	/// Check tile directories, merge completeness or uploads
	Verify(tools::verify::Subcommand),

	/// Start the HTTP job and tile service
	Serve(tools::serve::Subcommand),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	if let Some(env_file) = &cli.env_file {
		let applied = curvetiles_core::load_env_file(env_file)?;
		log::debug!("applied {applied} settings from {env_file:?}");
	} else {
		let default_file = PathBuf::from(".env");
		if default_file.is_file() {
			curvetiles_core::load_env_file(&default_file)?;
		}
	}

	run(cli)
}

fn run(cli: Cli) -> Result<()> {
	match &cli.command {
		Commands::Generate(arguments) => tools::generate::run(arguments),
		Commands::Upload(arguments) => tools::upload::run(arguments),
		Commands::Extract(arguments) => tools::extract::run(arguments),
		Commands::InsertGeometries(arguments) => tools::insert_geometries::run(arguments),
		Commands::Merge(arguments) => tools::merge::run(arguments),
		Commands::Verify(arguments) => tools::verify::run(arguments),
		Commands::Serve(arguments) => tools::serve::run(arguments),
	}
}
