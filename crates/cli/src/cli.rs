use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "molv")]
#[command(about = "Molecular viewer command bridge")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Start the bridge endpoint and serve the viewer bootstrap page
	Serve {
		/// Address to bind
		#[arg(long, default_value = "127.0.0.1")]
		host: String,

		/// Port to bind
		#[arg(long, default_value_t = 5000)]
		port: u16,

		/// Per-call dispatch deadline in seconds
		#[arg(long, default_value_t = 15)]
		timeout_secs: u64,

		/// Run an in-process headless rendering session instead of waiting
		/// for a browser to connect
		#[arg(long)]
		headless: bool,

		/// Refuse additional sessions instead of admitting them as observers
		#[arg(long)]
		strict: bool,
	},
}
