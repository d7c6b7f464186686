use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod pack;
mod unpack;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an archive from a directory
    Pack(PackCommand),
    /// Extract an archive
    Unpack(UnpackCommand),
    /// List archive contents
    List(ListCommand),
    /// Dump header and entry information as JSON
    Info(InfoCommand),
}

#[derive(Debug, Args)]
struct PackCommand {
    /// Input directory
    input: String,
    /// Output archive path; defaults to `<input>.dat`
    #[clap(short, long)]
    output: Option<String>,
    /// Overwrite an existing output file
    #[clap(long, default_value = "false")]
    r#override: bool,
}

#[derive(Debug, Args)]
struct UnpackCommand {
    /// Input archive path
    input: String,
    /// Output directory; defaults to a directory named after the archive
    #[clap(short, long)]
    output: Option<String>,
    /// Byte offset of the archive inside the input file
    #[clap(long, default_value = "0")]
    offset: u64,
}

#[derive(Debug, Args)]
struct ListCommand {
    /// Input archive path
    input: String,
    /// Byte offset of the archive inside the input file
    #[clap(long, default_value = "0")]
    offset: u64,
}

#[derive(Debug, Args)]
struct InfoCommand {
    /// Input archive path
    input: String,
    /// Output JSON path; defaults to stdout
    #[clap(short, long)]
    output: Option<String>,
    /// Byte offset of the archive inside the input file
    #[clap(long, default_value = "0")]
    offset: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Pack(cmd) => pack::pack(cmd),
        Command::Unpack(cmd) => unpack::unpack(cmd),
        Command::List(cmd) => unpack::list(cmd),
        Command::Info(cmd) => unpack::dump_info(cmd),
    }
}
