use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod migrate;

#[derive(Parser)]
#[command(name = "rkm")]
#[command(about = "Move a rkd data directory between installs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Relocate the daemon data directory using ./rkm migrate")]
    Migrate {
        #[arg(long, value_name = "SOURCE_DIR", default_value = "/var/lib/rkd")]
        source: PathBuf,

        #[arg(
            long,
            value_name = "TARGET_DIR",
            default_value = "/var/snap/rkd/common/rkd"
        )]
        target: PathBuf,

        #[arg(long, value_name = "SECONDS", default_value_t = 300)]
        timeout: u64,

        #[arg(long, help = "Leave the source package installed")]
        keep_source_package: bool,
    },
    #[command(about = "Print a daemon summary using ./rkm report <DATA_DIR>")]
    Report {
        #[arg(value_name = "DATA_DIR")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            source,
            target,
            timeout,
            keep_source_package,
        } => {
            migrate::run(migrate::MigrateArgs {
                source,
                target,
                timeout: Duration::from_secs(timeout),
                keep_source_package,
            })
            .await
        }
        Commands::Report { dir } => migrate::report(&dir).await,
    }
}
