//! fileset CLI - hash and copy filesets

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use fileset::{ops, Config, FilesetFilters, WareId};

#[derive(Parser)]
#[command(name = "fileset")]
#[command(about = "content-addressed fileset hashing and copying")]
#[command(version)]
struct Cli {
    /// TOML file with ware type and filter defaults
    #[arg(short, long, global = true, env = "FILESET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// compute the ware id of a directory
    Hash {
        /// directory to hash
        dir: PathBuf,

        /// ware type to report
        #[arg(short = 't', long = "type")]
        ware_type: Option<String>,

        /// uid filter: keep or a number
        #[arg(long)]
        uid: Option<String>,

        /// gid filter: keep or a number
        #[arg(long)]
        gid: Option<String>,

        /// mtime filter: keep, @<unix seconds>, or RFC 3339
        #[arg(long)]
        mtime: Option<String>,
    },

    /// copy a directory, verifying both sides hash the same
    Copy {
        /// source directory
        src: PathBuf,

        /// destination directory, created if missing
        dst: PathBuf,

        /// ware type to report
        #[arg(short = 't', long = "type")]
        ware_type: Option<String>,

        /// restore setuid, setgid, and sticky bits
        #[arg(long)]
        sticky: bool,
    },

    /// check that a ware id is well formed
    Parse {
        /// ware id, as <type>:<hash>
        ware_id: String,
    },
}

fn main() -> ExitCode {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .event_format(format)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> fileset::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Hash {
            dir,
            ware_type,
            uid,
            gid,
            mtime,
        } => {
            let mut filters = config.pack.clone();
            override_field(&mut filters.uid, uid);
            override_field(&mut filters.gid, gid);
            override_field(&mut filters.mtime, mtime);
            let ware_type = ware_type.unwrap_or(config.ware_type);
            let id = ops::pack(&dir, &ware_type, &filters, None, &cancel)?;
            println!("{}", id);
        }

        Commands::Copy {
            src,
            dst,
            ware_type,
            sticky,
        } => {
            let unpack_filters = FilesetFilters {
                sticky: sticky || config.unpack.sticky,
                ..config.unpack.clone()
            };
            let ware_type = ware_type.unwrap_or(config.ware_type);
            let id = ops::copy(
                &src,
                &dst,
                &ware_type,
                &config.pack,
                &unpack_filters,
                &cancel,
            )?;
            println!("{}", id);
        }

        Commands::Parse { ware_id } => {
            let id: WareId = ware_id.parse()?;
            println!("type: {}", id.ware_type);
            println!("hash: {}", id.hash);
        }
    }

    Ok(())
}

fn override_field(field: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *field = value;
    }
}
