//! FileFs CLI
//!
//! Command-line interface for a filesystem image.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use filefs::{Config, FileFs, FilesystemProxy, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// FileFs CLI
#[derive(Parser, Debug)]
#[command(name = "filefs")]
#[command(about = "Append-only object store inside a single host file")]
#[command(version)]
struct Args {
    /// Host file holding the filesystem
    #[arg(short, long, default_value = "./filefs.img")]
    image: PathBuf,

    /// fsync after every mutation instead of only on close
    #[arg(long)]
    sync_every_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty filesystem (destroys existing content)
    Init,

    /// Store a file under a name
    Put {
        /// Name inside the filesystem
        name: String,

        /// Source file, or "-" for stdin
        source: PathBuf,

        /// Replace an existing object instead of appending a duplicate
        #[arg(short, long)]
        update: bool,
    },

    /// Write an object's content to stdout
    Get {
        /// Name inside the filesystem
        name: String,
    },

    /// Delete an object
    Rm {
        /// Name inside the filesystem
        name: String,
    },

    /// List names, optionally under a prefix
    Ls {
        /// Name prefix
        prefix: Option<String>,
    },

    /// Dump every record header, live or deleted
    Inspect,
}

fn main() {
    // Logs go to stderr so `get` output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,filefs=info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> filefs::Result<()> {
    let strategy = if args.sync_every_write {
        SyncStrategy::EveryWrite
    } else {
        SyncStrategy::OnClose
    };
    let config = Config::builder().sync_strategy(strategy).worker_threads(1).build();

    let fs = match args.command {
        Commands::Init => {
            let fs = FileFs::create(&args.image, config)?;
            tracing::info!("Initialized {}", args.image.display());
            fs
        }
        command => {
            let fs = FileFs::open(&args.image, config)?;
            execute(&fs, command)?;
            fs
        }
    };

    fs.close()
}

fn execute(fs: &FileFs, command: Commands) -> filefs::Result<()> {
    match command {
        Commands::Init => {}
        Commands::Put {
            name,
            source,
            update,
        } => {
            let (reader, len) = open_source(&source)?;
            let task = if update {
                fs.update(&name, reader, len)
            } else {
                fs.write(&name, reader, len)
            };
            task.wait()?;
            println!("stored {} ({} bytes)", name, len);
        }
        Commands::Get { name } => {
            fs.read(&name, io::stdout()).wait()?;
        }
        Commands::Rm { name } => {
            if fs.delete(&name).wait()? {
                println!("deleted {}", name);
            } else {
                println!("{} not found", name);
            }
        }
        Commands::Ls { prefix } => {
            for name in fs.list(prefix.as_deref()).wait()? {
                println!("{}", name);
            }
        }
        Commands::Inspect => {
            for record in fs.engine().inspect()? {
                println!(
                    "{:>12}  {:<7}  {:>12}  {}",
                    record.offset,
                    if record.flags.is_deleted() { "deleted" } else { "live" },
                    record.payload_len,
                    record.name.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

/// Open the payload source and report its length
fn open_source(path: &Path) -> filefs::Result<(Box<dyn Read + Send>, u64)> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        let len = buf.len() as u64;
        return Ok((Box::new(Cursor::new(buf)), len));
    }

    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok((Box::new(file), len))
}
