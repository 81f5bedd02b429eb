//! # rtrace control tool
//!
//! Lists and toggles trace categories of a running process over its remote
//! channel, receives mirrored trace lines, and reads ring store files.
//!
//! # Usage
//!
//! ```bash
//! # Categories of the process listening on 127.0.0.1:5555
//! rtrace_ctl list
//!
//! # Enable everything in module "Player"
//! rtrace_ctl enable --module Player
//!
//! # Print records as they are written
//! rtrace_ctl follow /tmp/rtrace/tracebuffer.4242
//!
//! # Stores in the default directory, removing those of dead processes
//! rtrace_ctl stores --clean
//! ```

#![deny(warnings)]

mod client;
mod render;

use clap::{Parser, Subcommand, ValueEnum};
use client::RemoteClient;
use rtrace_common::consts::{DATAGRAM_CAPACITY, DEFAULT_REMOTE_PORT, DEFAULT_STORE_PATH, DEFAULT_STORE_PREFIX};
use rtrace_common::protocol::TraceLine;
use rtrace_shm::{RingReader, ShmError, ShmResult, Snapshot, StoreDiscovery};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Wait slice for blocking loops, so Ctrl+C is noticed promptly
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Snapshot attempts `dump` makes against a busy writer
const DUMP_ATTEMPTS: u32 = 50;

/// rtrace control tool
#[derive(Parser, Debug)]
#[command(name = "rtrace_ctl")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "List and toggle trace categories, follow and dump ring stores")]
#[command(long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List categories of a running process
    List {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Result format
        #[arg(long, value_enum, default_value_t = Output::Text)]
        output: Output,
    },

    /// Enable matching categories
    Enable(ToggleArgs),

    /// Disable matching categories
    Disable(ToggleArgs),

    /// Print mirrored trace lines until Ctrl+C
    Listen {
        /// Address the process mirrors to
        #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_REMOTE_PORT + 1)))]
        bind: SocketAddr,
    },

    /// Print every record currently held by a store
    Dump {
        /// Store file
        file: PathBuf,
    },

    /// Print records as they are written until Ctrl+C or writer exit
    Follow {
        /// Store file
        file: PathBuf,

        /// Print the existing backlog first
        #[arg(long)]
        from_start: bool,
    },

    /// Discover stores in a directory
    Stores {
        /// Directory to scan
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        dir: PathBuf,

        /// Store file prefix
        #[arg(long, default_value = DEFAULT_STORE_PREFIX)]
        prefix: String,

        /// Delete stores whose writer process is gone
        #[arg(long)]
        clean: bool,

        /// Result format
        #[arg(long, value_enum, default_value_t = Output::Text)]
        output: Output,
    },
}

#[derive(clap::Args, Debug)]
struct RemoteArgs {
    /// Remote channel of the target process
    #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_REMOTE_PORT)))]
    remote: SocketAddr,

    /// Quiet period ending response collection, in milliseconds
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct ToggleArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Module name; empty matches any
    #[arg(short, long, default_value = "")]
    module: String,

    /// Category name; empty matches any
    #[arg(short, long, default_value = "")]
    category: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(args.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Cmd) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Cmd::List { remote, output } => {
            let mut client = connect(&remote)?;
            let listed = client.list()?;
            if listed.is_empty() {
                warn!(remote = %remote.remote, "no categories reported");
            }
            match output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&listed)?),
                Output::Text => {
                    for l in &listed {
                        let state = if l.enabled { "on " } else { "off" };
                        println!("{state} {}/{}", l.module, l.category);
                    }
                }
            }
        }
        Cmd::Enable(toggle) => run_toggle(true, &toggle)?,
        Cmd::Disable(toggle) => run_toggle(false, &toggle)?,
        Cmd::Listen { bind } => listen(bind)?,
        Cmd::Dump { file } => {
            let mut reader = RingReader::attach(&file)?;
            print_records(&dump(&mut reader)?);
        }
        Cmd::Follow { file, from_start } => follow(file, from_start)?,
        Cmd::Stores {
            dir,
            prefix,
            clean,
            output,
        } => {
            let discovery = StoreDiscovery::new(&dir, prefix);
            if clean {
                let removed = discovery.remove_orphaned()?;
                info!(removed, dir = %dir.display(), "orphaned stores removed");
            }
            let stores = discovery.list()?;
            match output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&stores)?),
                Output::Text => {
                    for s in &stores {
                        println!("{}", render::store(s));
                    }
                }
            }
        }
    }
    Ok(())
}

fn connect(remote: &RemoteArgs) -> std::io::Result<RemoteClient> {
    RemoteClient::connect(remote.remote, Duration::from_millis(remote.timeout_ms))
}

fn run_toggle(enable: bool, args: &ToggleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&args.remote)?;
    match client.toggle(enable, &args.module, &args.category)? {
        Some(modified) => println!("{modified}"),
        None => return Err(format!("no response from {}", args.remote.remote).into()),
    }
    Ok(())
}

fn running_flag() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

fn listen(bind: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind(bind)?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    let running = running_flag()?;
    info!(%bind, "listening for trace lines");

    let mut buf = [0u8; DATAGRAM_CAPACITY];
    while running.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => return Err(e.into()),
        };
        match TraceLine::decode(&buf[..len]) {
            Some(line) => println!("{}", render::trace_line(&line)),
            None => debug!(%from, len, "ignoring non-trace datagram"),
        }
    }
    Ok(())
}

fn follow(file: PathBuf, from_start: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = RingReader::attach(&file)?;
    if !from_start {
        reader.seek_to_end();
    }
    let running = running_flag()?;
    info!(file = %file.display(), pid = reader.writer_pid(), "following store");

    while running.load(Ordering::SeqCst) {
        if let Some(batch) = read_batch(&mut reader)? {
            if batch.lost_bytes > 0 {
                warn!(lost_bytes = batch.lost_bytes, "records overwritten before they were read");
            }
            print_records(&batch);
        }

        if !reader.wait_for_data(Some(POLL_INTERVAL)) && !reader.is_writer_alive() {
            info!(pid = reader.writer_pid(), "writer exited");
            if let Some(batch) = read_batch(&mut reader)? {
                print_records(&batch);
            }
            break;
        }
    }
    Ok(())
}

/// New records, or `None` while the writer keeps the ring busy
fn read_batch(reader: &mut RingReader) -> ShmResult<Option<Snapshot>> {
    match reader.read_new() {
        Ok(batch) => Ok(Some(batch)),
        Err(ShmError::VersionConflict) => {
            debug!("writer busy, retrying on next poll");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Whole store contents, retrying while the writer is busy
fn dump(reader: &mut RingReader) -> ShmResult<Snapshot> {
    for attempt in 1..DUMP_ATTEMPTS {
        match reader.snapshot() {
            Err(ShmError::VersionConflict) => {
                debug!(attempt, "writer busy, retrying snapshot");
                std::thread::sleep(Duration::from_millis(10));
            }
            other => return other,
        }
    }
    reader.snapshot()
}

fn print_records(snapshot: &Snapshot) {
    for record in snapshot.records() {
        match record {
            Ok(view) => println!("{}", render::record(&view)),
            Err(e) => warn!(error = %e, "skipping undecodable record"),
        }
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Records go to stdout, diagnostics to stderr
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rtrace_shm::RingStore;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_toggle_defaults_are_wildcards() {
        let args = Args::parse_from(["rtrace_ctl", "enable"]);
        match args.command {
            Cmd::Enable(toggle) => {
                assert!(toggle.module.is_empty());
                assert!(toggle.category.is_empty());
                assert_eq!(toggle.remote.remote.port(), DEFAULT_REMOTE_PORT);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn busy_store() -> (tempfile::TempDir, RingStore, RingReader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring");
        let store = RingStore::create(&path, 256).unwrap();
        let reader = RingReader::attach(&path).unwrap();
        (dir, store, reader)
    }

    #[test]
    fn test_follow_retries_while_writer_is_busy() {
        let (_dir, mut store, mut reader) = busy_store();
        {
            let _open = store.reserve(16);
            assert!(read_batch(&mut reader).unwrap().is_none());
        }

        let batch = read_batch(&mut reader).unwrap().unwrap();
        assert_eq!(batch.bytes.len(), 16);
        assert_eq!(batch.end, 16);
    }

    #[test]
    fn test_dump_gives_up_on_stuck_writer() {
        let (_dir, mut store, mut reader) = busy_store();
        let _stuck = store.reserve(16);
        assert!(matches!(dump(&mut reader), Err(ShmError::VersionConflict)));
    }

    #[test]
    fn test_stores_arguments() {
        let args = Args::parse_from([
            "rtrace_ctl", "stores", "--dir", "/run/rtrace", "--clean", "--output", "json",
        ]);
        match args.command {
            Cmd::Stores {
                dir, clean, output, prefix,
            } => {
                assert_eq!(dir, PathBuf::from("/run/rtrace"));
                assert!(clean);
                assert_eq!(output, Output::Json);
                assert_eq!(prefix, DEFAULT_STORE_PREFIX);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
