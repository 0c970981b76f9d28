//! CLI entry point: parses flags, initializes logging, wires the reference transport
//! (the only concrete `TransportBackend` this crate ships — see DESIGN.md), and runs
//! the event loop to completion.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use meshpipe::eventloop::EventLoop;
use meshpipe::passphrase::TerminalPassphrase;
use meshpipe::slots::GlobalSlots;
use meshpipe::store::reference::NullEncryption;
use meshpipe::store::Store;
use meshpipe::transport::{BootstrapNode, ReferenceTransport};

/// Mirrors the original's `ratox [-4|-6] [-E|-e] [-T|-t] [-P|-p] [savefile]` (spec.md
/// §6). The bootstrap node list and proxy/IP-version plumbing are compile-time
/// details owned by whatever production transport is linked in; here they only steer
/// which flags are accepted.
#[derive(Parser)]
#[command(name = "meshpiped", about = "Filesystem-as-UI daemon for a peer-to-peer messaging identity")]
struct Cli {
    /// Force IPv4.
    #[arg(short = '4', conflicts_with = "ipv6")]
    ipv4: bool,
    /// Force IPv6.
    #[arg(short = '6')]
    ipv6: bool,
    /// Encrypt the save file.
    #[arg(short = 'E', conflicts_with = "no_encrypt")]
    encrypt: bool,
    /// Do not encrypt the save file.
    #[arg(short = 'e')]
    no_encrypt: bool,
    /// Disable UDP.
    #[arg(short = 'T', conflicts_with = "udp")]
    no_udp: bool,
    /// Enable UDP.
    #[arg(short = 't')]
    udp: bool,
    /// Use a proxy.
    #[arg(short = 'P', conflicts_with = "no_proxy")]
    proxy: bool,
    /// Do not use a proxy.
    #[arg(short = 'p')]
    no_proxy: bool,
    /// Overrides the default save-file path.
    savefile: Option<PathBuf>,
}

const BANNER: &str = r"
 _ __ ___   ___  ___| |__  _ __ (_)_ __   ___
| '_ ` _ \ / _ \/ __| '_ \| '_ \| | '_ \ / _ \
| | | | | |  __/\__ \ | | | |_) | | |_) |  __/
|_| |_| |_|\___||___/_| |_| .__/|_| .__/ \___|
                          |_|    |_|
";

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    print!("{BANNER}");

    let root = std::env::current_dir().expect("cannot read current directory");
    let savefile = cli.savefile.clone().unwrap_or_else(|| root.join("save"));
    let encrypted = cli.encrypt && !cli.no_encrypt;

    match run(root, savefile, encrypted) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(root: PathBuf, savefile: PathBuf, encrypted: bool) -> meshpipe::DaemonResult<()> {
    if let Err(e) = meshpipe::signals::install() {
        return Err(meshpipe::DaemonError::TransportInit(format!("cannot install signal handlers: {e}")));
    }

    let slots = GlobalSlots::create(&root)?;

    let placeholder_key = placeholder_public_key();
    let transport = Box::new(ReferenceTransport::new(placeholder_key));
    let store = Store::new(savefile, encrypted);
    let bootstrap_nodes: Vec<BootstrapNode> = Vec::new();

    let mut event_loop = EventLoop::new(root, slots, transport, store, Box::new(NullEncryption), bootstrap_nodes);
    let mut passphrase = TerminalPassphrase;
    event_loop.load(&mut passphrase)?;

    event_loop.run().map_err(|source| meshpipe::DaemonError::TransportInit(source.to_string()))
}

/// Non-cryptographic placeholder identity used only because this crate ships no real
/// transport (key generation is the external transport's job, out of scope per
/// spec.md §1). Overwritten by `EventLoop::load` if a save file already exists.
fn placeholder_public_key() -> [u8; 32] {
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let mut key = [0u8; 32];
    key[..4].copy_from_slice(&pid.to_be_bytes());
    key[4..8].copy_from_slice(&nanos.to_be_bytes());
    key
}
