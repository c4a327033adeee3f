// CLASSIFICATION: COMMUNITY
// Filename: fbns_sim.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Simulator for the framebuffer namespace multiplexer.
//!
//! Registers an in-memory framebuffer, lets several namespaces draw into it
//! through user mappings and rotates the foreground between them, printing
//! a checksum of the screen and of every backing buffer after each switch.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::LevelFilter;

use fbns::device::FbOps;
use fbns::diag;
use fbns::{
    AddressSpaceId, BackingStrategy, ColorRegister, FbMux, FbNsConfig, FbNsError, FbNsEvent,
    FbResult, FileHandle, ForegroundTracker, FramebufferDevice, MappingRegion, MemoryFramebuffer,
    NamespaceId, ScreenGeometry, SharedBuffer, SimulatedVm, SlotIndex,
};

#[derive(Parser)]
#[command(name = "fbns-sim", about = "Simulate framebuffer namespaces", version = "0.1")]
struct Cli {
    /// Log at debug level.
    #[arg(long, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw from several namespaces and rotate the foreground.
    Rotate {
        #[arg(long, default_value_t = 3)]
        namespaces: u64,
        #[arg(long, default_value_t = 2)]
        rounds: u32,
        #[arg(long, default_value_t = 64)]
        width: u32,
        #[arg(long, default_value_t = 48)]
        height: u32,
        /// Back every namespace with a single aliased page.
        #[arg(long, default_value_t = false)]
        unipage: bool,
    },
    /// Print the effective configuration.
    Config,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn checksum(buf: &SharedBuffer) -> u32 {
    buf.to_vec()
        .iter()
        .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(*b)).wrapping_mul(0x0100_0193))
}

fn rotate(
    config: FbNsConfig,
    namespaces: u64,
    rounds: u32,
    width: u32,
    height: u32,
) -> FbResult<()> {
    let host = Arc::new(ForegroundTracker::with_foreground(NamespaceId::INIT));
    let vm = Arc::new(SimulatedVm::new());
    let mux = FbMux::new(host.clone(), vm.clone(), config);

    let fb = Arc::new(
        MemoryFramebuffer::builder(SlotIndex::new(0)?)
            .id("simfb")
            .geometry(ScreenGeometry::new(width, height, 32))
            .build()?,
    );
    mux.dispatch(FbNsEvent::DeviceRegistered(fb.clone()))?;
    let slot = SlotIndex::new(0)?;
    let len = fb.screen().map_or(0, |s| s.len());

    let mut records = Vec::new();
    for n in 1..=namespaces {
        let ns = NamespaceId(n);
        mux.namespace_created(ns)?;
        let record = mux.acquire(ns, slot)?;
        let space = AddressSpaceId(n as u32);
        let region = MappingRegion::new(space, 0x1000_0000, len, FileHandle(0x100 + n));
        let ops = mux.ops(&record);
        ops.mmap(&region)?;
        ops.set_colreg(ColorRegister::new(n as u32, 0xffff, 0, 0, 0xffff))?;
        vm.write(space, region.start, &vec![n as u8; len])
            .map_err(|e| FbNsError::InvalidArgument(format!("draw failed: {e}")))?;
        records.push((ns, record, region));
    }

    for round in 0..rounds {
        for (ns, record, _) in &records {
            let prev = host.set_foreground(Some(*ns));
            if let Some(prev) = prev.filter(|p| !p.is_init() && p != ns) {
                mux.dispatch(FbNsEvent::Deactivate(prev))?;
            }
            mux.dispatch(FbNsEvent::Activate(*ns))?;
            let screen = fb.screen().map_or(0, |s| checksum(&s));
            println!("round {round} fg {ns} screen {screen:08x}");
            for (other, rec, _) in &records {
                if let Some(backing) = rec.backing() {
                    println!("  {other} backing {:08x}", checksum(&backing));
                }
            }
            println!("  {}", diag::describe(record));
        }
    }

    for (ns, record, region) in records {
        mux.ops(&record).munmap(region.space, region.start)?;
        mux.release(&record)?;
        mux.namespace_destroyed(ns)?;
    }
    let stats = mux.allocator_stats();
    println!(
        "allocations {} live {} bytes {} driver calls {}",
        stats.total,
        stats.live,
        stats.bytes,
        fb.calls().len()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let result = match cli.command {
        Commands::Rotate {
            namespaces,
            rounds,
            width,
            height,
            unipage,
        } => {
            let mut config = FbNsConfig::from_env();
            if unipage {
                config.backing = BackingStrategy::SinglePage;
            }
            rotate(config, namespaces, rounds, width, height)
        }
        Commands::Config => {
            println!("{:#?}", FbNsConfig::from_env());
            Ok(())
        }
    };
    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
