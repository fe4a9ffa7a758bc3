//! mcache CLI - Inspect and decode Maya geometry caches.

use std::env;
use std::sync::mpsc;
use std::sync::Arc;

use mcache::core::time::seconds_to_ticks;
use mcache::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the verbosity flags.
const LOG_ENV: &str = "MCACHE_LOG";

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("mcache");

    // Parse global flags
    let mut level = "info";
    let mut options = LoadOptions::default();
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "--little-endian" => options = options.with_endian(Endian::Little),
            "--no-mmap" => options = options.with_mmap(false),
            "-V" | "--version" => {
                println!("mcache {} ({})", env!("CARGO_PKG_VERSION"), env!("MCACHE_BUILD_DATE"));
                return;
            }
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_usage(prog);
        return;
    }

    let result = match filtered_args[0] {
        "info" | "i" if filtered_args.len() >= 2 => cmd_info(filtered_args[1]),
        "frames" | "f" if filtered_args.len() >= 2 => cmd_frames(filtered_args[1], &options),
        "dump" | "d" if filtered_args.len() >= 4 => {
            match filtered_args[3].parse::<usize>() {
                Ok(frame) => cmd_dump(filtered_args[1], filtered_args[2], frame, &options),
                Err(_) => {
                    eprintln!("Invalid frame index: {}", filtered_args[3]);
                    std::process::exit(1);
                }
            }
        }
        "load" | "l" if filtered_args.len() >= 2 => cmd_load(&filtered_args[1..], &options),
        "help" | "h" | "-h" | "--help" => {
            print_usage(prog);
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command or missing arguments: {}", cmd);
            print_usage(prog);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_usage(prog: &str) {
    println!("mcache - Inspect Maya geometry caches");
    println!();
    println!("Usage: {} [options] <command> <cache.xml> [args]", prog);
    println!();
    println!("Commands:");
    println!("  i, info <xml>                  Show descriptor contents");
    println!("  f, frames <xml>                Decode and list frames per channel");
    println!("  d, dump <xml> <channel> <n>    Print vertex positions of one frame");
    println!("  l, load <xml>...               Decode several caches in the background");
    println!("  h, help                        Show this help");
    println!();
    println!("Options:");
    println!("  -v, --verbose      Debug output");
    println!("  -vv, --trace       Trace output (very verbose)");
    println!("  -q, --quiet        Errors only");
    println!("  --little-endian    Read data files as little-endian");
    println!("  --no-mmap          Read data files into memory instead of mapping them");
    println!("  -V, --version      Show version");
    println!();
    println!("{} overrides the log filter, e.g. {}=mcache=trace", LOG_ENV, LOG_ENV);
}

fn cmd_info(path: &str) -> Result<()> {
    let cache = CacheFile::open(path)?;
    let desc = cache.descriptor();

    println!("Cache: {}", cache.file_name());
    println!("Base name: {}", cache.base_name());
    println!("Type: {}", desc.layout());
    println!("Version: {:.1}", desc.version());
    println!(
        "Time range: {:.4}s - {:.4}s ({} - {} ticks)",
        desc.start_time(),
        desc.end_time(),
        seconds_to_ticks(desc.start_time()),
        seconds_to_ticks(desc.end_time())
    );
    println!(
        "Time per frame: {:.6}s ({} ticks)",
        desc.time_per_frame(),
        seconds_to_ticks(desc.time_per_frame())
    );
    println!();
    println!("Channels ({}):", desc.num_channels());
    for ch in desc.channels() {
        println!(
            "  {} [{}, {}] {:.4}s - {:.4}s, ~{:.0} samples",
            ch.name,
            ch.channel_type,
            ch.interpretation,
            ch.start_time,
            ch.end_time,
            ch.num_samples()
        );
    }
    Ok(())
}

fn cmd_frames(path: &str, options: &LoadOptions) -> Result<()> {
    let store = FrameStore::new();
    let summary = load_file(path, &store, options)?;

    println!("Cache: {}", path);
    if let Some(header) = &summary.header {
        if let Some(version) = &header.version {
            println!("Data version: {}", version);
        }
    }
    println!("Files read: {}", summary.files_read);
    println!("Records: {} ({} skipped)", summary.records, summary.skipped_records);
    for skipped in &summary.skipped_files {
        println!("Skipped file: {}", skipped.display());
    }
    println!();
    for channel in store.channels() {
        let indices = store.frame_indices(&channel);
        let verts = indices
            .first()
            .and_then(|&i| store.frame(&channel, i))
            .map_or(0, |f| f.len());
        match (indices.first(), indices.last()) {
            (Some(first), Some(last)) => println!(
                "  {}: {} frame(s) [{}..={}], {} vertices",
                channel,
                indices.len(),
                first,
                last,
                verts
            ),
            _ => println!("  {}: no frames", channel),
        }
    }
    Ok(())
}

fn cmd_dump(path: &str, channel: &str, frame: usize, options: &LoadOptions) -> Result<()> {
    let store = FrameStore::new();
    load_file(path, &store, options)?;

    let Some(positions) = store.frame(channel, frame) else {
        eprintln!("No frame {} for channel {}", frame, channel);
        std::process::exit(1);
    };
    debug!("{} vertices", positions.len());
    for (i, p) in positions.iter().enumerate() {
        println!("{:6}  {:12.6} {:12.6} {:12.6}", i, p.x, p.y, p.z);
    }
    Ok(())
}

fn cmd_load(paths: &[&str], options: &LoadOptions) -> Result<()> {
    let (tx, rx) = mpsc::channel::<std::result::Result<String, String>>();
    let err_tx = tx.clone();
    let loader = LoadScheduler::with_error_hook(move |ev| {
        let _ = err_tx.send(Err(format!("{}: {}", ev.base_name, ev.error)));
    });

    let mut submitted = 0usize;
    for path in paths {
        let cache = CacheFile::open(path)?;
        let store: Arc<dyn FrameSink> = Arc::new(FrameStore::new());
        let done = tx.clone();
        let job = DecodeJob::new(cache, store)
            .with_options(*options)
            .on_complete(move |ev| {
                let _ = done.send(Ok(format!(
                    "{}: {} frame(s) from {} file(s)",
                    ev.file_name, ev.summary.frames_delivered, ev.summary.files_read
                )));
            });
        match loader.submit(job) {
            Ok(handle) => {
                info!("queued job {} ({})", handle.id(), handle.base_name());
                submitted += 1;
            }
            Err(e) => {
                eprintln!("{}: {}", path, e);
                break;
            }
        }
    }
    drop(tx);

    // Discarded jobs report nothing; stop once the loader drains.
    let mut failed = false;
    let mut reported = 0usize;
    while reported < submitted {
        match rx.recv_timeout(std::time::Duration::from_millis(50)) {
            Ok(Ok(line)) => {
                println!("{}", line);
                reported += 1;
            }
            Ok(Err(line)) => {
                eprintln!("{}", line);
                failed = true;
                reported += 1;
            }
            Err(_) if loader.is_idle() => break,
            Err(_) => {}
        }
    }

    if failed || loader.is_halted() {
        std::process::exit(1);
    }
    Ok(())
}
