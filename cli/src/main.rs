mod commands;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hapsync_core::config;
use hapsync_core::{
    DotGateway, HapticEngine, MemoryTransport, PlaybackHandle, SimulatedPlayback, spawn_playback_service,
};
use hapsync_types::EngineConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Drive a haptic sequence against simulated dots")]
struct Args {
    /// Sequence definition (JSON)
    #[arg(short, long)]
    sequence: Option<PathBuf>,

    /// Engine config (TOML); defaults to the per-user config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write daily log files here instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Simulate a device that rejects every write
    #[arg(long)]
    fail_device: Vec<u8>,
}

/// Initialize logging to a daily file under `log_dir` (or HAPSYNC_LOG_DIR),
/// otherwise stderr.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    let dir = log_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("HAPSYNC_LOG_DIR").map(PathBuf::from));

    if let Some(dir) = dir {
        let appender = tracing_appender::rolling::daily(dir, "hapsync.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    None
}

fn load_engine_config(path: Option<&Path>) -> EngineConfig {
    let result = match path {
        Some(path) => config::load_config(path),
        None => config::load_user_config(),
    };
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using default engine config");
        EngineConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_deref());
    let config = load_engine_config(args.config.as_deref());

    let transport = Arc::new(MemoryTransport::new(&config.devices).with_logging());
    for address in &args.fail_device {
        transport.fail_device(*address);
    }
    let gateway = Arc::new(DotGateway::new(transport, &config.devices, config.write_timeout()));
    if let Err(e) = gateway.start().await {
        println!("Gateway failed to start ({e}); haptics disabled");
    }

    let tick = config.tick();
    let mut engine = HapticEngine::new(config, gateway.clone());
    let mut total = None;
    if let Some(path) = &args.sequence {
        if engine.load_sequence(path) {
            if let Some(store) = engine.store() {
                let info = store.info();
                println!("Loaded \"{}\": {} events", info.name, store.len());
                total = info.total_duration;
            }
        } else {
            println!("Failed to load {}; dispatcher disabled", path.display());
        }
    }

    let printer = tokio::spawn(commands::print_signals(engine.subscribe()));
    let (handle, service) = spawn_playback_service(engine, SimulatedPlayback::new(total), tick);

    loop {
        let line = readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &handle, &gateway).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                writeln!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    handle.shutdown().await?;
    service.await.map_err(|e| e.to_string())?;
    printer.abort();
    Ok(())
}

fn readline() -> Result<String, String> {
    write!(std::io::stdout(), "> ").map_err(|e| e.to_string())?;
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut buffer = String::new();
    let read = std::io::stdin()
        .read_line(&mut buffer)
        .map_err(|e| e.to_string())?;
    if read == 0 {
        // EOF behaves like `exit`
        return Ok("exit".to_string());
    }
    Ok(buffer)
}

#[derive(Parser)]
#[command(about = "hapsync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Play,
    Pause,
    Seek {
        /// Position as m:ss or m:ss.f
        #[arg(short, long)]
        to: String,
    },
    Stop,
    /// Stop and forget every triggered event
    Reset,
    Status,
    /// Show the mirrored state of every device
    Devices,
    Exit,
}

async fn respond(line: &str, handle: &PlaybackHandle, gateway: &DotGateway) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "hapsync".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Play) => commands::play(handle).await,
        Some(Commands::Pause) => commands::pause(handle).await,
        Some(Commands::Seek { to }) => commands::seek(handle, to).await,
        Some(Commands::Stop) => commands::stop(handle).await,
        Some(Commands::Reset) => commands::reset(handle).await,
        Some(Commands::Status) => commands::status(handle).await,
        Some(Commands::Devices) => commands::devices(gateway).await,
        Some(Commands::Exit) => return Ok(true),
        None => {}
    }
    Ok(false)
}
