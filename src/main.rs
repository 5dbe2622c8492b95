use anyhow::{anyhow, Result};
use clap::Parser;
use popupcam::{PopupcamConfig, PopupcamOrchestrator};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "popupcamd")]
#[command(about = "Popup camera motor control daemon")]
#[command(version)]
#[command(long_about = "Drives the motorized popup camera module: raises it when a client \
opens the front camera, retracts it when the camera is released, and recovers from jams, \
drops and device restarts. Runs against a simulated motor with optional keyboard control.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "popupcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the daemon")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file
    #[arg(long, value_name = "PATH", help = "Write logs to a daily rolling file at PATH")]
    log_file: Option<PathBuf>,

    /// Simulate hardware events from the keyboard
    #[arg(short, long, help = "Enable keyboard simulation of camera, screen and motor events")]
    keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args)?;

    info!("Starting popupcamd v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PopupcamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut orchestrator = PopupcamOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(args.keyboard);

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize daemon: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start daemon: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Daemon error during execution: {}", e);
        e
    })?;

    info!("popupcamd exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    drop(_log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("popupcam={},popupcamd={}", log_level, log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Popup camera daemon configuration file");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[motor]
# Time a popup or takeback is allowed to take before the motor accepts new commands
settle_delay_ms = 1200
# How often a queued command is retried while the motor is busy
retry_poll_ms = 100
# Consecutive popup jams before calibration is offered
popup_max_failures = 3
# Consecutive takeback jams before calibration is offered
takeback_max_failures = 3
# Jam reports are ignored for this long after boot
boot_grace_ms = 1200

[debounce]
# Camera availability changes are coalesced over this window
window_ms = 100
# Camera id that owns the popup module
front_camera_id = "1"

[frequency]
# Sliding window for counting actuations
window_ms = 20000
# Actuations allowed within the window before the user is warned
capacity = 10

[feedback]
# LED brightness files lit while the motor moves
led_paths = ["/sys/class/leds/green/brightness", "/sys/class/leds/blue/brightness"]
# How long the LEDs stay lit after a command
light_duration_ms = 1200
# Directory holding the popup/takeback sound sets
sound_dir = "/system/media/audio/ui"
# Command used to play a sound file
sound_player = "aplay"
# Where LED and sound preferences are persisted
preferences_path = "popupcam-preferences.toml"
# Answer jam dialogs with "calibrate now" instead of cancel
auto_calibrate = false

[proximity]
# Input device for the proximity sensor (requires the proximity_input feature)
# device = "/dev/input/event3"

[simulator]
# Travel time of the simulated motor
travel_ms = 600

[system]
# Event bus capacity
event_bus_capacity = 100
"#;

    println!("{}", default_config);
}
