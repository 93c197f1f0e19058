use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{error, info, LevelFilter};

use rtb2000::config::{load_config, AppConfig};
use rtb2000::devices::rtb2000::{Rtb2000, TriggerSource, WaveformFormat};
use rtb2000::resource::Resource;
use rtb2000::Instrument;

/// Single-shot capture from an RTB2000 / RTM3000 / RTA4000 oscilloscope
#[derive(Parser, Debug)]
#[command(name = "rtb_capture")]
#[command(about = "Configure, arm and read back one acquisition plus a screenshot", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// VISA resource string, overrides session.resource
    #[arg(short, long, value_name = "RESOURCE")]
    resource: Option<String>,

    /// Where to save the screenshot on this machine, overrides screenshot.pc_path
    #[arg(short, long, value_name = "FILE")]
    screenshot: Option<String>,

    /// Skip the screenshot
    #[arg(long)]
    no_screenshot: bool,

    /// Write the binary waveform as JSON (time, volts) pairs
    #[arg(short, long, value_name = "FILE")]
    waveform_json: Option<String>,

    /// Override log level (off, error, warn, info, debug, trace), wins over RUST_LOG
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(r) = &args.resource { config.session.resource = r.clone(); }
    if let Some(s) = &args.screenshot { config.screenshot.pc_path = s.clone(); }
    if args.no_screenshot { config.screenshot.enabled = false; }
    if let Some(w) = &args.waveform_json { config.output.waveform_json = Some(w.clone()); }
}

fn open_session(config: &AppConfig) -> rtb2000::Result<Rtb2000> {
    let resource: Resource = config.session.resource.parse()?;
    let inst = Instrument::open_resource(
        &resource,
        config.session.id_query,
        false,
        Duration::from_millis(config.session.visa_timeout_ms),
    )?;

    let mut scope = Rtb2000::from_instrument(inst)?;
    let inst = scope.instrument();
    inst.set_opc_timeout(Duration::from_millis(config.session.opc_timeout_ms));
    inst.set_instrument_status_checking(config.session.status_checking);
    Ok(scope)
}

fn capture(scope: &mut Rtb2000, config: &AppConfig) -> rtb2000::Result<()> {
    let acq = &config.acquisition;
    let trig = &config.trigger;

    {
        let inst = scope.instrument();
        info!("IDN: {}", inst.idn_string());
        info!("Options: {}", inst.instrument_options().join(","));
        inst.clear_status()?;
        inst.reset()?;
    }

    // Basic settings
    scope.set_acquisition_time(acq.acquisition_time)?;
    scope.set_channel_range(acq.channel, acq.range)?;
    scope.set_channel_offset(acq.channel, acq.offset)?;
    scope.set_channel_coupling(acq.channel, acq.coupling)?;
    scope.set_channel_enabled(acq.channel, true)?;

    // Trigger settings
    scope.set_trigger_mode(trig.mode)?;
    scope.set_edge_trigger(trig.slope)?;
    scope.set_trigger_source(TriggerSource::Channel(trig.source_channel))?;
    scope.set_trigger_level(trig.source_channel, trig.level)?;
    scope.instrument().query_opc()?;
    info!("Settings applied");

    scope.single()?;
    scope.wait_for_acquisition(Duration::from_millis(acq.acquisition_timeout_ms))?;
    info!("Acquisition finished");

    // Both traces log their point count and query duration
    scope.fetch_waveform(acq.channel, WaveformFormat::Ascii)?;
    let binary = scope.fetch_waveform(acq.channel, WaveformFormat::Real32)?;

    if let Some(path) = &config.output.waveform_json {
        let header = scope.waveform_header(acq.channel)?;
        let wf = rtb2000::devices::rtb2000::time_axis(&header, binary);
        let json = serde_json::to_string_pretty(&wf)
            .map_err(|e| rtb2000::Error::Protocol(format!("Unable to serialise waveform: {}", e)))?;
        std::fs::write(path, json.as_bytes())?;
        info!("Waveform written to {}", path);
    }

    if config.screenshot.enabled {
        let shot = &config.screenshot;
        scope.save_screenshot(&shot.instrument_dir, &shot.name, &shot.pc_path)?;
        info!("Screenshot file saved to '{}'", shot.pc_path);
    }

    Ok(())
}

// RUST_LOG when set, `info` otherwise, and `--log-level` over both
fn init_logging(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_level);

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };
    apply_overrides(&mut config, &args);

    let mut scope = match open_session(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("Error initializing the instrument session:\n{}", e);
            process::exit(1);
        }
    };

    let result = capture(&mut scope, &config);
    if let Err(e) = scope.close() {
        error!("Unable to close the session: {}", e);
    }

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
