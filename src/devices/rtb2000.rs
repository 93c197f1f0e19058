use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::instrument::Instrument;
use crate::scpi::{self, BinFloatFormat, Idn};
use crate::transport::Transport;

pub const SUPPORTED_FAMILIES: [&str; 3] = ["RTB", "RTM", "RTA"];
pub const MAX_CHANNELS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling {
    /// DC, 1 MOhm
    DcLimit,
    /// AC, 1 MOhm
    AcLimit,
    Ground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode { Auto, Normal }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSlope { Positive, Negative, Either }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    Channel(u8),
    External,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformFormat {
    Ascii,
    /// 4-byte little endian floats
    Real32,
}

impl Coupling {
    pub fn to_scpi(self) -> &'static str {
        match self {
            Coupling::DcLimit => "DCL",
            Coupling::AcLimit => "ACL",
            Coupling::Ground  => "GND",
        }
    }
}

impl FromStr for Coupling {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DCL" | "DCLIMIT" | "DC" => Ok(Coupling::DcLimit),
            "ACL" | "ACLIMIT" | "AC" => Ok(Coupling::AcLimit),
            "GND" | "GROUND"         => Ok(Coupling::Ground),
            x => Err(Error::Protocol(format!("Invalid value for coupling: {}", x))),
        }
    }
}

impl TriggerMode {
    pub fn to_scpi(self) -> &'static str {
        match self {
            TriggerMode::Auto   => "AUTO",
            TriggerMode::Normal => "NORM",
        }
    }
}

impl FromStr for TriggerMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO"           => Ok(TriggerMode::Auto),
            "NORM" | "NORMAL" => Ok(TriggerMode::Normal),
            x => Err(Error::Protocol(format!("Invalid value for trigger mode: {}", x))),
        }
    }
}

impl TriggerSlope {
    pub fn to_scpi(self) -> &'static str {
        match self {
            TriggerSlope::Positive => "POS",
            TriggerSlope::Negative => "NEG",
            TriggerSlope::Either   => "EITH",
        }
    }
}

impl TriggerSource {
    pub fn to_scpi(self) -> String {
        match self {
            TriggerSource::Channel(n) => format!("CH{}", n),
            TriggerSource::External   => "EXT".to_owned(),
            TriggerSource::Line       => "LINE".to_owned(),
        }
    }
}

impl FromStr for TriggerSource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_uppercase();
        match s.as_str() {
            "EXT" | "EXTERNANALOG" => return Ok(TriggerSource::External),
            "LINE"                 => return Ok(TriggerSource::Line),
            _ => {}
        }
        s.strip_prefix("CH")
            .and_then(|n| n.parse::<u8>().ok())
            .map(TriggerSource::Channel)
            .ok_or_else(|| Error::Protocol(format!("Invalid value for trigger source: {}", s)))
    }
}

impl WaveformFormat {
    pub fn to_scpi(self) -> &'static str {
        match self {
            WaveformFormat::Ascii  => "ASC",
            WaveformFormat::Real32 => "REAL,32",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel: u8,
    pub enabled: bool,
    pub range: f64,
    pub offset: f64,
    pub coupling: Coupling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerState {
    pub mode: TriggerMode,
    pub source: TriggerSource,
    pub level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub idn: Option<Idn>,
    pub options: Vec<String>,
    pub acquisition_time: f64,
    pub trigger: TriggerState,
    pub channels: Vec<ChannelState>,
}

/// `CHANn:DATA:HEAD?`: time of the first and last sample, record length, values per sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformHeader {
    pub x_start: f64,
    pub x_stop: f64,
    pub record_length: usize,
    pub values_per_sample: usize,
}

impl WaveformHeader {
    pub fn parse(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().split(',').map(|f| f.trim()).collect();
        if fields.len() != 4 {
            return Err(Error::Protocol(format!("Expected four fields in waveform header '{}'", s.trim())));
        }
        let bad = |f: &str| Error::Protocol(format!("Invalid waveform header field '{}'", f));
        Ok(WaveformHeader {
            x_start: fields[0].parse().map_err(|_| bad(fields[0]))?,
            x_stop: fields[1].parse().map_err(|_| bad(fields[1]))?,
            record_length: fields[2].parse().map_err(|_| bad(fields[2]))?,
            values_per_sample: fields[3].parse().map_err(|_| bad(fields[3]))?,
        })
    }
}

// Debug formatting keeps a decimal point ("5.0") and switches to exponent form for tiny values ("1e-9"),
// both of which are valid SCPI numbers
fn num(x: f64) -> String { format!("{:?}", x) }

fn parse_f64(s: &str) -> Result<f64> {
    s.trim().parse::<f64>().map_err(|_| Error::Protocol(format!("Unable to parse '{}' as a number", s.trim())))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_uppercase().as_str() {
        "1" | "ON"  => Ok(true),
        "0" | "OFF" => Ok(false),
        x => Err(Error::Protocol(format!("Unable to parse '{}' as ON/OFF", x))),
    }
}

pub fn chan_ok(n: u8) -> Result<()> {
    if n == 0 || n > MAX_CHANNELS { Err(Error::Channel(n)) } else { Ok(()) }
}

pub struct Rtb2000<T: Transport = Box<dyn Transport>> {
    inst: Instrument<T>,
}

impl Rtb2000 {
    pub fn new(resource: &str) -> Result<Self> {
        Self::from_instrument(Instrument::open(resource, true, false)?)
    }
}

impl<T: Transport> Rtb2000<T> {

    pub fn from_instrument(inst: Instrument<T>) -> Result<Self> {
        let model = inst.idn().map(|idn| idn.model.clone()).unwrap_or_default();
        if !SUPPORTED_FAMILIES.iter().any(|f| model.to_ascii_uppercase().starts_with(f)) {
            return Err(Error::UnexpectedModel(inst.idn_string().to_owned()));
        }
        Ok(Self { inst })
    }

    pub fn instrument(&mut self) -> &mut Instrument<T> { &mut self.inst }

    /// Four-channel models end in 4 (RTB2004, RTM3004, RTA4004)
    pub fn channel_count(&self) -> u8 {
        match self.inst.idn().and_then(|idn| idn.model.chars().last()) {
            Some('2') => 2,
            _ => MAX_CHANNELS,
        }
    }

    fn channel(&self, n: u8) -> Result<()> {
        chan_ok(n)?;
        if n > self.channel_count() { Err(Error::Channel(n)) } else { Ok(()) }
    }

    fn query_f64(&mut self, query: &str) -> Result<f64> {
        let resp = self.inst.query_str(query)?;
        parse_f64(&resp)
    }

    // Acquisition

    pub fn set_acquisition_time(&mut self, secs: f64) -> Result<()> {
        self.inst.write_str(&format!("TIM:ACQT {}", num(secs)))
    }

    pub fn get_acquisition_time(&mut self) -> Result<f64> { self.query_f64("TIM:ACQT?") }

    // Channels

    pub fn set_channel_range(&mut self, ch: u8, volts: f64) -> Result<()> {
        self.channel(ch)?;
        self.inst.write_str(&format!("CHAN{}:RANG {}", ch, num(volts)))
    }

    pub fn get_channel_range(&mut self, ch: u8) -> Result<f64> {
        self.channel(ch)?;
        self.query_f64(&format!("CHAN{}:RANG?", ch))
    }

    pub fn set_channel_offset(&mut self, ch: u8, volts: f64) -> Result<()> {
        self.channel(ch)?;
        self.inst.write_str(&format!("CHAN{}:OFFS {}", ch, num(volts)))
    }

    pub fn get_channel_offset(&mut self, ch: u8) -> Result<f64> {
        self.channel(ch)?;
        self.query_f64(&format!("CHAN{}:OFFS?", ch))
    }

    pub fn set_channel_coupling(&mut self, ch: u8, coupling: Coupling) -> Result<()> {
        self.channel(ch)?;
        self.inst.write_str(&format!("CHAN{}:COUP {}", ch, coupling.to_scpi()))
    }

    pub fn get_channel_coupling(&mut self, ch: u8) -> Result<Coupling> {
        self.channel(ch)?;
        self.inst.query_str(&format!("CHAN{}:COUP?", ch))?.parse()
    }

    pub fn set_channel_enabled(&mut self, ch: u8, on: bool) -> Result<()> {
        self.channel(ch)?;
        self.inst.write_str(&format!("CHAN{}:STAT {}", ch, if on { "ON" } else { "OFF" }))
    }

    pub fn get_channel_enabled(&mut self, ch: u8) -> Result<bool> {
        self.channel(ch)?;
        parse_bool(&self.inst.query_str(&format!("CHAN{}:STAT?", ch))?)
    }

    pub fn get_channel_state(&mut self, ch: u8) -> Result<ChannelState> {
        Ok(ChannelState {
            channel: ch,
            enabled: self.get_channel_enabled(ch)?,
            range: self.get_channel_range(ch)?,
            offset: self.get_channel_offset(ch)?,
            coupling: self.get_channel_coupling(ch)?,
        })
    }

    // Trigger

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<()> {
        self.inst.write_str(&format!("TRIG:A:MODE {}", mode.to_scpi()))
    }

    pub fn get_trigger_mode(&mut self) -> Result<TriggerMode> {
        self.inst.query_str("TRIG:A:MODE?")?.parse()
    }

    pub fn set_edge_trigger(&mut self, slope: TriggerSlope) -> Result<()> {
        self.inst.write_str(&format!("TRIG:A:TYPE EDGE;:TRIG:A:EDGE:SLOP {}", slope.to_scpi()))
    }

    pub fn set_trigger_source(&mut self, source: TriggerSource) -> Result<()> {
        if let TriggerSource::Channel(n) = source {
            self.channel(n)?;
        }
        self.inst.write_str(&format!("TRIG:A:SOUR {}", source.to_scpi()))
    }

    pub fn get_trigger_source(&mut self) -> Result<TriggerSource> {
        self.inst.query_str("TRIG:A:SOUR?")?.parse()
    }

    /// Trigger levels are kept per source channel
    pub fn set_trigger_level(&mut self, ch: u8, volts: f64) -> Result<()> {
        self.channel(ch)?;
        self.inst.write_str(&format!("TRIG:A:LEV{} {}", ch, num(volts)))
    }

    pub fn get_trigger_level(&mut self, ch: u8) -> Result<f64> {
        self.channel(ch)?;
        self.query_f64(&format!("TRIG:A:LEV{}?", ch))
    }

    // Capture

    pub fn single(&mut self) -> Result<()> { self.inst.write_str("SING") }

    /// Blocks on `*OPC?` until the armed acquisition completes, for at most `timeout`
    pub fn wait_for_acquisition(&mut self, timeout: Duration) -> Result<()> {
        let prev = self.inst.opc_timeout();
        self.inst.set_opc_timeout(timeout);
        let ans = self.inst.query_opc();
        self.inst.set_opc_timeout(prev);
        ans
    }

    pub fn fetch_waveform(&mut self, ch: u8, format: WaveformFormat) -> Result<Vec<f64>> {
        self.channel(ch)?;
        if format == WaveformFormat::Real32 {
            self.inst.set_bin_float_numbers_format(BinFloatFormat::Single4BytesLe);
        }

        let start = Instant::now();
        let query = format!("FORM {};:CHAN{}:DATA?", format.to_scpi(), ch);
        let ans = self.inst.query_bin_or_ascii_float_list(&query)?;
        info!("CH{}: {} points in {:?} format, query duration {:.3} s", ch, ans.len(), format, start.elapsed().as_secs_f64());
        Ok(ans)
    }

    pub fn waveform_header(&mut self, ch: u8) -> Result<WaveformHeader> {
        self.channel(ch)?;
        WaveformHeader::parse(&self.inst.query_str(&format!("CHAN{}:DATA:HEAD?", ch))?)
    }

    /// Samples paired with their time relative to the trigger
    pub fn transfer_waveform(&mut self, ch: u8, format: WaveformFormat) -> Result<Vec<(f64, f64)>> {
        let header = self.waveform_header(ch)?;
        let values = self.fetch_waveform(ch, format)?;
        Ok(time_axis(&header, values))
    }

    // Screenshot

    fn without_status_checking<R>(&mut self, f: impl FnOnce(&mut Instrument<T>) -> Result<R>) -> Result<R> {
        let checking = self.inst.instrument_status_checking();
        self.inst.set_instrument_status_checking(false);
        let ans = f(&mut self.inst);
        self.inst.set_instrument_status_checking(checking);
        ans
    }

    /// Saves a PNG hardcopy as `<instr_dir><name>.png` on the instrument and copies it to `pc_path`
    pub fn save_screenshot(&mut self, instr_dir: &str, name: &str, pc_path: impl AsRef<Path>) -> Result<usize> {
        let file = format!("{}.png", name);
        self.inst.write_str(&format!("MMEM:CDIR {}", scpi::quote(instr_dir)))?;

        // Deleting a file that isn't there queues an error, and an existing file makes HCOP:IMM fail
        self.without_status_checking(|inst| {
            inst.write_str(&format!("MMEM:DEL {}", scpi::quote(&file)))?;
            inst.query_opc()?;
            inst.clear_status()
        })?;

        // No extension here, the instrument appends one for the language
        self.inst.write_str(&format!("HCOP:LANG PNG;:MMEM:NAME {}", scpi::quote(name)))?;
        self.inst.write_str("HCOP:IMM")?;
        self.inst.query_opc()?;
        self.inst.read_file_from_instrument_to_pc(&file, pc_path)
    }

    pub fn get_full_state(&mut self) -> Result<State> {
        let acquisition_time = self.get_acquisition_time()?;

        let mode = self.get_trigger_mode()?;
        let source = self.get_trigger_source()?;
        let level = match source {
            TriggerSource::Channel(n) if n <= self.channel_count() => Some(self.get_trigger_level(n)?),
            _ => None,
        };

        let mut channels = vec![];
        for ch in 1..=self.channel_count() {
            channels.push(self.get_channel_state(ch)?);
        }

        Ok(State {
            idn: self.inst.idn().cloned(),
            options: self.inst.instrument_options().to_vec(),
            acquisition_time,
            trigger: TriggerState { mode, source, level },
            channels,
        })
    }

    pub fn close(&mut self) -> Result<()> { self.inst.close() }
}

pub fn time_axis(header: &WaveformHeader, values: Vec<f64>) -> Vec<(f64, f64)> {
    let per_sample = header.values_per_sample.max(1);
    let samples = values.len() / per_sample;
    if samples != header.record_length {
        warn!("Waveform has {} samples but the header announced {}", samples, header.record_length);
    }

    // The header's record length fixes the sample spacing, whatever arrived
    let grid = if header.record_length > 0 { header.record_length } else { samples };
    let dt = if grid > 0 { (header.x_stop - header.x_start) / grid as f64 } else { 0.0 };

    values.into_iter()
        .enumerate()
        .map(|(idx, v)| (header.x_start + (idx / per_sample) as f64 * dt, v))
        .collect()
}

// Not Yet Implemented
// ACQ:MODE       acquisition mode (sample, peak detect, high resolution)
// ACQ:AVER       averaging
// CHANn:BAND     bandwidth limit
// MEAS           automatic measurements
// TIM:SCAL       time scale (TIM:ACQT is used instead)
// TRIG:A:HOLD    trigger holdoff
// FORM UINT,8/16 integer waveform formats
// CHANn:DATA:POIN  record length selection
