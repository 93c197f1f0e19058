use std::fs;
use std::path::Path;
use std::str;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, InstrumentError, Result};
use crate::resource::Resource;
use crate::scpi::{self, BinFloatFormat, Idn};
use crate::transport::{self, Transport};

pub const DEFAULT_VISA_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_OPC_TIMEOUT_MS: u64 = 15000;

// Status byte bit 2: error/event queue not empty
pub const STB_ERROR_QUEUE: u8 = 0x04;

// A queue that never empties means something other than SYST:ERR? is answering
const MAX_ERROR_QUEUE_READS: usize = 100;

/// An SCPI session with one instrument.
///
/// Every write and query is followed by a status byte check when
/// `instrument_status_checking` is on; any errors found in the instrument's
/// error queue are drained and returned as [`Error::InstrumentStatus`].
pub struct Instrument<T: Transport = Box<dyn Transport>> {
    transport: T,
    opc_timeout: Duration,
    instrument_status_checking: bool,
    bin_float_numbers_format: BinFloatFormat,
    idn_string: String,
    idn: Option<Idn>,
    options: Vec<String>,
    closed: bool,
}

impl Instrument {
    /// Opens a session from a VISA resource string such as `TCPIP::192.168.2.10::INSTR`
    pub fn open(resource: &str, id_query: bool, reset: bool) -> Result<Self> {
        let resource: Resource = resource.parse()?;
        Self::open_resource(&resource, id_query, reset, Duration::from_millis(DEFAULT_VISA_TIMEOUT_MS))
    }

    pub fn open_resource(resource: &Resource, id_query: bool, reset: bool, visa_timeout: Duration) -> Result<Self> {
        info!("Opening session to {}", resource);
        let transport = transport::open(resource, visa_timeout)?;
        Self::with_transport(transport, id_query, reset)
    }
}

impl<T: Transport> Instrument<T> {

    pub fn with_transport(transport: T, id_query: bool, reset: bool) -> Result<Self> {
        let mut ans = Instrument {
            transport,
            opc_timeout: Duration::from_millis(DEFAULT_OPC_TIMEOUT_MS),
            instrument_status_checking: true,
            bin_float_numbers_format: BinFloatFormat::default(),
            idn_string: String::new(),
            idn: None,
            options: vec![],
            closed: false,
        };

        ans.idn_string = text(&ans.query_raw("*IDN?")?)?;
        match Idn::parse(&ans.idn_string) {
            Ok(idn) => ans.idn = Some(idn),
            Err(e) if id_query => return Err(e),
            Err(e) => warn!("{}", e),
        }

        match ans.query_raw("*OPT?").and_then(|r| text(&r)) {
            Ok(opts) => ans.options = scpi::parse_options(&opts),
            Err(e) => warn!("Unable to read instrument options: {}", e),
        }

        info!("Connected to {}", ans.idn_string);

        if reset {
            ans.reset()?;
        }

        Ok(ans)
    }

    pub fn idn_string(&self) -> &str { &self.idn_string }
    pub fn idn(&self) -> Option<&Idn> { self.idn.as_ref() }
    pub fn instrument_options(&self) -> &[String] { &self.options }

    pub fn transport(&self) -> &T { &self.transport }

    pub fn visa_timeout(&self) -> Duration { self.transport.timeout() }

    pub fn set_visa_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.transport.set_timeout(timeout)?;
        Ok(())
    }

    pub fn opc_timeout(&self) -> Duration { self.opc_timeout }
    pub fn set_opc_timeout(&mut self, timeout: Duration) { self.opc_timeout = timeout; }

    pub fn instrument_status_checking(&self) -> bool { self.instrument_status_checking }
    pub fn set_instrument_status_checking(&mut self, on: bool) { self.instrument_status_checking = on; }

    pub fn bin_float_numbers_format(&self) -> BinFloatFormat { self.bin_float_numbers_format }
    pub fn set_bin_float_numbers_format(&mut self, format: BinFloatFormat) { self.bin_float_numbers_format = format; }

    fn query_raw(&mut self, query: &str) -> Result<Vec<u8>> {
        debug!("> {}", query);
        self.transport.write(query.as_bytes())?;
        let resp = self.transport.read()?;
        debug!("< {} bytes", resp.len());
        Ok(resp)
    }

    fn after(&mut self, context: &str) -> Result<()> {
        if self.instrument_status_checking { self.check_status_after(context) } else { Ok(()) }
    }

    // Runs `f` with the transport timeout temporarily raised to the OPC timeout
    fn with_opc_timeout<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let prev = self.transport.timeout();
        self.transport.set_timeout(self.opc_timeout)?;
        let ans = f(self);
        let restored = self.transport.set_timeout(prev);
        let ans = ans?;
        restored?;
        Ok(ans)
    }

    /// Reads every pending entry from the error queue
    pub fn drain_error_queue(&mut self) -> Result<Vec<InstrumentError>> {
        let mut errors = vec![];
        for _ in 0..MAX_ERROR_QUEUE_READS {
            let entry = scpi::parse_error_entry(&text(&self.query_raw("SYST:ERR?")?)?)?;
            if entry.code == 0 {
                return Ok(errors);
            }
            warn!("Instrument error {}", entry);
            errors.push(entry);
        }
        Err(Error::Protocol(format!("Error queue still not empty after {} reads", MAX_ERROR_QUEUE_READS)))
    }

    pub fn check_status(&mut self) -> Result<()> {
        self.check_status_after("status check")
    }

    fn check_status_after(&mut self, context: &str) -> Result<()> {
        let stb = self.transport.read_stb()?;
        if stb & STB_ERROR_QUEUE == 0 {
            return Ok(());
        }

        let errors = self.drain_error_queue()?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InstrumentStatus { context: context.to_owned(), errors })
        }
    }

    pub fn write_str(&mut self, cmd: &str) -> Result<()> {
        debug!("> {}", cmd);
        self.transport.write(cmd.as_bytes())?;
        self.after(cmd)
    }

    pub fn query_str(&mut self, query: &str) -> Result<String> {
        let resp = self.query_raw(query)?;
        self.after(query)?;
        text(&resp)
    }

    pub fn query_bin_block(&mut self, query: &str) -> Result<Vec<u8>> {
        let resp = self.query_raw(query)?;
        self.after(query)?;
        Ok(scpi::parse_block(&resp)?.to_vec())
    }

    /// Sends `cmd` followed by an arbitrary block holding `data`
    pub fn write_bin_block(&mut self, cmd: &str, data: &[u8]) -> Result<()> {
        debug!("> {}<{} bytes>", cmd, data.len());
        let mut msg = cmd.as_bytes().to_vec();
        msg.extend_from_slice(&scpi::format_block(data));
        self.transport.write(&msg)?;
        self.after(cmd)
    }

    /// The response decides the decoding: a block is read as binary floats in
    /// `bin_float_numbers_format`, anything else as comma-separated ASCII.
    pub fn query_bin_or_ascii_float_list(&mut self, query: &str) -> Result<Vec<f64>> {
        let start = Instant::now();
        let resp = self.query_raw(query)?;
        self.after(query)?;

        let ans = if resp.first() == Some(&b'#') {
            scpi::decode_binary_floats(scpi::parse_block(&resp)?, self.bin_float_numbers_format)?
        } else {
            scpi::parse_ascii_floats(&text(&resp)?)?
        };

        debug!("{} floats from '{}' in {:.3} s", ans.len(), query, start.elapsed().as_secs_f64());
        Ok(ans)
    }

    /// `*OPC?`, waiting up to the OPC timeout for pending operations to finish
    pub fn query_opc(&mut self) -> Result<()> {
        let resp = self.with_opc_timeout(|s| s.query_str("*OPC?"))?;
        expect_opc(&resp)
    }

    pub fn write_str_with_opc(&mut self, cmd: &str) -> Result<()> {
        let query = format!("{};*OPC?", cmd);
        let resp = self.with_opc_timeout(|s| s.query_str(&query))?;
        expect_opc(&resp)
    }

    pub fn clear_status(&mut self) -> Result<()> {
        self.transport.clear()?;
        self.write_str("*CLS")?;
        self.query_opc()
    }

    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting instrument");
        self.write_str("*RST")?;
        self.query_opc()
    }

    /// Copies a file from the instrument's mass storage to `pc_path`, returning its size
    pub fn read_file_from_instrument_to_pc(&mut self, instr_path: &str, pc_path: impl AsRef<Path>) -> Result<usize> {
        let query = format!("MMEM:DATA? {}", scpi::quote(instr_path));
        let data = self.with_opc_timeout(|s| s.query_bin_block(&query))?;
        fs::write(pc_path.as_ref(), &data)?;
        info!("Copied instrument file {} to {} ({} bytes)", instr_path, pc_path.as_ref().display(), data.len());
        Ok(data.len())
    }

    pub fn send_file_from_pc_to_instrument(&mut self, pc_path: impl AsRef<Path>, instr_path: &str) -> Result<usize> {
        let data = fs::read(pc_path.as_ref())?;
        let cmd = format!("MMEM:DATA {},", scpi::quote(instr_path));
        self.with_opc_timeout(|s| s.write_bin_block(&cmd, &data))?;
        info!("Copied {} to instrument file {} ({} bytes)", pc_path.as_ref().display(), instr_path, data.len());
        Ok(data.len())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.transport.close()?;
        info!("Session closed");
        Ok(())
    }
}

impl<T: Transport> Drop for Instrument<T> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.transport.close() {
                warn!("Unable to close instrument session: {}", e);
            }
        }
    }
}

fn text(resp: &[u8]) -> Result<String> {
    str::from_utf8(resp)
        .map(|s| s.trim_end_matches(&['\n', '\r'][..]).to_owned())
        .map_err(|_| Error::Protocol("Unable to parse response as UTF-8".into()))
}

fn expect_opc(resp: &str) -> Result<()> {
    if resp.trim() == "1" {
        Ok(())
    } else {
        Err(Error::Protocol(format!("Expected '1' from *OPC? but got '{}'", resp.trim())))
    }
}
