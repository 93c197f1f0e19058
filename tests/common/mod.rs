#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Error, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use rtb2000::transport::Transport;

pub const RTB2004_IDN: &str = "Rohde&Schwarz,RTB2004,1333.1005k04/102345,02.300\n";
pub const RTB2002_IDN: &str = "Rohde&Schwarz,RTB2002,1333.1005k02/100001,02.300\n";

#[derive(Default)]
pub struct FakeState {
    pub writes: Vec<String>,
    pub raw_writes: Vec<Vec<u8>>,
    pub responses: HashMap<String, Vec<u8>>,
    pub failing: HashSet<String>,
    pub error_queue: VecDeque<String>,
    pending: VecDeque<Vec<u8>>,
    pub stb_reads: usize,
    pub timeout: Duration,
    pub timeout_history: Vec<Duration>,
    pub closed: usize,
}

/// A scripted instrument.  Queries answer from `responses`, commands in `failing` queue an
/// error, unknown queries queue -113 and never answer, the way a real instrument would.
#[derive(Clone)]
pub struct FakeScope(pub Rc<RefCell<FakeState>>);

impl FakeScope {
    pub fn new(idn: &str) -> Self {
        let scope = FakeScope(Rc::new(RefCell::new(FakeState::default())));
        scope.0.borrow_mut().timeout = Duration::from_millis(3000);
        scope.respond("*IDN?", idn);
        scope.respond("*OPT?", "B1,K1\n");
        scope
    }

    pub fn rtb2004() -> Self { Self::new(RTB2004_IDN) }

    pub fn respond(&self, query: &str, resp: &str) {
        self.respond_bytes(query, resp.as_bytes().to_vec());
    }

    pub fn respond_bytes(&self, query: &str, resp: Vec<u8>) {
        self.0.borrow_mut().responses.insert(query.to_owned(), resp);
    }

    pub fn fail_on(&self, cmd: &str) {
        self.0.borrow_mut().failing.insert(cmd.to_owned());
    }

    pub fn writes(&self) -> Vec<String> { self.0.borrow().writes.clone() }

    /// Writes after the session's own `*IDN?` / `*OPT?` handshake
    pub fn commands(&self) -> Vec<String> { self.writes().into_iter().skip(2).collect() }

    pub fn state(&self) -> std::cell::Ref<'_, FakeState> { self.0.borrow() }
}

impl Transport for FakeScope {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        let text = String::from_utf8_lossy(data).into_owned();
        s.raw_writes.push(data.to_vec());
        s.writes.push(text.clone());

        if s.failing.contains(&text) {
            s.error_queue.push_back("-256,\"File name not found\"".to_owned());
        }

        if text == "*CLS" {
            s.error_queue.clear();
        } else if text == "SYST:ERR?" {
            let entry = s.error_queue.pop_front().unwrap_or_else(|| "0,\"No error\"".to_owned());
            s.pending.push_back(format!("{}\n", entry).into_bytes());
        } else if text.ends_with("*OPC?") {
            s.pending.push_back(b"1\n".to_vec());
        } else if let Some(resp) = s.responses.get(&text).cloned() {
            s.pending.push_back(resp);
        } else if text.contains('?') {
            s.error_queue.push_back("-113,\"Undefined header\"".to_owned());
        }

        Ok(())
    }

    fn read(&mut self) -> io::Result<Vec<u8>> {
        self.0.borrow_mut().pending.pop_front()
            .ok_or_else(|| Error::new(ErrorKind::TimedOut, "I/O timeout"))
    }

    fn read_stb(&mut self) -> io::Result<u8> {
        let mut s = self.0.borrow_mut();
        s.stb_reads += 1;
        Ok(if s.error_queue.is_empty() { 0 } else { 0x04 })
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        s.writes.push("<DCL>".to_owned());
        s.pending.clear();
        Ok(())
    }

    fn timeout(&self) -> Duration { self.0.borrow().timeout }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        s.timeout = timeout;
        s.timeout_history.push(timeout);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.borrow_mut().closed += 1;
        Ok(())
    }
}

pub fn real32_block(values: &[f32]) -> Vec<u8> {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let mut block = rtb2000::scpi::format_block(&data);
    block.push(b'\n');
    block
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("rtb2000_{}_{}", std::process::id(), name))
}
