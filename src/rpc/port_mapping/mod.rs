pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_NULL:u32    = 0;     // (void) -> void
pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::net::ToSocketAddrs;

use log::debug;

use super::{IPPROTO_TCP, IPPROTO_UDP};
use super::xdr_pack;
use super::tcp_clients::TcpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	TCP,
	UDP,
}

impl Protocol {
	pub fn to_u32(self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
		Protocol::UDP => IPPROTO_UDP,
	}}
}

#[derive(Debug, Clone)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,				// XDR encodes it as a u32 for alignment
}

pub struct TcpPortMapperClient {
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str) -> io::Result<Self> {
		Self::connect((host, PMAP_PORT))
	}

	pub fn connect<A: ToSocketAddrs>(addr:A) -> io::Result<Self> {
		let tcp_client = TcpClient::connect(addr, PMAP_PROG, PMAP_VERS)?;
		Ok(Self{ tcp_client })
	}

	pub fn null(&mut self) -> io::Result<()> {
		self.tcp_client.start_call(PMAPPROC_NULL)?;
		self.tcp_client.do_call()
	}

	// A port of zero means the program isn't registered
	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.tcp_client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.tcp_client.do_call()?;

		let ans:u32 = self.tcp_client.unpacker.unpack_u32()?;

		if !self.tcp_client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		match ans {
			0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} v{} is not registered with the port mapper", m.program, m.version))),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, format!("Port mapper returned an out of range port {}", p))),
			p => {
				debug!("Port mapper: program {:#x} v{} on port {}", m.program, m.version, p);
				Ok(p as u16)
			}
		}
	}

}
