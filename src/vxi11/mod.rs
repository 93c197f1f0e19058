// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_READSTB:u32    = 13;
pub const DEVICE_TRIGGER:u32    = 14;
pub const DEVICE_CLEAR:u32      = 15;
pub const DEVICE_REMOTE:u32     = 16;
pub const DEVICE_LOCAL:u32      = 17;
pub const DEVICE_LOCK:u32       = 18;
pub const DEVICE_UNLOCK:u32     = 19;
pub const DEVICE_ENABLE_SRQ:u32 = 20;
pub const DEVICE_DOCMD:u32      = 22;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_DEVICE:&str = "inst0";
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;
pub const DEFAULT_IO_TIMEOUT_MS:u64 = 3000;

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Reason bits in a Device_ReadResp
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Upper bound on what a single DEVICE_READ asks for, the device may send less
pub const READ_CHUNK_SIZE:u32 = 1 << 20;

// The RPC io_timeout is enforced by the instrument, so the socket waits a bit longer than that before giving up
const SOCKET_TIMEOUT_MARGIN:Duration = Duration::from_secs(2);

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use log::{debug, info};

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Translate the error field common to every core channel response
pub fn device_error(code:i32) -> io::Result<()> {
    let msg = match code {
        0  => return Ok(()),
        1  => "Syntax error",
        3  => "Device not accessible",
        4  => "Invalid link identifier",
        5  => "Parameter error",
        6  => "Channel not established",
        8  => "Operation not supported",
        9  => "Out of resources",
        11 => "Device locked by another link",
        12 => "No lock held by this link",
        15 => return Err(Error::new(ErrorKind::TimedOut, "I/O timeout")),
        17 => "I/O error",
        21 => "Invalid address",
        23 => "Abort",
        29 => "Channel already established",
        _  => return Err(Error::new(ErrorKind::Other, format!("Unknown VXI-11 error code {}", code))),
    };
    Err(err(msg))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLinkParms {
    pub client_id: i32,
    pub lock_device: bool,
    pub lock_timeout: u32,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWriteParms {
    pub link: i32,
    pub io_timeout: u32,
    pub lock_timeout: u32,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReadParms {
    pub link: i32,
    pub request_size: u32,
    pub io_timeout: u32,
    pub lock_timeout: u32,
    pub flags: i32,
    pub term_char: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGenericParms {
    pub link: i32,
    pub flags: i32,
    pub lock_timeout: u32,
    pub io_timeout: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: i32,
    pub abort_port: u16,
    pub max_recv_size: u32,
}

pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout: Duration,
}

impl CoreClient {

    fn get_link(&self) -> io::Result<Link> {
        self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No link"))
    }

    fn io_timeout_ms(&self) -> u32 {
        self.io_timeout.as_millis().min(u32::MAX as u128) as u32
    }

    pub fn new(host:&str) -> io::Result<Self> {

        // Find the port to use for the core program
        let mut pmap_client = TcpPortMapperClient::new(host)?;

        let mapping = Mapping {
            program: DEVICE_CORE_PROG,
            version: DEVICE_CORE_VERS,
            protocol: Protocol::TCP,
            port: 0,
        };

        let port = pmap_client.get_port(&mapping)?;
        Self::connect_port(host, port)
    }

    // For instruments (and firewalls) where the core channel port is already known
    pub fn connect_port(host:&str, port:u16) -> io::Result<Self> {
        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS)?;
        let mut ans = CoreClient { client, opt_link: None, io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS) };
        ans.set_io_timeout(ans.io_timeout)?;
        Ok(ans)
    }

    pub fn link(&self) -> Option<Link> { self.opt_link }

    pub fn io_timeout(&self) -> Duration { self.io_timeout }

    pub fn set_io_timeout(&mut self, timeout:Duration) -> io::Result<()> {
        self.io_timeout = timeout;
        self.client.set_read_timeout(Some(timeout + SOCKET_TIMEOUT_MARGIN))
    }

    pub fn create_link(&mut self, device:&str) -> io::Result<()> {
        if self.opt_link.is_some() {
            return Err(err("Already connected to a link"));
        }

        let parms = CreateLinkParms {
            client_id: CLIENT_ID,
            lock_device: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            device: device.to_owned(),
        };

        self.client.start_call(CREATE_LINK)?;
        xdr_pack::pack_create_link_parms(&mut self.client.packer, &parms)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let abort_port:u32    = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        device_error(error)?;

        info!("VXI-11 link {} to device {} (max_recv_size={})", link_id, device, max_recv_size);
        self.opt_link = Some(Link{ link_id, abort_port: abort_port as u16, max_recv_size });
        Ok(())
    }

    pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
        self.write(data)?;
        self.read()
    }

    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let link = self.get_link()?;
        let chunk_size = if link.max_recv_size == 0 { data.len().max(1) } else { link.max_recv_size as usize };

        // A device may accept only part of a chunk; the rest is resent from where it stopped.
        // END goes on any call whose bytes reach the end of the message.
        let mut sent:usize = 0;
        loop {
            let stop = (sent + chunk_size).min(data.len());
            let piece = &data[sent..stop];
            let accepted = self.write_chunk(link.link_id, piece, stop == data.len())?;

            if accepted > piece.len() {
                return Err(err("Device confirmed more bytes than were sent"));
            }
            if accepted == 0 && !piece.is_empty() {
                return Err(err("Device accepted none of the bytes sent"));
            }
            if accepted < piece.len() {
                debug!("VXI-11 device accepted {} of {} bytes", accepted, piece.len());
            }

            sent += accepted;
            if sent == data.len() {
                return Ok(());
            }
        }
    }

    // One DEVICE_WRITE, returning the number of bytes the device accepted
    fn write_chunk(&mut self, link_id:i32, chunk:&[u8], end:bool) -> io::Result<usize> {
        let parms = DeviceWriteParms {
            link: link_id,
            io_timeout: self.io_timeout_ms(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            flags: if end { OPERATION_FLAGS_END_ONLY } else { 0 },
        };

        self.client.start_call(DEVICE_WRITE)?;
        xdr_pack::pack_device_write_parms(&mut self.client.packer, &parms, chunk)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;

        device_error(error)?;

        Ok(size as usize)
    }

    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let link = self.get_link()?;
        let mut ans:Vec<u8> = vec![];

        loop {
            let parms = DeviceReadParms {
                link: link.link_id,
                request_size: READ_CHUNK_SIZE,
                io_timeout: self.io_timeout_ms(),
                lock_timeout: DEFAULT_LOCK_TIMEOUT,
                flags: 0,
                term_char: 0,
            };

            self.client.start_call(DEVICE_READ)?;
            xdr_pack::pack_device_read_parms(&mut self.client.packer, &parms)?;
            self.client.do_call()?;

            let error:i32  = self.client.unpacker.unpack_i32()?;
            let reason:i32 = self.client.unpacker.unpack_i32()?;
            let data       = self.client.unpacker.unpack_variable_len_opaque()?;

            device_error(error)?;

            if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
                return Err(err("Bits in reason code that should be zero aren't zero"));
            }

            ans.extend_from_slice(&data);

            // Without END the device has more to send; REQCNT alone means our request size was the limit
            if reason & (REASON_END | REASON_CHR) != 0 {
                debug!("VXI-11 read {} bytes", ans.len());
                return Ok(ans);
            }
        }
    }

    fn generic_call(&mut self, prc:u32) -> io::Result<()> {
        let link = self.get_link()?;
        let parms = DeviceGenericParms {
            link: link.link_id,
            flags: 0,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            io_timeout: self.io_timeout_ms(),
        };

        self.client.start_call(prc)?;
        xdr_pack::pack_device_generic_parms(&mut self.client.packer, &parms)?;
        self.client.do_call()
    }

    pub fn read_stb(&mut self) -> io::Result<u8> {
        self.generic_call(DEVICE_READSTB)?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let stb:u32   = self.client.unpacker.unpack_u32()?;
        device_error(error)?;

        Ok((stb & 0xff) as u8)
    }

    pub fn clear(&mut self) -> io::Result<()> {
        self.generic_call(DEVICE_CLEAR)?;
        device_error(self.client.unpacker.unpack_i32()?)
    }

    pub fn destroy_link(&mut self) -> io::Result<()> {
        let link = self.get_link()?;

        self.client.start_call(DESTROY_LINK)?;
        self.client.packer.pack_i32(link.link_id)?;
        self.client.do_call()?;

        // The link is gone from our side whatever the device says
        self.opt_link = None;
        device_error(self.client.unpacker.unpack_i32()?)?;

        info!("VXI-11 link {} destroyed", link.link_id);
        Ok(())
    }

}
