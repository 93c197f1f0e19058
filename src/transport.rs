use std::io;
use std::time::Duration;

use log::warn;

use crate::resource::Resource;
use crate::socket::SocketClient;
use crate::vxi11::CoreClient;

/// Byte-level link to an instrument: whole messages out, whole responses in
pub trait Transport {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    fn read(&mut self) -> io::Result<Vec<u8>>;
    fn read_stb(&mut self) -> io::Result<u8>;
    fn clear(&mut self) -> io::Result<()>;
    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> { (**self).write(data) }
    fn read(&mut self) -> io::Result<Vec<u8>> { (**self).read() }
    fn read_stb(&mut self) -> io::Result<u8> { (**self).read_stb() }
    fn clear(&mut self) -> io::Result<()> { (**self).clear() }
    fn timeout(&self) -> Duration { (**self).timeout() }
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> { (**self).set_timeout(timeout) }
    fn close(&mut self) -> io::Result<()> { (**self).close() }
}

impl Transport for CoreClient {
    fn write(&mut self, data: &[u8]) -> io::Result<()> { CoreClient::write(self, data) }
    fn read(&mut self) -> io::Result<Vec<u8>> { CoreClient::read(self) }
    fn read_stb(&mut self) -> io::Result<u8> { CoreClient::read_stb(self) }
    fn clear(&mut self) -> io::Result<()> { CoreClient::clear(self) }
    fn timeout(&self) -> Duration { self.io_timeout() }
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> { self.set_io_timeout(timeout) }

    fn close(&mut self) -> io::Result<()> {
        if self.link().is_some() { self.destroy_link() } else { Ok(()) }
    }
}

impl Transport for SocketClient {
    fn write(&mut self, data: &[u8]) -> io::Result<()> { SocketClient::write(self, data) }
    fn read(&mut self) -> io::Result<Vec<u8>> { SocketClient::read(self) }
    fn read_stb(&mut self) -> io::Result<u8> { SocketClient::read_stb(self) }
    fn clear(&mut self) -> io::Result<()> { SocketClient::clear(self) }
    fn timeout(&self) -> Duration { SocketClient::timeout(self) }
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> { SocketClient::set_timeout(self, timeout) }
    fn close(&mut self) -> io::Result<()> { self.shutdown() }
}

pub fn open(resource: &Resource, timeout: Duration) -> io::Result<Box<dyn Transport>> {
    match resource {
        Resource::Vxi11 { host, device } => {
            let mut core = CoreClient::new(host)?;
            core.set_io_timeout(timeout)?;
            if let Err(e) = core.create_link(device) {
                warn!("Unable to create link to {} on {}: {}", device, host, e);
                return Err(e);
            }
            Ok(Box::new(core))
        }
        Resource::Socket { host, port } => Ok(Box::new(SocketClient::connect(host, *port, timeout)?)),
    }
}
