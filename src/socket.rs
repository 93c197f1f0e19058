// Raw SCPI over a TCP socket (port 5025 on most instruments).  There is no framing besides the newline
// terminator, so binary blocks have to be read according to their own length header.

use std::io::{self, BufRead, BufReader, Error, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::str;
use std::time::Duration;

use log::{debug, info};

pub const DEFAULT_SCPI_PORT:u16 = 5025;

pub struct SocketClient {
    reader: BufReader<TcpStream>,
    timeout: Duration,
}

impl SocketClient {

    pub fn connect(host:&str, port:u16, timeout:Duration) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        info!("Connected raw SCPI socket to {}:{}", host, port);
        Ok(Self{ reader: BufReader::new(stream), timeout })
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    pub fn set_timeout(&mut self, timeout:Duration) -> io::Result<()> {
        self.timeout = timeout;
        self.reader.get_ref().set_read_timeout(Some(timeout))
    }

    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data)?;
        if data.last() != Some(&b'\n') {
            stream.write_all(b"\n")?;
        }
        stream.flush()
    }

    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        read_response(&mut self.reader)
    }

    pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
        self.write(data)?;
        self.read()
    }

    pub fn read_stb(&mut self) -> io::Result<u8> {
        let resp = self.ask(b"*STB?")?;
        str::from_utf8(&resp).ok()
            .and_then(|s| s.trim().parse::<u8>().ok())
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Unable to parse *STB? response"))
    }

    // A device clear needs an out-of-band channel that raw sockets don't have, so there is nothing to send
    pub fn clear(&mut self) -> io::Result<()> {
        debug!("Device clear is not available on a raw socket, skipping");
        Ok(())
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        self.reader.get_ref().shutdown(Shutdown::Both)
    }

}

// One response: either a newline-terminated line, or an IEEE 488.2 block plus its terminator
pub fn read_response<R: BufRead>(reader:&mut R) -> io::Result<Vec<u8>> {
    let first = match reader.fill_buf()?.first() {
        Some(b) => *b,
        None => return Err(Error::new(ErrorKind::UnexpectedEof, "Connection closed while waiting for a response")),
    };

    if first != b'#' {
        let mut line:Vec<u8> = vec![];
        reader.read_until(b'\n', &mut line)?;
        if line.last() != Some(&b'\n') {
            return Err(Error::new(ErrorKind::UnexpectedEof, "Connection closed in the middle of a response"));
        }
        return Ok(line);
    }

    let mut head = [0u8; 2];
    reader.read_exact(&mut head)?;
    let digits = (head[1] as char).to_digit(10)
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid block header"))? as usize;

    let mut ans:Vec<u8> = head.to_vec();
    if digits == 0 {
        // Indefinite-length block, terminated by the newline that ends the message
        reader.read_until(b'\n', &mut ans)?;
        return Ok(ans);
    }

    let mut len_bytes = vec![0u8; digits];
    reader.read_exact(&mut len_bytes)?;
    let len = str::from_utf8(&len_bytes).ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Invalid block length"))?;
    ans.extend_from_slice(&len_bytes);

    let start = ans.len();
    ans.resize(start + len, 0);
    reader.read_exact(&mut ans[start..])?;

    let mut term = [0u8; 1];
    reader.read_exact(&mut term)?;
    if term[0] != b'\n' {
        return Err(Error::new(ErrorKind::InvalidData, "Block not followed by a newline"));
    }
    ans.push(b'\n');

    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn line_response_stops_at_newline() {
        let mut rdr = Cursor::new(b"1\n0,\"No error\"\n".to_vec());
        assert_eq!(read_response(&mut rdr).unwrap(), b"1\n".to_vec());
        assert_eq!(read_response(&mut rdr).unwrap(), b"0,\"No error\"\n".to_vec());
    }

    #[test]
    fn block_with_embedded_newlines_is_read_whole() {
        let mut rdr = Cursor::new(b"#14\n\n\n\n\n1\n".to_vec());
        assert_eq!(read_response(&mut rdr).unwrap(), b"#14\n\n\n\n\n".to_vec());
        assert_eq!(read_response(&mut rdr).unwrap(), b"1\n".to_vec());
    }

    #[test]
    fn truncated_block_is_an_error() {
        let mut rdr = Cursor::new(b"#210abc".to_vec());
        assert!(read_response(&mut rdr).is_err());
    }

    #[test]
    fn closed_connection_is_eof() {
        let mut rdr = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_response(&mut rdr).unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }
}
