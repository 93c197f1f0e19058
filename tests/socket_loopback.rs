use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtb2000::scpi::format_block;
use rtb2000::socket::SocketClient;
use rtb2000::Instrument;

// Line-based SCPI server; returns every line it received once the client hangs up
fn spawn_server() -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        let mut seen = vec![];

        for line in reader.lines() {
            let line = match line { Ok(l) => l, Err(_) => break };
            let resp: Vec<u8> = match line.as_str() {
                "*IDN?" => b"Rohde&Schwarz,RTA4004,1335.7700k04/100123,01.400\n".to_vec(),
                "*OPT?" => b"0\n".to_vec(),
                "*STB?" => b"0\n".to_vec(),
                "FORM REAL,32;:CHAN1:DATA?" => {
                    // The second sample's low byte is 0x0a, a newline inside the block
                    let data: Vec<u8> = [1.0f32, f32::from_bits(0x3f80_000a)].iter().flat_map(|v| v.to_le_bytes()).collect();
                    let mut block = format_block(&data);
                    block.push(b'\n');
                    block
                }
                _ => vec![],
            };
            seen.push(line);
            writer.write_all(&resp).unwrap();
        }

        seen
    });

    (port, handle)
}

#[test]
fn binary_block_over_raw_socket() {
    let (port, server) = spawn_server();
    let client = SocketClient::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();

    {
        let mut inst = Instrument::with_transport(client, true, false).unwrap();
        assert_eq!(inst.idn().unwrap().model, "RTA4004");
        assert!(inst.instrument_options().is_empty());

        let trace = inst.query_bin_or_ascii_float_list("FORM REAL,32;:CHAN1:DATA?").unwrap();
        assert_eq!(trace, vec![1.0, f32::from_bits(0x3f80_000a) as f64]);
        inst.close().unwrap();
    }

    let seen = server.join().unwrap();
    assert_eq!(seen, vec!["*IDN?", "*OPT?", "FORM REAL,32;:CHAN1:DATA?", "*STB?"]);
}
