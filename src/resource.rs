// VISA resource strings for the LAN transports this crate speaks

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::vxi11::DEFAULT_DEVICE;

lazy_static! {
    static ref INSTR_RE: Regex  = Regex::new(r"(?i)^TCPIP\d*::([^:]+)(?:::([^:]+))?::INSTR$").unwrap();
    static ref SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(\d+)::SOCKET$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// `TCPIP::<host>[::<device>]::INSTR`, the device name defaults to `inst0`
    Vxi11 { host: String, device: String },
    /// `TCPIP::<host>::<port>::SOCKET`
    Socket { host: String, port: u16 },
}

impl Resource {
    pub fn host(&self) -> &str {
        match self {
            Resource::Vxi11 { host, .. } | Resource::Socket { host, .. } => host,
        }
    }
}

impl FromStr for Resource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(cap) = INSTR_RE.captures(s) {
            let host = cap[1].to_owned();
            let device = cap.get(2).map(|m| m.as_str().to_owned()).unwrap_or_else(|| DEFAULT_DEVICE.to_owned());
            if device.to_ascii_lowercase().starts_with("hislip") {
                return Err(Error::Resource(format!("HiSLIP is not supported: {}", s)));
            }
            return Ok(Resource::Vxi11 { host, device });
        }

        if let Some(cap) = SOCKET_RE.captures(s) {
            let port = cap[2].parse::<u16>()
                .map_err(|_| Error::Resource(format!("Port out of range in {}", s)))?;
            return Ok(Resource::Socket { host: cap[1].to_owned(), port });
        }

        Err(Error::Resource(format!("Unrecognised VISA resource string: {}", s)))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Vxi11 { host, device } => write!(f, "TCPIP::{}::{}::INSTR", host, device),
            Resource::Socket { host, port } => write!(f, "TCPIP::{}::{}::SOCKET", host, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instr_defaults_to_inst0() {
        let r: Resource = "TCPIP::192.168.2.10::INSTR".parse().unwrap();
        assert_eq!(r, Resource::Vxi11 { host: "192.168.2.10".into(), device: "inst0".into() });
        assert_eq!(r.to_string(), "TCPIP::192.168.2.10::inst0::INSTR");
    }

    #[test]
    fn board_number_and_device_are_accepted() {
        let r: Resource = "tcpip0::rtb2004.lab::inst1::instr".parse().unwrap();
        assert_eq!(r, Resource::Vxi11 { host: "rtb2004.lab".into(), device: "inst1".into() });
    }

    #[test]
    fn socket_resource() {
        let r: Resource = "TCPIP::10.0.0.5::5025::SOCKET".parse().unwrap();
        assert_eq!(r, Resource::Socket { host: "10.0.0.5".into(), port: 5025 });
        assert_eq!(r.host(), "10.0.0.5");
    }

    #[test]
    fn unsupported_resources_are_rejected() {
        assert!("USB0::0x0AAD::0x01D6::123456::INSTR".parse::<Resource>().is_err());
        assert!("TCPIP::10.0.0.5::hislip0::INSTR".parse::<Resource>().is_err());
        assert!("TCPIP::10.0.0.5::99999::SOCKET".parse::<Resource>().is_err());
    }
}
