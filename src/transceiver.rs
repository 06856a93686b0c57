//! AT command handshake with the SA868 transceiver module.
//!
//! The module listens on a 9600 baud UART for `\r\n`-terminated commands and answers each
//! with a short `+DMO...:<status>` line. The beacon sends the three configuration commands
//! once at startup and never talks to the module again.

use crate::engine::Clock;
use crate::engine::sim::SimSerial;
use crate::model::config::{Bandwidth, RadioConfig};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

pub const BAUD_RATE: u32 = 9600;

/// Largest acknowledgement read back after a command.
pub const RESPONSE_LIMIT: usize = 64;

/// How long a response read may block.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

pub const DEFAULT_SETTLE_MS: f64 = 100.0;
pub const CONNECT_SETTLE_MS: f64 = 500.0;

pub const MIN_VOLUME: u8 = 1;
pub const MAX_VOLUME: u8 = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    /// Bandwidth, transmit/receive frequency in MHz and squelch. Subtones are left off.
    SetGroup {
        bandwidth: Bandwidth,
        tx_mhz: f64,
        rx_mhz: f64,
        squelch: u8,
    },
    SetVolume(u8),
}

impl Command {
    /// Same frequency for transmit and receive.
    pub fn set_group(config: &RadioConfig) -> Self {
        Command::SetGroup {
            bandwidth: config.bandwidth,
            tx_mhz: config.frequency_mhz,
            rx_mhz: config.frequency_mhz,
            squelch: config.squelch,
        }
    }

    pub fn set_volume(volume: u8) -> Self {
        Command::SetVolume(volume.clamp(MIN_VOLUME, MAX_VOLUME))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "AT+DMOCONNECT"),
            Command::SetGroup {
                bandwidth,
                tx_mhz,
                rx_mhz,
                squelch,
            } => write!(
                f,
                "AT+DMOSETGROUP={},{:.4},{:.4},0000,{},0000",
                bandwidth.code(),
                tx_mhz,
                rx_mhz,
                squelch
            ),
            Command::SetVolume(volume) => write!(f, "AT+DMOSETVOLUME={}", volume),
        }
    }
}

/// Open a TCP serial bridge (e.g. ser2net) whose far end is the SA868's UART at
/// [`BAUD_RATE`]. Reads time out after [`READ_TIMEOUT`].
pub fn connect_bridge(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .with_context(|| format!("Failed to connect to serial bridge at {}", addr))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true)?;

    info!("connected to serial bridge at {}", addr);
    Ok(stream)
}

/// Anything that can carry the module's UART traffic.
pub trait SerialLink: Read + Write {}

impl<T: Read + Write> SerialLink for T {}

/// The TCP bridge at `addr` when given, otherwise a simulated SA868.
pub fn open_link(addr: Option<&str>) -> Result<Box<dyn SerialLink>> {
    match addr {
        Some(addr) => Ok(Box::new(connect_bridge(addr)?)),
        None => {
            info!("No serial bridge given, using a simulated SA868..!");
            Ok(Box::new(SimSerial::sa868()))
        }
    }
}

/// Sole owner of the serial link to the module.
pub struct Transceiver<L: Read + Write> {
    link: L,
}

impl<L: Read + Write> Transceiver<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Write `text` plus `\r\n`, wait `settle_ms`, then read whatever acknowledgement arrived
    /// (up to [`RESPONSE_LIMIT`] bytes). A missing answer is only a warning; the module's
    /// reply is never checked for success.
    pub fn send_command<C: Clock>(
        &mut self,
        clock: &mut C,
        text: &str,
        settle_ms: f64,
    ) -> Result<Option<String>> {
        debug!("sending command: '{}'", text);
        self.link
            .write_all(format!("{}\r\n", text).as_bytes())
            .with_context(|| format!("Failed to send '{}'", text))?;
        self.link.flush()?;

        clock.sleep_ms(settle_ms);

        let mut buf = [0u8; RESPONSE_LIMIT];
        let n = match self.link.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read reply to '{}'", text)),
        };

        if n == 0 {
            warn!("no response to '{}'", text);
            return Ok(None);
        }

        let response = String::from_utf8_lossy(&buf[..n]).trim().to_owned();
        debug!("received response: '{}'", response);

        Ok(Some(response))
    }

    pub fn send<C: Clock>(&mut self, clock: &mut C, command: &Command) -> Result<Option<String>> {
        let settle_ms = match command {
            Command::Connect => CONNECT_SETTLE_MS,
            _ => DEFAULT_SETTLE_MS,
        };

        self.send_command(clock, &command.to_string(), settle_ms)
    }

    /// The one-time startup handshake: connect, channel group, volume.
    pub fn configure<C: Clock>(&mut self, clock: &mut C, config: &RadioConfig) -> Result<()> {
        info!(
            "configuring transceiver: {:.4} MHz, bandwidth {:?}, squelch {}, volume {}",
            config.frequency_mhz, config.bandwidth, config.squelch, config.volume
        );

        self.send(clock, &Command::Connect)?;
        self.send(clock, &Command::set_group(config))?;
        self.send(clock, &Command::set_volume(config.volume))?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::sim::{Activity, Recorder, SimClock};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn command_text() {
        let config = RadioConfig::default();

        assert_eq!(Command::Connect.to_string(), "AT+DMOCONNECT");
        assert_eq!(
            Command::set_group(&config).to_string(),
            "AT+DMOSETGROUP=1,146.5650,146.5650,0000,3,0000"
        );
        assert_eq!(Command::set_volume(5).to_string(), "AT+DMOSETVOLUME=5");
    }

    #[test]
    fn volume_is_clamped() {
        assert_eq!(Command::set_volume(12), Command::SetVolume(8));
        assert_eq!(Command::set_volume(0), Command::SetVolume(1));
        assert_eq!(Command::set_volume(12).to_string(), "AT+DMOSETVOLUME=8");
    }

    #[test]
    fn narrow_band_group() {
        let config = RadioConfig {
            frequency_mhz: 433.5,
            bandwidth: Bandwidth::Narrow,
            squelch: 0,
            ..RadioConfig::default()
        };

        assert_eq!(
            Command::set_group(&config).to_string(),
            "AT+DMOSETGROUP=0,433.5000,433.5000,0000,0,0000"
        );
    }

    #[test]
    fn startup_handshake() {
        env_logger::try_init().unwrap_or(());

        let recorder = Recorder::new();
        let mut clock = SimClock::new(recorder.clone());
        let mut radio = Transceiver::new(SimSerial::sa868());
        let config = RadioConfig {
            volume: 12,
            ..RadioConfig::default()
        };

        radio.configure(&mut clock, &config).unwrap();

        assert_eq!(
            radio.link().commands(),
            [
                "AT+DMOCONNECT",
                "AT+DMOSETGROUP=1,146.5650,146.5650,0000,3,0000",
                "AT+DMOSETVOLUME=8",
            ]
        );
        assert_eq!(
            recorder.activity(),
            vec![
                Activity::Slept { ms: 500.0 },
                Activity::Slept { ms: 100.0 },
                Activity::Slept { ms: 100.0 },
            ]
        );
    }

    #[test]
    fn reply_is_returned() {
        let mut clock = SimClock::default();
        let mut radio = Transceiver::new(SimSerial::sa868());

        let reply = radio.send(&mut clock, &Command::Connect).unwrap();
        assert_eq!(reply.as_deref(), Some("+DMOCONNECT:0"));
    }

    #[test]
    fn silence_is_not_an_error() {
        let mut clock = SimClock::default();
        let mut radio = Transceiver::new(SimSerial::silent());

        assert_eq!(radio.send_command(&mut clock, "AT+DMOCONNECT", 10.0).unwrap(), None);
        radio.configure(&mut clock, &RadioConfig::default()).unwrap();
        assert_eq!(radio.into_inner().commands().len(), 4);
    }

    #[test]
    fn bridge_reads_time_out() {
        env_logger::try_init().unwrap_or(());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (heard_tx, heard_rx) = mpsc::channel::<String>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        // Acknowledges the first command, then goes quiet without closing the socket.
        let module = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];

            let n = stream.read(&mut buf).unwrap();
            heard_tx.send(String::from_utf8_lossy(&buf[..n]).into_owned()).unwrap();
            stream.write_all(b"+DMOCONNECT:0\r\n").unwrap();

            let n = stream.read(&mut buf).unwrap();
            heard_tx.send(String::from_utf8_lossy(&buf[..n]).into_owned()).unwrap();
            done_rx.recv().unwrap();
        });

        let mut clock = SimClock::default();
        let mut radio = Transceiver::new(connect_bridge(&addr).unwrap());

        let reply = radio.send_command(&mut clock, "AT+DMOCONNECT", 0.0).unwrap();
        assert_eq!(reply.as_deref(), Some("+DMOCONNECT:0"));
        assert_eq!(heard_rx.recv().unwrap(), "AT+DMOCONNECT\r\n");

        let started = Instant::now();
        let reply = radio.send_command(&mut clock, "AT+DMOSETVOLUME=5", 0.0).unwrap();
        let waited = started.elapsed();

        assert_eq!(reply, None);
        assert!(waited >= READ_TIMEOUT - Duration::from_millis(50), "gave up after {:?}", waited);
        assert!(waited < READ_TIMEOUT * 3, "blocked for {:?}", waited);
        assert_eq!(heard_rx.recv().unwrap(), "AT+DMOSETVOLUME=5\r\n");

        done_tx.send(()).unwrap();
        module.join().unwrap();
    }

    #[test]
    fn unreachable_bridge_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(connect_bridge(&addr).is_err());
        assert!(open_link(Some(&addr)).is_err());
    }

    #[test]
    fn simulated_link_by_default() {
        let mut clock = SimClock::default();
        let mut radio = Transceiver::new(open_link(None).unwrap());

        radio.configure(&mut clock, &RadioConfig::default()).unwrap();
        let reply = radio.send(&mut clock, &Command::set_volume(3)).unwrap();
        assert_eq!(reply.as_deref(), Some("+DMOSETVOLUME:0"));
    }

    struct BrokenLink;

    impl Read for BrokenLink {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    impl Write for BrokenLink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_reported() {
        let mut clock = SimClock::default();
        let mut radio = Transceiver::new(BrokenLink);

        assert!(radio.configure(&mut clock, &RadioConfig::default()).is_err());
    }
}
