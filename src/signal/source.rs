// Source adapters - turn a device byte stream into samples
//
// Wire format is one reading per line: `raw,filtered[,...]\n`. Anything that
// does not start with two numbers is dropped. Read problems after connect
// never surface as errors; they show up as `None` and in `LinkStats`.

use super::Sample;
use crate::error::{log_connect_error, ConnectError};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Counters kept by a link since it was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub samples: u64,
    pub malformed: u64,
    pub io_errors: u64,
    /// Samples lost between a reader thread and the pipeline
    pub dropped: u64,
}

/// An open source of samples
pub trait SampleLink: Send {
    /// Next sample if one is available without waiting past the link's own
    /// read timeout
    fn read_sample(&mut self) -> Option<Sample>;

    fn stats(&self) -> LinkStats {
        LinkStats::default()
    }

    /// True once no further samples will ever arrive
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<L: SampleLink + ?Sized> SampleLink for Box<L> {
    fn read_sample(&mut self) -> Option<Sample> {
        (**self).read_sample()
    }

    fn stats(&self) -> LinkStats {
        (**self).stats()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Something that can open a `SampleLink`
pub trait SampleConnector {
    type Link: SampleLink;

    fn connect(&self) -> Result<Self::Link, ConnectError>;
}

/// Parse `raw,filtered` from one protocol line
///
/// Extra comma-separated fields are ignored. Non-finite values are rejected.
pub fn parse_line(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.trim().split(',');
    let raw = fields.next()?.trim().parse::<f64>().ok()?;
    let filtered = fields.next()?.trim().parse::<f64>().ok()?;
    if raw.is_finite() && filtered.is_finite() {
        Some((raw, filtered))
    } else {
        None
    }
}

/// Longest accepted protocol line, newline excluded
pub const MAX_LINE_LEN: usize = 256;

/// Line-protocol link over any buffered reader
///
/// A partial line left behind by a read timeout is kept and completed by
/// the next call. Lines longer than `MAX_LINE_LEN` are discarded up to their
/// newline and counted as malformed.
pub struct LineLink<R> {
    reader: R,
    pending: Vec<u8>,
    overflowed: bool,
    stats: LinkStats,
    exhausted: bool,
}

impl<R: BufRead> LineLink<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(64),
            overflowed: false,
            stats: LinkStats::default(),
            exhausted: false,
        }
    }

    fn take_line(&mut self) -> Option<Sample> {
        let parsed = std::str::from_utf8(&self.pending)
            .ok()
            .and_then(parse_line);
        let blank = self.pending.iter().all(|b| b.is_ascii_whitespace());
        self.pending.clear();

        match parsed {
            Some((raw, filtered)) => {
                self.stats.samples += 1;
                Some(Sample::now(raw, filtered))
            }
            None => {
                if !blank {
                    self.stats.malformed += 1;
                }
                None
            }
        }
    }
}

impl<R: BufRead + Send> SampleLink for LineLink<R> {
    fn read_sample(&mut self) -> Option<Sample> {
        if self.exhausted {
            return None;
        }
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return None;
                }
                Err(err) => {
                    self.stats.io_errors += 1;
                    if self.stats.io_errors == 1 {
                        tracing::warn!("[Source] Read failed: {}", err);
                    } else {
                        tracing::debug!("[Source] Read failed: {}", err);
                    }
                    return None;
                }
            };

            if available.is_empty() {
                self.exhausted = true;
                tracing::debug!("[Source] End of stream after {} samples", self.stats.samples);
                if self.overflowed {
                    self.overflowed = false;
                    self.stats.malformed += 1;
                    return None;
                }
                return if self.pending.is_empty() {
                    None
                } else {
                    self.take_line()
                };
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let content = newline.unwrap_or(available.len());
            if !self.overflowed {
                if self.pending.len() + content > MAX_LINE_LEN {
                    // drop everything up to the next newline
                    self.overflowed = true;
                    self.pending.clear();
                } else {
                    self.pending.extend_from_slice(&available[..content]);
                }
            }
            let consumed = newline.map_or(content, |i| i + 1);
            self.reader.consume(consumed);

            if newline.is_some() {
                if self.overflowed {
                    self.overflowed = false;
                    self.stats.malformed += 1;
                    return None;
                }
                return self.take_line();
            }
        }
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }

    /// True once the underlying reader reported end of stream
    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Device exposed over TCP (serial-to-network bridge)
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub address: String,
    pub connect_timeout: Duration,
    /// Bounds how long one `read_sample` can block
    pub read_timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(5),
        }
    }

    fn resolve(&self) -> Result<SocketAddr, ConnectError> {
        let invalid = |reason: String| ConnectError::InvalidAddress {
            address: self.address.clone(),
            reason,
        };
        self.address
            .to_socket_addrs()
            .map_err(|err| invalid(err.to_string()))?
            .next()
            .ok_or_else(|| invalid("no addresses resolved".to_string()))
    }
}

impl SampleConnector for TcpConnector {
    type Link = LineLink<BufReader<TcpStream>>;

    fn connect(&self) -> Result<Self::Link, ConnectError> {
        let result = self.resolve().and_then(|addr| {
            let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|err| {
                ConnectError::Unreachable {
                    address: self.address.clone(),
                    reason: err.to_string(),
                }
            })?;
            stream
                .set_read_timeout(Some(self.read_timeout))
                .map_err(|err| ConnectError::Io {
                    target: self.address.clone(),
                    reason: err.to_string(),
                })?;
            Ok(stream)
        });

        match result {
            Ok(stream) => {
                tracing::info!("[Source] Connected to {}", self.address);
                Ok(LineLink::new(BufReader::new(stream)))
            }
            Err(err) => {
                log_connect_error(&err, "TcpConnector::connect");
                Err(err)
            }
        }
    }
}

/// Line-protocol input from standard input or a file
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderConnector {
    Stdin,
    File(PathBuf),
}

impl SampleConnector for ReaderConnector {
    type Link = LineLink<Box<dyn BufRead + Send>>;

    fn connect(&self) -> Result<Self::Link, ConnectError> {
        let reader: Box<dyn BufRead + Send> = match self {
            ReaderConnector::Stdin => Box::new(BufReader::new(io::stdin())),
            ReaderConnector::File(path) => {
                let file = File::open(path).map_err(|err| {
                    let err = ConnectError::Io {
                        target: path.display().to_string(),
                        reason: err.to_string(),
                    };
                    log_connect_error(&err, "ReaderConnector::connect");
                    err
                })?;
                Box::new(BufReader::new(file))
            }
        };
        Ok(LineLink::new(reader))
    }
}
