//! Response capture log.
//!
//! A capture file is a sequence of frames, each
//! `[len: u32 LE][crc32: u32 LE][bincode payload]`. The first frame is a
//! [`CaptureHeader`]; every following frame is one raw query response.
//! Writing happens on a background thread fed by a bounded channel so the
//! fetch path never blocks on disk.
use crc32fast::Hasher as Crc32;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

pub const CAPTURE_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture io: {0}")]
    Io(#[from] io::Error),
    #[error("capture frame encoding: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("CRC mismatch at frame {frame}: file={file:#x}, calc={calc:#x}")]
    CrcMismatch { frame: usize, file: u32, calc: u32 },
    #[error("capture writer thread panicked")]
    WriterPanicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    pub node_url: String,
    pub contract_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub seq: u64,
    pub recv_unix_ns: u128,
    pub input_type: u16,
    pub request: Vec<u8>,
    pub response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFrame {
    Header(CaptureHeader),
    Response(ResponseRecord),
}

pub fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn write_frame<W: Write>(w: &mut W, frame: &CaptureFrame) -> Result<(), CaptureError> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

fn writer_thread(out: PathBuf, rx: Receiver<CaptureFrame>) -> Result<(), CaptureError> {
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(&out)?;
    let mut w = BufWriter::with_capacity(1 << 16, file);
    for frame in rx {
        write_frame(&mut w, &frame)?;
    }
    w.flush()?;
    Ok(())
}

/// Handle feeding the background capture writer.
pub struct CaptureSink {
    tx: Sender<CaptureFrame>,
    seq: AtomicU64,
    writer: Mutex<Option<JoinHandle<Result<(), CaptureError>>>>,
}

impl CaptureSink {
    /// Create (truncate) `path`, start the writer and queue the header frame.
    pub fn create(path: &Path, header: CaptureHeader) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let (tx, rx) = bounded::<CaptureFrame>(1024);
        let out = path.to_path_buf();
        let writer = std::thread::spawn(move || writer_thread(out, rx));
        // The channel is empty, so this cannot be dropped for lack of space.
        let _ = tx.send(CaptureFrame::Header(header));
        Ok(Self { tx, seq: AtomicU64::new(0), writer: Mutex::new(Some(writer)) })
    }

    /// Queue one response. Drops the frame with a warning if the writer is
    /// behind rather than stalling the caller.
    pub fn record(&self, input_type: u16, request: &[u8], response: &[u8]) {
        let frame = CaptureFrame::Response(ResponseRecord {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            recv_unix_ns: now_unix_ns(),
            input_type,
            request: request.to_vec(),
            response: response.to_vec(),
        });
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(input_type, "capture queue full, frame dropped"),
            Err(TrySendError::Disconnected(_)) => warn!(input_type, "capture writer gone, frame dropped"),
        }
    }

    /// Close the channel and wait until everything queued is on disk.
    pub fn finish(self) -> Result<u64, CaptureError> {
        let Self { tx, seq, writer } = self;
        drop(tx);
        let handle = writer.into_inner().unwrap_or_else(|e| e.into_inner());
        if let Some(h) = handle {
            h.join().map_err(|_| CaptureError::WriterPanicked)??;
        }
        Ok(seq.into_inner())
    }
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Sequential frame reader with CRC verification.
pub struct CaptureReader<R> {
    rdr: R,
    frames: usize,
}

impl CaptureReader<io::BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self::new(io::BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(rdr: R) -> Self {
        Self { rdr, frames: 0 }
    }

    pub fn frames_read(&self) -> usize {
        self.frames
    }

    /// Next frame, or `None` at a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<CaptureFrame>, CaptureError> {
        let len = match read_u32(&mut self.rdr) {
            Ok(v) => v as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let crc_on_file = read_u32(&mut self.rdr)?;
        let mut payload = vec![0u8; len];
        self.rdr.read_exact(&mut payload)?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            return Err(CaptureError::CrcMismatch { frame: self.frames, file: crc_on_file, calc: crc_calc });
        }
        self.frames += 1;
        Ok(Some(bincode::deserialize(&payload)?))
    }
}
