use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bno08x::{Framer, FramerStats};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::report::OrientationReport;
use super::state::OrientationState;
use crate::cancel::CancelToken;
use crate::errors::{ImuError, ImuResult};

const READ_BUFFER_SIZE: usize = 256;
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);
/// Consecutive zero-length reads treated as end of file
pub const EOF_READ_LIMIT: usize = 32;

/// Anything the reader can pull sensor bytes from
///
/// Reads are expected to time out periodically so the reader can notice
/// cancellation; `TimedOut` and `WouldBlock` errors are not failures.
pub trait ByteSource: Send {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
}

impl<T: Read + Send + ?Sized> ByteSource for T {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.read(buffer)
    }
}

/// Serial settings for the orientation sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    pub serial_path: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub reopen_backoff_ms: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            serial_path: "/dev/ttyAMA0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
            reopen_backoff_ms: 100,
        }
    }
}

impl ImuConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_ms)
    }

    /// Open the configured serial port.
    pub fn open(&self) -> ImuResult<Box<dyn ByteSource>> {
        info!(
            "Opening IMU serial port {} at {} bps",
            self.serial_path, self.baud_rate
        );
        let port = serialport::new(&self.serial_path, self.baud_rate)
            .timeout(self.read_timeout())
            .open()
            .map_err(|source| ImuError::Open {
                path: self.serial_path.clone(),
                source,
            })?;
        Ok(Box::new(port))
    }
}

/// Acquisition counters, cumulative across reconnects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImuStats {
    pub framing: FramerStats,
    /// Times the connection was (re)opened successfully
    pub connects: u64,
    /// Open or read failures
    pub failures: u64,
    pub last_index: Option<u8>,
}

/// Handle to the acquisition thread
pub struct ImuReader {
    state: Arc<OrientationState>,
    stats: Arc<Mutex<ImuStats>>,
    cancel: CancelToken,
    join_handle: Option<JoinHandle<()>>,
}

impl ImuReader {
    /// Spawn a reader on the configured serial port.
    pub fn spawn_serial(config: ImuConfig, state: Arc<OrientationState>) -> Self {
        let backoff = config.reopen_backoff();
        Self::spawn(move || config.open(), state, backoff)
    }

    /// Spawn a reader that calls `opener` for every (re)connect.
    pub fn spawn<F>(opener: F, state: Arc<OrientationState>, reopen_backoff: Duration) -> Self
    where
        F: FnMut() -> ImuResult<Box<dyn ByteSource>> + Send + 'static,
    {
        let stats = Arc::new(Mutex::new(ImuStats::default()));
        let cancel = CancelToken::new();

        let worker = ReaderLoop {
            opener,
            state: state.clone(),
            stats: stats.clone(),
            cancel: cancel.clone(),
            framer: Framer::new(),
            reopen_backoff,
        };
        let join_handle = thread::Builder::new()
            .name("imu-reader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| warn!("Failed to spawn IMU reader thread: {e}"))
            .ok();

        Self {
            state,
            stats,
            cancel,
            join_handle,
        }
    }

    pub fn state(&self) -> &Arc<OrientationState> {
        &self.state
    }

    pub fn stats(&self) -> ImuStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the reader and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ImuReader {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReaderLoop<F> {
    opener: F,
    state: Arc<OrientationState>,
    stats: Arc<Mutex<ImuStats>>,
    cancel: CancelToken,
    framer: Framer,
    reopen_backoff: Duration,
}

impl<F> ReaderLoop<F>
where
    F: FnMut() -> ImuResult<Box<dyn ByteSource>>,
{
    fn run(mut self) {
        while !self.cancel.is_cancelled() {
            let result = (self.opener)().and_then(|source| {
                self.update_stats(|s| s.connects += 1);
                self.read_frames(source)
            });
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = result {
                warn!("IMU loop stopped, will retry: {e}");
                self.update_stats(|s| s.failures += 1);
            }
            // Waiters re-check and surface a stall if reconnecting takes too long.
            self.state.notify_all();
            if self.cancel.wait_timeout(self.reopen_backoff) {
                break;
            }
        }
        self.state.notify_all();
        info!("IMU reader exited");
    }

    fn read_frames(&mut self, mut source: Box<dyn ByteSource>) -> ImuResult<()> {
        self.framer.reset();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut last_log = Instant::now();
        let mut empty_reads = 0;

        while !self.cancel.is_cancelled() {
            let n = match source.read_bytes(&mut buffer) {
                Ok(0) => {
                    empty_reads += 1;
                    if empty_reads >= EOF_READ_LIMIT {
                        return Err(ImuError::Read(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "serial device returned end of file",
                        )));
                    }
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                Ok(n) => {
                    empty_reads = 0;
                    n
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(ImuError::Read(e)),
            };

            let now = Instant::now();
            let frames = self.framer.push_bytes(&buffer[..n]);
            let last_index = frames.last().map(|f| f.index);
            for frame in &frames {
                self.state.publish(OrientationReport::from_frame(frame, now));
            }

            let framing = self.framer.stats();
            self.update_stats(|s| {
                s.framing = framing;
                if last_index.is_some() {
                    s.last_index = last_index;
                }
            });

            if last_log.elapsed() >= STATS_LOG_INTERVAL {
                debug!(
                    "IMU frames={} checksum_failures={} discarded={}",
                    framing.frames, framing.checksum_failures, framing.discarded_bytes
                );
                last_log = now;
            }
        }
        Ok(())
    }

    fn update_stats(&self, f: impl FnOnce(&mut ImuStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}
