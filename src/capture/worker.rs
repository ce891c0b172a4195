use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::buffer::FrameBuffer;
use crate::capture::source::FrameProducer;
use crate::error::CaptureError;

const ERROR_RETRY_SLEEP: Duration = Duration::from_millis(100);
const PAUSE_POLL: Duration = Duration::from_millis(100);
const FPS_SAMPLE_WINDOW: u32 = 30;

/// Dedicated background worker owning FrameProducer -> FrameBuffer
/// production. Runs at its own cadence, independent of the analysis path.
pub struct CaptureWorker {
    handle: tokio::task::JoinHandle<()>,
    shared: Arc<WorkerShared>,
    cancel_token: CancellationToken,
    buffer: Arc<FrameBuffer>,
}

struct WorkerShared {
    running: AtomicBool,
    paused: AtomicBool,
    // Measured frames-per-second, stored as fps * 10.
    measured_fps_deci: AtomicU32,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CaptureStatus {
    pub running: bool,
    pub paused: bool,
    pub measured_fps: f32,
}

impl CaptureWorker {
    pub fn spawn(
        mut producer: Box<dyn FrameProducer>,
        buffer: Arc<FrameBuffer>,
        target_fps: u32,
        cancel_token: CancellationToken,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            measured_fps_deci: AtomicU32::new(0),
        });

        info!("Capture worker starting: {}", producer.describe());

        let worker_shared = Arc::clone(&shared);
        let worker_buffer = Arc::clone(&buffer);
        let worker_token = cancel_token.clone();
        let handle = tokio::task::spawn_blocking(move || {
            capture_loop(
                producer.as_mut(),
                &worker_buffer,
                target_fps,
                &worker_shared,
                &worker_token,
            );
            producer.release();
            worker_shared.running.store(false, Ordering::Release);
        });

        Self {
            handle,
            shared,
            cancel_token,
            buffer,
        }
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            running: self.shared.running.load(Ordering::Acquire),
            paused: self.shared.paused.load(Ordering::Acquire),
            measured_fps: self.shared.measured_fps_deci.load(Ordering::Acquire) as f32 / 10.0,
        }
    }

    /// Signals the loop to exit, joins it with a bounded timeout, and drains
    /// the buffer. The producer releases its device inside the task.
    pub async fn stop(self, join_timeout: Duration) -> Result<(), CaptureError> {
        self.cancel_token.cancel();
        let joined = tokio::time::timeout(join_timeout, self.handle).await;
        let drained = self.buffer.drain().len();
        let status = self.buffer.status();
        info!(
            "Capture worker stopped: {} frames captured, {} dropped, {} drained",
            status.total_frames, status.dropped_frames, drained
        );
        match joined {
            Ok(_) => Ok(()),
            Err(_) => Err(CaptureError::StopTimeout(join_timeout)),
        }
    }
}

fn capture_loop(
    producer: &mut dyn FrameProducer,
    buffer: &FrameBuffer,
    target_fps: u32,
    shared: &WorkerShared,
    cancel_token: &CancellationToken,
) {
    let frame_interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
    let mut fps_sample_count: u32 = 0;
    let mut fps_sample_start = Instant::now();

    while !cancel_token.is_cancelled() {
        let loop_start = Instant::now();

        if shared.paused.load(Ordering::Acquire) {
            std::thread::sleep(PAUSE_POLL);
            continue;
        }

        match producer.next_frame() {
            Ok(frame) => {
                buffer.push(frame);

                fps_sample_count += 1;
                if fps_sample_count >= FPS_SAMPLE_WINDOW {
                    let elapsed = fps_sample_start.elapsed().as_secs_f32();
                    if elapsed > 0.0 {
                        let fps = fps_sample_count as f32 / elapsed;
                        shared
                            .measured_fps_deci
                            .store((fps * 10.0) as u32, Ordering::Release);
                    }
                    fps_sample_count = 0;
                    fps_sample_start = Instant::now();
                }
            }
            Err(e) => {
                // One bad read never stops the pipeline.
                warn!("Frame acquisition failed, retrying: {e}");
                std::thread::sleep(ERROR_RETRY_SLEEP);
                continue;
            }
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }
}
