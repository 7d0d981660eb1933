// Live microphone capture
//
// cpal streams are not Send, so each capture owns a dedicated thread that
// builds the stream, keeps it alive, and drops it when asked to stop. The
// capture callback only ever uses `try_send`; when the controller falls behind
// frames are dropped instead of queued.

use std::sync::atomic::{AtomicBool, Ordering};

use super::backend::{AudioCapture, AudioFormat, CaptureError, CaptureFactory};

static DEVICE_HELD: AtomicBool = AtomicBool::new(false);

/// Process-wide exclusive claim on the audio input device
///
/// Released on drop.
#[derive(Debug)]
pub struct DeviceLease {
    _private: (),
}

impl DeviceLease {
    pub fn acquire() -> Result<Self, CaptureError> {
        DEVICE_HELD
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CaptureError::DeviceBusy)?;
        Ok(Self { _private: () })
    }

    pub fn is_held() -> bool {
        DEVICE_HELD.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        DEVICE_HELD.store(false, Ordering::SeqCst);
    }
}

/// Creates microphone captures for new sessions
#[derive(Debug, Clone, Default)]
pub struct MicrophoneFactory {
    /// Input device name; the host default when unset
    pub device_name: Option<String>,
}

impl CaptureFactory for MicrophoneFactory {
    fn create(&self, format: AudioFormat) -> Result<Box<dyn AudioCapture>, CaptureError> {
        #[cfg(feature = "microphone")]
        {
            Ok(Box::new(cpal_capture::MicrophoneCapture::new(
                format,
                self.device_name.clone(),
            )))
        }

        #[cfg(not(feature = "microphone"))]
        {
            let _ = format;
            Err(CaptureError::Unavailable(
                "built without the `microphone` feature".to_string(),
            ))
        }
    }
}

#[cfg(feature = "microphone")]
mod cpal_capture {
    use anyhow::Result;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::sync::{mpsc, oneshot};
    use tracing::{debug, error, info, warn};

    use super::DeviceLease;
    use crate::audio::backend::{
        AudioCapture, AudioFormat, AudioFrame, AudioStreamSource, CaptureError,
    };
    use crate::audio::convert;

    pub struct MicrophoneCapture {
        format: AudioFormat,
        device_name: Option<String>,
        lease: Option<DeviceLease>,
        stop_tx: Option<std::sync::mpsc::Sender<()>>,
        thread: Option<std::thread::JoinHandle<()>>,
        dropped_frames: Arc<AtomicU64>,
    }

    impl MicrophoneCapture {
        pub fn new(format: AudioFormat, device_name: Option<String>) -> Self {
            Self {
                format,
                device_name,
                lease: None,
                stop_tx: None,
                thread: None,
                dropped_frames: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    /// Accumulates device callbacks into fixed-size frames in the target format
    struct FrameAssembler {
        device_rate: u32,
        device_channels: u16,
        format: AudioFormat,
        converter: convert::FrameConverter,
        buffer: Vec<i16>,
        started_at: Instant,
        tx: mpsc::Sender<AudioFrame>,
        dropped_frames: Arc<AtomicU64>,
    }

    impl FrameAssembler {
        fn push(&mut self, samples: Vec<i16>) {
            let frame = AudioFrame {
                samples,
                sample_rate: self.device_rate,
                channels: self.device_channels,
                timestamp_ms: 0,
                source: AudioStreamSource::Microphone,
            };
            let frame = match self.converter.convert(frame) {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(e) => {
                    error!("Dropping microphone audio: {:#}", e);
                    return;
                }
            };
            self.buffer.extend_from_slice(&frame.samples);

            // Frames leave in the session format, so slicing uses its frame size
            let frame_len = self.format.samples_per_frame().max(1);
            while self.buffer.len() >= frame_len {
                let samples: Vec<i16> = self.buffer.drain(..frame_len).collect();
                let out = AudioFrame {
                    samples,
                    sample_rate: frame.sample_rate,
                    channels: frame.channels,
                    timestamp_ms: self.started_at.elapsed().as_millis() as u64,
                    source: AudioStreamSource::Microphone,
                };

                // Send to channel (non-blocking)
                if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(out) {
                    let dropped = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped % 50 == 1 {
                        warn!("Recognition is falling behind, dropped {} audio frames", dropped);
                    }
                }
            }
        }
    }

    fn open_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::Stream(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or(CaptureError::NoDevice),
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
        }
    }

    fn build_stream(
        device: &cpal::Device,
        assembler: FrameAssembler,
    ) -> Result<cpal::Stream, CaptureError> {
        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(format!("Failed to get config: {}", e)))?;

        let mut assembler = assembler;
        assembler.device_rate = config.sample_rate().0;
        assembler.device_channels = config.channels();

        let err_fn = |err: cpal::StreamError| error!("Microphone stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push(data.iter().map(|&s| convert::f32_to_i16(s)).collect());
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    assembler.push(data.to_vec());
                },
                err_fn,
                None,
            ),
            other => {
                return Err(CaptureError::Stream(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream.map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
            other => CaptureError::Stream(other.to_string()),
        })
    }

    #[async_trait::async_trait]
    impl AudioCapture for MicrophoneCapture {
        async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
            if self.thread.is_some() {
                return Err(CaptureError::DeviceBusy);
            }

            let lease = DeviceLease::acquire()?;

            info!(
                "Starting microphone capture ({}Hz, {} channels, {}ms frames)",
                self.format.sample_rate, self.format.channels, self.format.frame_duration_ms
            );

            let (tx, rx) = mpsc::channel(self.format.queue_frames.max(1));
            let (ready_tx, ready_rx) = oneshot::channel();
            let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

            let assembler = FrameAssembler {
                device_rate: self.format.sample_rate,
                device_channels: self.format.channels,
                format: self.format.clone(),
                converter: convert::FrameConverter::new(self.format.sample_rate, self.format.channels),
                buffer: Vec::new(),
                started_at: Instant::now(),
                tx,
                dropped_frames: Arc::clone(&self.dropped_frames),
            };
            let device_name = self.device_name.clone();

            let thread = std::thread::Builder::new()
                .name("loqa-microphone".to_string())
                .spawn(move || {
                    let stream = open_device(device_name.as_deref())
                        .and_then(|device| build_stream(&device, assembler))
                        .and_then(|stream| {
                            stream
                                .play()
                                .map_err(|e| CaptureError::Stream(e.to_string()))?;
                            Ok(stream)
                        });

                    match stream {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            // Keep the stream alive until stop() or the capture is dropped
                            let _ = stop_rx.recv();
                            drop(stream);
                            debug!("Microphone stream released");
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                })
                .map_err(|e| CaptureError::Stream(format!("Failed to spawn capture thread: {}", e)))?;

            match ready_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = thread.join();
                    return Err(e);
                }
                Err(_) => {
                    return Err(CaptureError::Stream(
                        "Capture thread exited before the stream started".to_string(),
                    ))
                }
            }

            self.lease = Some(lease);
            self.stop_tx = Some(stop_tx);
            self.thread = Some(thread);

            info!("Microphone capture started");

            Ok(rx)
        }

        async fn stop(&mut self) -> Result<()> {
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }

            if let Some(thread) = self.thread.take() {
                tokio::task::spawn_blocking(move || {
                    if thread.join().is_err() {
                        error!("Microphone capture thread panicked");
                    }
                })
                .await?;
            }

            self.lease = None;

            let dropped = self.dropped_frames.load(Ordering::Relaxed);
            if dropped > 0 {
                warn!("Microphone capture stopped ({} frames dropped)", dropped);
            } else {
                info!("Microphone capture stopped");
            }

            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.thread.is_some()
        }

        fn name(&self) -> &str {
            "cpal microphone"
        }
    }
}
