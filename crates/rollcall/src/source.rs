use rollcall_hw::{Camera, CameraError, FrameSampler, SampleError};
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// An acquired capture device that yields one encoded frame per request.
pub trait FrameProvider: Send + Sync {
    /// Sample and encode the current frame.
    fn next_payload(&self) -> impl Future<Output = Result<Vec<u8>, SampleError>> + Send;

    /// Release the device. Later samples fail with [`CameraError::Released`].
    fn release(&self);
}

/// Acquires a [`FrameProvider`] at session start.
pub trait DeviceAcquirer: Send + Sync {
    type Provider: FrameProvider + 'static;

    fn acquire(&self) -> impl Future<Output = Result<Self::Provider, CameraError>> + Send;
}

/// Messages sent from the capture loop to the camera thread.
enum SourceRequest {
    Sample {
        reply: oneshot::Sender<Result<Vec<u8>, SampleError>>,
    },
}

/// Handle to a camera owned by a dedicated OS thread.
///
/// The thread exits, dropping the camera, once every sender is gone.
pub struct CameraSource {
    device: String,
    tx: Mutex<Option<mpsc::Sender<SourceRequest>>>,
}

impl CameraSource {
    /// Open the camera on its own thread. Fails fast if the device cannot be opened.
    pub async fn spawn(
        device: &str,
        width: u32,
        height: u32,
        sampler: FrameSampler,
    ) -> Result<Self, CameraError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::channel::<SourceRequest>(1);
        let path = device.to_string();

        std::thread::Builder::new()
            .name("rollcall-camera".into())
            .spawn(move || {
                let mut camera = match Camera::open(&path, width, height) {
                    Ok(camera) => {
                        tracing::info!(
                            device = %path,
                            width = camera.width,
                            height = camera.height,
                            fourcc = ?camera.fourcc,
                            jpeg_quality = sampler.quality(),
                            "camera thread started"
                        );
                        let _ = ready_tx.send(Ok(()));
                        camera
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Some(req) = rx.blocking_recv() {
                    match req {
                        SourceRequest::Sample { reply } => {
                            let _ = reply.send(sampler.sample(&mut camera));
                        }
                    }
                }
                tracing::info!(device = %path, "camera thread exiting");
            })
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn camera thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| CameraError::CaptureFailed("camera thread exited during open".into()))??;

        Ok(Self {
            device: device.to_string(),
            tx: Mutex::new(Some(tx)),
        })
    }

    fn sender(&self) -> Option<mpsc::Sender<SourceRequest>> {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl FrameProvider for CameraSource {
    async fn next_payload(&self) -> Result<Vec<u8>, SampleError> {
        let tx = self.sender().ok_or(CameraError::Released)?;
        let (reply, reply_rx) = oneshot::channel();
        tx.send(SourceRequest::Sample { reply })
            .await
            .map_err(|_| CameraError::Released)?;
        reply_rx.await.map_err(|_| CameraError::Released)?
    }

    fn release(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if tx.is_some() {
            tracing::info!(device = %self.device, "releasing camera");
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens the configured V4L2 device at a fixed resolution.
#[derive(Debug, Clone)]
pub struct V4lAcquirer {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub sampler: FrameSampler,
}

impl DeviceAcquirer for V4lAcquirer {
    type Provider = CameraSource;

    async fn acquire(&self) -> Result<CameraSource, CameraError> {
        CameraSource::spawn(&self.device, self.width, self.height, self.sampler).await
    }
}
