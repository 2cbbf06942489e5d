//! Shared, async access to an [`EditorSession`].
//!
//! Callers queue on a FIFO mutex, so mutations are applied one at a time in
//! arrival order. The two slow operations never hold the lock while they
//! work: segmentation is awaited between `begin_load` and `complete_load`,
//! and export rasterizes a snapshot on the blocking thread pool.

use std::sync::Arc;

use tokio::sync::Mutex;

use layercut_common::error::{LayercutError, LayercutResult};
use layercut_render::{export_png, ExportedImage, ProgressCallback};

use crate::gateway::SegmentationGateway;
use crate::session::{EditorSession, LoadOutcome, LoadTicket, SessionState};

/// Cloneable handle to one session and its segmentation gateway.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<EditorSession>>,
    gateway: Arc<dyn SegmentationGateway>,
}

impl SessionHandle {
    pub fn new(session: EditorSession, gateway: Arc<dyn SegmentationGateway>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            gateway,
        }
    }

    /// Upload raw image bytes and segment them.
    ///
    /// Returns [`LoadOutcome::Stale`] if another upload started while this
    /// one was in the gateway.
    pub async fn upload(&self, bytes: Vec<u8>) -> LayercutResult<LoadOutcome> {
        let ticket = self.session.lock().await.begin_load(bytes);
        self.segment(ticket).await
    }

    /// Re-run the last failed upload.
    pub async fn retry(&self) -> LayercutResult<LoadOutcome> {
        let ticket = self.session.lock().await.retry()?;
        self.segment(ticket).await
    }

    async fn segment(&self, ticket: LoadTicket) -> LayercutResult<LoadOutcome> {
        let result = self.gateway.segment(ticket.bytes()).await;
        self.session
            .lock()
            .await
            .complete_load(&ticket, result, self.gateway.name())
    }

    /// Render and encode the document at native resolution.
    pub async fn export_png(&self) -> LayercutResult<ExportedImage> {
        self.export_png_with_progress(None).await
    }

    /// [`SessionHandle::export_png`] reporting progress from the worker thread.
    pub async fn export_png_with_progress(
        &self,
        progress: Option<ProgressCallback>,
    ) -> LayercutResult<ExportedImage> {
        let (ticket, scene, compositor) = {
            let mut session = self.session.lock().await;
            let (ticket, scene) = session.begin_export()?;
            (ticket, scene, Arc::clone(session.compositor()))
        };

        let rendered =
            tokio::task::spawn_blocking(move || export_png(&compositor, &scene, progress.as_ref()))
                .await;

        self.session.lock().await.finish_export(ticket);
        match rendered {
            Ok(result) => result,
            Err(e) => Err(LayercutError::render(format!("export task failed: {e}"))),
        }
    }

    /// Run a synchronous operation against the session.
    pub async fn with<R>(&self, f: impl FnOnce(&mut EditorSession) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut *session)
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("gateway", &self.gateway.name())
            .finish_non_exhaustive()
    }
}
