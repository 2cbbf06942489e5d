use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use tokio::sync::oneshot;

use layercut_common::config::AppConfig;
use layercut_common::error::{LayercutError, LayercutResult};
use layercut_document::background::BackgroundSpec;
use layercut_document::viewport::Point2D;
use layercut_render::Compositor;
use layercut_session::{
    EditorSession, LoadOutcome, PassthroughGateway, SegmentationGateway, SessionHandle,
    SessionState,
};

fn subject(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 200, ((x + y) % 256) as u8]))
}

fn png(image: &RgbaImage) -> Vec<u8> {
    layercut_render::encode_png(image).expect("encode")
}

fn handle_with(gateway: Arc<dyn SegmentationGateway>) -> SessionHandle {
    SessionHandle::new(
        EditorSession::new(&AppConfig::default(), Compositor::default()),
        gateway,
    )
}

/// Each upload's first byte selects a channel the test completes by hand.
#[derive(Default)]
struct ManualGateway {
    pending: Mutex<HashMap<u8, oneshot::Receiver<LayercutResult<RgbaImage>>>>,
}

impl ManualGateway {
    fn expect(&self, key: u8) -> oneshot::Sender<LayercutResult<RgbaImage>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(key, rx);
        tx
    }
}

#[async_trait::async_trait]
impl SegmentationGateway for ManualGateway {
    async fn segment(&self, image: &[u8]) -> LayercutResult<RgbaImage> {
        let rx = self
            .pending
            .lock()
            .unwrap()
            .remove(&image[0])
            .ok_or_else(|| LayercutError::segmentation("unexpected upload"))?;
        rx.await
            .map_err(|_| LayercutError::segmentation("gateway dropped"))?
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Fails the first call, then behaves like passthrough.
#[derive(Default)]
struct FlakyGateway {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl SegmentationGateway for FlakyGateway {
    async fn segment(&self, image: &[u8]) -> LayercutResult<RgbaImage> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(LayercutError::segmentation("HTTP 503"));
        }
        PassthroughGateway.segment(image).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

async fn wait_for_generation(handle: &SessionHandle, generation: u64) {
    while handle.with(|s| s.generation()).await < generation {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn superseded_upload_is_discarded() {
    let gateway = Arc::new(ManualGateway::default());
    let first_tx = gateway.expect(1);
    let second_tx = gateway.expect(2);
    let handle = handle_with(gateway.clone());

    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.upload(vec![1]).await }
    });
    wait_for_generation(&handle, 1).await;

    let second = tokio::spawn({
        let handle = handle.clone();
        async move { handle.upload(vec![2]).await }
    });
    wait_for_generation(&handle, 2).await;

    second_tx.send(Ok(subject(20, 10))).ok();
    let outcome = second.await.expect("join").expect("second upload");
    assert!(matches!(outcome, LoadOutcome::Applied(ref d) if d.width == 20));

    first_tx.send(Ok(subject(64, 64))).ok();
    let outcome = first.await.expect("join").expect("first upload");
    assert_eq!(outcome, LoadOutcome::Stale);

    let dims = handle
        .with(|s| s.document().map(|d| (d.width, d.height)))
        .await;
    assert_eq!(dims, Some((20, 10)));
    assert_eq!(handle.state().await, SessionState::Ready);
}

#[tokio::test]
async fn failed_load_can_be_retried() {
    let handle = handle_with(Arc::new(FlakyGateway::default()));
    let bytes = png(&subject(8, 6));

    let err = handle.upload(bytes).await.unwrap_err();
    assert!(matches!(err, LayercutError::Segmentation { .. }));
    assert_eq!(handle.state().await, SessionState::Failed);

    let outcome = handle.retry().await.expect("retry");
    assert!(matches!(outcome, LoadOutcome::Applied(ref d) if d.source == "flaky"));
    assert_eq!(handle.state().await, SessionState::Ready);
}

#[tokio::test]
async fn undecodable_gateway_output_fails_the_load() {
    let handle = handle_with(Arc::new(PassthroughGateway));
    let err = handle.upload(b"garbage".to_vec()).await.unwrap_err();
    assert!(matches!(err, LayercutError::Decode { .. }));
    assert_eq!(handle.state().await, SessionState::Failed);
    assert!(matches!(handle.export_png().await, Err(LayercutError::NoSubject)));
}

#[tokio::test]
async fn scenario_a_end_to_end() {
    let handle = handle_with(Arc::new(PassthroughGateway));
    let raw = subject(400, 300);
    handle.upload(png(&raw)).await.expect("upload");

    let (fit, zoomed) = handle
        .with(|s| {
            let fit = s.fit_to_container(800.0, 600.0).expect("fit");
            let zoomed = s.zoom(0.25, Point2D::new(200.0, 150.0)).expect("zoom");
            (fit, zoomed)
        })
        .await;
    assert_eq!((fit.scale, fit.pan_x, fit.pan_y), (1.0, 0.0, 0.0));
    assert_eq!(zoomed.scale, 1.25);
    let pinned = zoomed.to_display(Point2D::new(200.0, 150.0));
    assert!(pinned.distance_to(&Point2D::new(200.0, 150.0)) < 1e-9);

    let exported = handle.export_png().await.expect("export");
    assert_eq!((exported.width, exported.height), (400, 300));

    // Transparent background, no strokes: the gateway alpha survives exactly.
    let decoded = image::load_from_memory(&exported.png)
        .expect("decode")
        .to_rgba8();
    let alpha = |img: &RgbaImage| img.pixels().map(|p| p.0[3]).collect::<Vec<_>>();
    assert_eq!(alpha(&decoded), alpha(&raw));
    assert_eq!(handle.state().await, SessionState::Ready);
}

#[tokio::test]
async fn export_is_independent_of_zoom_at_export_time() {
    let handle = handle_with(Arc::new(PassthroughGateway));
    handle.upload(png(&subject(120, 90))).await.expect("upload");

    handle
        .with(|s| {
            s.set_background(&BackgroundSpec::parse_css("linear-gradient(135deg, #222, #eee)").expect("css"))
                .expect("background");
            s.fit_to_container(60.0, 60.0).expect("fit");
            s.begin_stroke(Point2D::new(10.0, 10.0), 4.0).expect("begin");
            s.extend_stroke(Point2D::new(40.0, 30.0)).expect("extend");
            s.end_stroke().expect("stroke");
        })
        .await;

    let mut exports = Vec::new();
    for (delta, pan) in [(0.0, 0.0), (-0.5, 13.0), (2.0, -40.0)] {
        handle
            .with(|s| {
                s.zoom(delta, Point2D::new(5.0, 5.0)).expect("zoom");
                s.pan(pan, pan).expect("pan");
            })
            .await;
        exports.push(handle.export_png().await.expect("export").png);
    }
    assert!(exports.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn concurrent_exports_do_not_overlap() {
    let handle = handle_with(Arc::new(PassthroughGateway));
    handle.upload(png(&subject(300, 200))).await.expect("upload");

    let (a, b) = tokio::join!(handle.export_png(), handle.export_png());
    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(LayercutError::InvalidState { .. })))
        .count();
    // Either they serialized cleanly or the second hit the running export.
    assert!(ok >= 1);
    assert_eq!(ok + busy, 2);
    assert_eq!(handle.state().await, SessionState::Ready);
}
