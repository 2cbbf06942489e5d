//! Viewport controller: the single zoom/pan transform shared by every
//! render surface.
//!
//! Native coordinates are pixels of the segmented image. Display coordinates
//! are on-screen pixels:
//!
//! ```text
//! display = native * scale + pan
//! native  = (display - pan) / scale
//! ```
//!
//! Surfaces never keep their own copy of zoom/pan. They subscribe to the
//! controller and repaint from the transform it broadcasts, so two surfaces
//! can never disagree about where a native pixel sits on screen.

use serde::{Deserialize, Serialize};

use layercut_common::config::ViewportDefaults;
use layercut_common::error::{LayercutError, LayercutResult};

/// A 2D point. Whether it is native or display space is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Point halfway between `a` and `b`.
    pub fn midpoint(a: &Point2D, b: &Point2D) -> Point2D {
        Point2D {
            x: (a.x + b.x) * 0.5,
            y: (a.y + b.y) * 0.5,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The presentational transform from native to display space.
///
/// Never part of the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    /// Display pixels per native pixel.
    pub scale: f64,
    /// Horizontal offset in display pixels.
    pub pan_x: f64,
    /// Vertical offset in display pixels.
    pub pan_y: f64,
}

impl ViewportTransform {
    pub const IDENTITY: ViewportTransform = ViewportTransform {
        scale: 1.0,
        pan_x: 0.0,
        pan_y: 0.0,
    };

    /// Map a native point to display space.
    pub fn to_display(&self, native: Point2D) -> Point2D {
        Point2D {
            x: native.x * self.scale + self.pan_x,
            y: native.y * self.scale + self.pan_y,
        }
    }

    /// Map a display point back to native space.
    pub fn to_native(&self, display: Point2D) -> Point2D {
        Point2D {
            x: (display.x - self.pan_x) / self.scale,
            y: (display.y - self.pan_y) / self.scale,
        }
    }

    /// Convert a display-space length (e.g. a brush width) to native units.
    pub fn native_length(&self, display_len: f64) -> f64 {
        display_len / self.scale
    }

    /// Convert a native length to display units.
    pub fn display_length(&self, native_len: f64) -> f64 {
        native_len * self.scale
    }
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Handle returned by [`ViewportController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type SubscriberFn = Box<dyn FnMut(&ViewportTransform) + Send>;

/// Owner of the zoom/pan state.
pub struct ViewportController {
    native_size: Option<(u32, u32)>,
    min_scale: f64,
    max_scale: f64,
    transform: ViewportTransform,
    fit_scale: f64,
    subscribers: Vec<(Subscription, SubscriberFn)>,
    next_subscription: u64,
}

impl ViewportController {
    /// Create a controller with explicit zoom limits.
    pub fn new(limits: &ViewportDefaults) -> Self {
        Self {
            native_size: None,
            min_scale: limits.min_scale,
            max_scale: limits.max_scale,
            transform: ViewportTransform::IDENTITY,
            fit_scale: 1.0,
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Create a controller with the default 0.5..=5.0 zoom range.
    pub fn with_defaults() -> Self {
        Self::new(&ViewportDefaults::default())
    }

    /// Current transform.
    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    /// Scale chosen by the last `fit_to_container`.
    pub fn fit_scale(&self) -> f64 {
        self.fit_scale
    }

    /// Native size of the loaded subject, if any.
    pub fn native_size(&self) -> Option<(u32, u32)> {
        self.native_size
    }

    /// Register a render surface. It immediately receives the current
    /// transform, then every subsequent change.
    pub fn subscribe<F>(&mut self, mut callback: F) -> Subscription
    where
        F: FnMut(&ViewportTransform) + Send + 'static,
    {
        let ticket = Subscription(self.next_subscription);
        self.next_subscription += 1;
        callback(&self.transform);
        self.subscribers.push((ticket, Box::new(callback)));
        ticket
    }

    /// Remove a surface. Returns false if the ticket was already removed.
    pub fn unsubscribe(&mut self, ticket: Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(t, _)| *t != ticket);
        self.subscribers.len() != before
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Bind the controller to a freshly loaded subject.
    ///
    /// Resets to identity; call [`fit_to_container`](Self::fit_to_container)
    /// afterwards to frame the image.
    pub fn attach(&mut self, width: u32, height: u32) {
        self.native_size = Some((width, height));
        self.fit_scale = 1.0;
        self.set_transform(ViewportTransform::IDENTITY);
    }

    /// Forget the subject (new upload).
    pub fn detach(&mut self) {
        self.native_size = None;
        self.fit_scale = 1.0;
        self.set_transform(ViewportTransform::IDENTITY);
    }

    /// Scale the whole image into the container, never enlarging past 1:1.
    pub fn fit_to_container(
        &mut self,
        container_width: f64,
        container_height: f64,
    ) -> LayercutResult<ViewportTransform> {
        let (w, h) = self.require_native()?;
        if !(container_width.is_finite() && container_height.is_finite())
            || container_width <= 0.0
            || container_height <= 0.0
        {
            return Err(LayercutError::invalid_input(format!(
                "container size must be positive, got {container_width}x{container_height}"
            )));
        }

        let scale = (container_width / w as f64)
            .min(container_height / h as f64)
            .min(1.0);
        self.fit_scale = scale;
        self.set_transform(ViewportTransform {
            scale,
            pan_x: 0.0,
            pan_y: 0.0,
        });
        tracing::debug!(scale, container_width, container_height, "Viewport fitted");
        Ok(self.transform)
    }

    /// Change the scale by `delta`, keeping the native point under `anchor`
    /// (display space) fixed on screen. The new scale is clamped to the
    /// configured limits, even when the fit scale lies below the minimum.
    pub fn zoom(&mut self, delta: f64, anchor: Point2D) -> LayercutResult<ViewportTransform> {
        self.require_native()?;
        if !delta.is_finite() || !anchor.is_finite() {
            return Err(LayercutError::invalid_input("zoom delta and anchor must be finite"));
        }

        let old = self.transform;
        let scale = (old.scale + delta).clamp(self.min_scale, self.max_scale);
        let pinned = old.to_native(anchor);

        self.set_transform(ViewportTransform {
            scale,
            pan_x: anchor.x - pinned.x * scale,
            pan_y: anchor.y - pinned.y * scale,
        });
        Ok(self.transform)
    }

    /// Accumulate a pan offset in display pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) -> LayercutResult<ViewportTransform> {
        self.require_native()?;
        if !dx.is_finite() || !dy.is_finite() {
            return Err(LayercutError::invalid_input("pan offsets must be finite"));
        }
        let mut next = self.transform;
        next.pan_x += dx;
        next.pan_y += dy;
        self.set_transform(next);
        Ok(self.transform)
    }

    /// Return to the last fit scale with no pan.
    pub fn reset(&mut self) -> LayercutResult<ViewportTransform> {
        self.require_native()?;
        self.set_transform(ViewportTransform {
            scale: self.fit_scale,
            pan_x: 0.0,
            pan_y: 0.0,
        });
        Ok(self.transform)
    }

    fn require_native(&self) -> LayercutResult<(u32, u32)> {
        self.native_size.ok_or(LayercutError::NoSubject)
    }

    fn set_transform(&mut self, transform: ViewportTransform) {
        self.transform = transform;
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&transform);
        }
    }
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("native_size", &self.native_size)
            .field("transform", &self.transform)
            .field("fit_scale", &self.fit_scale)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
