use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

/// How long after the last release the page is still considered "settling".
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// The DOM side of the lock: where the page is, and how to pin/unpin it.
pub trait ScrollSurface {
    fn scroll_offset(&self) -> i64;
    fn apply_lock(&mut self, offset: i64);
    fn release_lock(&mut self);
    fn scroll_to(&mut self, offset: i64);
}

/// Inline styles the shell applies to `<body>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BodyStyle {
    pub position: Option<String>,
    pub top: Option<String>,
    pub width: Option<String>,
    pub overflow: Option<String>,
}

impl BodyStyle {
    fn locked_at(offset: i64) -> Self {
        BodyStyle {
            position: Some("fixed".to_string()),
            top: Some(format!("-{}px", offset)),
            width: Some("100%".to_string()),
            overflow: Some("hidden".to_string()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.position.is_some() || self.overflow.is_some()
    }
}

/// Model of the webview page. The shell reports its scroll offset and reads
/// back the body style plus any pending scroll restore.
#[derive(Debug, Default)]
pub struct PageSurface {
    scroll_y: i64,
    body: BodyStyle,
    pending_restore: Option<i64>,
}

impl PageSurface {
    /// Ignored while locked: a fixed body does not scroll.
    pub fn report_scroll(&mut self, y: i64) {
        if !self.body.is_locked() {
            self.scroll_y = y.max(0);
        }
    }

    pub fn body(&self) -> &BodyStyle {
        &self.body
    }

    pub fn take_restore(&mut self) -> Option<i64> {
        self.pending_restore.take()
    }
}

impl ScrollSurface for PageSurface {
    fn scroll_offset(&self) -> i64 {
        self.scroll_y
    }

    fn apply_lock(&mut self, offset: i64) {
        self.body = BodyStyle::locked_at(offset);
    }

    fn release_lock(&mut self) {
        self.body = BodyStyle::default();
    }

    fn scroll_to(&mut self, offset: i64) {
        self.scroll_y = offset;
        self.pending_restore = Some(offset);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Reference-counted page lock: applied on 0 -> 1, released on 1 -> 0.
pub struct ModalStack<S: ScrollSurface> {
    surface: S,
    open_count: u32,
    /// `Some` only between a capture and its restore. Offset 0 is a real capture.
    saved_offset: Option<i64>,
    mounted: BTreeSet<String>,
    settle_delay: Duration,
    last_release: Option<Instant>,
}

impl<S: ScrollSurface> ModalStack<S> {
    pub fn new(surface: S, settle_delay: Duration) -> Self {
        ModalStack {
            surface,
            open_count: 0,
            saved_offset: None,
            mounted: BTreeSet::new(),
            settle_delay,
            last_release: None,
        }
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn state(&self) -> LockState {
        if self.open_count > 0 {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn mounted(&self) -> impl Iterator<Item = &str> {
        self.mounted.iter().map(String::as_str)
    }

    pub fn register_open(&mut self) {
        self.open_count = self.open_count.saturating_add(1);
        if self.open_count == 1 {
            let offset = self.surface.scroll_offset();
            self.saved_offset = Some(offset);
            self.surface.apply_lock(offset);
            info!(offset, "page scroll locked");
        } else {
            debug!(open_count = self.open_count, "nested dialog opened");
        }
    }

    pub fn register_close(&mut self) {
        if self.open_count == 0 {
            debug!("close with no open dialogs ignored");
            return;
        }
        self.open_count -= 1;
        if self.open_count == 0 {
            self.unlock();
        } else {
            debug!(open_count = self.open_count, "nested dialog closed");
        }
    }

    /// Recovery path for dialogs that never unregistered (e.g. a render
    /// error tore them down). Safe in any state.
    pub fn force_reset(&mut self) {
        if self.open_count > 0 || !self.mounted.is_empty() {
            warn!(
                open_count = self.open_count,
                mounted = self.mounted.len(),
                "forcing modal stack reset"
            );
        }
        self.open_count = 0;
        self.mounted.clear();
        self.unlock();
    }

    /// Lifecycle hook for a dialog becoming visible. Mounting an id that is
    /// already mounted does not count twice.
    pub fn mount(&mut self, dialog_id: &str) -> bool {
        if !self.mounted.insert(dialog_id.to_string()) {
            return false;
        }
        self.register_open();
        true
    }

    /// Lifecycle hook for a dialog going away, however it was dismissed.
    pub fn unmount(&mut self, dialog_id: &str) -> bool {
        if !self.mounted.remove(dialog_id) {
            return false;
        }
        self.register_close();
        true
    }

    /// True once nothing is open and the settle delay has passed since the
    /// last release, so follow-up work is not blocked by open/close churn.
    pub fn is_settled(&self, now: Instant) -> bool {
        self.open_count == 0 && self.settle_remaining(now).is_zero()
    }

    pub fn settle_remaining(&self, now: Instant) -> Duration {
        match self.last_release {
            Some(at) => (at + self.settle_delay).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    fn unlock(&mut self) {
        self.surface.release_lock();
        if let Some(offset) = self.saved_offset.take() {
            self.surface.scroll_to(offset);
            info!(offset, "page scroll restored");
        }
        self.last_release = Some(Instant::now());
    }
}
