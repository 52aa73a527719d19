//! Auto-scroll decisions for the message viewport

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Live geometry of a scrollable container, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollGeometry {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl ScrollGeometry {
    /// Distance between the visible bottom edge and the end of the content
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    /// `scroll_top` that shows the end of the content
    pub fn bottom_offset(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn is_near_bottom(&self, threshold: f64) -> bool {
        self.distance_from_bottom() <= threshold
    }
}

/// The viewport the timeline is rendered into
pub trait ScrollContainer: Send + Sync {
    fn geometry(&self) -> ScrollGeometry;
    fn set_scroll_top(&self, top: f64);
}

/// Who asked for a forced scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOrigin {
    /// Explicit user action; never suppressed by the cooldown
    User,
    /// Programmatic (session reset and the like)
    System,
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollConfig {
    /// Near-bottom distance
    pub threshold: f64,
    /// Minimum spacing of smart scrolls
    pub frame_interval: Duration,
    /// Minimum spacing of system forced scrolls
    pub force_cooldown: Duration,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            threshold: 200.0,
            frame_interval: Duration::from_millis(16),
            force_cooldown: Duration::from_millis(100),
        }
    }
}

struct ScrollState {
    container: Option<Weak<dyn ScrollContainer>>,
    is_near_bottom: bool,
    last_force_at: Option<Instant>,
    frame_pending: bool,
}

struct ScrollInner {
    config: ScrollConfig,
    state: Mutex<ScrollState>,
}

/// Decides when the viewport follows new content.
///
/// The container is injected with [`attach`](Self::attach) and held weakly:
/// once the view drops it every scroll is a no-op until a new container is
/// attached. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct ScrollEngine {
    inner: Arc<ScrollInner>,
}

impl ScrollEngine {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            inner: Arc::new(ScrollInner {
                config,
                state: Mutex::new(ScrollState {
                    container: None,
                    is_near_bottom: true,
                    last_force_at: None,
                    frame_pending: false,
                }),
            }),
        }
    }

    /// Use this container from now on
    pub fn attach(&self, container: &Arc<dyn ScrollContainer>) {
        let near = container.geometry().is_near_bottom(self.inner.config.threshold);
        let mut state = self.inner.state.lock();
        state.container = Some(Arc::downgrade(container));
        state.is_near_bottom = near;
    }

    pub fn detach(&self) {
        self.inner.state.lock().container = None;
    }

    /// Re-read geometry after the user scrolled. Returns the near-bottom flag.
    pub fn on_scroll(&self) -> bool {
        let container = resolve(&mut self.inner.state.lock());
        let near = container.map(|c| c.geometry().is_near_bottom(self.inner.config.threshold));
        let mut state = self.inner.state.lock();
        if let Some(near) = near {
            state.is_near_bottom = near;
        }
        state.is_near_bottom
    }

    pub fn is_near_bottom(&self) -> bool {
        self.inner.state.lock().is_near_bottom
    }

    /// Whether a "scroll to bottom" affordance should be offered
    pub fn show_scroll_button(&self) -> bool {
        !self.is_near_bottom()
    }

    /// Follow new content if the user is near the bottom.
    ///
    /// Calls within one frame are coalesced into a single scroll at the
    /// end of the frame. Outside a Tokio runtime the scroll happens at once.
    pub fn smart_scroll(&self) {
        let frame = self.inner.config.frame_interval;
        {
            let mut state = self.inner.state.lock();
            if !state.is_near_bottom || state.frame_pending {
                return;
            }
            if tokio::runtime::Handle::try_current().is_err() {
                let target = claim_bottom(&mut state);
                drop(state);
                scroll_to_end(target);
                return;
            }
            state.frame_pending = true;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(frame).await;
            let target = {
                let mut state = inner.state.lock();
                state.frame_pending = false;
                if state.is_near_bottom {
                    claim_bottom(&mut state)
                } else {
                    None
                }
            };
            scroll_to_end(target);
        });
    }

    /// Scroll to the bottom regardless of position.
    ///
    /// System requests inside the cooldown are dropped; a user request
    /// resets the cooldown and always scrolls. Returns whether it scrolled.
    pub fn force_scroll(&self, origin: ScrollOrigin) -> bool {
        let target = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            if origin == ScrollOrigin::User {
                state.last_force_at = None;
            }
            let cooling = state
                .last_force_at
                .is_some_and(|last| now.duration_since(last) < self.inner.config.force_cooldown);
            if cooling {
                return false;
            }
            state.last_force_at = Some(now);
            claim_bottom(&mut state)
        };
        scroll_to_end(target)
    }

    /// Manual entry point: `force` for user actions, otherwise smart
    pub fn scroll_to_bottom(&self, force: bool) {
        if force {
            self.force_scroll(ScrollOrigin::User);
        } else {
            self.smart_scroll();
        }
    }

    /// Forget scroll history, e.g. for a new conversation
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.is_near_bottom = true;
        state.last_force_at = None;
    }
}

fn resolve(state: &mut ScrollState) -> Option<Arc<dyn ScrollContainer>> {
    let container = state.container.as_ref().and_then(Weak::upgrade);
    if container.is_none() && state.container.is_some() {
        tracing::debug!("Scroll container is gone, waiting for a new one");
        state.container = None;
    }
    container
}

// Containers may call back into the engine, so they are only touched
// with the state lock released.
fn claim_bottom(state: &mut ScrollState) -> Option<Arc<dyn ScrollContainer>> {
    let container = resolve(state)?;
    state.is_near_bottom = true;
    Some(container)
}

fn scroll_to_end(container: Option<Arc<dyn ScrollContainer>>) -> bool {
    let Some(container) = container else {
        return false;
    };
    let geometry = container.geometry();
    container.set_scroll_top(geometry.bottom_offset());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeViewport {
        geometry: Mutex<ScrollGeometry>,
        scrolls: AtomicUsize,
    }

    impl FakeViewport {
        fn new(scroll_height: f64, scroll_top: f64, client_height: f64) -> Arc<Self> {
            Arc::new(Self {
                geometry: Mutex::new(ScrollGeometry {
                    scroll_height,
                    scroll_top,
                    client_height,
                }),
                scrolls: AtomicUsize::new(0),
            })
        }

        fn user_scrolls_to(&self, top: f64) {
            self.geometry.lock().scroll_top = top;
        }

        fn grow(&self, by: f64) {
            self.geometry.lock().scroll_height += by;
        }

        fn scroll_count(&self) -> usize {
            self.scrolls.load(Ordering::SeqCst)
        }
    }

    impl ScrollContainer for FakeViewport {
        fn geometry(&self) -> ScrollGeometry {
            *self.geometry.lock()
        }

        fn set_scroll_top(&self, top: f64) {
            self.geometry.lock().scroll_top = top;
            self.scrolls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn attached(viewport: &Arc<FakeViewport>) -> (ScrollEngine, Arc<dyn ScrollContainer>) {
        let engine = ScrollEngine::new(ScrollConfig::default());
        let container: Arc<dyn ScrollContainer> = viewport.clone();
        engine.attach(&container);
        (engine, container)
    }

    #[test]
    fn test_threshold_geometry() {
        let g = |top| ScrollGeometry {
            scroll_height: 1000.0,
            scroll_top: top,
            client_height: 500.0,
        };
        assert_eq!(g(350.0).distance_from_bottom(), 150.0);
        assert!(g(350.0).is_near_bottom(200.0));
        assert!(!g(200.0).is_near_bottom(200.0));
    }

    #[test]
    fn test_scroll_button_follows_user_position() {
        let viewport = FakeViewport::new(1000.0, 500.0, 500.0);
        let (engine, _container) = attached(&viewport);

        viewport.user_scrolls_to(350.0);
        engine.on_scroll();
        assert!(!engine.show_scroll_button());

        viewport.user_scrolls_to(200.0);
        engine.on_scroll();
        assert!(engine.show_scroll_button());
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_scroll_throttled_to_one_per_frame() {
        let viewport = FakeViewport::new(1000.0, 500.0, 500.0);
        let (engine, _container) = attached(&viewport);

        for _ in 0..50 {
            viewport.grow(10.0);
            engine.smart_scroll();
        }
        assert_eq!(viewport.scroll_count(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(viewport.scroll_count(), 1);
        assert_eq!(viewport.geometry().scroll_top, 1000.0);

        engine.smart_scroll();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(viewport.scroll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_scroll_suppressed_when_user_scrolled_away() {
        let viewport = FakeViewport::new(2000.0, 1500.0, 500.0);
        let (engine, _container) = attached(&viewport);

        viewport.user_scrolls_to(100.0);
        engine.on_scroll();
        engine.smart_scroll();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(viewport.scroll_count(), 0);
        assert_eq!(viewport.geometry().scroll_top, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_growth_alone_does_not_stop_following() {
        let viewport = FakeViewport::new(1000.0, 500.0, 500.0);
        let (engine, _container) = attached(&viewport);

        viewport.grow(800.0);
        engine.smart_scroll();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(viewport.geometry().scroll_top, 1300.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_scroll_ignores_position_with_cooldown() {
        let viewport = FakeViewport::new(2000.0, 0.0, 500.0);
        let (engine, _container) = attached(&viewport);
        assert!(!engine.is_near_bottom());

        assert!(engine.force_scroll(ScrollOrigin::System));
        assert!(!engine.force_scroll(ScrollOrigin::System));
        assert_eq!(viewport.scroll_count(), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.force_scroll(ScrollOrigin::System));
        assert_eq!(viewport.scroll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_force_resets_cooldown() {
        let viewport = FakeViewport::new(2000.0, 0.0, 500.0);
        let (engine, _container) = attached(&viewport);

        assert!(engine.force_scroll(ScrollOrigin::System));
        assert!(engine.force_scroll(ScrollOrigin::User));
        assert!(engine.force_scroll(ScrollOrigin::User));
        assert_eq!(viewport.scroll_count(), 3);
        assert!(engine.is_near_bottom());
    }

    #[test]
    fn test_unmounted_container_is_noop_until_reattached() {
        let engine = ScrollEngine::new(ScrollConfig::default());
        {
            let viewport = FakeViewport::new(2000.0, 0.0, 500.0);
            let container: Arc<dyn ScrollContainer> = viewport;
            engine.attach(&container);
        }
        assert!(!engine.force_scroll(ScrollOrigin::User));

        let remounted = FakeViewport::new(3000.0, 0.0, 500.0);
        let container: Arc<dyn ScrollContainer> = remounted.clone();
        engine.attach(&container);
        assert!(engine.force_scroll(ScrollOrigin::User));
        assert_eq!(remounted.geometry().scroll_top, 2500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_to_bottom_force_and_smart() {
        let viewport = FakeViewport::new(2000.0, 0.0, 500.0);
        let (engine, _container) = attached(&viewport);

        engine.scroll_to_bottom(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(viewport.scroll_count(), 0);

        engine.scroll_to_bottom(true);
        assert_eq!(viewport.geometry().scroll_top, 1500.0);
        assert_eq!(viewport.scroll_count(), 1);

        viewport.grow(100.0);
        engine.scroll_to_bottom(false);
        assert_eq!(viewport.scroll_count(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(viewport.scroll_count(), 2);
        assert_eq!(viewport.geometry().scroll_top, 1600.0);
    }

    #[test]
    fn test_detach_stops_scrolling() {
        let viewport = FakeViewport::new(2000.0, 0.0, 500.0);
        let (engine, _container) = attached(&viewport);
        engine.detach();
        assert!(!engine.force_scroll(ScrollOrigin::User));
        assert_eq!(viewport.scroll_count(), 0);
    }

    struct EchoingViewport {
        inner: Arc<FakeViewport>,
        engine: Mutex<Option<ScrollEngine>>,
    }

    impl ScrollContainer for EchoingViewport {
        fn geometry(&self) -> ScrollGeometry {
            self.inner.geometry()
        }

        fn set_scroll_top(&self, top: f64) {
            self.inner.set_scroll_top(top);
            // browsers fire a scroll event from inside the setter
            let engine = self.engine.lock().clone();
            if let Some(engine) = engine {
                engine.on_scroll();
            }
        }
    }

    #[test]
    fn test_container_may_call_back_while_scrolling() {
        let engine = ScrollEngine::new(ScrollConfig::default());
        let echoing = Arc::new(EchoingViewport {
            inner: FakeViewport::new(2000.0, 0.0, 500.0),
            engine: Mutex::new(Some(engine.clone())),
        });
        let container: Arc<dyn ScrollContainer> = echoing.clone();
        engine.attach(&container);

        assert!(engine.force_scroll(ScrollOrigin::User));
        engine.smart_scroll();
        assert_eq!(echoing.inner.scroll_count(), 2);
        assert!(engine.is_near_bottom());
    }

    #[test]
    fn test_smart_scroll_without_runtime_is_immediate() {
        let viewport = FakeViewport::new(1200.0, 600.0, 500.0);
        let (engine, _container) = attached(&viewport);
        engine.smart_scroll();
        assert_eq!(viewport.scroll_count(), 1);
    }
}
