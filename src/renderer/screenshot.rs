//! Screenshot promises fulfilled at buffer swap.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::texture::Texture2D;

#[derive(Debug, Default)]
struct Shared {
    image: Mutex<Option<Texture2D>>,
    ready: Condvar,
}

/// Handle to a screenshot that becomes available after the next buffer swap.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotHandle {
    shared: Arc<Shared>,
}

impl ScreenshotHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.image.lock().is_some()
    }

    /// Take the image if it has arrived.
    pub fn try_take(&self) -> Option<Texture2D> {
        self.shared.image.lock().take()
    }

    /// Block until the image arrives.
    ///
    /// The image is produced by `swap_buffers` on the render thread, so this must not be
    /// called from that thread before the swap.
    pub fn wait(&self) -> Texture2D {
        let mut image = self.shared.image.lock();
        loop {
            if let Some(texture) = image.take() {
                return texture;
            }
            self.shared.ready.wait(&mut image);
        }
    }

    /// Block until the image arrives or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Texture2D> {
        let mut image = self.shared.image.lock();
        if image.is_none() {
            self.shared.ready.wait_for(&mut image, timeout);
        }
        image.take()
    }

    pub(crate) fn fulfill(&self, texture: Texture2D) {
        *self.shared.image.lock() = Some(texture);
        self.shared.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::texture::ColorSpace;

    #[test]
    fn test_fulfill_then_take() {
        let handle = ScreenshotHandle::new();
        assert!(!handle.is_ready());
        assert!(handle.wait_timeout(Duration::from_millis(1)).is_none());

        handle.clone().fulfill(Texture2D::from_color(Color::RED, ColorSpace::Srgb));
        assert!(handle.is_ready());
        assert_eq!(handle.wait().dimensions(), glam::UVec2::ONE);
        assert!(handle.try_take().is_none());
    }

    #[test]
    fn test_wait_across_threads() {
        let handle = ScreenshotHandle::new();
        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || handle.wait())
        };
        handle.fulfill(Texture2D::from_color(Color::BLUE, ColorSpace::Linear));
        let image = waiter.join().unwrap();
        assert_eq!(image.width(), 1);
    }
}
