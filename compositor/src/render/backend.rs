//! The rendering-backend trait and the backend-agnostic alpha-mask cache
//! it shares across windows.

use std::collections::HashMap;
use std::time::Duration;

use x11rb::protocol::xproto::{Pixmap, Window as WindowId};

use crate::error::Result;
use crate::window::Window;

/// Opacity value meaning "fully opaque"; mirrors [`crate::window::OPAQUE`].
pub const OPAQUE: u16 = u16::MAX;

/// Capability set every rendering backend must provide. `Surface` is the
/// backend's handle type for a compositing surface (a Render-extension
/// picture, for the reference backend).
pub trait RenderBackend {
    type Surface: Copy;

    /// Two-phase handshake: issue the version/format negotiation requests.
    fn init(&mut self) -> Result<()>;
    /// Collect the replies from `init` and finish setting up surfaces.
    /// Fails with an *unsupported-extension-version* style error if the
    /// server's extension version is too old.
    fn init_finalise(&mut self) -> Result<()>;

    /// Rebuilds the background surface from `background_pixmap`, the
    /// caller-resolved desktop-background pixmap, falling back to a solid
    /// fill when it is `None` or fails to produce a usable surface.
    fn reset_background(&mut self, background_pixmap: Option<Pixmap>) -> Result<()>;

    fn paint_background(&mut self, dirty: crate::geometry::Rect) -> Result<()>;

    fn paint_window(
        &mut self,
        window: &mut Window,
        dirty_sub: crate::geometry::Rect,
        opacity: u16,
    ) -> Result<()>;

    fn paint_all(&mut self, dirty: crate::geometry::Rect) -> Result<()>;

    fn free_window_pixmap(&mut self, window: &mut Window) -> Result<()>;

    fn free_window(&mut self, window: &mut Window) -> Result<()>;

    fn is_request(&self, code: u8) -> bool;
    fn request_label(&self, minor: u8) -> &'static str;
    fn error_label(&self, code: u8) -> &'static str;
}

struct CacheEntry<S> {
    opacity: u16,
    surface: S,
    refcount: u32,
}

/// A reference-counted cache of 1x1 repeating alpha-mask surfaces, one per
/// distinct opacity value in use, shared across every window that needs
/// one. Entries are ordered most-recently-created first; with only a
/// handful of distinct opacities in practice, linear scans are cheap, so a
/// `Vec` plus a per-window attachment map suffices.
pub struct AlphaMaskCache<S> {
    entries: Vec<CacheEntry<S>>,
    attached: HashMap<WindowId, u16>,
}

impl<S: Copy> AlphaMaskCache<S> {
    pub fn new() -> Self {
        AlphaMaskCache {
            entries: Vec::new(),
            attached: HashMap::new(),
        }
    }

    /// Looks up (or allocates) the alpha-mask surface for `window` at
    /// `opacity`. `create` is invoked only when no existing entry matches
    /// `opacity` and a new 1x1 surface must be allocated; it must return
    /// that surface.
    pub fn get(
        &mut self,
        window: WindowId,
        opacity: u16,
        create: impl FnOnce(u16) -> Result<S>,
    ) -> Result<Option<S>> {
        if let Some(&current) = self.attached.get(&window) {
            if current == opacity {
                return Ok(self.find(current).map(|e| e.surface));
            }
            self.detach(window, current);
        }

        if opacity == OPAQUE {
            return Ok(None);
        }

        if let Some(entry) = self.find_mut(opacity) {
            entry.refcount += 1;
            self.attached.insert(window, opacity);
            return Ok(Some(entry.surface));
        }

        let surface = create(opacity)?;
        self.entries.insert(
            0,
            CacheEntry {
                opacity,
                surface,
                refcount: 1,
            },
        );
        self.attached.insert(window, opacity);
        Ok(Some(surface))
    }

    /// Releases `window`'s attachment, if any, without creating a new one;
    /// used when a window is destroyed or becomes fully opaque.
    pub fn detach_window(&mut self, window: WindowId) {
        if let Some(opacity) = self.attached.remove(&window) {
            self.detach(window, opacity);
        }
    }

    fn detach(&mut self, window: WindowId, opacity: u16) {
        self.attached.remove(&window);
        if let Some(position) = self.entries.iter().position(|e| e.opacity == opacity) {
            self.entries[position].refcount -= 1;
            if self.entries[position].refcount == 0 {
                self.entries.remove(position);
            }
        }
    }

    fn find(&self, opacity: u16) -> Option<&CacheEntry<S>> {
        self.entries.iter().find(|e| e.opacity == opacity)
    }

    fn find_mut(&mut self, opacity: u16) -> Option<&mut CacheEntry<S>> {
        self.entries.iter_mut().find(|e| e.opacity == opacity)
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl<S: Copy> Default for AlphaMaskCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the paint interval bound to the extension-advertised refresh
/// rate; kept here rather than in `damage` since the backend is the only
/// component that learns the rate (from a RandR query).
pub fn interval_from_hz(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_request_returns_none() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        let result = cache.get(1, OPAQUE, |_| Ok(999)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn first_translucent_request_allocates() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        let result = cache.get(1, 128, |opacity| Ok(1000 + opacity as u32)).unwrap();
        assert_eq!(result, Some(1128));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn second_window_same_opacity_shares_entry() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        cache.get(1, 128, |opacity| Ok(1000 + opacity as u32)).unwrap();
        let result = cache.get(2, 128, |_| panic!("should not allocate twice")).unwrap();
        assert_eq!(result, Some(1128));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn changing_opacity_detaches_old_entry_and_frees_when_unreferenced() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        cache.get(1, 128, |opacity| Ok(1000 + opacity as u32)).unwrap();
        cache.get(1, 64, |opacity| Ok(1000 + opacity as u32)).unwrap();
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn shared_entry_survives_until_last_window_detaches() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        cache.get(1, 128, |opacity| Ok(1000 + opacity as u32)).unwrap();
        cache.get(2, 128, |_| panic!()).unwrap();
        cache.detach_window(1);
        assert_eq!(cache.entry_count(), 1);
        cache.detach_window(2);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn re_requesting_same_opacity_after_detach_reuses_cached_surface() {
        let mut cache: AlphaMaskCache<u32> = AlphaMaskCache::new();
        cache.get(1, 100, |opacity| Ok(opacity as u32)).unwrap();
        cache.get(1, 200, |opacity| Ok(opacity as u32)).unwrap();
        let result = cache.get(2, 200, |_| panic!("must reuse existing entry")).unwrap();
        assert_eq!(result, Some(200));
    }
}
