//! The `Window` model: one top-level window of the display, its mirrored
//! server attributes, and the off-screen resources bound to it.

use std::any::Any;

use x11rb::protocol::damage::Damage;
use x11rb::protocol::xfixes::Region;
use x11rb::protocol::xproto::{Pixmap, Window as WindowId};

use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    InputOutput,
    InputOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Unmapped,
    Viewable,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowAttributes {
    pub class: WindowClass,
    pub map_state: MapState,
    pub override_redirect: bool,
    pub visual: u32,
}

impl Default for WindowAttributes {
    fn default() -> Self {
        WindowAttributes {
            class: WindowClass::InputOutput,
            map_state: MapState::Unmapped,
            override_redirect: false,
            visual: 0,
        }
    }
}

/// Per-backend opaque state hung off a window: the picture wrapping its
/// pixmap, a handle into the alpha-mask cache, etc. Owned by whichever
/// rendering backend created it; the window only holds the slot.
pub type RenderingState = Box<dyn Any + Send>;

pub struct Window {
    pub id: WindowId,
    pub attributes: WindowAttributes,
    pub geometry: Geometry,
    pub damage_handle: Option<Damage>,
    pub damaged: bool,
    pub damage_notify_counter: u32,
    /// Whether the current frame's accumulator already covers this
    /// window's whole bounding box; cleared by the painter after each
    /// successful paint.
    pub accumulator_covers_window: bool,
    pub pixmap: Option<Pixmap>,
    pub region: Option<Region>,
    pub is_rectangular: bool,
    pub rendering_state: Option<RenderingState>,
    /// Per-window opacity as reported by `_NET_WM_WINDOW_OPACITY`, or by a
    /// plugin's opacity provider hook. `None` means fully opaque.
    pub opacity: Option<u16>,
}

/// Fully opaque, matching the property's convention where the max `u32`
/// (0xffffffff) means opaque; the scheduler/backend work in `u16` after
/// scaling, see [`crate::render::backend::OPAQUE`].
pub const OPAQUE: u16 = u16::MAX;

impl Window {
    pub fn new(id: WindowId) -> Self {
        Window {
            id,
            attributes: WindowAttributes::default(),
            geometry: Geometry::default(),
            damage_handle: None,
            damaged: false,
            damage_notify_counter: 0,
            accumulator_covers_window: false,
            pixmap: None,
            region: None,
            is_rectangular: true,
            rendering_state: None,
            opacity: None,
        }
    }

    /// Input-only windows never track damage or own a pixmap.
    pub fn is_input_only(&self) -> bool {
        self.attributes.class == WindowClass::InputOnly
    }

    pub fn is_viewable(&self) -> bool {
        self.attributes.map_state == MapState::Viewable
    }

    /// True iff the window's bounding box intersects the screen rectangle.
    pub fn intersects_screen(&self, screen: &crate::geometry::Rect) -> bool {
        self.geometry.outer_rect().intersects(screen)
    }

    pub fn opacity_or_opaque(&self) -> u16 {
        self.opacity.unwrap_or(OPAQUE)
    }

    pub fn is_opaque(&self) -> bool {
        self.opacity_or_opaque() == OPAQUE
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("geometry", &self.geometry)
            .field("damaged", &self.damaged)
            .field("pixmap", &self.pixmap)
            .field("opacity", &self.opacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn fresh_window_has_no_server_resources() {
        let w = Window::new(42);
        assert!(w.damage_handle.is_none());
        assert!(w.pixmap.is_none());
        assert!(w.region.is_none());
        assert!(!w.damaged);
    }

    #[test]
    fn input_only_windows_are_identified() {
        let mut w = Window::new(1);
        w.attributes.class = WindowClass::InputOnly;
        assert!(w.is_input_only());
    }

    #[test]
    fn offscreen_window_does_not_intersect_screen() {
        let mut w = Window::new(1);
        w.geometry = Geometry::new(-500, -500, 10, 10, 0);
        let screen = Rect::new(0, 0, 1920, 1080);
        assert!(!w.intersects_screen(&screen));
    }

    #[test]
    fn opacity_defaults_to_opaque() {
        let w = Window::new(1);
        assert!(w.is_opaque());
        assert_eq!(w.opacity_or_opaque(), OPAQUE);
    }
}
