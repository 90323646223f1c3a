//! Window registry: the ordered paint-order sequence of windows plus an
//! id-keyed index for fast lookup, and the pixmap/region lifecycle rules
//! that piggyback on registry mutations.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ConnectionExt as XprotoExt, MapState as XMapState, WindowClass as XWindowClass,
};
use x11rb::rust_connection::RustConnection;

use crate::error::Result;
use crate::geometry::Rect;
use crate::window::{MapState, Window, WindowAttributes, WindowClass};

/// Sentinel passed to [`WindowRegistry::restack`] meaning "move to the
/// bottom of the stack", mirroring X11's `None` above-sibling convention.
pub const STACK_BOTTOM: Option<WindowId> = None;

pub struct WindowRegistry {
    /// Paint order, bottom-to-top; the authoritative stacking order.
    order: Vec<Window>,
    /// id -> position in `order`, kept in sync on every mutation.
    index: BTreeMap<WindowId, usize>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        WindowRegistry {
            order: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Creates and appends a window to the top of the stack; does not fetch
    /// attributes or geometry, that is the caller's responsibility.
    pub fn append(&mut self, id: WindowId) -> &mut Window {
        let window = Window::new(id);
        self.order.push(window);
        let position = self.order.len() - 1;
        self.index.insert(id, position);
        trace!(id, position, "registry: appended window");
        &mut self.order[position]
    }

    /// Removes the window from both the ordered sequence and the lookup
    /// index, returning its owned server-side resource handles so the
    /// caller can release them. A caller holding an unknown id gets `None`
    /// and must tolerate it.
    pub fn remove(&mut self, id: WindowId) -> Option<Window> {
        let position = self.index.remove(&id)?;
        let window = self.order.remove(position);
        // every window after `position` shifted left by one.
        for entry in self.index.values_mut() {
            if *entry > position {
                *entry -= 1;
            }
        }
        debug!(id, "registry: removed window");
        Some(window)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        let position = *self.index.get(&id)?;
        self.order.get(position)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        let position = *self.index.get(&id)?;
        self.order.get_mut(position)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.index.contains_key(&id)
    }

    /// Paint order, bottom first.
    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.order.iter()
    }

    /// Paint order, bottom first, mutable.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Window> {
        self.order.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Detaches `id` and re-inserts it immediately above `above`, or at the
    /// bottom when `above` is `None`. O(n): rare in practice
    /// (circulate-notify, sibling-carrying configure-notify).
    pub fn restack(&mut self, id: WindowId, above: Option<WindowId>) {
        let Some(old_position) = self.index.get(&id).copied() else {
            warn!(id, "registry: restack of unknown window ignored");
            return;
        };
        let window = self.order.remove(old_position);

        let new_position = match above {
            None => 0,
            Some(above_id) => match self.index.get(&above_id) {
                Some(&p) => {
                    // account for the removal above shifting indices.
                    if p > old_position { p } else { p + 1 }
                }
                None => self.order.len(),
            },
        };
        let new_position = new_position.min(self.order.len());
        self.order.insert(new_position, window);
        self.rebuild_index();
        trace!(id, old_position, new_position, "registry: restacked window");
    }

    /// Moves `id` to the top or bottom of the stack (`circulate-notify`).
    pub fn circulate(&mut self, id: WindowId, to_top: bool) {
        if to_top {
            let Some(old_position) = self.index.get(&id).copied() else {
                return;
            };
            let window = self.order.remove(old_position);
            self.order.push(window);
            self.rebuild_index();
        } else {
            self.restack(id, STACK_BOTTOM);
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, window) in self.order.iter().enumerate() {
            self.index.insert(window.id, position);
        }
    }

    /// `add_existing`: batches `get_window_attributes`/`get_geometry`
    /// requests for every id (all requests issued before any reply is
    /// awaited), then appends a window populated with the real attributes
    /// and geometry for each id whose attribute fetch succeeds. An id whose
    /// attribute reply errors (window destroyed between `query_tree` and
    /// here) is dropped with a warning rather than registered half-built.
    pub fn add_existing(&mut self, conn: &RustConnection, ids: &[WindowId]) -> Result<()> {
        let new_ids: Vec<WindowId> = ids.iter().copied().filter(|&id| !self.contains(id)).collect();

        let attr_cookies: Vec<_> = new_ids
            .iter()
            .map(|&id| conn.get_window_attributes(id))
            .collect::<std::result::Result<_, _>>()?;
        let geom_cookies: Vec<_> = new_ids
            .iter()
            .map(|&id| conn.get_geometry(id))
            .collect::<std::result::Result<_, _>>()?;

        for ((id, attr_cookie), geom_cookie) in new_ids.into_iter().zip(attr_cookies).zip(geom_cookies) {
            let attr_reply = match attr_cookie.reply() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(id, error = %e, "registry: dropping pre-existing window, attribute fetch failed");
                    continue;
                }
            };
            let geom_reply = match geom_cookie.reply() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(id, error = %e, "registry: dropping pre-existing window, geometry fetch failed");
                    continue;
                }
            };

            let window = self.append(id);
            window.attributes = WindowAttributes {
                class: match attr_reply.class {
                    XWindowClass::INPUT_ONLY => WindowClass::InputOnly,
                    _ => WindowClass::InputOutput,
                },
                map_state: match attr_reply.map_state {
                    XMapState::VIEWABLE => MapState::Viewable,
                    _ => MapState::Unmapped,
                },
                override_redirect: attr_reply.override_redirect,
                visual: attr_reply.visual,
            };
            window.geometry = crate::geometry::Geometry::new(
                geom_reply.x,
                geom_reply.y,
                geom_reply.width,
                geom_reply.height,
                geom_reply.border_width,
            );
            debug!(id, "registry: populated pre-existing window from server state");
        }
        Ok(())
    }

    /// True iff the window's bounding box intersects the screen rectangle.
    pub fn visible(&self, id: WindowId, screen: &Rect) -> bool {
        match self.get(id) {
            Some(window) => window.intersects_screen(screen),
            None => false,
        }
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_get_roundtrip() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        assert!(reg.get(1).is_some());
        assert!(reg.get(2).is_some());
        assert!(reg.get(3).is_none());
    }

    #[test]
    fn remove_shifts_remaining_indices() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        reg.append(3);
        reg.remove(2);
        let order: Vec<_> = reg.iter().map(|w| w.id).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(reg.get(3).unwrap().id, 3);
    }

    #[test]
    fn restack_none_moves_to_bottom() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        reg.append(3);
        reg.restack(3, STACK_BOTTOM);
        let order: Vec<_> = reg.iter().map(|w| w.id).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn restack_above_sibling() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        reg.append(3);
        // stack is [1, 2, 3]; put 1 directly above 2 -> [2, 1, 3]
        reg.restack(1, Some(2));
        let order: Vec<_> = reg.iter().map(|w| w.id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn restack_is_its_own_inverse_when_uninterrupted() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        reg.append(3);
        let before: Vec<_> = reg.iter().map(|w| w.id).collect();
        reg.restack(1, Some(3));
        reg.restack(1, STACK_BOTTOM);
        let after: Vec<_> = reg.iter().map(|w| w.id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        assert!(reg.remove(99).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn circulate_to_top() {
        let mut reg = WindowRegistry::new();
        reg.append(1);
        reg.append(2);
        reg.append(3);
        reg.circulate(1, true);
        let order: Vec<_> = reg.iter().map(|w| w.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
