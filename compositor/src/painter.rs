//! Paint-tick driver: turns the accumulated damage region into a
//! backend-agnostic sequence of `paint_*` calls, and resets the per-frame
//! state the scheduler relies on.

use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::protocol::xfixes::ConnectionExt as XfixesExt;

use crate::context::Context;
use crate::error::Result;
use crate::geometry::Rect;
use crate::render::backend::RenderBackend;
use crate::window::Window;

/// Runs one paint tick if the accumulator is dirty; a no-op otherwise (the
/// timer watcher calls this unconditionally on every tick).
pub fn paint_if_dirty<B: RenderBackend>(ctx: &mut Context<B>) -> Result<()> {
    if !ctx.damage.accumulator_is_dirty() {
        return Ok(());
    }

    let dirty = fetch_accumulator_extents(ctx)?;
    if dirty.width == 0 || dirty.height == 0 {
        clear_accumulator(ctx)?;
        finish_frame(ctx);
        return Ok(());
    }

    ctx.backend.paint_background(dirty)?;
    paint_windows_in_order(ctx, dirty)?;
    ctx.backend.paint_all(dirty)?;

    clear_accumulator(ctx)?;
    finish_frame(ctx);
    trace!(x = dirty.x, y = dirty.y, w = dirty.width, h = dirty.height, "paint tick complete");
    Ok(())
}

/// Paint order: bottom to top, skipping unmapped or undamaged windows,
/// honouring a plugin's `render_windows` override when present.
fn paint_windows_in_order<B: RenderBackend>(ctx: &mut Context<B>, dirty: Rect) -> Result<()> {
    match ctx.plugins.render_windows() {
        Some(order) => {
            for raw_id in order {
                paint_one(ctx, raw_id, dirty)?;
            }
        }
        None => {
            let ids: Vec<u32> = ctx.registry.iter().map(|w| w.id).collect();
            for id in ids {
                paint_one(ctx, id, dirty)?;
            }
        }
    }
    Ok(())
}

fn paint_one<B: RenderBackend>(ctx: &mut Context<B>, id: u32, dirty: Rect) -> Result<()> {
    let opacity_override = ctx.plugins.window_get_opacity(id);

    let Some(window) = ctx.registry.get_mut(id) else {
        return Ok(());
    };
    if !should_paint(window, &dirty) {
        return Ok(());
    }
    let opacity = opacity_override.unwrap_or_else(|| window.opacity_or_opaque());
    let dirty_sub = intersection(&dirty, &window.geometry.outer_rect());
    ctx.backend.paint_window(window, dirty_sub, opacity)?;
    Ok(())
}

fn should_paint(window: &Window, dirty: &Rect) -> bool {
    window.is_viewable()
        && !window.is_input_only()
        && window.damaged
        && window.geometry.outer_rect().intersects(dirty)
}

fn intersection(a: &Rect, b: &Rect) -> Rect {
    let x = a.x.max(b.x);
    let y = a.y.max(b.y);
    let right = a.right().min(b.right());
    let bottom = a.bottom().min(b.bottom());
    Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
}

/// Reads the accumulator region's bounding box; the dirty area passed to
/// every backend call this tick.
fn fetch_accumulator_extents<B: RenderBackend>(ctx: &Context<B>) -> Result<Rect> {
    let reply = ctx.conn.xfixes_fetch_region(ctx.accumulator.region)?.reply()?;
    let extents = reply.extents;
    Ok(Rect::new(extents.x as i32, extents.y as i32, extents.width as i32, extents.height as i32))
}

/// Empties the server-side accumulator region in place by unioning it with
/// itself using no new rectangles is not possible directly; instead we set
/// it to an empty rectangle list.
fn clear_accumulator<B: RenderBackend>(ctx: &Context<B>) -> Result<()> {
    ctx.conn.xfixes_set_region(ctx.accumulator.region, &[])?;
    Ok(())
}

/// Resets the per-frame bookkeeping the scheduler and each window rely on,
/// after a paint has consumed the accumulated damage.
fn finish_frame<B: RenderBackend>(ctx: &mut Context<B>) {
    ctx.damage.mark_painted();
    for window in ctx.registry.iter_mut() {
        window.damaged = false;
        window.damage_notify_counter = 0;
        window.accumulator_covers_window = false;
    }
    debug!("paint: per-window frame state reset");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_disjoint_rects_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(100, 100, 10, 10);
        let r = intersection(&a, &b);
        assert_eq!(r.width, 0);
        assert_eq!(r.height, 0);
    }

    #[test]
    fn intersection_of_overlapping_rects_is_the_overlap() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        let r = intersection(&a, &b);
        assert_eq!(r, Rect::new(50, 50, 50, 50));
    }
}
