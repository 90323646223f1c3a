//! Event dispatch: demultiplexes display-server messages to registry
//! mutations, the damage scheduler, and plugin hooks.

use tracing::{debug, error, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::composite::ConnectionExt as CompositeExt;
use x11rb::protocol::damage::{ConnectionExt as DamageExt, NotifyEvent as DamageNotifyEvent};
use x11rb::protocol::randr::{ConnectionExt as RandrExt, ScreenChangeNotifyEvent};
use x11rb::protocol::xfixes::ConnectionExt as XfixesExt;
use x11rb::protocol::xproto::{
    AtomEnum, CirculatePlace, ConfigureNotifyEvent, ConnectionExt as XprotoExt, CreateNotifyEvent,
    DestroyNotifyEvent, MapNotifyEvent, MappingNotifyEvent, Pixmap, PropertyNotifyEvent,
    ReparentNotifyEvent, UnmapNotifyEvent, Window as WindowId,
};
use x11rb::protocol::Event;

use crate::context::Context;
use crate::damage::{DamageAction, WindowDamageState};
use crate::error::{is_resource_vanished, CompositorError, Result};
use crate::render::backend::RenderBackend;

/// Processes every event currently readable on the connection, draining
/// all pending events.
pub fn drain_events<B: RenderBackend>(ctx: &mut Context<B>) -> Result<()> {
    loop {
        let event = match ctx.conn.poll_for_event()? {
            Some(event) => event,
            None => break,
        };
        dispatch_one(ctx, event)?;
    }
    Ok(())
}

fn dispatch_one<B: RenderBackend>(ctx: &mut Context<B>, event: Event) -> Result<()> {
    match event {
        Event::DamageNotify(e) => on_damage_notify(ctx, e),
        Event::CreateNotify(e) => on_create_notify(ctx, e),
        Event::DestroyNotify(e) => on_destroy_notify(ctx, e),
        Event::MapNotify(e) => on_map_notify(ctx, e),
        Event::UnmapNotify(e) => on_unmap_notify(ctx, e),
        Event::ConfigureNotify(e) => on_configure_notify(ctx, e),
        Event::CirculateNotify(e) => {
            let to_top = e.place == CirculatePlace::TOP;
            ctx.registry.circulate(e.window, to_top);
            ctx.plugins.dispatch_circulate(e.window);
            Ok(())
        }
        Event::ReparentNotify(e) => on_reparent_notify(ctx, e),
        Event::PropertyNotify(e) => on_property_notify(ctx, e),
        Event::MappingNotify(e) => on_mapping_notify(ctx, e),
        Event::KeyPress(e) => {
            ctx.plugins.dispatch_key_press(e.detail);
            Ok(())
        }
        Event::KeyRelease(e) => {
            ctx.plugins.dispatch_key_release(e.detail);
            Ok(())
        }
        Event::ButtonPress(e) => {
            ctx.plugins.dispatch_button_press(e.detail);
            Ok(())
        }
        Event::ButtonRelease(e) => {
            ctx.plugins.dispatch_button_release(e.detail);
            Ok(())
        }
        Event::Error(e) => on_error(ctx, e),
        Event::RandrScreenChangeNotify(e) => on_randr_screen_change_notify(ctx, e),
        other => {
            trace!(?other, "unhandled event kind");
            Ok(())
        }
    }
}

fn on_damage_notify<B: RenderBackend>(ctx: &mut Context<B>, e: DamageNotifyEvent) -> Result<()> {
    let id = e.drawable;
    let Some(window) = ctx.registry.get_mut(id) else {
        trace!(id, "damage-notify for unknown window, ignoring");
        return Ok(());
    };

    let mut state = WindowDamageState {
        painted_since_viewable: window.damaged,
        accumulator_covers_window: window.accumulator_covers_window,
    };
    let action = ctx
        .damage
        .on_damage_notify(id, &mut state, &mut window.damage_notify_counter);
    window.damaged = true;
    window.accumulator_covers_window = state.accumulator_covers_window;

    match action {
        DamageAction::FullRepaint | DamageAction::AlreadyFull => {
            if let Some(handle) = window.damage_handle {
                ctx.conn.damage_subtract(handle, 0u32, 0u32)?;
            }
        }
        DamageAction::Partial => {
            let region = ctx.conn.generate_id()?;
            ctx.conn.xfixes_create_region(region, &[])?;
            if let Some(handle) = window.damage_handle {
                ctx.conn.damage_subtract(handle, 0u32, region)?;
            }
            ctx.conn.xfixes_translate_region(region, window.geometry.x, window.geometry.y)?;
            ctx.conn.xfixes_union_region(region, ctx.accumulator.region, ctx.accumulator.region)?;
            ctx.conn.xfixes_destroy_region(region)?;
        }
    }

    ctx.plugins.dispatch_damage(id);
    Ok(())
}

fn on_create_notify<B: RenderBackend>(ctx: &mut Context<B>, e: CreateNotifyEvent) -> Result<()> {
    if e.parent != ctx.root {
        return Ok(());
    }
    let window = ctx.registry.append(e.window);
    window.geometry = crate::geometry::Geometry::new(e.x, e.y, e.width, e.height, e.border_width);
    window.attributes.override_redirect = e.override_redirect;

    if ctx.registry.visible(e.window, &ctx.screen_rect()) {
        create_window_region(ctx, e.window)?;
    }
    ctx.plugins.dispatch_create(e.window);
    Ok(())
}

fn on_destroy_notify<B: RenderBackend>(ctx: &mut Context<B>, e: DestroyNotifyEvent) -> Result<()> {
    // the server already freed the damage handle implicitly.
    if let Some(mut window) = ctx.registry.remove(e.window) {
        window.damage_handle = None;
        release_window_resources(ctx, &mut window)?;
    }
    ctx.plugins.dispatch_destroy(e.window);
    Ok(())
}

fn on_map_notify<B: RenderBackend>(ctx: &mut Context<B>, e: MapNotifyEvent) -> Result<()> {
    let id = e.window;
    allocate_pixmap_and_damage(ctx, id)?;
    if let Some(window) = ctx.registry.get_mut(id) {
        window.attributes.map_state = crate::window::MapState::Viewable;
        window.damaged = false;
    }
    create_window_region(ctx, id)?;
    ctx.plugins.dispatch_map(id);
    Ok(())
}

fn on_unmap_notify<B: RenderBackend>(ctx: &mut Context<B>, e: UnmapNotifyEvent) -> Result<()> {
    let id = e.window;
    if let Some(region) = ctx.registry.get(id).and_then(|w| w.region) {
        ctx.conn.xfixes_union_region(region, ctx.accumulator.region, ctx.accumulator.region)?;
    }
    if let Some(window) = ctx.registry.get_mut(id) {
        window.attributes.map_state = crate::window::MapState::Unmapped;
        window.damaged = false;
        ctx.backend.free_window_pixmap(window)?;
        if let Some(pixmap) = window.pixmap.take() {
            ctx.conn.free_pixmap(pixmap)?;
        }
    }
    ctx.plugins.dispatch_unmap(id);
    Ok(())
}

fn on_configure_notify<B: RenderBackend>(ctx: &mut Context<B>, e: ConfigureNotifyEvent) -> Result<()> {
    if e.window == ctx.root {
        ctx.screen_width = e.width;
        ctx.screen_height = e.height;
        let pixmap = fetch_background_pixmap(ctx)?;
        ctx.backend.reset_background(pixmap)?;
        return Ok(());
    }

    let Some(window) = ctx.registry.get_mut(e.window) else {
        return Ok(());
    };
    if let Some(region) = window.region {
        ctx.conn.xfixes_union_region(region, ctx.accumulator.region, ctx.accumulator.region)?;
    }

    let size_or_border_changed = window.geometry.width != e.width
        || window.geometry.height != e.height
        || window.geometry.border_width != e.border_width;
    window.geometry = crate::geometry::Geometry::new(e.x, e.y, e.width, e.height, e.border_width);

    if size_or_border_changed && window.is_viewable() {
        if let Some(pixmap) = window.pixmap.take() {
            ctx.conn.free_pixmap(pixmap)?;
        }
        allocate_pixmap_and_damage(ctx, e.window)?;
    }
    create_window_region(ctx, e.window)?;

    if e.above_sibling == 0 {
        ctx.registry.restack(e.window, None);
    } else {
        ctx.registry.restack(e.window, Some(e.above_sibling));
    }
    ctx.plugins.dispatch_configure(e.window);
    Ok(())
}

fn on_reparent_notify<B: RenderBackend>(ctx: &mut Context<B>, e: ReparentNotifyEvent) -> Result<()> {
    if e.parent == ctx.root {
        if !ctx.registry.contains(e.window) {
            ctx.registry.append(e.window);
        }
    } else if let Some(mut window) = ctx.registry.remove(e.window) {
        release_window_resources(ctx, &mut window)?;
    }
    ctx.plugins.dispatch_reparent(e.window);
    Ok(())
}

fn on_property_notify<B: RenderBackend>(ctx: &mut Context<B>, e: PropertyNotifyEvent) -> Result<()> {
    if e.window == ctx.root && ctx.atoms.is_background_atom(e.atom) {
        let pixmap = fetch_background_pixmap(ctx)?;
        ctx.backend.reset_background(pixmap)?;
        return Ok(());
    }
    if e.window == ctx.root && e.atom == ctx.atoms.supported_hints_atom() {
        ctx.atoms.refresh_supported(&ctx.conn, ctx.root)?;
        ctx.plugins.recheck_requirements();
        return Ok(());
    }
    if e.atom == ctx.atoms.opacity {
        let opacity = fetch_opacity(ctx, e.window)?;
        if let Some(window) = ctx.registry.get_mut(e.window) {
            window.opacity = opacity;
        }
    }
    ctx.plugins.dispatch_property(e.window, e.atom);
    ctx.plugins.recheck_requirements();
    Ok(())
}

/// Probes `_XROOTPMAP_ID`/`_XSETROOT_ID` in turn for a valid pixmap value,
/// returning the first one that decodes; `None` when neither is set.
fn fetch_background_pixmap<B: RenderBackend>(ctx: &Context<B>) -> Result<Option<Pixmap>> {
    for atom in ctx.atoms.background_atoms() {
        let reply = ctx
            .conn
            .get_property(false, ctx.root, atom, AtomEnum::PIXMAP, 0, 1)?
            .reply();
        if let Ok(reply) = reply {
            if let Some(pixmap) = reply.value32().and_then(|mut v| v.next()) {
                return Ok(Some(pixmap));
            }
        }
    }
    Ok(None)
}

fn on_randr_screen_change_notify<B: RenderBackend>(ctx: &mut Context<B>, _e: ScreenChangeNotifyEvent) -> Result<()> {
    let reply = match ctx.conn.randr_get_screen_info(ctx.root)?.reply() {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "failed to re-query RandR screen info after screen-change notify");
            return Ok(());
        }
    };
    if reply.rate > 0 {
        ctx.damage.set_refresh_rate(Some(reply.rate as u32));
    }
    Ok(())
}

fn on_mapping_notify<B: RenderBackend>(ctx: &mut Context<B>, _e: MappingNotifyEvent) -> Result<()> {
    let setup = ctx.conn.setup();
    ctx.keyboard.refresh(&ctx.conn, setup.min_keycode, setup.max_keycode)?;
    Ok(())
}

fn on_error<B: RenderBackend>(ctx: &mut Context<B>, e: x11rb::x11_utils::X11Error) -> Result<()> {
    let label = ctx.backend.error_label(e.error_kind_code());
    if ctx.starting_up {
        error!(?e, label, "fatal error during startup");
        return Err(CompositorError::Internal(format!(
            "startup error: {label} (resource {:?})",
            e.bad_value
        )));
    }
    if is_resource_vanished(&e) {
        debug!(?e, "resource vanished, ignoring");
    } else {
        warn!(?e, label, "X11 error (runtime, ignored)");
    }
    Ok(())
}

fn fetch_opacity<B: RenderBackend>(ctx: &Context<B>, window: WindowId) -> Result<Option<u16>> {
    let reply = ctx
        .conn
        .get_property(false, window, ctx.atoms.opacity, x11rb::protocol::xproto::AtomEnum::CARDINAL, 0, 1)?
        .reply();
    let value = match reply {
        Ok(reply) => reply.value32().and_then(|mut v| v.next()),
        Err(_) => None,
    };
    // property is a 32-bit fraction of u32::MAX; scale down to u16.
    Ok(value.map(|v| (v >> 16) as u16))
}

fn create_window_region<B: RenderBackend>(ctx: &mut Context<B>, id: WindowId) -> Result<()> {
    let Some(window) = ctx.registry.get_mut(id) else {
        return Ok(());
    };
    if let Some(old) = window.region.take() {
        ctx.conn.xfixes_union_region(old, ctx.accumulator.region, ctx.accumulator.region)?;
        ctx.conn.xfixes_destroy_region(old)?;
    }
    let region = ctx.conn.generate_id()?;
    ctx.conn.xfixes_create_region_from_window(
        region,
        id,
        x11rb::protocol::shape::SK::BOUNDING,
    )?;
    let rectangle_count = ctx.conn.xfixes_fetch_region(region)?.reply()?.rectangles.len();

    let Some(window) = ctx.registry.get_mut(id) else {
        return Ok(());
    };
    window.region = Some(region);
    window.is_rectangular = rectangle_count <= 1;
    Ok(())
}

fn allocate_pixmap_and_damage<B: RenderBackend>(ctx: &mut Context<B>, id: WindowId) -> Result<()> {
    let pixmap = ctx.conn.generate_id()?;
    match ctx.conn.composite_name_window_pixmap(id, pixmap) {
        Ok(cookie) => {
            cookie.check().map_err(CompositorError::from)?;
        }
        Err(e) => return Err(e.into()),
    }
    let damage = ctx.conn.generate_id()?;
    ctx.conn.damage_create(damage, id, x11rb::protocol::damage::ReportLevel::NON_EMPTY)?;

    if let Some(window) = ctx.registry.get_mut(id) {
        window.pixmap = Some(pixmap);
        window.damage_handle = Some(damage);
    }
    Ok(())
}

pub(crate) fn release_window_resources<B: RenderBackend>(ctx: &mut Context<B>, window: &mut crate::window::Window) -> Result<()> {
    ctx.backend.free_window_pixmap(window)?;
    ctx.backend.free_window(window)?;
    if let Some(pixmap) = window.pixmap.take() {
        ctx.conn.free_pixmap(pixmap)?;
    }
    if let Some(region) = window.region.take() {
        ctx.conn.xfixes_destroy_region(region)?;
    }
    if let Some(damage) = window.damage_handle.take() {
        ctx.conn.damage_destroy(damage)?;
    }
    Ok(())
}

