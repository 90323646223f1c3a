//! The main loop: a single-threaded `calloop` loop multiplexing the
//! display connection, the paint timer, and shutdown signals.

use std::os::unix::io::AsRawFd;

use calloop::generic::Generic;
use calloop::timer::{Timer, TimeoutAction};
use calloop::{EventLoop, Interest, Mode, PostAction};
use calloop_signal::{Signal, Signals};
use tracing::{error, info, warn};
use x11rb::connection::Connection;

use crate::context::Context;
use crate::dispatcher::{drain_events, release_window_resources};
use crate::error::{CompositorError, Result};
use crate::painter::paint_if_dirty;
use crate::plugin::PluginRuntime;
use crate::render::backend::RenderBackend;
use crate::registry::WindowRegistry;

/// Runs the compositor until a shutdown signal arrives or the connection is
/// lost, then performs the ordered teardown below.
pub fn run<B: RenderBackend>(ctx: Context<B>, connection_fd: impl AsRawFd) -> Result<()> {
    let mut event_loop: EventLoop<Context<B>> = EventLoop::try_new().map_err(|e| CompositorError::EventLoop(e.to_string()))?;
    let loop_handle = event_loop.handle();
    let loop_signal = event_loop.get_signal();
    let mut ctx = ctx;

    let display_source = Generic::new(connection_fd.as_raw_fd(), Interest::READ, Mode::Level);
    loop_handle
        .insert_source(display_source, |_event, _metadata, ctx: &mut Context<B>| {
            if let Err(e) = drain_events(ctx) {
                error!(error = %e, "error draining display events");
                return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
            }
            Ok(PostAction::Continue)
        })
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    let paint_interval = ctx.damage.paint_interval();
    let paint_timer = Timer::immediate();
    loop_handle
        .insert_source(paint_timer, move |_deadline, _metadata, ctx: &mut Context<B>| {
            if let Err(e) = paint_if_dirty(ctx) {
                warn!(error = %e, "paint tick failed");
            }
            if let Err(e) = drain_events(ctx) {
                error!(error = %e, "error draining events after paint");
            }
            TimeoutAction::ToDuration(paint_interval)
        })
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    let signal_source = Signals::new(&[Signal::SIGHUP, Signal::SIGINT, Signal::SIGTERM])
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;
    loop_handle
        .insert_source(signal_source, move |event, _metadata, _ctx: &mut Context<B>| match event {
            calloop_signal::Event::Signal(signal) => {
                info!(?signal, "received shutdown signal");
                loop_signal.stop();
            }
        })
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    ctx.starting_up = false;
    info!("entering main loop");
    event_loop
        .run(None, &mut ctx, |ctx| {
            if let Err(e) = ctx.conn.flush() {
                error!(error = %e, "failed to flush outgoing display requests");
            }
        })
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    shutdown(&mut ctx)
}

/// Ordered teardown: unload plugins, release every window's server-side
/// resources, unload the backend, then drop the rest of the context. The
/// connection itself is dropped (and thus closed) by the caller once this
/// returns.
fn shutdown<B: RenderBackend>(ctx: &mut Context<B>) -> Result<()> {
    info!("shutting down: unloading plugins");
    ctx.plugins = PluginRuntime::load(Vec::new());

    info!("shutting down: releasing window resources");
    let ids: Vec<u32> = ctx.registry.iter().map(|w| w.id).collect();
    for id in ids {
        if let Some(mut window) = ctx.registry.remove(id) {
            if let Err(e) = release_window_resources(ctx, &mut window) {
                warn!(id, error = %e, "failed to release window resources during shutdown");
            }
        }
    }
    ctx.registry = WindowRegistry::new();

    info!("shutdown complete");
    Ok(())
}
