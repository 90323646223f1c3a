//! The explicit context value threaded through every call, in place of a
//! process-wide global record.

use std::rc::Rc;

use compman_core::CompositorConfig;
use x11rb::protocol::xfixes::Region;
use x11rb::protocol::xproto::Window as WindowId;
use x11rb::rust_connection::RustConnection;

use crate::atoms::AtomRegistry;
use crate::damage::{Accumulator, DamageScheduler};
use crate::keyboard::KeyboardState;
use crate::plugin::PluginRuntime;
use crate::registry::WindowRegistry;
use crate::render::backend::RenderBackend;

/// Everything the event dispatcher, painter, and plugin runtime share,
/// owned by the main loop and passed by `&mut` into every mutator. All
/// mutable state is accessed only from the loop's single execution
/// context.
pub struct Context<B: RenderBackend> {
    pub conn: Rc<RustConnection>,
    pub root: WindowId,
    pub screen_width: u16,
    pub screen_height: u16,
    pub config: CompositorConfig,
    pub atoms: AtomRegistry,
    pub registry: WindowRegistry,
    pub damage: DamageScheduler,
    pub accumulator: Accumulator,
    pub backend: B,
    pub plugins: PluginRuntime,
    pub keyboard: KeyboardState,
    /// True until the startup handshake completes; governs the
    /// startup-vs-steady error-handling split.
    pub starting_up: bool,
}

impl<B: RenderBackend> Context<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Rc<RustConnection>,
        root: WindowId,
        screen_width: u16,
        screen_height: u16,
        config: CompositorConfig,
        atoms: AtomRegistry,
        accumulator_region: Region,
        backend: B,
        plugins: PluginRuntime,
    ) -> Self {
        let refresh_rate_hz = config.fallback_refresh_rate_hz;
        Context {
            conn,
            root,
            screen_width,
            screen_height,
            damage: DamageScheduler::new(config.damage_coarsen_threshold, Some(refresh_rate_hz)),
            accumulator: Accumulator::new(accumulator_region),
            config,
            atoms,
            registry: WindowRegistry::new(),
            backend,
            plugins,
            keyboard: KeyboardState::default(),
            starting_up: true,
        }
    }

    pub fn screen_rect(&self) -> crate::geometry::Rect {
        crate::geometry::Rect::new(0, 0, self.screen_width as i32, self.screen_height as i32)
    }
}
