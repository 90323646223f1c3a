//! Binary entry point: command-line parsing wired to the startup handshake
//! (connect, negotiate extensions, acquire the compositing-manager
//! selection, load the backend and plugins) before handing off to the
//! main loop.

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use tracing::{error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::composite::ConnectionExt as CompositeExt;
use x11rb::protocol::damage::ConnectionExt as DamageExt;
use x11rb::protocol::randr::{ConnectionExt as RandrExt, NotifyMask as RandrNotifyMask};
use x11rb::protocol::xfixes::ConnectionExt as XfixesExt;
use x11rb::protocol::xproto::{
    ConnectionExt as XprotoExt, CreateWindowAux, EventMask, Screen, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::COPY_DEPTH_FROM_PARENT;

use compman_compositor::atoms::AtomRegistry;
use compman_compositor::context::Context;
use compman_compositor::error::CompositorError;
use compman_compositor::main_loop;
use compman_compositor::plugin::PluginRuntime;
use compman_compositor::render::{RenderBackend, X11Backend};
use compman_core::logging::{init_logging, init_minimal_logging};
use compman_core::ConfigLoader;

/// Exit codes for the startup failure categories: inability to connect to
/// the display, another compositing manager already holding the selection,
/// a required extension missing or too old, and inability to load the
/// rendering backend. 0 is reserved for a clean shutdown.
mod exit_code {
    pub const CONNECT_FAILED: u8 = 1;
    pub const SELECTION_CONFLICT: u8 = 2;
    pub const EXTENSION_MISSING: u8 = 3;
    pub const BACKEND_INIT_FAILED: u8 = 4;
    pub const CONFIG_ERROR: u8 = 5;
    pub const RUNTIME_ERROR: u8 = 6;
}

struct Args {
    verbose: bool,
    config_path: Option<PathBuf>,
    backend_dir: Option<PathBuf>,
    plugin_dir: Option<PathBuf>,
}

impl Args {
    /// Hand-rolled parsing of the four externalized startup parameters;
    /// `--help` prints usage and exits cleanly.
    fn parse() -> Result<Self, String> {
        let mut verbose = false;
        let mut config_path = None;
        let mut backend_dir = None;
        let mut plugin_dir = None;

        let mut raw = std::env::args().skip(1);
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "-v" | "--verbose" => verbose = true,
                "-c" | "--config" => {
                    config_path = Some(PathBuf::from(
                        raw.next().ok_or("--config requires a path argument")?,
                    ))
                }
                "--backend-dir" => {
                    backend_dir = Some(PathBuf::from(
                        raw.next().ok_or("--backend-dir requires a path argument")?,
                    ))
                }
                "--plugin-dir" => {
                    plugin_dir = Some(PathBuf::from(
                        raw.next().ok_or("--plugin-dir requires a path argument")?,
                    ))
                }
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => return Err(format!("unrecognized argument: {other}")),
            }
        }

        Ok(Args {
            verbose,
            config_path,
            backend_dir,
            plugin_dir,
        })
    }
}

fn print_usage() {
    println!(
        "usage: compman [-v|--verbose] [-c|--config PATH] [--backend-dir DIR] [--plugin-dir DIR]"
    );
}

fn main() -> ExitCode {
    init_minimal_logging();

    let args = match Args::parse() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("compman: {message}");
            print_usage();
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    let mut config = match ConfigLoader::load(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };
    if args.backend_dir.is_some() {
        config.compositor.backend_dir = args.backend_dir;
    }
    if args.plugin_dir.is_some() {
        config.compositor.plugin_dir = args.plugin_dir;
    }

    // Keep the guard alive for the rest of `main`; dropping it stops the
    // non-blocking file-logging writer thread.
    let _log_guard = match init_logging(&config.logging, args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("compman: failed to initialize logging: {e}");
            None
        }
    };

    match run(config.compositor) {
        Ok(()) => ExitCode::from(0),
        Err(StartupError::Connect(e)) => {
            error!(error = %e, "could not connect to the display server");
            ExitCode::from(exit_code::CONNECT_FAILED)
        }
        Err(StartupError::SelectionConflict) => {
            error!("another compositing manager already owns the selection");
            ExitCode::from(exit_code::SELECTION_CONFLICT)
        }
        Err(StartupError::ExtensionMissing(what)) => {
            error!(extension = %what, "required X11 extension missing or too old");
            ExitCode::from(exit_code::EXTENSION_MISSING)
        }
        Err(StartupError::BackendInit(e)) => {
            error!(error = %e, "rendering backend failed to initialize");
            ExitCode::from(exit_code::BACKEND_INIT_FAILED)
        }
        Err(StartupError::Runtime(e)) => {
            error!(error = %e, "compositor exited with an error");
            ExitCode::from(exit_code::RUNTIME_ERROR)
        }
    }
}

enum StartupError {
    Connect(x11rb::errors::ConnectError),
    SelectionConflict,
    ExtensionMissing(String),
    BackendInit(CompositorError),
    Runtime(CompositorError),
}

impl From<CompositorError> for StartupError {
    fn from(e: CompositorError) -> Self {
        StartupError::Runtime(e)
    }
}

impl From<x11rb::errors::ConnectionError> for StartupError {
    fn from(e: x11rb::errors::ConnectionError) -> Self {
        StartupError::Runtime(CompositorError::from(e))
    }
}

impl From<x11rb::errors::ReplyError> for StartupError {
    fn from(e: x11rb::errors::ReplyError) -> Self {
        StartupError::Runtime(CompositorError::from(e))
    }
}

impl From<x11rb::errors::ReplyOrIdError> for StartupError {
    fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
        StartupError::Runtime(CompositorError::from(e))
    }
}

fn run(compositor_config: compman_core::CompositorConfig) -> Result<(), StartupError> {
    let (conn, screen_num) = RustConnection::connect(None).map_err(StartupError::Connect)?;
    let conn = Rc::new(conn);

    let screen: &Screen = &conn.setup().roots[screen_num];
    let root = screen.root;
    let root_depth = screen.root_depth;
    let screen_width = screen.width_in_pixels;
    let screen_height = screen.height_in_pixels;

    negotiate_extensions(&conn)?;
    acquire_selection(&conn, screen_num, root)?;

    let atoms = AtomRegistry::new(&conn, root)?;

    let existing: Vec<x11rb::protocol::xproto::Window> =
        conn.query_tree(root)?.reply()?.children;

    conn.composite_redirect_subwindows(root, x11rb::protocol::composite::Redirect::MANUAL)?;

    conn.change_window_attributes(
        root,
        &x11rb::protocol::xproto::ChangeWindowAttributesAux::new().event_mask(
            EventMask::SUBSTRUCTURE_NOTIFY
                | EventMask::PROPERTY_CHANGE
                | EventMask::STRUCTURE_NOTIFY,
        ),
    )?;

    let accumulator_region = conn.generate_id()?;
    conn.xfixes_create_region(accumulator_region, &[])?;

    let plugins = match &compositor_config.plugin_dir {
        Some(dir) => match compman_plugin_manager::discover_plugins_in_directory(dir) {
            Ok(discovered) => PluginRuntime::load(discovered),
            Err(e) => {
                warn!(error = %e, "plugin discovery failed, continuing without plugins");
                PluginRuntime::load(Vec::new())
            }
        },
        None => PluginRuntime::load(Vec::new()),
    };
    if compositor_config.backend_dir.is_some() {
        // A backend search directory is accepted for forward compatibility
        // with pluggable backends, but only the built-in X11Backend is
        // instantiated today.
        info!("backend-dir configured but dynamic backend loading is not yet implemented; using the built-in backend");
    }

    let mut backend = X11Backend::new(conn.clone(), root, root_depth, screen_width, screen_height);
    backend.init().map_err(StartupError::BackendInit)?;
    backend.init_finalise().map_err(StartupError::BackendInit)?;

    let mut ctx: Context<X11Backend> = Context::new(
        conn.clone(),
        root,
        screen_width,
        screen_height,
        compositor_config,
        atoms,
        accumulator_region,
        backend,
        plugins,
    );

    ctx.registry.add_existing(&conn, &existing)?;
    ctx.plugins.recheck_requirements();
    ctx.plugins.manage_existing(&existing);

    discover_refresh_rate(&conn, root, &mut ctx);

    info!(windows = existing.len(), "startup complete, entering main loop");
    conn.flush()?;

    main_loop::run(ctx, RawConnFd(conn))?;
    Ok(())
}

/// Adapts `Rc<RustConnection>` to `AsRawFd` for the display-source watcher,
/// since x11rb's `RustConnection` exposes its stream fd via a method rather
/// than the `AsRawFd` trait directly.
struct RawConnFd(Rc<RustConnection>);

impl AsRawFd for RawConnFd {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.0.stream().as_raw_fd()
    }
}

const COMPOSITING_MANAGER_SELECTION_TIMESTAMP_ATOM: &str = "COMPMAN_SELECTION_TIMESTAMP";

/// Acquires the per-screen compositing-manager selection: interns
/// `_NET_WM_CM_S<screen>`, fails fast if another manager already owns it,
/// creates a dummy window to own the selection, and obtains a server
/// timestamp via the property-change echo convention before calling
/// `set-selection-owner`.
fn acquire_selection(conn: &RustConnection, screen_num: usize, root: x11rb::protocol::xproto::Window) -> Result<(), StartupError> {
    let selection_name = format!("_NET_WM_CM_S{screen_num}");
    let selection_atom = conn.intern_atom(false, selection_name.as_bytes())?.reply()?.atom;

    let current_owner = conn.get_selection_owner(selection_atom)?.reply()?.owner;
    if current_owner != x11rb::NONE {
        return Err(StartupError::SelectionConflict);
    }

    let dummy_window = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        dummy_window,
        root,
        -1,
        -1,
        1,
        1,
        0,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
    )?;

    let timestamp_atom = conn
        .intern_atom(false, COMPOSITING_MANAGER_SELECTION_TIMESTAMP_ATOM.as_bytes())?
        .reply()?
        .atom;
    AtomRegistry::touch_timestamp_property(conn, dummy_window, timestamp_atom)?;
    conn.flush()?;

    let timestamp = loop {
        let event = conn.wait_for_event()?;
        if let x11rb::protocol::Event::PropertyNotify(notify) = event {
            if notify.window == dummy_window && notify.atom == timestamp_atom {
                break notify.time;
            }
        }
    };

    conn.set_selection_owner(dummy_window, selection_atom, timestamp)?;
    let owner_after = conn.get_selection_owner(selection_atom)?.reply()?.owner;
    if owner_after != dummy_window {
        return Err(StartupError::SelectionConflict);
    }

    info!(selection = %selection_name, "acquired compositing-manager selection");
    Ok(())
}

/// Best-effort RandR refresh-rate discovery: queries the extension version,
/// subscribes to screen-change notifications, and feeds the advertised rate
/// into the damage scheduler's paint interval. RandR is optional, so any
/// failure here is logged and the configured fallback rate is kept.
fn discover_refresh_rate<B: RenderBackend>(conn: &RustConnection, root: x11rb::protocol::xproto::Window, ctx: &mut Context<B>) {
    let version_cookie = match conn.randr_query_version(1, 2) {
        Ok(cookie) => cookie,
        Err(e) => {
            info!(error = %e, "RandR unavailable, using configured fallback refresh rate");
            return;
        }
    };
    let version = match version_cookie.reply() {
        Ok(reply) => reply,
        Err(e) => {
            info!(error = %e, "RandR version negotiation failed, using configured fallback refresh rate");
            return;
        }
    };
    info!(
        major = version.major_version,
        minor = version.minor_version,
        "RandR extension negotiated"
    );

    if let Err(e) = conn.randr_select_input(root, RandrNotifyMask::SCREEN_CHANGE) {
        warn!(error = %e, "failed to subscribe to RandR screen-change notifications");
    }

    let info_cookie = match conn.randr_get_screen_info(root) {
        Ok(cookie) => cookie,
        Err(e) => {
            warn!(error = %e, "failed to query RandR screen info");
            return;
        }
    };
    let info = match info_cookie.reply() {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "failed to query RandR screen info");
            return;
        }
    };
    if info.rate > 0 {
        info!(rate = info.rate, "RandR advertised refresh rate");
        ctx.damage.set_refresh_rate(Some(info.rate as u32));
    } else {
        info!("RandR screen info reported no refresh rate, keeping configured fallback");
    }
}

/// Negotiates the Composite, Damage and XFixes extension versions the
/// compositor depends on; the Render extension's own negotiation happens
/// inside `X11Backend::init_finalise`.
fn negotiate_extensions(conn: &RustConnection) -> Result<(), StartupError> {
    let composite_version = conn
        .composite_query_version(0, 4)?
        .reply()
        .map_err(|_| StartupError::ExtensionMissing("Composite".to_string()))?;
    info!(
        major = composite_version.major_version,
        minor = composite_version.minor_version,
        "Composite extension negotiated"
    );

    let damage_version = conn
        .damage_query_version(1, 1)?
        .reply()
        .map_err(|_| StartupError::ExtensionMissing("Damage".to_string()))?;
    info!(
        major = damage_version.major_version,
        minor = damage_version.minor_version,
        "Damage extension negotiated"
    );

    let xfixes_version = conn
        .xfixes_query_version(5, 0)?
        .reply()
        .map_err(|_| StartupError::ExtensionMissing("XFixes".to_string()))?;
    info!(
        major = xfixes_version.major_version,
        minor = xfixes_version.minor_version,
        "XFixes extension negotiated"
    );

    Ok(())
}
