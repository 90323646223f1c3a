//! Atom registry: interns the handful of well-known property names the
//! compositor cares about, and tracks the window manager's
//! extensible-hints advertisement.

use std::collections::HashSet;

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, PropMode};
use x11rb::rust_connection::RustConnection;

use crate::error::Result;

const OPACITY_ATOM_NAME: &str = "_NET_WM_WINDOW_OPACITY";
const BACKGROUND_ATOM_NAMES: &[&str] = &["_XROOTPMAP_ID", "_XSETROOT_ID"];
const SUPPORTED_HINTS_ATOM_NAME: &str = "_NET_SUPPORTED";

pub struct AtomRegistry {
    pub opacity: Atom,
    background_atoms: HashSet<Atom>,
    supported_hints_atom: Atom,
    supported: HashSet<Atom>,
}

impl AtomRegistry {
    /// Interns every well-known atom with request/reply pipelining: all
    /// `intern_atom` requests are issued before any reply is awaited, to
    /// minimize round-trips.
    pub fn new(conn: &RustConnection, root: x11rb::protocol::xproto::Window) -> Result<Self> {
        let opacity_cookie = conn.intern_atom(false, OPACITY_ATOM_NAME.as_bytes())?;
        let background_cookies: Vec<_> = BACKGROUND_ATOM_NAMES
            .iter()
            .map(|name| conn.intern_atom(false, name.as_bytes()))
            .collect::<std::result::Result<_, _>>()?;
        let supported_hints_cookie = conn.intern_atom(false, SUPPORTED_HINTS_ATOM_NAME.as_bytes())?;

        let opacity = opacity_cookie.reply()?.atom;
        let background_atoms = background_cookies
            .into_iter()
            .map(|c| Ok(c.reply()?.atom))
            .collect::<Result<HashSet<_>>>()?;
        let supported_hints_atom = supported_hints_cookie.reply()?.atom;

        let mut registry = AtomRegistry {
            opacity,
            background_atoms,
            supported_hints_atom,
            supported: HashSet::new(),
        };
        registry.refresh_supported(conn, root)?;
        Ok(registry)
    }

    pub fn supported_hints_atom(&self) -> Atom {
        self.supported_hints_atom
    }

    pub fn is_background_atom(&self, atom: Atom) -> bool {
        self.background_atoms.contains(&atom)
    }

    /// The interned `_XROOTPMAP_ID`/`_XSETROOT_ID` atoms, in the order the
    /// desktop-background pixmap should be probed under.
    pub fn background_atoms(&self) -> impl Iterator<Item = Atom> + '_ {
        self.background_atoms.iter().copied()
    }

    pub fn is_supported(&self, atom: Atom) -> bool {
        self.supported.contains(&atom)
    }

    /// Re-fetches `_NET_SUPPORTED` on the root window. Called once at
    /// startup and again whenever a `PropertyNotify` on that atom fires.
    pub fn refresh_supported(&mut self, conn: &RustConnection, root: x11rb::protocol::xproto::Window) -> Result<()> {
        let cookie = conn.get_property(
            false,
            root,
            self.supported_hints_atom,
            AtomEnum::ATOM,
            0,
            u32::MAX,
        )?;
        let reply = cookie.reply();
        self.supported = match reply {
            Ok(reply) => reply
                .value32()
                .map(|iter| iter.collect())
                .unwrap_or_default(),
            // A malformed property reply is treated as absence of the property.
            Err(_) => HashSet::new(),
        };
        debug!(count = self.supported.len(), "refreshed supported-hints set");
        Ok(())
    }

    /// Intern a dummy property-change used solely to obtain a server
    /// timestamp via its PropertyNotify echo, per the selection-ownership
    /// acquisition convention.
    pub fn touch_timestamp_property(
        conn: &RustConnection,
        window: x11rb::protocol::xproto::Window,
        atom: Atom,
    ) -> Result<()> {
        conn.change_property8(PropMode::APPEND, window, atom, AtomEnum::STRING, b"")?;
        Ok(())
    }
}
