//! Rendering backend interface: a polymorphic compositing surface with one
//! reference implementation today, `x11_backend`.

pub mod backend;
pub mod x11_backend;

pub use backend::{AlphaMaskCache, RenderBackend};
pub use x11_backend::X11Backend;
