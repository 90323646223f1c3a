//! Reference rendering backend: composes via the X11 Render extension into
//! a screen-sized buffer picture, then blits to the root.

use std::rc::Rc;

use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::protocol::render::{
    self, ConnectionExt as RenderExt, CreatePictureAux, PictOp, PictType, Picture, Pictformat,
};
use x11rb::protocol::xfixes::{ConnectionExt as XfixesExt, Region};
use x11rb::protocol::xproto::{ConnectionExt as XprotoExt, Pixmap, Rectangle, Window as WindowId};
use x11rb::rust_connection::RustConnection;

use crate::error::{CompositorError, Result};
use crate::geometry::Rect;
use crate::render::backend::{AlphaMaskCache, RenderBackend};
use crate::window::Window;

const REQUIRED_RENDER_MAJOR: u32 = 0;
const REQUIRED_RENDER_MINOR: u32 = 11;

struct PictFormatCatalog {
    argb32: Pictformat,
    rgb24: Pictformat,
}

impl PictFormatCatalog {
    fn for_depth(&self, depth: u8) -> Pictformat {
        if depth == 32 {
            self.argb32
        } else {
            self.rgb24
        }
    }
}

/// The reference `RenderBackend`. `Surface = Picture`, the Render
/// extension's compositing-surface handle.
pub struct X11Backend {
    conn: Rc<RustConnection>,
    root: WindowId,
    screen_width: u16,
    screen_height: u16,
    root_picture: Option<Picture>,
    buffer_picture: Option<Picture>,
    buffer_pixmap: Option<Pixmap>,
    background_picture: Option<Picture>,
    formats: Option<PictFormatCatalog>,
    alpha_masks: AlphaMaskCache<Picture>,
    version: Option<(u32, u32)>,
    root_depth: u8,
}

impl X11Backend {
    pub fn new(conn: Rc<RustConnection>, root: WindowId, root_depth: u8, screen_width: u16, screen_height: u16) -> Self {
        X11Backend {
            conn,
            root,
            screen_width,
            screen_height,
            root_picture: None,
            buffer_picture: None,
            buffer_pixmap: None,
            background_picture: None,
            formats: None,
            alpha_masks: AlphaMaskCache::new(),
            version: None,
            root_depth,
        }
    }

    fn pict_format_for_window(&self, window: &Window) -> Pictformat {
        let depth = if window.attributes.visual == 0 { self.root_depth } else { 32 };
        self.formats.as_ref().expect("formats queried in init_finalise").for_depth(depth)
    }

    fn ensure_window_surface(&self, window: &mut Window) -> Result<Picture> {
        if let Some(state) = window.rendering_state.as_ref() {
            if let Some(&picture) = state.downcast_ref::<Picture>() {
                return Ok(picture);
            }
        }
        let pixmap = window
            .pixmap
            .ok_or_else(|| CompositorError::Internal("paint_window on a window with no pixmap".into()))?;
        let format = self.pict_format_for_window(window);
        let picture = self.conn.generate_id()?;
        // clip-by-children so obscured and non-rectangular pieces render correctly.
        self.conn.render_create_picture(
            picture,
            pixmap,
            format,
            &CreatePictureAux::new().subwindow_mode(x11rb::protocol::xproto::SubwindowMode::CLIP_BY_CHILDREN),
        )?;
        window.rendering_state = Some(Box::new(picture));
        Ok(picture)
    }

    fn clip_to(&self, picture: Picture, rect: Rect) -> Result<()> {
        let region: Region = self.conn.generate_id()?;
        self.conn.xfixes_create_region(
            region,
            &[Rectangle {
                x: clamp_i16(rect.x),
                y: clamp_i16(rect.y),
                width: clamp_u16(rect.width),
                height: clamp_u16(rect.height),
            }],
        )?;
        self.conn.xfixes_set_picture_clip_region(picture, region, 0, 0)?;
        self.conn.xfixes_destroy_region(region)?;
        Ok(())
    }

    fn clear_clip(&self, picture: Picture) -> Result<()> {
        self.conn.render_change_picture(picture, &CreatePictureAux::new().clip_mask(0u32))?;
        Ok(())
    }

    /// Validates `pixmap` by fetching its geometry (fails if it was freed or
    /// never existed) and wraps it as a tiled picture at its own depth.
    fn try_picture_from_pixmap(&self, pixmap: Pixmap, formats: &PictFormatCatalog) -> Result<Picture> {
        let geometry = self.conn.get_geometry(pixmap)?.reply()?;
        let picture = self.conn.generate_id()?;
        let cookie = self.conn.render_create_picture(
            picture,
            pixmap,
            formats.for_depth(geometry.depth),
            &CreatePictureAux::new().repeat(render::Repeat::NORMAL),
        )?;
        cookie.check().map_err(CompositorError::from)?;
        Ok(picture)
    }
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, u16::MAX as i32) as u16
}

impl RenderBackend for X11Backend {
    type Surface = Picture;

    fn init(&mut self) -> Result<()> {
        // Pipelined: both requests are issued before either reply is
        // awaited, so the round trip happens once.
        let version_cookie = self.conn.render_query_version(REQUIRED_RENDER_MAJOR, REQUIRED_RENDER_MINOR)?;
        let formats_cookie = self.conn.render_query_pict_formats()?;

        let version = version_cookie.reply()?;
        if version.major_version < REQUIRED_RENDER_MAJOR
            || (version.major_version == REQUIRED_RENDER_MAJOR && version.minor_version < REQUIRED_RENDER_MINOR)
        {
            return Err(CompositorError::ExtensionMissing(format!(
                "Render extension {}.{} is older than required {}.{}",
                version.major_version, version.minor_version, REQUIRED_RENDER_MAJOR, REQUIRED_RENDER_MINOR
            )));
        }
        self.version = Some((version.major_version, version.minor_version));

        let formats_reply = formats_cookie.reply()?;
        let mut argb32 = None;
        let mut rgb24 = None;
        for format in &formats_reply.formats {
            if format.depth == 32 && format.type_ == PictType::DIRECT {
                argb32.get_or_insert(format.id);
            } else if format.depth == 24 && format.type_ == PictType::DIRECT {
                rgb24.get_or_insert(format.id);
            }
        }
        self.formats = Some(PictFormatCatalog {
            argb32: argb32.ok_or_else(|| CompositorError::BackendInitFailure("no 32-bit ARGB pict format".into()))?,
            rgb24: rgb24.ok_or_else(|| CompositorError::BackendInitFailure("no 24-bit RGB pict format".into()))?,
        });
        Ok(())
    }

    fn init_finalise(&mut self) -> Result<()> {
        if self.version.is_none() || self.formats.is_none() {
            return Err(CompositorError::Internal("init_finalise called before init".into()));
        }
        let formats = self.formats.as_ref().expect("checked above");

        let root_picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(root_picture, self.root, formats.for_depth(self.root_depth), &CreatePictureAux::new())?;

        let buffer_pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(self.root_depth, buffer_pixmap, self.root, self.screen_width, self.screen_height)?;
        let buffer_picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(buffer_picture, buffer_pixmap, formats.for_depth(self.root_depth), &CreatePictureAux::new())?;

        self.root_picture = Some(root_picture);
        self.buffer_pixmap = Some(buffer_pixmap);
        self.buffer_picture = Some(buffer_picture);
        debug!("render backend initialized");
        Ok(())
    }

    fn reset_background(&mut self, background_pixmap: Option<Pixmap>) -> Result<()> {
        if let Some(old) = self.background_picture.take() {
            self.conn.render_free_picture(old)?;
        }
        let formats = self.formats.as_ref().expect("init_finalise ran first");

        if let Some(pixmap) = background_pixmap {
            match self.try_picture_from_pixmap(pixmap, formats) {
                Ok(picture) => {
                    self.background_picture = Some(picture);
                    debug!(pixmap, "background rebuilt from desktop pixmap");
                    return Ok(());
                }
                Err(e) => {
                    trace!(pixmap, error = %e, "desktop-background pixmap invalid, falling back to solid fill");
                }
            }
        }

        let fallback_pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(self.root_depth, fallback_pixmap, self.root, 1, 1)?;
        let picture = self.conn.generate_id()?;
        self.conn
            .render_create_picture(picture, fallback_pixmap, formats.for_depth(self.root_depth), &CreatePictureAux::new().repeat(render::Repeat::NORMAL))?;
        let mid_gray = render::Color { red: 0x8000, green: 0x8000, blue: 0x8000, alpha: 0xffff };
        self.conn.render_fill_rectangles(PictOp::SRC, picture, mid_gray, &[Rectangle { x: 0, y: 0, width: 1, height: 1 }])?;
        self.conn.free_pixmap(fallback_pixmap)?;
        self.background_picture = Some(picture);
        Ok(())
    }

    fn paint_background(&mut self, dirty: Rect) -> Result<()> {
        let buffer = self.buffer_picture.expect("init_finalise ran first");
        let background = self
            .background_picture
            .ok_or_else(|| CompositorError::Internal("paint_background before reset_background".into()))?;
        self.clip_to(buffer, dirty)?;
        self.conn.render_composite(
            PictOp::SRC,
            background,
            0u32,
            buffer,
            0,
            0,
            0,
            0,
            clamp_i16(dirty.x),
            clamp_i16(dirty.y),
            clamp_u16(dirty.width),
            clamp_u16(dirty.height),
        )?;
        self.clear_clip(buffer)?;
        Ok(())
    }

    fn paint_window(&mut self, window: &mut Window, dirty_sub: Rect, opacity: u16) -> Result<()> {
        let buffer = self.buffer_picture.expect("init_finalise ran first");
        let surface = self.ensure_window_surface(window)?;

        self.clip_to(buffer, dirty_sub)?;

        let conn = Rc::clone(&self.conn);
        let window_id = window.id;
        let root = self.root;
        let argb32 = self.formats.as_ref().expect("init_finalise ran first").argb32;
        let mask = self.alpha_masks.get(window_id, opacity, |value| {
            let pixmap = conn.generate_id()?;
            conn.create_pixmap(8, pixmap, root, 1, 1)?;
            let picture = conn.generate_id()?;
            conn.render_create_picture(
                picture,
                pixmap,
                argb32,
                &CreatePictureAux::new().repeat(render::Repeat::NORMAL),
            )?;
            let alpha = value as u32 * 0x0101;
            conn.render_fill_rectangles(
                PictOp::SRC,
                picture,
                render::Color { red: 0, green: 0, blue: 0, alpha: alpha as u16 },
                &[Rectangle { x: 0, y: 0, width: 1, height: 1 }],
            )?;
            conn.free_pixmap(pixmap)?;
            Ok(picture)
        })?;

        let op = if mask.is_some() { PictOp::OVER } else { PictOp::SRC };
        let (mask_picture, mask_x, mask_y) = match mask {
            Some(picture) => (picture, 0, 0),
            None => (0u32, 0, 0),
        };
        self.conn.render_composite(
            op,
            surface,
            mask_picture,
            buffer,
            0,
            0,
            mask_x,
            mask_y,
            clamp_i16(dirty_sub.x),
            clamp_i16(dirty_sub.y),
            clamp_u16(dirty_sub.width),
            clamp_u16(dirty_sub.height),
        )?;
        self.clear_clip(buffer)?;
        trace!(window = window.id, opacity, "painted window");
        Ok(())
    }

    fn paint_all(&mut self, dirty: Rect) -> Result<()> {
        let buffer = self.buffer_picture.expect("init_finalise ran first");
        let root = self.root_picture.expect("init_finalise ran first");
        self.clip_to(root, dirty)?;
        self.conn.render_composite(
            PictOp::SRC,
            buffer,
            0u32,
            root,
            clamp_i16(dirty.x),
            clamp_i16(dirty.y),
            0,
            0,
            clamp_i16(dirty.x),
            clamp_i16(dirty.y),
            clamp_u16(dirty.width),
            clamp_u16(dirty.height),
        )?;
        self.clear_clip(root)?;
        Ok(())
    }

    fn free_window_pixmap(&mut self, window: &mut Window) -> Result<()> {
        if let Some(state) = window.rendering_state.take() {
            if let Ok(picture) = state.downcast::<Picture>() {
                self.conn.render_free_picture(*picture)?;
            }
        }
        Ok(())
    }

    fn free_window(&mut self, window: &mut Window) -> Result<()> {
        self.alpha_masks.detach_window(window.id);
        Ok(())
    }

    fn is_request(&self, code: u8) -> bool {
        matches!(code, RENDER_MINOR_QUERY_VERSION | RENDER_MINOR_CREATE_PICTURE | RENDER_MINOR_COMPOSITE | RENDER_MINOR_FILL_RECTANGLES)
    }

    fn request_label(&self, minor: u8) -> &'static str {
        match minor {
            RENDER_MINOR_QUERY_VERSION => "RenderQueryVersion",
            RENDER_MINOR_CREATE_PICTURE => "RenderCreatePicture",
            RENDER_MINOR_COMPOSITE => "RenderComposite",
            RENDER_MINOR_FILL_RECTANGLES => "RenderFillRectangles",
            _ => "Render<unknown>",
        }
    }

    fn error_label(&self, code: u8) -> &'static str {
        match code {
            RENDER_ERROR_PICT_FORMAT => "RenderPictFormat",
            RENDER_ERROR_PICTURE => "RenderPicture",
            RENDER_ERROR_PICT_OP => "RenderPictOp",
            RENDER_ERROR_GLYPH_SET => "RenderGlyphSet",
            _ => "Render<unknown>",
        }
    }
}

// Render extension minor-opcode and error-code numbers, per the X Render
// extension protocol (stable across server versions; not re-exported as
// named constants by x11rb's generated bindings).
const RENDER_MINOR_QUERY_VERSION: u8 = 0;
const RENDER_MINOR_CREATE_PICTURE: u8 = 4;
const RENDER_MINOR_COMPOSITE: u8 = 8;
const RENDER_MINOR_FILL_RECTANGLES: u8 = 26;
const RENDER_ERROR_PICT_FORMAT: u8 = 0;
const RENDER_ERROR_PICTURE: u8 = 1;
const RENDER_ERROR_PICT_OP: u8 = 2;
const RENDER_ERROR_GLYPH_SET: u8 = 3;
