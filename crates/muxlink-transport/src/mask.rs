/// Default obfuscation byte shared by both ends of a link.
pub const DEFAULT_MASK: u8 = 0x64;

/// Single-byte XOR transform applied to everything on the shared transport.
///
/// XOR is its own inverse, so both ends apply the same mask on read and write
/// without negotiating any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorMask(u8);

impl XorMask {
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn byte(self) -> u8 {
        self.0
    }

    /// Transform `buf` in place.
    pub fn apply(self, buf: &mut [u8]) {
        if self.0 == 0 {
            return;
        }
        for b in buf.iter_mut() {
            *b ^= self.0;
        }
    }
}

impl Default for XorMask {
    fn default() -> Self {
        Self(DEFAULT_MASK)
    }
}

impl From<u8> for XorMask {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}
