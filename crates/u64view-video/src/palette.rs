/// An 8-bit-per-channel RGB triple.
pub type Rgb = [u8; 3];

/// Number of entries in the VIC-II color table.
pub const PALETTE_SIZE: usize = 16;

/// VIC-II colors in index order, as rendered by the Ultimate 64.
pub const VIC_II_PALETTE: [Rgb; PALETTE_SIZE] = [
    [0x00, 0x00, 0x00], // black
    [0xEF, 0xEF, 0xEF], // white
    [0x8D, 0x2F, 0x34], // red
    [0x6A, 0xD4, 0xCD], // cyan
    [0x98, 0x35, 0xA4], // purple
    [0x4C, 0xB4, 0x42], // green
    [0x2C, 0x29, 0xB1], // blue
    [0xEF, 0xEF, 0x5D], // yellow
    [0x98, 0x4E, 0x20], // orange
    [0x5B, 0x38, 0x00], // brown
    [0xD1, 0x67, 0x6D], // light red
    [0x4A, 0x4A, 0x4A], // dark grey
    [0x7B, 0x7B, 0x7B], // grey
    [0x9F, 0xEF, 0x93], // light green
    [0x6D, 0x6A, 0xEF], // light blue
    [0xB2, 0xB2, 0xB2], // light grey
];

/// Look up a palette index. Indices wrap modulo 16.
#[inline(always)]
pub fn rgb(index: u8) -> Rgb {
    VIC_II_PALETTE[index as usize % PALETTE_SIZE]
}
