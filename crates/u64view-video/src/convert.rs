// Packed 4-bit indexed pixels → RGB888, and RGB888 → RGBA8888 for surfaces
// that want an alpha channel.

use u64view_protocol::video::{LINES_PER_PACKET, LINE_BYTES};

use crate::palette;

/// Decode one line group into an RGB buffer of `width` × `height` pixels.
///
/// `payload` holds up to `LINES_PER_PACKET` packed scan lines of `LINE_BYTES`
/// each, the first landing on scan line `first_line`. Lines past `height` and
/// pixels past `width` are dropped; a short payload fills what it covers.
pub fn decode_line_group(
    payload: &[u8],
    first_line: usize,
    rgb: &mut [u8],
    width: usize,
    height: usize,
) {
    for (i, packed) in payload.chunks(LINE_BYTES).take(LINES_PER_PACKET).enumerate() {
        let line = first_line + i;
        if line >= height {
            break;
        }
        let row_off = line * width;
        for (byte_idx, &b) in packed.iter().enumerate() {
            let x = byte_idx * 2;
            if x >= width {
                break;
            }
            put_pixel(rgb, (row_off + x) * 3, b & 0x0F);
            if x + 1 < width {
                put_pixel(rgb, (row_off + x + 1) * 3, b >> 4);
            }
        }
    }
}

#[inline(always)]
fn put_pixel(rgb: &mut [u8], out: usize, index: u8) {
    if let Some(dst) = rgb.get_mut(out..out + 3) {
        dst.copy_from_slice(&palette::rgb(index));
    }
}

/// Convert RGB888 to opaque RGBA8888.
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = vec![0u8; rgb.len() / 3 * 4];
    rgb_to_rgba_into(rgb, &mut rgba);
    rgba
}

/// Convert RGB888 to opaque RGBA8888, writing into an existing buffer.
pub fn rgb_to_rgba_into(rgb: &[u8], rgba: &mut [u8]) {
    for (src, dst) in rgb.chunks_exact(3).zip(rgba.chunks_exact_mut(4)) {
        dst[..3].copy_from_slice(src);
        dst[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::rgb;

    const W: usize = 384;
    const H: usize = 272;

    fn pixel(buf: &[u8], x: usize, y: usize) -> [u8; 3] {
        let i = (y * W + x) * 3;
        [buf[i], buf[i + 1], buf[i + 2]]
    }

    #[test]
    fn low_nibble_is_left_pixel() {
        let mut buf = vec![0u8; W * H * 3];
        let mut payload = vec![0u8; LINE_BYTES * LINES_PER_PACKET];
        payload[0] = 0x21;
        decode_line_group(&payload, 0, &mut buf, W, H);
        assert_eq!(pixel(&buf, 0, 0), rgb(1));
        assert_eq!(pixel(&buf, 1, 0), rgb(2));
    }

    #[test]
    fn lines_land_at_first_line_offset() {
        let mut buf = vec![0u8; W * H * 3];
        let mut payload = vec![0u8; LINE_BYTES * LINES_PER_PACKET];
        // last byte of the fourth line: pixels 382/383 of line 8 + 3
        payload[LINE_BYTES * 4 - 1] = 0x7E;
        decode_line_group(&payload, 8, &mut buf, W, H);
        assert_eq!(pixel(&buf, 382, 11), rgb(0xE));
        assert_eq!(pixel(&buf, 383, 11), rgb(0x7));
        assert_eq!(pixel(&buf, 382, 10), [0, 0, 0]);
    }

    #[test]
    fn lines_past_height_are_dropped() {
        let mut buf = vec![0u8; W * H * 3];
        let payload = vec![0x11u8; LINE_BYTES * LINES_PER_PACKET];
        decode_line_group(&payload, 270, &mut buf, W, H);
        assert_eq!(pixel(&buf, 0, 270), rgb(1));
        assert_eq!(pixel(&buf, 383, 271), rgb(1));

        let mut buf = vec![0u8; W * H * 3];
        decode_line_group(&payload, 400, &mut buf, W, H);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn short_payload_fills_what_it_covers() {
        let mut buf = vec![0u8; W * H * 3];
        decode_line_group(&[0x11, 0x11], 0, &mut buf, W, H);
        assert_eq!(pixel(&buf, 3, 0), rgb(1));
        assert_eq!(pixel(&buf, 4, 0), [0, 0, 0]);
    }

    #[test]
    fn rgba_alpha_always_255() {
        let rgba = rgb_to_rgba(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
