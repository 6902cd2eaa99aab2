//! Hex dumps of bulk transfers for the `mtp::data` trace target.

use std::fmt::Write as _;

use tracing::trace;

use crate::infrastructure::storage::config::DebugFlags;
use crate::infrastructure::usb::direction_label;

const BYTES_PER_LINE: usize = 16;

/// Formats `data` as offset, hex bytes and printable ASCII, 16 bytes per line.
///
/// ```text
/// 00000000  10 00 00 00 01 00 02 10  00 00 00 00 55 00 00 00  |............U...|
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 16);
    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:08x} ", line * BYTES_PER_LINE);
        for i in 0..BYTES_PER_LINE {
            if i == 8 {
                out.push(' ');
            }
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, " {b:02x}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

/// Emits one transfer on `mtp::data` when `flags.data` is set.
pub fn trace_transfer(flags: DebugFlags, endpoint: u8, data: &[u8]) {
    if !flags.data {
        return;
    }
    trace!(
        target: "mtp::data",
        "{}: {:#x} bytes with ep {:#x}:\n{}",
        direction_label(endpoint),
        data.len(),
        endpoint,
        hex_dump(data)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_full_line() {
        // Arrange
        let data: Vec<u8> = (0x41..0x51).collect();

        // Act
        let dump = hex_dump(&data);

        // Assert
        assert_eq!(
            dump,
            "00000000  41 42 43 44 45 46 47 48  49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|\n"
        );
    }

    #[test]
    fn test_hex_dump_pads_partial_line_and_masks_control_bytes() {
        let dump = hex_dump(&[0x00, b'U', 0xff]);
        assert!(dump.starts_with("00000000  00 55 ff"));
        assert!(dump.ends_with("|.U.|\n"));
    }

    #[test]
    fn test_hex_dump_numbers_each_line() {
        let dump = hex_dump(&[0u8; 20]);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000010 "));
    }

    #[test]
    fn test_hex_dump_of_empty_transfer_is_empty() {
        assert_eq!(hex_dump(&[]), "");
    }
}
