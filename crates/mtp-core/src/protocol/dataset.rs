//! Readers for the small part of PTP datasets the transaction core needs.
//!
//! Devices whose USB interface carries no string descriptor are identified
//! as MTP by the vendor-extension description in their DeviceInfo dataset.
//! Only the leading fields up to that string are read here; the rest of the
//! dataset belongs to higher layers.
//!
//! PTP strings are a one-byte character count (including the terminating
//! NUL) followed by that many UTF-16LE code units.  A count of zero is the
//! empty string.

use crate::protocol::codec::ProtocolError;

/// Offset of VendorExtensionDesc: StandardVersion (2) + VendorExtensionID (4)
/// + VendorExtensionVersion (2).
const VENDOR_EXTENSION_DESC_OFFSET: usize = 8;

/// Reads a PTP string at `offset`.
///
/// Returns the string (without the terminating NUL) and the offset just past
/// it.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when the declared character
/// count runs past the end of `buf`.
pub fn read_ptp_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    let count = *buf.get(offset).ok_or(ProtocolError::InsufficientData {
        needed: offset + 1,
        available: buf.len(),
    })? as usize;

    let start = offset + 1;
    let end = start + 2 * count;
    if buf.len() < end {
        return Err(ProtocolError::InsufficientData {
            needed: end,
            available: buf.len(),
        });
    }

    let units: Vec<u16> = buf[start..end]
        .chunks_exact(2)
        .map(|u| u16::from_le_bytes([u[0], u[1]]))
        .take_while(|&u| u != 0)
        .collect();
    Ok((String::from_utf16_lossy(&units), end))
}

/// Appends `s` to `buf` as a NUL-terminated PTP string.
///
/// The host only reads datasets; this exists for device simulators that
/// build DeviceInfo replies.  Strings longer than 254 UTF-16 code units are
/// truncated to fit the one-byte count.
pub fn write_ptp_string(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        buf.push(0);
        return;
    }
    let units: Vec<u16> = s.encode_utf16().take(254).collect();
    buf.push((units.len() + 1) as u8);
    for unit in units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&[0, 0]);
}

/// Extracts VendorExtensionDesc from a raw DeviceInfo dataset.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when the dataset is truncated
/// before the end of the string.
pub fn vendor_extension_desc(device_info: &[u8]) -> Result<String, ProtocolError> {
    if device_info.len() < VENDOR_EXTENSION_DESC_OFFSET {
        return Err(ProtocolError::InsufficientData {
            needed: VENDOR_EXTENSION_DESC_OFFSET,
            available: device_info.len(),
        });
    }
    read_ptp_string(device_info, VENDOR_EXTENSION_DESC_OFFSET).map(|(s, _)| s)
}
