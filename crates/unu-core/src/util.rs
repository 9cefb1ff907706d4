//! Helpers for turning btleplug peripherals into [`PeripheralHandle`]s.

use btleplug::api::PeripheralProperties;
use btleplug::platform::PeripheralId;

use crate::transport::PeripheralHandle;

/// Address reported by CoreBluetooth, which hides real addresses.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap a
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier for a peripheral: its address, or the platform ID when
/// the address is hidden.
pub fn peripheral_identifier(address: &str, id: &PeripheralId) -> String {
    if address == HIDDEN_ADDRESS {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

/// Build a handle from a peripheral's ID and advertised properties.
pub fn peripheral_handle(id: &PeripheralId, properties: Option<&PeripheralProperties>) -> PeripheralHandle {
    match properties {
        Some(props) => PeripheralHandle::new(
            peripheral_identifier(&props.address.to_string(), id),
            props.local_name.clone(),
        ),
        None => PeripheralHandle::new(format_peripheral_id(id), None),
    }
}

/// Lossy ASCII rendering of a payload for logs.
pub fn payload_preview(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}
