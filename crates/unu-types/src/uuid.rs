//! Bluetooth UUIDs for unu scooters.
//!
//! Every service and characteristic exposed by the scooter shares the
//! `-6e67-5d0d-aab9-ad9126b66f91` suffix; only the leading 32 bits differ.

use uuid::{Uuid, uuid};

// --- Service UUIDs ---

/// Command service (command and hibernation characteristics).
pub const COMMAND_SERVICE: Uuid = uuid!("9a590000-6e67-5d0d-aab9-ad9126b66f91");

/// Main service (scooter state and handlebar lock).
pub const MAIN_SERVICE: Uuid = uuid!("9a590020-6e67-5d0d-aab9-ad9126b66f91");

/// Power management service.
pub const POWER_SERVICE: Uuid = uuid!("9a5900a0-6e67-5d0d-aab9-ad9126b66f91");

/// Auxiliary battery service.
pub const AUX_BATTERY_SERVICE: Uuid = uuid!("9a590040-6e67-5d0d-aab9-ad9126b66f91");

/// CBB (connectivity battery box) service.
pub const CBB_SERVICE: Uuid = uuid!("9a590060-6e67-5d0d-aab9-ad9126b66f91");

/// Primary and secondary traction battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("9a5900e0-6e67-5d0d-aab9-ad9126b66f91");

// --- Characteristic UUIDs ---

/// Text command input, e.g. `scooter:state lock`.
pub const COMMAND: Uuid = uuid!("9a590001-6e67-5d0d-aab9-ad9126b66f91");

/// Hibernation command input, accepts `wakeup`.
pub const HIBERNATION_COMMAND: Uuid = uuid!("9a590002-6e67-5d0d-aab9-ad9126b66f91");

/// Scooter state as text (`stand-by`, `parked`, ...).
pub const SCOOTER_STATE: Uuid = uuid!("9a590021-6e67-5d0d-aab9-ad9126b66f91");

/// Handlebar lock sensor as text (`locked` / `unlocked`).
pub const HANDLEBAR_LOCK: Uuid = uuid!("9a590023-6e67-5d0d-aab9-ad9126b66f91");

/// Power state as text (`running`, `suspending`, ...).
pub const POWER_STATE: Uuid = uuid!("9a5900a1-6e67-5d0d-aab9-ad9126b66f91");

/// Auxiliary battery state of charge, 4 bytes little-endian.
pub const AUX_SOC: Uuid = uuid!("9a590044-6e67-5d0d-aab9-ad9126b66f91");

/// CBB state of charge, 1 byte.
pub const CBB_SOC: Uuid = uuid!("9a590061-6e67-5d0d-aab9-ad9126b66f91");

/// CBB charging status as text.
pub const CBB_CHARGING: Uuid = uuid!("9a590072-6e67-5d0d-aab9-ad9126b66f91");

/// Primary battery state of charge, 4 bytes little-endian.
pub const PRIMARY_SOC: Uuid = uuid!("9a5900e9-6e67-5d0d-aab9-ad9126b66f91");

/// Secondary battery state of charge, 4 bytes little-endian.
pub const SECONDARY_SOC: Uuid = uuid!("9a5900f5-6e67-5d0d-aab9-ad9126b66f91");

/// All six services, in discovery order.
pub const ALL_SERVICES: [Uuid; 6] = [
    COMMAND_SERVICE,
    MAIN_SERVICE,
    POWER_SERVICE,
    AUX_BATTERY_SERVICE,
    CBB_SERVICE,
    BATTERY_SERVICE,
];

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = "-6e67-5d0d-aab9-ad9126b66f91";

    #[test]
    fn test_service_uuids() {
        assert_eq!(
            COMMAND_SERVICE.to_string(),
            "9a590000-6e67-5d0d-aab9-ad9126b66f91"
        );
        assert_eq!(
            MAIN_SERVICE.to_string(),
            "9a590020-6e67-5d0d-aab9-ad9126b66f91"
        );
        assert_eq!(
            POWER_SERVICE.to_string(),
            "9a5900a0-6e67-5d0d-aab9-ad9126b66f91"
        );
        assert_eq!(
            AUX_BATTERY_SERVICE.to_string(),
            "9a590040-6e67-5d0d-aab9-ad9126b66f91"
        );
        assert_eq!(
            CBB_SERVICE.to_string(),
            "9a590060-6e67-5d0d-aab9-ad9126b66f91"
        );
        assert_eq!(
            BATTERY_SERVICE.to_string(),
            "9a5900e0-6e67-5d0d-aab9-ad9126b66f91"
        );
    }

    #[test]
    fn test_characteristic_prefixes() {
        let expected = [
            (COMMAND, "9a590001"),
            (HIBERNATION_COMMAND, "9a590002"),
            (SCOOTER_STATE, "9a590021"),
            (HANDLEBAR_LOCK, "9a590023"),
            (POWER_STATE, "9a5900a1"),
            (AUX_SOC, "9a590044"),
            (CBB_SOC, "9a590061"),
            (CBB_CHARGING, "9a590072"),
            (PRIMARY_SOC, "9a5900e9"),
            (SECONDARY_SOC, "9a5900f5"),
        ];
        for (uuid, prefix) in expected {
            assert_eq!(uuid.to_string(), format!("{prefix}{SUFFIX}"));
        }
    }

    #[test]
    fn test_all_services_unique() {
        let mut seen = std::collections::HashSet::new();
        for service in ALL_SERVICES {
            assert!(seen.insert(service), "duplicate service {service}");
        }
    }
}
