/*!
 * Identity records.
 *
 * An identity is the stable descriptor the layer above keys a device's
 * uniform representation on: the driver namespace, device type, UDN,
 * and a derived `thing_id`. The full form additionally carries every
 * remaining string-valued top-level metadata field of the device.
 */
use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use thingbridge_core::types::Value;

use crate::device::DeviceRecord;

/// Fixed namespace for deriving thing identifiers
const THING_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8f3b_61c2_4a0d_4f7e_9b5a_2d83_c1e6_7a04);

/// Field names of the base identity record; metadata fields with these
/// names are never duplicated into the expansion
const BASE_FIELDS: [&str; 4] = ["driver", "deviceType", "udn", "thing_id"];

/// The stable identity descriptor of a bound device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Driver namespace identifier, e.g. `bridge-driver:sim`
    pub driver: String,
    /// Device type string
    #[serde(rename = "deviceType")]
    pub device_type: String,
    /// Unique device name
    pub udn: String,
    /// Derived stable thing identifier
    pub thing_id: String,
    /// String-valued metadata fields included only in the full form
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Identity {
    /// Compute the base identity record for a bound device
    pub fn base(driver: &str, record: &DeviceRecord) -> Self {
        let device_type = record.device_type().to_string();
        let udn = record.udn().to_string();
        let thing_id = derive_thing_id(driver, &device_type, &udn);

        Self {
            driver: driver.to_string(),
            device_type,
            udn,
            thing_id,
            extra: BTreeMap::new(),
        }
    }

    /// Compute the full identity record for a bound device.
    ///
    /// Starts from the base record and includes each string-valued
    /// top-level metadata field not already present in it. Numeric,
    /// boolean, and structured fields are excluded from the expansion.
    pub fn full(driver: &str, record: &DeviceRecord) -> Self {
        let mut identity = Self::base(driver, record);

        for (key, value) in record.metadata() {
            if BASE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Value::String(s) = value {
                identity.extra.insert(key.clone(), s.clone());
            }
        }

        identity
    }
}

/// Derive the stable thing identifier for a device.
///
/// A v5 UUID over the driver namespace, device type, and UDN; the same
/// inputs always produce the same identifier, across processes.
pub fn derive_thing_id(driver: &str, device_type: &str, udn: &str) -> String {
    let seed = format!("{}|{}|{}", driver, device_type, udn);
    format!(
        "urn:thing:{}",
        Uuid::new_v5(&THING_ID_NAMESPACE, seed.as_bytes())
    )
}
