//! GATT database reconciler (§4.5): enumerate services/characteristics,
//! read each characteristic's iid and signature, and (when a session is
//! live) populate values respecting permission bits.

use hap_ble_gatt::{CharacteristicHandle, GattClient};
use hap_ble_tlv8::TlvList;
use uuid::Uuid;

use crate::config::SERVICE_INSTANCE_UUID;
use crate::driver::{char_read, char_sig_read};
use crate::error::Result;
use crate::model::{Accessory, Characteristic, Format, Range, Service};

mod additional_parameter_types {
    pub const CHARACTERISTIC_TYPE: u8 = 0x04;
    pub const HAP_CHARACTERISTIC_PROPERTIES: u8 = 0x0A;
    pub const GATT_PRESENTATION_FORMAT: u8 = 0x0C;
    pub const GATT_VALID_RANGE: u8 = 0x0D;
    pub const HAP_STEP_VALUE: u8 = 0x0E;
}

/// Services whose characteristics are never value-populated, even with a
/// live session (§4.5 **[SUPPLEMENT]**). Names mirror the HAP service-type
/// vocabulary; these are held as well-known UUIDs rather than names because
/// the wire only ever carries UUIDs.
pub struct SkipSyncServices {
    pub thread_transport: Uuid,
    pub pairing: Uuid,
    pub transfer_transport_management: Uuid,
    pub accessory_information: Uuid,
}

impl SkipSyncServices {
    fn contains(&self, service_type: Uuid) -> bool {
        [self.thread_transport, self.pairing, self.transfer_transport_management].contains(&service_type)
    }
}

/// Enumerate every service/characteristic on `client` and build an
/// `Accessory` tree with signatures populated but values absent (§4.5 steps
/// 1-4).
pub async fn discover_signatures(client: &dyn GattClient, max_reassembly_reads: usize) -> Result<Accessory> {
    let mut accessory = Accessory::default();

    for service_handle in client.services().await? {
        let mut characteristics = Vec::new();
        let mut service_iid = hap_ble_core::Iid(0);

        for char_handle in &service_handle.characteristics {
            if char_handle.uuid == SERVICE_INSTANCE_UUID {
                // This pseudo-characteristic's value, not its signature, is the
                // enclosing service's own iid (§4.5: "excluding the
                // service-instance-id pseudo-characteristic" from the regular
                // characteristic enumeration).
                let raw = char_read(client, None, char_handle, 0, max_reassembly_reads).await?;
                service_iid = hap_ble_core::Iid(u16::from_le_bytes([raw.first().copied().unwrap_or(0), raw.get(1).copied().unwrap_or(0)]));
                continue;
            }
            let Some(iid) = client.read_iid_descriptor(char_handle).await? else {
                tracing::debug!(uuid = %char_handle.uuid, "characteristic has no iid descriptor, skipping");
                continue;
            };
            let signature = char_sig_read(client, char_handle, iid, max_reassembly_reads).await?;
            let decoded = hap_ble_tlv8::decode(&signature)?;
            characteristics.push(build_characteristic(hap_ble_core::Iid(iid), char_handle, service_handle.uuid, &decoded)?);
        }
        characteristics.sort_by_key(|c| c.iid);
        accessory.services.push(Service { iid: service_iid, service_type: service_handle.uuid, characteristics });
    }

    accessory.services.sort_by_key(|s| s.iid);
    Ok(accessory)
}

fn build_characteristic(
    iid: hap_ble_core::Iid,
    handle: &CharacteristicHandle,
    service_type: Uuid,
    signature: &TlvList,
) -> Result<Characteristic> {
    use additional_parameter_types::*;

    let perms = signature
        .get(HAP_CHARACTERISTIC_PROPERTIES)
        .map(|bytes| {
            let bits = u16::from_le_bytes([bytes.first().copied().unwrap_or(0), bytes.get(1).copied().unwrap_or(0)]);
            crate::model::Permissions::from_bits_truncate(bits as u8)
        })
        .unwrap_or(crate::model::Permissions::empty());

    let format = signature.get(GATT_PRESENTATION_FORMAT).and_then(|bytes| bytes.first()).map(|&b| decode_format(b));

    let width = format.as_ref().map(format_width).unwrap_or(0);
    let range = if width > 0 {
        let min_step = signature.get(HAP_STEP_VALUE).and_then(|bytes| decode_numeric(bytes, width));
        let (min_value, max_value) = signature
            .get(GATT_VALID_RANGE)
            .map(|bytes| {
                if bytes.len() < width * 2 {
                    (None, None)
                } else {
                    (decode_numeric(&bytes[..width], width), decode_numeric(&bytes[width..width * 2], width))
                }
            })
            .unwrap_or((None, None));
        Range { min_value, max_value, min_step }
    } else {
        Range::default()
    };

    let char_type = signature
        .get(CHARACTERISTIC_TYPE)
        .map(|bytes| uuid_from_wire(bytes))
        .unwrap_or(Uuid::nil());

    Ok(Characteristic { iid, char_type, service_type, perms, format, range, value: None })
}

fn decode_format(byte: u8) -> Format {
    match byte {
        0x01 => Format::Bool,
        0x04 => Format::UInt8,
        0x06 => Format::UInt16,
        0x08 => Format::UInt32,
        0x0A => Format::UInt64,
        0x10 => Format::Int,
        0x14 => Format::Float,
        0x19 => Format::String,
        0x1B => Format::Tlv8,
        0x1A => Format::Data,
        other => Format::Other(other),
    }
}

pub(crate) fn format_width(format: &Format) -> usize {
    match format {
        Format::Bool | Format::UInt8 => 1,
        Format::UInt16 => 2,
        Format::UInt32 | Format::Float => 4,
        Format::UInt64 | Format::Int => 8,
        _ => 0,
    }
}

fn decode_numeric(bytes: &[u8], width: usize) -> Option<f64> {
    if bytes.len() < width {
        return None;
    }
    let value = match width {
        1 => bytes[0] as f64,
        2 => u16::from_le_bytes(bytes[..2].try_into().ok()?) as f64,
        4 => u32::from_le_bytes(bytes[..4].try_into().ok()?) as f64,
        8 => u64::from_le_bytes(bytes[..8].try_into().ok()?) as f64,
        _ => return None,
    };
    Some(value)
}

fn uuid_from_wire(bytes: &[u8]) -> Uuid {
    let mut buf = [0u8; 16];
    let n = bytes.len().min(16);
    buf[..n].copy_from_slice(&bytes[..n]);
    Uuid::from_bytes(buf)
}

/// Populate characteristic values over a live session (§4.5 second half):
/// every `paired_read` characteristic, excluding `skip` services entirely,
/// further excluding `accessory_information` unless `config_num_driven`.
pub async fn populate_values(
    client: &dyn GattClient,
    mut cipher: Option<&mut hap_ble_crypto::SessionCipher>,
    accessory: &mut Accessory,
    skip: &SkipSyncServices,
    config_num_driven: bool,
    max_reassembly_reads: usize,
) -> Result<()> {
    for service in &mut accessory.services {
        if skip.contains(service.service_type) {
            continue;
        }
        if service.service_type == skip.accessory_information && !config_num_driven {
            continue;
        }
        for characteristic in &mut service.characteristics {
            if !characteristic.supports_paired_read() {
                continue;
            }
            let handle = CharacteristicHandle {
                uuid: characteristic.char_type,
                service_uuid: service.service_type,
                max_write_without_response_size: None,
                opaque: characteristic.iid.0 as u64,
            };
            let raw = char_read(client, cipher.as_deref_mut(), &handle, characteristic.iid.0, max_reassembly_reads).await?;
            characteristic.value = Some(decode_value(&raw, characteristic.format.as_ref()));
        }
    }
    Ok(())
}

pub(crate) fn decode_value(raw: &[u8], format: Option<&Format>) -> serde_json::Value {
    match format {
        Some(Format::Bool) => serde_json::Value::Bool(raw.first().copied().unwrap_or(0) != 0),
        Some(f) => decode_numeric(raw, format_width(f))
            .map(|n| serde_json::Number::from_f64(n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null))
            .unwrap_or_else(|| serde_json::Value::String(hex_encode(raw))),
        None => serde_json::Value::String(hex_encode(raw)),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Inverse of [`decode_value`], used by the controller's write path.
pub(crate) fn encode_value(value: &serde_json::Value, format: Option<&Format>) -> Vec<u8> {
    match (value, format) {
        (serde_json::Value::Bool(b), _) => vec![*b as u8],
        (serde_json::Value::String(s), Some(Format::String)) => s.as_bytes().to_vec(),
        (serde_json::Value::Number(n), Some(f)) => {
            let width = format_width(f);
            let as_u64 = n.as_u64().or_else(|| n.as_f64().map(|v| v as u64)).unwrap_or(0);
            match width {
                1 => vec![as_u64 as u8],
                2 => (as_u64 as u16).to_le_bytes().to_vec(),
                4 => {
                    if matches!(f, Format::Float) {
                        (n.as_f64().unwrap_or(0.0) as f32).to_le_bytes().to_vec()
                    } else {
                        (as_u64 as u32).to_le_bytes().to_vec()
                    }
                }
                8 => as_u64.to_le_bytes().to_vec(),
                _ => as_u64.to_le_bytes().to_vec(),
            }
        }
        (serde_json::Value::String(s), _) => hex_decode(s),
        _ => Vec::new(),
    }
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| s.get(i..i + 2).and_then(|byte| u8::from_str_radix(byte, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip_services() -> SkipSyncServices {
        SkipSyncServices {
            thread_transport: Uuid::from_u128(1),
            pairing: Uuid::from_u128(2),
            transfer_transport_management: Uuid::from_u128(3),
            accessory_information: Uuid::from_u128(4),
        }
    }

    #[test]
    fn skip_services_excludes_named_services() {
        let skip = skip_services();
        assert!(skip.contains(skip.thread_transport));
        assert!(!skip.contains(skip.accessory_information));
        assert!(!skip.contains(Uuid::from_u128(99)));
    }

    #[test]
    fn signature_decodes_perms_and_format() {
        let signature =
            TlvList::new().push(0x0A, vec![0x03, 0x00]).push(0x0C, vec![0x04]).push(0x0D, vec![0, 100]).push(0x0E, vec![1]);
        let handle = CharacteristicHandle { uuid: Uuid::nil(), service_uuid: Uuid::nil(), max_write_without_response_size: None, opaque: 0 };
        let characteristic = build_characteristic(hap_ble_core::Iid(5), &handle, Uuid::nil(), &signature).unwrap();
        assert!(characteristic.supports_paired_read());
        assert!(characteristic.supports_paired_write());
        assert_eq!(characteristic.format, Some(Format::UInt8));
        assert_eq!(characteristic.range.max_value, Some(100.0));
        assert_eq!(characteristic.range.min_step, Some(1.0));
    }

    #[test]
    fn missing_format_leaves_range_absent() {
        let signature = TlvList::new().push(0x0A, vec![0x01, 0x00]);
        let handle = CharacteristicHandle { uuid: Uuid::nil(), service_uuid: Uuid::nil(), max_write_without_response_size: None, opaque: 0 };
        let characteristic = build_characteristic(hap_ble_core::Iid(1), &handle, Uuid::nil(), &signature).unwrap();
        assert_eq!(characteristic.format, None);
        assert_eq!(characteristic.range, Range::default());
    }
}
