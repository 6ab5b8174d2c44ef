//! `ble_request`: one request/response round-trip over a target
//! characteristic, with fragmentation and reassembly (§4.3).

use hap_ble_crypto::SessionCipher;
use hap_ble_pdu::{OpCode, PduStatus};

use crate::client::{CharacteristicHandle, GattClient};
use crate::error::{Error, Result};

/// HAP-BLE's wire-mandated MTU floor (§6).
pub const MIN_MTU: u16 = 155;

/// Compute the per-fragment write size for `handle` under the current
/// link MTU and (optional) active session, per §4.3's selection rule.
pub fn fragment_size(client: &dyn GattClient, handle: &CharacteristicHandle, sessioned: bool) -> usize {
    let mtu = client.mtu_size().max(MIN_MTU) as usize;
    let mut size = handle
        .max_write_without_response_size
        .map(|backend_size| backend_size.max(mtu - 3))
        .unwrap_or(mtu - 3);
    if sessioned {
        size = size.saturating_sub(16);
    }
    size
}

/// Perform one `(opcode, iid, body?)` request and return `(status,
/// response_body)`. Runs the read-to-completion loop even on a non-SUCCESS
/// status, since the cipher's counters must stay in lock-step regardless of
/// outcome (§4.3, §8.5).
pub async fn ble_request(
    client: &dyn GattClient,
    mut cipher: Option<&mut SessionCipher>,
    opcode: OpCode,
    handle: &CharacteristicHandle,
    iid: u16,
    body: Option<&[u8]>,
    max_reassembly_reads: usize,
) -> Result<(PduStatus, Vec<u8>)> {
    let tid = hap_ble_pdu::random_tid();
    let frag_size = fragment_size(client, handle, cipher.is_some());

    tracing::debug!(opcode = ?opcode, tid, iid, frag_size, "ble_request: encoding");
    let frames = hap_ble_pdu::encode_request(opcode, tid, iid, body, frag_size)?;

    for frame in frames {
        let out = match cipher.as_deref_mut() {
            Some(session) => session.write.encrypt(&frame),
            None => frame,
        };
        client.write_gatt_char(handle, &out, true).await?;
    }

    let raw = client.read_gatt_char(handle).await?;
    let plaintext = decrypt_if_sessioned(cipher.as_deref_mut(), &raw)?;
    tracing::trace!(?plaintext, "ble_request: first read");
    let (status, declared_len, mut body) = hap_ble_pdu::decode_response_first(tid, &plaintext)?;

    let mut reads = 0usize;
    while body.len() < declared_len as usize {
        if reads >= max_reassembly_reads {
            return Err(Error::ReassemblyBoundExceeded(max_reassembly_reads));
        }
        reads += 1;
        let raw = client.read_gatt_char(handle).await?;
        let plaintext = decrypt_if_sessioned(cipher.as_deref_mut(), &raw)?;
        body.extend(hap_ble_pdu::decode_response_continuation(tid, &plaintext)?);
    }

    Ok((status, body))
}

fn decrypt_if_sessioned(cipher: Option<&mut SessionCipher>, raw: &[u8]) -> Result<Vec<u8>> {
    match cipher {
        Some(session) => Ok(session.read.decrypt(raw)?),
        None => Ok(raw.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MockClient {
        mtu: u16,
        /// Queue of GATT reads returned in order, one per `read_gatt_char` call.
        reads: Mutex<std::collections::VecDeque<Vec<u8>>>,
        writes: Mutex<Vec<Vec<u8>>>,
        /// When set, `read_gatt_char` builds its response from the tid
        /// observed in the most recent write instead of draining `reads`.
        echo_tid: bool,
        echo_body: Vec<u8>,
        echo_status: PduStatus,
    }

    impl Default for MockClient {
        fn default() -> Self {
            Self {
                mtu: 185,
                reads: Mutex::new(Default::default()),
                writes: Mutex::new(vec![]),
                echo_tid: false,
                echo_body: vec![],
                echo_status: PduStatus::Success,
            }
        }
    }

    impl MockClient {
        fn last_written_tid(&self) -> u8 {
            let writes = self.writes.lock().unwrap();
            let frame = writes.last().expect("a write must precede a read");
            // Request first-fragment frames are `[control, opcode, tid, ..]`.
            frame[2]
        }
    }

    #[async_trait]
    impl GattClient for MockClient {
        async fn connect(&self) -> hap_ble_core::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> hap_ble_core::Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn mtu_size(&self) -> u16 {
            self.mtu
        }
        async fn services(&self) -> hap_ble_core::Result<Vec<ServiceHandle>> {
            Ok(vec![])
        }
        async fn read_gatt_char(&self, _handle: &CharacteristicHandle) -> hap_ble_core::Result<Vec<u8>> {
            if self.echo_tid {
                let tid = self.last_written_tid();
                let mut frame = vec![0x02, tid, self.echo_status.as_u8()];
                frame.extend_from_slice(&(self.echo_body.len() as u16).to_le_bytes());
                frame.extend_from_slice(&self.echo_body);
                return Ok(frame);
            }
            Ok(self.reads.lock().unwrap().pop_front().unwrap_or_default())
        }
        async fn write_gatt_char(&self, _handle: &CharacteristicHandle, data: &[u8], _with_response: bool) -> hap_ble_core::Result<()> {
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        async fn read_iid_descriptor(&self, _handle: &CharacteristicHandle) -> hap_ble_core::Result<Option<u16>> {
            Ok(Some(1))
        }
        async fn start_notify(&self, _h: &CharacteristicHandle, _s: tokio::sync::mpsc::UnboundedSender<crate::client::Notification>) -> hap_ble_core::Result<()> {
            Ok(())
        }
        async fn stop_notify(&self, _h: &CharacteristicHandle) -> hap_ble_core::Result<()> {
            Ok(())
        }
    }

    fn handle() -> CharacteristicHandle {
        CharacteristicHandle {
            uuid: Uuid::nil(),
            service_uuid: Uuid::nil(),
            max_write_without_response_size: None,
            opaque: 0,
        }
    }

    #[tokio::test]
    async fn unsessioned_read_round_trips() {
        let client = MockClient {
            mtu: 185,
            reads: Mutex::new(Default::default()),
            writes: Mutex::new(vec![]),
            echo_tid: true,
            echo_body: b"abc".to_vec(),
            echo_status: PduStatus::Success,
        };

        let (status, body) = ble_request(&client, None, OpCode::CharRead, &handle(), 10, None, 4).await.unwrap();
        assert_eq!(status, PduStatus::Success);
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn mismatched_tid_in_response_is_protocol_desync() {
        let mut response = vec![0x02, 0xFFu8, PduStatus::Success.as_u8()];
        response.extend_from_slice(&0u16.to_le_bytes());
        let client = MockClient {
            mtu: 185,
            reads: Mutex::new(vec![response].into()),
            writes: Mutex::new(vec![]),
            echo_tid: false,
            echo_body: vec![],
            echo_status: PduStatus::Success,
        };
        let err = ble_request(&client, None, OpCode::CharRead, &handle(), 10, None, 4).await.unwrap_err();
        assert!(matches!(err, Error::Pdu(hap_ble_pdu::Error::ProtocolDesync(_))));
    }

    #[tokio::test]
    async fn reassembly_runs_to_completion_even_on_failure_status() {
        let tid = 5u8;
        let mut first = vec![0x02, tid, PduStatus::InvalidInstanceId.as_u8()];
        first.extend_from_slice(&6u16.to_le_bytes());
        first.extend_from_slice(b"ab");
        let mut cont = vec![0x82, tid];
        cont.extend_from_slice(b"cdef");

        // Force a deterministic tid by constructing frames ourselves and
        // driving decode directly rather than through the randomized
        // `ble_request` tid path.
        let (status, declared_len, mut body) = hap_ble_pdu::decode_response_first(tid, &first).unwrap();
        body.extend(hap_ble_pdu::decode_response_continuation(tid, &cont).unwrap());
        assert_eq!(status, PduStatus::InvalidInstanceId);
        assert_eq!(body.len(), declared_len as usize);
    }

    #[test]
    fn fragment_size_floors_at_min_mtu_minus_overhead() {
        let client = MockClient { mtu: 20, ..Default::default() };
        let size = fragment_size(&client, &handle(), false);
        assert_eq!(size, MIN_MTU as usize - 3);
    }

    #[test]
    fn fragment_size_subtracts_tag_when_sessioned() {
        let client = MockClient { mtu: 200, ..Default::default() };
        let unsessioned = fragment_size(&client, &handle(), false);
        let sessioned = fragment_size(&client, &handle(), true);
        assert_eq!(unsessioned - sessioned, 16);
    }

    #[test]
    fn fragment_size_prefers_backend_capability() {
        let client = MockClient { mtu: 200, ..Default::default() };
        let mut h = handle();
        h.max_write_without_response_size = Some(500);
        assert_eq!(fragment_size(&client, &h, false), 500);
    }
}
