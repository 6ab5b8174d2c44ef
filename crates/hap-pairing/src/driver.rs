//! Pair-setup / pair-verify drivers (§4.4) and the `char_write`/`char_read`
//! HAP-value wrapper they (and every other characteristic access) sit on
//! top of, grounded in `aiohomekit/controller/ble/client.py`'s `char_write`,
//! `char_read` and `drive_pairing_state_machine`.

use hap_ble_gatt::{ble_request, CharacteristicHandle, GattClient};
use hap_ble_pdu::{OpCode, PduStatus};
use hap_ble_tlv8::{TlvItem, TlvList};

use crate::error::{Error, Result};

/// HAP's "additional parameter types" used to wrap every characteristic
/// write/read payload (§4.4: "wrap as a HAP write value").
pub(crate) mod additional_parameter_types {
    pub const VALUE: u8 = 0x01;
    pub const TTL: u8 = 0x08;
    pub const RETURN_RESPONSE: u8 = 0x09;
}

/// Write `body` to `handle`/`iid` via `CHAR_WRITE`, wrapped in the HAP
/// value envelope, and return the decoded `Value` field of the response.
pub async fn char_write(
    client: &dyn GattClient,
    mut cipher: Option<&mut hap_ble_crypto::SessionCipher>,
    handle: &CharacteristicHandle,
    iid: u16,
    body: &[u8],
    max_reassembly_reads: usize,
) -> Result<Vec<u8>> {
    let envelope = TlvList::new().push(additional_parameter_types::RETURN_RESPONSE, vec![1u8]).push(additional_parameter_types::VALUE, body.to_vec());
    let encoded = hap_ble_tlv8::encode(&envelope);

    let (status, response) = ble_request(
        client,
        cipher.as_deref_mut(),
        OpCode::CharWrite,
        handle,
        iid,
        Some(&encoded),
        max_reassembly_reads,
    )
    .await?;
    if status != PduStatus::Success {
        return Err(Error::ProtocolDesync(format!("CHAR_WRITE status {}: {}", status.as_u8(), status.description())));
    }
    extract_value(&response)
}

/// Read `handle`/`iid`'s signature via `CHAR_SIG_READ` (§4.5). Always
/// unsessioned: signature reads happen before verify during database fetch.
///
/// Unlike `char_write`/`char_read`, the signature response body is *not*
/// wrapped in the HAP value envelope (no tag `0x01`) — it is itself a TLV
/// list keyed directly by the signature tags (`CHARACTERISTIC_TYPE`,
/// `HAP_CHARACTERISTIC_PROPERTIES`, ...) that `reconciler::build_characteristic`
/// decodes, so the raw response is returned as-is rather than run through
/// [`extract_value`].
pub async fn char_sig_read(client: &dyn GattClient, handle: &CharacteristicHandle, iid: u16, max_reassembly_reads: usize) -> Result<Vec<u8>> {
    let (status, response) = ble_request(client, None, OpCode::CharSignatureRead, handle, iid, None, max_reassembly_reads).await?;
    if status != PduStatus::Success {
        return Err(Error::ProtocolDesync(format!("CHAR_SIG_READ status {}: {}", status.as_u8(), status.description())));
    }
    Ok(response)
}

/// Read `handle`/`iid` via `CHAR_READ` and return the decoded `Value` field.
pub async fn char_read(
    client: &dyn GattClient,
    mut cipher: Option<&mut hap_ble_crypto::SessionCipher>,
    handle: &CharacteristicHandle,
    iid: u16,
    max_reassembly_reads: usize,
) -> Result<Vec<u8>> {
    let (status, response) = ble_request(client, cipher.as_deref_mut(), OpCode::CharRead, handle, iid, None, max_reassembly_reads).await?;
    if status != PduStatus::Success {
        return Err(Error::ProtocolDesync(format!("CHAR_READ status {}: {}", status.as_u8(), status.description())));
    }
    extract_value(&response)
}

fn extract_value(response: &[u8]) -> Result<Vec<u8>> {
    let decoded = hap_ble_tlv8::decode(response)?;
    decoded
        .get(additional_parameter_types::VALUE)
        .map(|v| v.to_vec())
        .ok_or_else(|| Error::MalformedPdu("HAP value envelope missing Value field".to_string()))
}

/// Pair-setup's terminal output (§4.4): the new pairing descriptor.
#[derive(Debug, Clone)]
pub struct PairingIdentity {
    pub accessory_pairing_id: String,
    pub accessory_ltpk: Vec<u8>,
}

/// Pair-verify's terminal output (§4.4): a session id plus the key
/// material needed to derive the two directional session keys.
pub struct VerifiedSession {
    pub session_id: hap_ble_core::SessionId,
    pub deriver: Box<dyn hap_ble_crypto::KeyDeriver>,
}

/// One step of an externally supplied pair-setup or pair-verify state
/// machine (§4.4): either another outbound TLV request, or completion with
/// a final `Output` value.
pub enum StepResult<Output> {
    Continue { request: TlvList },
    Done(Output),
}

/// The Rust-idiomatic rendering of the Python generator protocol
/// (`send`/`StopIteration`) the original pairing state machines use (§9,
/// "Coroutine control flow → explicit state"). Supplied entirely by the
/// caller; pair-setup/pair-verify cryptography itself is out of scope (§1).
pub trait PairingStateMachine {
    type Output;

    /// Advance the machine. `inbound` is `None` only on the very first
    /// call; every subsequent call carries the accessory's decoded reply.
    fn step(&mut self, inbound: Option<TlvList>) -> StepResult<Self::Output>;
}

/// Drive `machine` to completion over `handle`/`iid`, mirroring
/// `drive_pairing_state_machine`: TLV-encode each outbound request, write
/// it via [`char_write`], TLV-decode the reply, and feed it back in.
///
/// Pair-setup/pair-verify signature reads and writes are always
/// unencrypted at the transport level (the machine's own TLV fields carry
/// whatever cryptographic material is needed), so `cipher` is always `None`
/// here — a verified session is the *output* of pair-verify, not a
/// precondition for driving it.
pub async fn drive<M: PairingStateMachine>(
    client: &dyn GattClient,
    handle: &CharacteristicHandle,
    iid: u16,
    machine: &mut M,
    max_reassembly_reads: usize,
) -> Result<M::Output> {
    let mut inbound = None;
    loop {
        match machine.step(inbound.take()) {
            StepResult::Done(output) => return Ok(output),
            StepResult::Continue { request } => {
                let body = hap_ble_tlv8::encode(&request);
                let response = char_write(client, None, handle, iid, &body, max_reassembly_reads).await?;
                inbound = Some(hap_ble_tlv8::decode(&response)?);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TlvError {
    pub code: u8,
}

/// Decode a Pair-Pairings/Pair-Setup error field (tag `0x07`, `kTLVType_Error`)
/// if the accessory's response carries one.
pub fn error_field(list: &TlvList) -> Option<TlvError> {
    const ERROR_TAG: u8 = 0x07;
    list.get(ERROR_TAG).and_then(|v| v.first()).map(|&code| TlvError { code })
}

/// `kTLVError_Authentication` per the HAP TLV error code table.
pub const TLV_ERROR_AUTHENTICATION: u8 = 0x02;

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoStepEcho {
        step: u8,
    }

    impl PairingStateMachine for TwoStepEcho {
        type Output = Vec<u8>;

        fn step(&mut self, inbound: Option<TlvList>) -> StepResult<Self::Output> {
            match (self.step, inbound) {
                (0, None) => {
                    self.step = 1;
                    StepResult::Continue { request: TlvList::new().push(1, vec![0xAA]) }
                }
                (1, Some(list)) => StepResult::Done(list.get(1).unwrap_or(&[]).to_vec()),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn extract_value_reads_the_value_tag() {
        let envelope = TlvList::new().push(additional_parameter_types::RETURN_RESPONSE, vec![1]).push(additional_parameter_types::VALUE, vec![9, 8, 7]);
        let encoded = hap_ble_tlv8::encode(&envelope);
        assert_eq!(extract_value(&encoded).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn extract_value_errors_when_value_missing() {
        let envelope = TlvList::new().push(additional_parameter_types::RETURN_RESPONSE, vec![1]);
        let encoded = hap_ble_tlv8::encode(&envelope);
        assert!(extract_value(&encoded).is_err());
    }

    #[test]
    fn error_field_decodes_authentication_error() {
        let list = TlvList::new().push(0x07, vec![TLV_ERROR_AUTHENTICATION]);
        let err = error_field(&list).unwrap();
        assert_eq!(err.code, TLV_ERROR_AUTHENTICATION);
    }

    #[test]
    fn step_result_enum_distinguishes_continue_and_done() {
        let mut machine = TwoStepEcho { step: 0 };
        match machine.step(None) {
            StepResult::Continue { request } => assert_eq!(request.get(1), Some([0xAAu8].as_slice())),
            StepResult::Done(_) => panic!("expected Continue"),
        }
        match machine.step(Some(TlvList::new().push(1, vec![0xBB]))) {
            StepResult::Done(output) => assert_eq!(output, vec![0xBB]),
            StepResult::Continue { .. } => panic!("expected Done"),
        }
    }
}
