//! FTEST wire protocol codec
//!
//! Translates between raw datagram bytes and structured messages. Three
//! message shapes exist on the wire, all textual:
//!
//! ```text
//! probe:     <FTEST,{sequence},{payload}>
//! echo:      [FTEST,0,{identity},{sequence},{reserved}]
//! telemetry: [PCIR,{id},{linkFail},{maxCycle},{minCycle},{over15},{over20},{over25},{over30},{recvCount},{recvDouble},{recvFail}]
//! ```
//!
//! Decoders return `None` for anything that does not satisfy the envelope
//! shape. A buffer that is not an echo may still be a telemetry report or
//! unrelated traffic, so "no match" is never an error.

/// Envelope of an outbound probe
const PROBE_PREFIX: &str = "<FTEST,";
const PROBE_SUFFIX: char = '>';

/// Envelope of an echo response. The literal `0` is part of the protocol
const ECHO_PREFIX: &str = "[FTEST,0,";
const ECHO_SUFFIX: char = ']';

/// Fields remaining after the echo prefix: identity, sequence, reserved
const ECHO_BODY_FIELDS: usize = 3;

/// Envelope of an extended telemetry report
const TELEMETRY_PREFIX: &str = "[PCIR,";
const TELEMETRY_SUFFIX: char = ']';

/// Numeric fields following the PCIR tag
const TELEMETRY_FIELDS: usize = 11;

/// A decoded echo response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    /// Device identity token, e.g. a MAC address string
    pub identity: String,
    /// The probe sequence the device is answering
    pub sequence: u16,
}

/// A decoded extended telemetry report
///
/// Cumulative link/cycle statistics a device reports out-of-band. Applied
/// wholesale to the device record; fields are never merged across reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryReport {
    pub id: u64,
    pub link_fail_count: u64,
    pub max_cycle_ms: u64,
    pub min_cycle_ms: u64,
    pub over_15ms: u64,
    pub over_20ms: u64,
    pub over_25ms: u64,
    pub over_30ms: u64,
    pub recv_count: u64,
    pub recv_double_count: u64,
    pub recv_fail_count: u64,
}

/// Encode an outbound probe frame
///
/// The payload is free-form and is used to pad the packet for load
/// testing; it must not contain the closing `>` delimiter.
pub fn encode_probe(sequence: u16, payload: &str) -> Vec<u8> {
    format!("{PROBE_PREFIX}{sequence},{payload}{PROBE_SUFFIX}").into_bytes()
}

/// Decode an echo response, or `None` if the buffer is not one
pub fn decode_echo(buf: &[u8]) -> Option<EchoMessage> {
    let raw = std::str::from_utf8(buf).ok()?;
    let content = raw.strip_prefix(ECHO_PREFIX)?.strip_suffix(ECHO_SUFFIX)?;

    let parts: Vec<&str> = content.split(',').collect();
    if parts.len() != ECHO_BODY_FIELDS {
        return None;
    }
    let sequence: u16 = parts[1].parse().ok()?;

    Some(EchoMessage {
        identity: parts[0].to_string(),
        sequence,
    })
}

/// Decode a telemetry report, or `None` if the buffer is not one
///
/// All eleven fields must parse as integers; a partial report is rejected
/// outright so a device's telemetry snapshot is never half-updated.
pub fn decode_telemetry(buf: &[u8]) -> Option<TelemetryReport> {
    let raw = std::str::from_utf8(buf).ok()?;
    let content = raw
        .strip_prefix(TELEMETRY_PREFIX)?
        .strip_suffix(TELEMETRY_SUFFIX)?;

    let parts: Vec<&str> = content.split(',').collect();
    if parts.len() != TELEMETRY_FIELDS {
        return None;
    }

    let mut fields = [0u64; TELEMETRY_FIELDS];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }

    Some(TelemetryReport {
        id: fields[0],
        link_fail_count: fields[1],
        max_cycle_ms: fields[2],
        min_cycle_ms: fields[3],
        over_15ms: fields[4],
        over_20ms: fields[5],
        over_25ms: fields[6],
        over_30ms: fields[7],
        recv_count: fields[8],
        recv_double_count: fields[9],
        recv_fail_count: fields[10],
    })
}
