// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SDCP message codec.
//
// Discovery: the ASCII probe `M99999` goes out over UDP to port 3000 and each
// printer answers with a JSON datagram describing itself.  Status: once a
// WebSocket is open on port 3030, a `Cmd 0` request makes the printer push
// `Status` objects.  Everything else that arrives on the socket (command
// acknowledgements, attribute pushes) is recognised and ignored.
//
// Decoding is all-or-nothing: a payload either becomes a complete
// `PrinterStatus` or a `Parse` error.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use druckwacht_core::error::{DruckwachtError, Result};
use druckwacht_core::types::{PrinterEndpoint, PrinterState, PrinterStatus};

/// Discovery probe datagram.
pub const DISCOVERY_PROBE: &[u8] = b"M99999";

/// SDCP command number for "report printer status".
pub const CMD_STATUS: u32 = 0;

/// `From` field value identifying a PC/desktop client.
const FROM_PC: u32 = 0;

// -- Print status codes (PrintInfo.Status) ----------------------------------

pub const PRINT_IDLE: u32 = 0;
pub const PRINT_HOMING: u32 = 1;
pub const PRINT_DROPPING: u32 = 2;
pub const PRINT_EXPOSING: u32 = 3;
pub const PRINT_LIFTING: u32 = 4;
pub const PRINT_PAUSING: u32 = 5;
pub const PRINT_PAUSED: u32 = 6;
pub const PRINT_STOPPING: u32 = 7;
pub const PRINT_STOPPED: u32 = 8;
pub const PRINT_COMPLETE: u32 = 9;
pub const PRINT_FILE_CHECK: u32 = 10;
pub const PRINT_PRINTING: u32 = 13;
pub const PRINT_HEATING: u32 = 16;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DiscoveryReply {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Data")]
    data: Option<DiscoveryData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiscoveryData {
    name: Option<String>,
    machine_name: Option<String>,
    brand_name: Option<String>,
    #[serde(rename = "MainboardIP")]
    mainboard_ip: Option<String>,
    #[serde(rename = "MainboardID")]
    mainboard_id: Option<String>,
    protocol_version: Option<String>,
    firmware_version: Option<String>,
}

/// Decode a discovery reply datagram received from `source`.
///
/// The printer's self-reported `MainboardIP` wins over the datagram source
/// address when it parses, since replies can be relayed.
pub fn parse_discovery_reply(payload: &[u8], source: IpAddr) -> Result<PrinterEndpoint> {
    let reply: DiscoveryReply = serde_json::from_slice(payload)
        .map_err(|e| DruckwachtError::Parse(format!("invalid JSON from {source}: {e}")))?;

    let (Some(id), Some(data)) = (reply.id, reply.data) else {
        return Err(DruckwachtError::Parse(format!(
            "reply from {source} unrecognised as SDCP"
        )));
    };

    let address = data
        .mainboard_ip
        .as_deref()
        .and_then(|ip| ip.parse().ok())
        .unwrap_or(source);

    Ok(PrinterEndpoint {
        name: data.name.unwrap_or_else(|| "?".into()),
        mainboard_id: data.mainboard_id.unwrap_or_else(|| id.clone()),
        protocol_version: data.protocol_version.unwrap_or_else(|| "?".into()),
        firmware_version: data.firmware_version,
        machine_name: data.machine_name,
        brand_name: data.brand_name,
        address,
        id,
    })
}

// ---------------------------------------------------------------------------
// Status request
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Request<'a> {
    id: &'a str,
    data: RequestData<'a>,
    topic: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RequestData<'a> {
    cmd: u32,
    data: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "RequestID")]
    request_id: &'a str,
    #[serde(rename = "MainboardID")]
    mainboard_id: &'a str,
    time_stamp: i64,
    from: u32,
}

/// A fresh 16-hex-character request identifier.
pub fn new_request_id() -> String {
    hex::encode(&Uuid::new_v4().as_bytes()[..8])
}

/// Build the `Cmd 0` status request for `endpoint`.
pub fn status_request(endpoint: &PrinterEndpoint, request_id: &str, timestamp: i64) -> Result<String> {
    let request = Request {
        id: &endpoint.id,
        data: RequestData {
            cmd: CMD_STATUS,
            data: serde_json::Map::new(),
            request_id,
            mainboard_id: &endpoint.mainboard_id,
            time_stamp: timestamp,
            from: FROM_PC,
        },
        topic: format!("sdcp/request/{}", endpoint.mainboard_id),
    };
    Ok(serde_json::to_string(&request)?)
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A decoded message from the status channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status(PrinterStatus),
    /// Acknowledgement or any other message without a `Status` member.
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusPayload {
    #[serde(default)]
    current_status: Vec<u32>,
    temp_of_hotbed: Option<f64>,
    print_info: PrintInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PrintInfo {
    status: u32,
    current_ticks: Option<f64>,
    total_ticks: Option<f64>,
    filename: Option<String>,
}

/// Decode one text frame from the status channel.
pub fn decode_message(text: &str, received_at: DateTime<Utc>) -> Result<Inbound> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| DruckwachtError::Parse(format!("invalid JSON: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(DruckwachtError::Parse("message is not a JSON object".into()));
    };
    let Some(status) = object.get("Status") else {
        return Ok(Inbound::Other);
    };

    let payload = StatusPayload::deserialize(status)
        .map_err(|e| DruckwachtError::Parse(format!("Status member: {e}")))?;

    if let Some(temp) = payload.temp_of_hotbed {
        if !temp.is_finite() {
            return Err(DruckwachtError::Parse(format!("bed temperature {temp}")));
        }
    }

    let info = payload.print_info;
    Ok(Inbound::Status(PrinterStatus {
        state: normalize_print_status(info.status),
        machine_status: payload.current_status.first().copied(),
        print_status: Some(info.status),
        bed_temperature: payload.temp_of_hotbed,
        progress: progress_percent(info.current_ticks, info.total_ticks),
        filename: info.filename.filter(|f| !f.is_empty()),
        raw_timestamp: received_at,
    }))
}

/// Map an SDCP print status code onto the normalised state.
pub fn normalize_print_status(code: u32) -> PrinterState {
    match code {
        PRINT_IDLE => PrinterState::Idle,
        PRINT_HOMING | PRINT_DROPPING | PRINT_EXPOSING | PRINT_LIFTING | PRINT_FILE_CHECK
        | PRINT_PRINTING | PRINT_HEATING => PrinterState::Printing,
        PRINT_PAUSING | PRINT_PAUSED => PrinterState::Paused,
        PRINT_STOPPING | PRINT_STOPPED => PrinterState::Error,
        PRINT_COMPLETE => PrinterState::Complete,
        _ => PrinterState::Unknown,
    }
}

/// Job progress rounded to 5 % steps, or `None` when no job length is known.
pub fn progress_percent(current_ticks: Option<f64>, total_ticks: Option<f64>) -> Option<u8> {
    let total = total_ticks.filter(|t| t.is_finite() && *t > 0.0)?;
    let current = current_ticks.filter(|c| c.is_finite()).unwrap_or(0.0);
    let steps = ((current * 20.0) / total).round().clamp(0.0, 20.0);
    Some((steps as u8) * 5)
}

/// Console label in `Machine:PRINT` form, e.g. `Print:PAUSED`.
///
/// Some firmware sends codes outside the published tables; those are shown
/// as raw numbers.
pub fn status_label(status: &PrinterStatus) -> String {
    let machine = match status.machine_status {
        Some(0) => "Idle".to_string(),
        Some(1) => "Print".to_string(),
        Some(2) => "Upload".to_string(),
        Some(3) => "Calib".to_string(),
        Some(4) => "Test".to_string(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    };
    let print = match status.print_status {
        Some(code) => print_status_name(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_string()),
        None => status.state.as_str().to_string(),
    };
    format!("{machine}:{print}")
}

fn print_status_name(code: u32) -> Option<&'static str> {
    Some(match code {
        PRINT_IDLE => "IDLE",
        PRINT_HOMING => "HOMING",
        PRINT_DROPPING => "DROPPING",
        PRINT_EXPOSING => "EXPOSING",
        PRINT_LIFTING => "LIFTING",
        PRINT_PAUSING => "PAUSING",
        PRINT_PAUSED => "PAUSED",
        PRINT_STOPPING => "STOPPING",
        PRINT_STOPPED => "STOPPED",
        PRINT_COMPLETE => "COMPLETE",
        PRINT_FILE_CHECK => "FILECHECK",
        PRINT_PRINTING => "PRINTING",
        PRINT_HEATING => "HEATING",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCOVERY_REPLY: &str = r#"{
        "Id": "f25273b12b094c5a8b9513a30ca60049",
        "Data": {
            "Name": "Centauri Carbon",
            "MachineName": "Centauri Carbon",
            "BrandName": "ELEGOO",
            "MainboardIP": "192.168.1.50",
            "MainboardID": "000000000001d354",
            "ProtocolVersion": "V3.0.0",
            "FirmwareVersion": "V1.1.29"
        }
    }"#;

    fn status_frame(print_status: u32, bed: f64, current: f64, total: f64) -> String {
        format!(
            r#"{{"Status": {{"CurrentStatus": [1], "TempOfHotbed": {bed},
                "PrintInfo": {{"Status": {print_status}, "CurrentTicks": {current},
                "TotalTicks": {total}, "Filename": "benchy.gcode"}}}},
                "MainboardID": "000000000001d354", "TimeStamp": 1735000000,
                "Topic": "sdcp/status/000000000001d354"}}"#
        )
    }

    fn endpoint() -> PrinterEndpoint {
        parse_discovery_reply(DISCOVERY_REPLY.as_bytes(), "192.168.1.50".parse().unwrap()).unwrap()
    }

    #[test]
    fn discovery_reply_yields_endpoint() {
        let ep = endpoint();
        assert_eq!(ep.id, "f25273b12b094c5a8b9513a30ca60049");
        assert_eq!(ep.name, "Centauri Carbon");
        assert_eq!(ep.mainboard_id, "000000000001d354");
        assert_eq!(ep.protocol_version, "V3.0.0");
        assert_eq!(ep.firmware_version.as_deref(), Some("V1.1.29"));
        assert_eq!(ep.brand_name.as_deref(), Some("ELEGOO"));
    }

    #[test]
    fn mainboard_ip_overrides_datagram_source() {
        let ep =
            parse_discovery_reply(DISCOVERY_REPLY.as_bytes(), "10.9.9.9".parse().unwrap()).unwrap();
        assert_eq!(ep.address.to_string(), "192.168.1.50");
    }

    #[test]
    fn reply_without_id_is_not_sdcp() {
        let err = parse_discovery_reply(br#"{"Data": {}}"#, "10.0.0.2".parse().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("unrecognised as SDCP"));
    }

    #[test]
    fn non_json_reply_is_rejected() {
        let err = parse_discovery_reply(b"M99999", "10.0.0.2".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DruckwachtError::Parse(_)));
    }

    #[test]
    fn status_request_has_sdcp_shape() {
        let ep = endpoint();
        let text = status_request(&ep, "0123456789abcdef", 1_735_000_000).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Id"], "f25273b12b094c5a8b9513a30ca60049");
        assert_eq!(value["Data"]["Cmd"], 0);
        assert_eq!(value["Data"]["Data"], serde_json::json!({}));
        assert_eq!(value["Data"]["RequestID"], "0123456789abcdef");
        assert_eq!(value["Data"]["MainboardID"], "000000000001d354");
        assert_eq!(value["Data"]["TimeStamp"], 1_735_000_000);
        assert_eq!(value["Data"]["From"], 0);
        assert_eq!(value["Topic"], "sdcp/request/000000000001d354");
    }

    #[test]
    fn request_ids_are_sixteen_hex_chars() {
        let id = new_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_request_id());
    }

    #[test]
    fn status_frame_decodes() {
        let now = Utc::now();
        let inbound = decode_message(&status_frame(13, 59.8, 500.0, 1000.0), now).unwrap();
        let Inbound::Status(status) = inbound else {
            panic!("expected a status");
        };
        assert_eq!(status.state, PrinterState::Printing);
        assert_eq!(status.machine_status, Some(1));
        assert_eq!(status.print_status, Some(13));
        assert_eq!(status.bed_temperature, Some(59.8));
        assert_eq!(status.progress, Some(50));
        assert_eq!(status.filename.as_deref(), Some("benchy.gcode"));
        assert_eq!(status.raw_timestamp, now);
    }

    #[test]
    fn acknowledgement_is_not_a_status() {
        let ack = r#"{"Id": "x", "Data": {"Cmd": 0, "Data": {"Ack": 0}, "RequestID": "ab"},
                      "Topic": "sdcp/response/000000000001d354"}"#;
        assert_eq!(decode_message(ack, Utc::now()).unwrap(), Inbound::Other);
    }

    #[test]
    fn broken_status_member_is_a_parse_error() {
        let err = decode_message(r#"{"Status": {"PrintInfo": "nope"}}"#, Utc::now()).unwrap_err();
        assert!(matches!(err, DruckwachtError::Parse(_)));
        assert!(decode_message("not json", Utc::now()).is_err());
        assert!(decode_message("[1, 2]", Utc::now()).is_err());
    }

    #[test]
    fn print_codes_normalise() {
        assert_eq!(normalize_print_status(0), PrinterState::Idle);
        for code in [1, 2, 3, 4, 10, 13, 16] {
            assert_eq!(normalize_print_status(code), PrinterState::Printing, "code {code}");
        }
        assert_eq!(normalize_print_status(5), PrinterState::Paused);
        assert_eq!(normalize_print_status(6), PrinterState::Paused);
        assert_eq!(normalize_print_status(7), PrinterState::Error);
        assert_eq!(normalize_print_status(8), PrinterState::Error);
        assert_eq!(normalize_print_status(9), PrinterState::Complete);
        assert_eq!(normalize_print_status(42), PrinterState::Unknown);
    }

    #[test]
    fn progress_moves_in_five_percent_steps() {
        assert_eq!(progress_percent(Some(0.0), Some(1000.0)), Some(0));
        assert_eq!(progress_percent(Some(333.0), Some(1000.0)), Some(35));
        assert_eq!(progress_percent(Some(1000.0), Some(1000.0)), Some(100));
        assert_eq!(progress_percent(Some(10.0), Some(0.0)), None);
        assert_eq!(progress_percent(None, None), None);
    }

    #[test]
    fn label_uses_code_tables() {
        let Inbound::Status(status) =
            decode_message(&status_frame(6, 60.0, 1.0, 2.0), Utc::now()).unwrap()
        else {
            panic!("expected a status");
        };
        assert_eq!(status_label(&status), "Print:PAUSED");

        let mut odd = status.clone();
        odd.machine_status = Some(7);
        odd.print_status = Some(21);
        assert_eq!(status_label(&odd), "7:21");
    }
}
