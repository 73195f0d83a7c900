use super::codec::PayloadCursor;
use super::Error;
use encoding_rs::WINDOWS_1252;
use std::fmt::Write;

/// control message subtypes (MTIN values with MSTP = control)
pub const CONTROL_REQUEST: u8 = 1;
pub const CONTROL_RESPONSE: u8 = 2;
pub const CONTROL_TIME: u8 = 3;

pub const SERVICE_ID_SET_LOG_LEVEL: u32 = 1;
pub const SERVICE_ID_GET_LOG_INFO: u32 = 3;
pub const SERVICE_ID_GET_SOFTWARE_VERSION: u32 = 19;
pub const SERVICE_ID_MESSAGE_BUFFER_OVERFLOW: u32 = 20;

// user services as from dlt-daemon; outside the base name table
pub const SERVICE_ID_UNREGISTER_CONTEXT: u32 = 0xF01;
pub const SERVICE_ID_CONNECTION_INFO: u32 = 0xF02;
pub const SERVICE_ID_TIMEZONE: u32 = 0xF03;
pub const SERVICE_ID_MARKER: u32 = 0xF04;
pub const SERVICE_ID_CALLSW_CINJECTION: u32 = 0xFFF;

/// names of the base services 1..=20
static SERVICE_NAME_STRS: [&str; 21] = [
    "",
    "set_log_level",
    "set_trace_status",
    "get_log_info",
    "get_default_log_level",
    "store_config",
    "reset_to_factory_default",
    "set_com_interface_status",
    "set_com_interface_max_bandwidth",
    "set_verbose_mode",
    "set_message_filtering",
    "set_timing_packets",
    "get_local_time",
    "use_ecu_id",
    "use_session_id",
    "use_timestamp",
    "use_extended_header",
    "set_default_log_level",
    "set_default_trace_status",
    "get_software_version",
    "message_buffer_overflow",
];

static CTRL_RETURN_STRS: [&str; 9] = [
    "ok",
    "not_supported",
    "error",
    "3",
    "4",
    "5",
    "6",
    "7",
    "no_matching_context_id",
];

fn append_service_name(text: &mut String, id: u32) -> Result<(), Error> {
    match SERVICE_NAME_STRS.get(id as usize) {
        Some(name) if id > 0 => text.push_str(name),
        _ => write!(text, "service({})", id)?,
    }
    Ok(())
}

fn return_name(code: u8) -> Result<&'static str, Error> {
    CTRL_RETURN_STRS
        .get(code as usize)
        .copied()
        .ok_or_else(|| Error::invalid(format!("invalid control return code {}", code)))
}

fn connection_state_str(state: u8) -> &'static str {
    match state {
        1 => "disconnected",
        2 => "connected",
        _ => "unknown",
    }
}

/// Render a non-verbose control request/response into `text`.
///
/// The service id honors the record endianness; the per-service fields
/// after it are read host-endian, as the wire format of dlt-daemon has
/// them.
pub(crate) fn append_control(
    text: &mut String,
    payload: &[u8],
    big_endian: bool,
    subtype: u8,
) -> Result<(), Error> {
    let mut cur = PayloadCursor::new(payload);
    let service_id: u32 = cur.extract(big_endian)?;

    if subtype != CONTROL_RESPONSE {
        text.push('[');
        append_service_name(text, service_id)?;
        text.push(']');
        return Ok(());
    }

    let return_code: u8 = cur.extract(false)?;
    if service_id == SERVICE_ID_MARKER {
        text.push_str("MARKER");
        return Ok(());
    }

    text.push('[');
    append_service_name(text, service_id)?;
    write!(text, " {}] ", return_name(return_code)?)?;

    match service_id {
        SERVICE_ID_GET_SOFTWARE_VERSION => {
            let sw_len: u32 = cur.extract(false)?;
            let raw = cur.take(sw_len as usize)?;
            let (sw, _) = WINDOWS_1252.decode_without_bom_handling(raw);
            text.push_str(&sw);
        }
        SERVICE_ID_CONNECTION_INFO => {
            let state: u8 = cur.extract(false)?;
            let comid = cur.take(4)?;
            let (comid, _) = WINDOWS_1252.decode_without_bom_handling(comid);
            // dlt-viewer conformance: the service header is replaced
            text.clear();
            write!(text, "{} ", connection_state_str(state))?;
            text.push_str(&comid);
        }
        SERVICE_ID_TIMEZONE => {
            // dlt-viewer conformance: the header is replaced by the raw offset
            let timezone: u32 = cur.extract(false)?;
            text.clear();
            write!(text, "{}", timezone)?;
            if cur.extract_bool()? {
                text.push_str("DST");
            }
        }
        _ => {} // no additional payload rendering for the remaining services
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(payload: &[u8], big_endian: bool, subtype: u8) -> Result<String, Error> {
        let mut text = String::new();
        append_control(&mut text, payload, big_endian, subtype)?;
        Ok(text)
    }

    fn response(service_id: u32, return_code: u8, tail: &[u8]) -> Vec<u8> {
        let mut v = service_id.to_le_bytes().to_vec();
        v.push(return_code);
        v.extend_from_slice(tail);
        v
    }

    #[test]
    fn marker_response() {
        let payload = response(SERVICE_ID_MARKER, 0, &[]);
        assert_eq!(render(&payload, false, CONTROL_RESPONSE).unwrap(), "MARKER");
    }

    #[test]
    fn marker_request_renders_extended_id() {
        let payload = SERVICE_ID_MARKER.to_le_bytes();
        assert_eq!(
            render(&payload, false, CONTROL_REQUEST).unwrap(),
            "[service(3844)]"
        );
    }

    #[test]
    fn request_with_base_name() {
        let payload = SERVICE_ID_SET_LOG_LEVEL.to_le_bytes();
        assert_eq!(
            render(&payload, false, CONTROL_REQUEST).unwrap(),
            "[set_log_level]"
        );
    }

    #[test]
    fn request_with_unknown_id() {
        let payload = 0u32.to_le_bytes();
        assert_eq!(
            render(&payload, false, CONTROL_REQUEST).unwrap(),
            "[service(0)]"
        );
        let payload = 21u32.to_le_bytes();
        assert_eq!(
            render(&payload, false, CONTROL_REQUEST).unwrap(),
            "[service(21)]"
        );
    }

    #[test]
    fn service_id_honors_record_endianness() {
        let mut payload = SERVICE_ID_GET_LOG_INFO.to_be_bytes().to_vec();
        payload.push(0);
        assert_eq!(
            render(&payload, true, CONTROL_RESPONSE).unwrap(),
            "[get_log_info ok] "
        );
    }

    #[test]
    fn response_return_codes() {
        let payload = response(SERVICE_ID_SET_LOG_LEVEL, 1, &[]);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "[set_log_level not_supported] "
        );
        let payload = response(SERVICE_ID_SET_LOG_LEVEL, 8, &[]);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "[set_log_level no_matching_context_id] "
        );
    }

    #[test]
    fn invalid_return_code() {
        let payload = response(SERVICE_ID_SET_LOG_LEVEL, 9, &[]);
        let err = render(&payload, false, CONTROL_RESPONSE).unwrap_err();
        assert!(err.to_string().contains("invalid control return code"));
    }

    #[test]
    fn software_version_tail() {
        let mut tail = 5u32.to_le_bytes().to_vec();
        tail.extend_from_slice(b"R1.23");
        let payload = response(SERVICE_ID_GET_SOFTWARE_VERSION, 0, &tail);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "[get_software_version ok] R1.23"
        );
    }

    #[test]
    fn software_version_length_beyond_payload() {
        let tail = 99u32.to_le_bytes();
        let payload = response(SERVICE_ID_GET_SOFTWARE_VERSION, 0, &tail);
        assert!(render(&payload, false, CONTROL_RESPONSE).is_err());
    }

    #[test]
    fn connection_info_replaces_header() {
        let mut tail = vec![2u8];
        tail.extend_from_slice(b"COMI");
        let payload = response(SERVICE_ID_CONNECTION_INFO, 0, &tail);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "connected COMI"
        );
        let mut tail = vec![1u8];
        tail.extend_from_slice(b"COMI");
        let payload = response(SERVICE_ID_CONNECTION_INFO, 0, &tail);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "disconnected COMI"
        );
        let mut tail = vec![7u8];
        tail.extend_from_slice(b"COMI");
        let payload = response(SERVICE_ID_CONNECTION_INFO, 0, &tail);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "unknown COMI"
        );
    }

    #[test]
    fn timezone_replaces_header_and_appends_dst() {
        let mut tail = 3600u32.to_le_bytes().to_vec();
        tail.push(1);
        let payload = response(SERVICE_ID_TIMEZONE, 0, &tail);
        assert_eq!(
            render(&payload, false, CONTROL_RESPONSE).unwrap(),
            "3600DST"
        );

        let mut tail = 7200u32.to_le_bytes().to_vec();
        tail.push(0);
        let payload = response(SERVICE_ID_TIMEZONE, 0, &tail);
        assert_eq!(render(&payload, false, CONTROL_RESPONSE).unwrap(), "7200");
    }

    #[test]
    fn response_without_return_code_fails() {
        let payload = SERVICE_ID_SET_LOG_LEVEL.to_le_bytes();
        assert!(render(&payload, false, CONTROL_RESPONSE).is_err());
    }

    #[test]
    fn time_subtype_uses_request_template() {
        let payload = 12u32.to_le_bytes(); // get_local_time
        assert_eq!(
            render(&payload, false, CONTROL_TIME).unwrap(),
            "[get_local_time]"
        );
    }
}
