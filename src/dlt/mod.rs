pub mod args;
pub(crate) mod codec;
pub mod control;

use crate::source::ByteSource;
use crate::utils::US_PER_SEC;
use codec::PayloadCursor;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::borrow::Cow;
use std::fmt::{self, Write};

// MARK: Id4

/// A 4-byte DLT identifier (ECU / application / context id).
///
/// Logically a 1-4 character printable tag padded with zero bytes. No
/// conversion is done at construction; invalid data is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Id4 {
    bytes: [u8; 4],
}

impl Id4 {
    pub fn from_buf(buf: &[u8]) -> Id4 {
        assert_eq!(
            4,
            buf.len(),
            "Id4::from_buf with invalid buf len {} called",
            buf.len()
        );
        Id4 {
            bytes: [buf[0], buf[1], buf[2], buf[3]],
        }
    }

    pub fn as_buf(&self) -> &[u8; 4] {
        &self.bytes
    }

    /// The tag with trailing zero bytes trimmed.
    ///
    /// The length is determined scanning from byte 3 down to the first
    /// non-zero byte, so embedded zeros survive ("A\0B\0" has length 3).
    /// An all-zero id is empty.
    pub fn as_text(&self) -> Cow<'_, str> {
        let b = &self.bytes;
        let len = if b[3] != 0 {
            4
        } else if b[2] != 0 {
            3
        } else if b[1] != 0 {
            2
        } else if b[0] != 0 {
            1
        } else {
            0
        };
        String::from_utf8_lossy(&b[..len])
    }
}

impl fmt::Display for Id4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.as_text()) // handles width, fill/align and precision
    }
}

impl Serialize for Id4 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_text())
    }
}

// MARK: headers

pub const DLT_STORAGE_HEADER_PATTERN: u32 = 0x01544c44; // DLT\x01
pub const DLT_STORAGE_HEADER_SIZE: usize = 16; // DLT\x01 + secs, micros, ecu
pub const DLT_MIN_STD_HEADER_SIZE: usize = 4;
pub const DLT_EXT_HEADER_SIZE: usize = 10;

// dlt standard header htyp bitfield:
pub const DLT_HTYP_UEH: u8 = 0x01; // use extended header
pub const DLT_HTYP_MSBF: u8 = 0x02; // payload MSB first
pub const DLT_HTYP_WEID: u8 = 0x04; // with ECU id
pub const DLT_HTYP_WSID: u8 = 0x08; // with session id
pub const DLT_HTYP_WTMS: u8 = 0x10; // with timestamp

/// File storage header preceding every stored DLT message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageHeader {
    /// seconds since 1.1.1970
    pub secs: u32,
    pub micros: u32,
    /// the ECU id, if it is not already in the DLT message itself
    pub ecu: Id4,
}

impl StorageHeader {
    pub fn reception_time_us(&self) -> u64 {
        self.secs as u64 * US_PER_SEC + self.micros as u64
    }
}

/// Standard header present in each DLT message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StandardHeader {
    pub htyp: u8,
    /// increased with each sent DLT message
    pub mcnt: u8,
    /// length of the complete message, without storage header
    pub len: u16,
}

impl StandardHeader {
    #[inline(always)]
    pub fn has_ext_hdr(&self) -> bool {
        (self.htyp & DLT_HTYP_UEH) > 0
    }

    #[inline(always)]
    pub fn is_big_endian(&self) -> bool {
        (self.htyp & DLT_HTYP_MSBF) > 0
    }

    #[inline(always)]
    pub fn has_ecu_id(&self) -> bool {
        (self.htyp & DLT_HTYP_WEID) > 0
    }

    #[inline(always)]
    pub fn has_session_id(&self) -> bool {
        (self.htyp & DLT_HTYP_WSID) > 0
    }

    #[inline(always)]
    pub fn has_timestamp(&self) -> bool {
        (self.htyp & DLT_HTYP_WTMS) > 0
    }
}

/// Optional standard header extras, each present iff enabled in htyp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderExtra {
    pub ecu: Id4,
    /// session number
    pub seid: u32,
    /// timestamp since system start in 0.1 milliseconds
    pub tmsp: u32,
}

/// Extended header, only present if enabled in htyp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    /// message info
    pub msin: u8,
    /// number of arguments
    pub noar: u8,
    pub apid: Id4,
    pub ctid: Id4,
}

impl ExtendedHeader {
    #[inline(always)]
    pub fn is_verbose(&self) -> bool {
        self.msin & 0x01 == 0x01
    }

    /// message type, 3-bit MSTP subfield
    #[inline(always)]
    pub fn mstp(&self) -> u8 {
        (self.msin >> 1) & 0x07
    }

    /// message type info, 4-bit MTIN subfield
    #[inline(always)]
    pub fn mtin(&self) -> u8 {
        (self.msin >> 4) & 0x0f
    }
}

// MARK: message kinds

/// Verbosity mode of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum Mode {
    #[default]
    NonVerbose = 0,
    Verbose = 1,
}

/// Message type from the MSTP subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum MessageType {
    Log = 0,
    AppTrace = 1,
    NwTrace = 2,
    Control = 3,
}

impl MessageType {
    fn from_mstp(mstp: u8) -> Option<MessageType> {
        match mstp {
            0 => Some(MessageType::Log),
            1 => Some(MessageType::AppTrace),
            2 => Some(MessageType::NwTrace),
            3 => Some(MessageType::Control),
            _ => None,
        }
    }
}

/// Value of [`Record::type_code`] / [`Record::subtype`] for records
/// without an extended header.
pub const TYPE_UNKNOWN: i8 = -2;

// MARK: Record

/// One parsed DLT message, or a corrupted placeholder marking a
/// resynchronization boundary.
///
/// Records are immutable once emitted. A corrupted record carries no valid
/// headers or message; only [`Record::corruption_cause`] is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    corruption_cause: Option<String>,
    storage: StorageHeader,
    standard: StandardHeader,
    extra: HeaderExtra,
    extended: Option<ExtendedHeader>,
    big_endian: bool,
    mode: Mode,
    msg_type: Option<MessageType>,
    subtype: Option<u8>,
    message: String,
}

impl Record {
    /// Parse exactly one record from the source.
    ///
    /// On failure the source is left wherever the failing read stopped;
    /// the caller decides whether to resynchronize.
    pub fn parse(source: &mut ByteSource) -> Result<Record, Error> {
        let pattern = u32::from_le_bytes(source.read(4)?.try_into().unwrap());
        if pattern != DLT_STORAGE_HEADER_PATTERN {
            return Err(Error::invalid("invalid DLT signature"));
        }
        let storage = StorageHeader {
            secs: u32::from_le_bytes(source.read(4)?.try_into().unwrap()),
            micros: u32::from_le_bytes(source.read(4)?.try_into().unwrap()),
            ecu: Id4::from_buf(source.read(4)?),
        };

        let head = source.read(DLT_MIN_STD_HEADER_SIZE)?;
        let standard = StandardHeader {
            htyp: head[0],
            mcnt: head[1],
            // big endian on the wire regardless of MSBF
            len: u16::from_be_bytes([head[2], head[3]]),
        };
        let big_endian = standard.is_big_endian();
        let mut consumed = DLT_MIN_STD_HEADER_SIZE;

        let mut extra = HeaderExtra::default();
        if standard.has_ecu_id() {
            extra.ecu = Id4::from_buf(source.read(4)?);
            consumed += 4;
        }
        if standard.has_session_id() {
            extra.seid = u32::from_be_bytes(source.read(4)?.try_into().unwrap());
            consumed += 4;
        }
        if standard.has_timestamp() {
            extra.tmsp = u32::from_be_bytes(source.read(4)?.try_into().unwrap());
            consumed += 4;
        }

        let mut extended = None;
        let mut mode = Mode::NonVerbose;
        let mut msg_type = None;
        let mut subtype = None;
        if standard.has_ext_hdr() {
            let buf = source.read(DLT_EXT_HEADER_SIZE)?;
            let eh = ExtendedHeader {
                msin: buf[0],
                noar: buf[1],
                apid: Id4::from_buf(&buf[2..6]),
                ctid: Id4::from_buf(&buf[6..10]),
            };
            if eh.is_verbose() {
                mode = Mode::Verbose;
            }
            msg_type = Some(
                MessageType::from_mstp(eh.mstp())
                    .ok_or_else(|| Error::invalid(format!("unknown message type {}", eh.mstp())))?,
            );
            subtype = Some(eh.mtin());
            extended = Some(eh);
            consumed += DLT_EXT_HEADER_SIZE;
        }

        let body_len = (standard.len as usize)
            .checked_sub(consumed)
            .ok_or_else(|| Error::invalid("declared length does not cover the headers"))?;
        let body = source.read(body_len)?;

        let noar = extended.as_ref().map(|e| e.noar).unwrap_or(0);
        let message = assemble_message(body, big_endian, mode, msg_type, subtype, noar)?;

        Ok(Record {
            corruption_cause: None,
            storage,
            standard,
            extra,
            extended,
            big_endian,
            mode,
            msg_type,
            subtype,
            message,
        })
    }

    /// placeholder marking a resynchronization boundary
    pub(crate) fn corrupted(cause: String) -> Record {
        Record {
            corruption_cause: Some(cause),
            ..Default::default()
        }
    }

    pub fn is_corrupted(&self) -> bool {
        self.corruption_cause.is_some()
    }

    pub fn corruption_cause(&self) -> Option<&str> {
        self.corruption_cause.as_deref()
    }

    /// the formatted payload text
    pub fn message(&self) -> &str {
        &self.message
    }

    /// the ECU id from the storage header
    pub fn ecu(&self) -> Cow<'_, str> {
        self.storage.ecu.as_text()
    }

    /// the ECU id override from the standard header extras, empty if absent
    pub fn ecu_override(&self) -> Cow<'_, str> {
        self.extra.ecu.as_text()
    }

    pub fn apid(&self) -> Cow<'_, str> {
        match &self.extended {
            Some(e) => e.apid.as_text(),
            None => Cow::Borrowed(""),
        }
    }

    pub fn ctid(&self) -> Cow<'_, str> {
        match &self.extended {
            Some(e) => e.ctid.as_text(),
            None => Cow::Borrowed(""),
        }
    }

    /// reception time from the storage header in microseconds since the epoch
    pub fn timestamp(&self) -> u64 {
        self.storage.reception_time_us()
    }

    /// monotonic timestamp tick in 0.1 milliseconds, 0 if absent
    pub fn timestamp_extra(&self) -> u32 {
        self.extra.tmsp
    }

    pub fn session_id(&self) -> u32 {
        self.extra.seid
    }

    pub fn message_counter(&self) -> u8 {
        self.standard.mcnt
    }

    /// message type (0..=3), [`TYPE_UNKNOWN`] without extended header
    pub fn type_code(&self) -> i8 {
        self.msg_type.map(|t| t as i8).unwrap_or(TYPE_UNKNOWN)
    }

    /// message subtype (MTIN), [`TYPE_UNKNOWN`] without extended header
    pub fn subtype(&self) -> i8 {
        self.subtype.map(|s| s as i8).unwrap_or(TYPE_UNKNOWN)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.msg_type
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// number of arguments from the extended header, 0 if absent
    pub fn noar(&self) -> u8 {
        self.extended.as_ref().map(|e| e.noar).unwrap_or(0)
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("Record", 12)?;
        s.serialize_field("corrupted", &self.is_corrupted())?;
        s.serialize_field("corruption_cause", &self.corruption_cause)?;
        s.serialize_field("ecu", &self.ecu())?;
        s.serialize_field("apid", &self.apid())?;
        s.serialize_field("ctid", &self.ctid())?;
        s.serialize_field("timestamp_us", &self.timestamp())?;
        s.serialize_field("timestamp_extra", &self.timestamp_extra())?;
        s.serialize_field("session_id", &self.session_id())?;
        s.serialize_field("mcnt", &self.message_counter())?;
        s.serialize_field("mstp", &self.type_code())?;
        s.serialize_field("mtin", &self.subtype())?;
        s.serialize_field("message", &self.message())?;
        s.end()
    }
}

/// render the message body depending on type and mode
fn assemble_message(
    body: &[u8],
    big_endian: bool,
    mode: Mode,
    msg_type: Option<MessageType>,
    subtype: Option<u8>,
    noar: u8,
) -> Result<String, Error> {
    let mut text = String::with_capacity(64);
    if msg_type == Some(MessageType::Control) {
        if mode == Mode::Verbose {
            return Err(Error::invalid("verbose control messages are not supported"));
        }
        control::append_control(&mut text, body, big_endian, subtype.unwrap_or(0))?;
    } else if mode == Mode::Verbose {
        if noar > 0 {
            args::append_args(&mut text, body, noar, big_endian)?;
        }
    } else {
        // non-verbose log/trace: the payload is keyed by a message id
        let id: u32 = PayloadCursor::new(body).extract(false)?;
        write!(text, "[{}]", id)?;
    }
    Ok(text)
}

// MARK: Error

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// ill-formed data; the caller may resynchronize on the next byte
    InvalidData(String),
    /// the stream ended in the middle of a record
    Truncated(String),
    /// clean end of stream
    Eof,
    /// any non-parse failure; terminates the whole run
    Fatal(String),
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn invalid(desc: impl Into<String>) -> Error {
        Error::new(ErrorKind::InvalidData(desc.into()))
    }

    pub(crate) fn truncated(desc: impl Into<String>) -> Error {
        Error::new(ErrorKind::Truncated(desc.into()))
    }

    pub(crate) fn fatal(desc: impl Into<String>) -> Error {
        Error::new(ErrorKind::Fatal(desc.into()))
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::InvalidData(ref desc) => {
                write!(f, "invalid data - {}", desc)
            }
            ErrorKind::Truncated(ref desc) => {
                write!(f, "truncated data - {}", desc)
            }
            ErrorKind::Eof => {
                write!(f, "end of stream")
            }
            ErrorKind::Fatal(ref desc) => {
                write!(f, "fatal error - {}", desc)
            }
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Error {
        Error::fatal("message formatting failed")
    }
}
