//! IEC 61937 burst preamble.
//!
//! ## Layout
//!
//! Every data burst starts with four 16-bit words carried in the PCM stream as
//! little-endian samples:
//!
//! - **Pa** (0xF872) and **Pb** (0x4E1F): sync words
//! - **Pc**: burst info
//!   - `[6:0]` data type
//!   - `[7]` error flag
//!   - `[12:8]` data-type dependent info
//!   - `[15:13]` bitstream number
//! - **Pd**: payload length, in bits or bytes depending on the data type
//!
//! Bursts repeat once per encoded frame; the repetition period (in carrier
//! frames) is fixed per data type and bounds the payload length.

use std::fmt::{self, Display};
use std::io::{self, Cursor};

use bitstream_io::{BitRead, BitReader, LittleEndian};

/// First sync word of the burst preamble.
pub const PA_SYNC: u16 = 0xF872;

/// Second sync word of the burst preamble.
pub const PB_SYNC: u16 = 0x4E1F;

/// Size of the Pa/Pb sync pair in bytes.
pub const SYNC_LEN: usize = 4;

/// Size of the complete Pa..Pd preamble in bytes.
pub const PREAMBLE_LEN: usize = 8;

/// Bytes per carrier frame (2 channels of 16-bit samples).
pub const CARRIER_FRAME_BYTES: usize = 4;

/// Pc `[6:0]` data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Ac3,
    Pause,
    Mpeg1Layer1,
    Mpeg1Layer23,
    Mpeg2Ext,
    Mpeg2Aac,
    DtsType1,
    DtsType2,
    DtsType3,
    Eac3,
    TrueHd,
    Unknown(u8),
}

impl From<u8> for DataType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => DataType::Null,
            0x01 => DataType::Ac3,
            0x03 => DataType::Pause,
            0x04 => DataType::Mpeg1Layer1,
            0x05 => DataType::Mpeg1Layer23,
            0x06 => DataType::Mpeg2Ext,
            0x07 => DataType::Mpeg2Aac,
            0x0B => DataType::DtsType1,
            0x0C => DataType::DtsType2,
            0x0D => DataType::DtsType3,
            0x15 => DataType::Eac3,
            0x16 => DataType::TrueHd,
            other => DataType::Unknown(other),
        }
    }
}

/// How Pd expresses the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Bits,
    Bytes,
}

impl DataType {
    /// Burst repetition period in carrier frames, for the formats the
    /// decoder handles. `None` for padding bursts and unknown types.
    pub const fn repetition_period(self) -> Option<usize> {
        match self {
            DataType::Ac3 => Some(1536),
            DataType::Mpeg1Layer1 => Some(384),
            DataType::Mpeg1Layer23 => Some(1152),
            DataType::Mpeg2Aac => Some(1024),
            DataType::DtsType1 => Some(512),
            DataType::DtsType2 => Some(1024),
            DataType::DtsType3 => Some(2048),
            DataType::Eac3 => Some(6144),
            DataType::TrueHd => Some(15360),
            DataType::Null
            | DataType::Pause
            | DataType::Mpeg2Ext
            | DataType::Unknown(_) => None,
        }
    }

    pub const fn length_unit(self) -> LengthUnit {
        match self {
            DataType::Eac3 | DataType::TrueHd => LengthUnit::Bytes,
            _ => LengthUnit::Bits,
        }
    }

    /// Whether this is one of the compressed formats we switch to decoding for.
    pub const fn is_compressed_audio(self) -> bool {
        self.repetition_period().is_some()
    }

    /// Bytes available for payload in one logical frame, after the preamble.
    pub const fn max_payload_bytes(self) -> Option<usize> {
        match self.repetition_period() {
            Some(period) => Some(period * CARRIER_FRAME_BYTES - PREAMBLE_LEN),
            None => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Ac3 => write!(f, "AC-3"),
            DataType::Pause => write!(f, "PAUSE"),
            DataType::Mpeg1Layer1 => write!(f, "MPEG-1 Layer 1"),
            DataType::Mpeg1Layer23 => write!(f, "MPEG-1 Layer 2/3"),
            DataType::Mpeg2Ext => write!(f, "MPEG-2 extension"),
            DataType::Mpeg2Aac => write!(f, "MPEG-2 AAC"),
            DataType::DtsType1 => write!(f, "DTS type I"),
            DataType::DtsType2 => write!(f, "DTS type II"),
            DataType::DtsType3 => write!(f, "DTS type III"),
            DataType::Eac3 => write!(f, "E-AC-3"),
            DataType::TrueHd => write!(f, "TrueHD"),
            DataType::Unknown(code) => write!(f, "unknown ({code:#04X})"),
        }
    }
}

/// Reasons a sync hit is not accepted as compressed audio.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstIssue {
    #[error("data type {0} is not a compressed format of interest")]
    UnsupportedDataType(DataType),

    #[error("zero-length burst")]
    EmptyPayload,

    #[error("burst length {length} bytes exceeds the {max} bytes left in the frame")]
    PayloadTooLong { length: usize, max: usize },
}

/// Parsed Pa..Pd preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstPreamble {
    pub data_type: DataType,
    pub error: bool,
    pub info: u8,
    pub stream_number: u8,
    pub length_code: u16,
}

impl BurstPreamble {
    /// Whether `bytes` starts with the Pa/Pb sync pair.
    #[inline]
    pub fn is_sync(bytes: &[u8]) -> bool {
        bytes.len() >= SYNC_LEN
            && u16::from_le_bytes([bytes[0], bytes[1]]) == PA_SYNC
            && u16::from_le_bytes([bytes[2], bytes[3]]) == PB_SYNC
    }

    /// Parses a preamble starting at `bytes[0]`. Returns `None` when the sync
    /// words are absent or fewer than [`PREAMBLE_LEN`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PREAMBLE_LEN || !Self::is_sync(bytes) {
            return None;
        }
        Self::read_burst_info(&bytes[SYNC_LEN..PREAMBLE_LEN]).ok()
    }

    fn read_burst_info(pc_pd: &[u8]) -> io::Result<Self> {
        let mut reader = BitReader::<_, LittleEndian>::new(Cursor::new(pc_pd));

        let data_type: u8 = reader.read_unsigned_var(7)?;
        let error = reader.read_bit()?;
        let info: u8 = reader.read_unsigned_var(5)?;
        let stream_number: u8 = reader.read_unsigned_var(3)?;
        let length_code: u16 = reader.read_unsigned_var(16)?;

        Ok(Self {
            data_type: data_type.into(),
            error,
            info,
            stream_number,
            length_code,
        })
    }

    /// Payload length in bytes, rounded up for bit-counted types.
    pub fn payload_bytes(&self) -> usize {
        match self.data_type.length_unit() {
            LengthUnit::Bits => (self.length_code as usize).div_ceil(8),
            LengthUnit::Bytes => self.length_code as usize,
        }
    }

    /// Checks the burst info for plausibility.
    pub fn validate(&self) -> Result<(), BurstIssue> {
        let Some(max) = self.data_type.max_payload_bytes() else {
            return Err(BurstIssue::UnsupportedDataType(self.data_type));
        };

        let length = self.payload_bytes();
        if length == 0 {
            return Err(BurstIssue::EmptyPayload);
        }
        if length > max {
            return Err(BurstIssue::PayloadTooLong { length, max });
        }

        Ok(())
    }

    /// Serializes the preamble back into carrier byte order.
    pub fn to_bytes(&self) -> [u8; PREAMBLE_LEN] {
        let pc = (self.data_type_code() as u16 & 0x7F)
            | (u16::from(self.error) << 7)
            | ((self.info as u16 & 0x1F) << 8)
            | ((self.stream_number as u16 & 0x07) << 13);

        let mut out = [0u8; PREAMBLE_LEN];
        out[0..2].copy_from_slice(&PA_SYNC.to_le_bytes());
        out[2..4].copy_from_slice(&PB_SYNC.to_le_bytes());
        out[4..6].copy_from_slice(&pc.to_le_bytes());
        out[6..8].copy_from_slice(&self.length_code.to_le_bytes());
        out
    }

    fn data_type_code(&self) -> u8 {
        match self.data_type {
            DataType::Null => 0x00,
            DataType::Ac3 => 0x01,
            DataType::Pause => 0x03,
            DataType::Mpeg1Layer1 => 0x04,
            DataType::Mpeg1Layer23 => 0x05,
            DataType::Mpeg2Ext => 0x06,
            DataType::Mpeg2Aac => 0x07,
            DataType::DtsType1 => 0x0B,
            DataType::DtsType2 => 0x0C,
            DataType::DtsType3 => 0x0D,
            DataType::Eac3 => 0x15,
            DataType::TrueHd => 0x16,
            DataType::Unknown(code) => code,
        }
    }
}

impl Display for BurstPreamble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} burst, {} bytes", self.data_type, self.payload_bytes())?;
        if self.stream_number != 0 {
            write!(f, ", stream {}", self.stream_number)?;
        }
        if self.error {
            write!(f, ", error flag set")?;
        }
        Ok(())
    }
}
