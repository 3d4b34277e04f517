//! # fdw-proto
//!
//! Binary wire protocol shared by the FDW coordinator and its nodes.
//!
//! These types are used by:
//! - `backend`: decoding telemetry from body-worn nodes, encoding alerts back
//! - `tools/sim-node`: producing telemetry frames, decoding alert frames
//!
//! ## Frame layout
//!
//! Both message families share a 4-byte header: magic `"FD"`, version (u8),
//! msg_type (u8). All integer fields are little-endian. Every frame ends with
//! a CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no xor-out)
//! computed over all preceding bytes.
//!
//! ```text
//! telemetry v1 (32 B): hdr | id u8 | seq u16 | ts u32 | yaw/pitch/roll i16 (cd)
//!                      | quality u8 | pos_x/pos_y i32 (cm) | pos_quality u8
//!                      | battery u16 (mV) | flags u8 | crc u16
//! telemetry v2 (45 B): v1 body | lat/lon i32 (1e-7 deg) | alt i32 (cm)
//!                      | gps_quality u8 | crc u16
//! alert       (11 B): hdr | id u8 | on u8 | intensity u8 | hold u16 (ms) | crc u16
//! ```
//!
//! Orientation serializes as centidegrees clamped to i16; quality fields clamp
//! to 0..=100. Clamping at the encode boundary is silent. GPS fields surface
//! as absent when `gps_quality == 0`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Constants ─────────────────────────────────────────────────────────────────

pub const MAGIC: [u8; 2] = *b"FD";
pub const VERSION_V1: u8 = 1;
pub const VERSION_V2: u8 = 2;
pub const MSG_TELEMETRY: u8 = 1;
pub const MSG_ALERT: u8 = 2;

/// Fixed frame sizes, header and CRC included.
pub const TELEMETRY_V1_SIZE: usize = 32;
pub const TELEMETRY_V2_SIZE: usize = 45;
pub const ALERT_SIZE: usize = 11;

const HEADER_SIZE: usize = 4;
const CRC_SIZE: usize = 2;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Closed set of decode failures. Encoding never fails; out-of-range values
/// are clamped at the boundary instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },
    #[error("bad magic")]
    BadMagic,
    #[error("bad message type: {got}")]
    BadType { got: u8 },
    #[error("unsupported version: {got}")]
    BadVersion { got: u8 },
    #[error("size mismatch: got {got}, want {want}")]
    SizeMismatch { got: usize, want: usize },
    #[error("crc mismatch: got {got:#06x}, want {want:#06x}")]
    BadCrc { got: u16, want: u16 },
}

// ── CRC-16/CCITT-FALSE ────────────────────────────────────────────────────────

/// Poly 0x1021, init 0xFFFF, no reflection, no xor-out.
/// Check value: crc16("123456789") == 0x29B1.
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ── Packets ───────────────────────────────────────────────────────────────────

/// One telemetry report from a node. Angles in degrees, positions in
/// centimeters as reported on the wire, GPS in degrees / meters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPacket {
    pub player_id: u8,
    pub seq: u16,
    pub timestamp_ms: u32,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    /// Self-reported orientation confidence, 0..=100
    pub quality: u8,
    pub pos_x_cm: i32,
    pub pos_y_cm: i32,
    /// Per-reading position confidence, 0..=100; 0 means no position
    pub pos_quality: u8,
    pub battery_mv: u16,
    pub flags: u8,
    /// GPS fix (v2 frames only); absent when `gps_quality == 0`
    pub gps_lat_deg: Option<f64>,
    pub gps_lon_deg: Option<f64>,
    pub gps_alt_m: Option<f64>,
    pub gps_quality: u8,
}

impl TelemetryPacket {
    /// True when the packet carries a usable latitude+longitude pair,
    /// which forces v2 encoding.
    pub fn has_gps_fix(&self) -> bool {
        self.gps_lat_deg.is_some() && self.gps_lon_deg.is_some()
    }
}

/// Alert datagram sent back to the originating node. Always version 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPacket {
    pub player_id: u8,
    pub alert_on: bool,
    pub intensity: u8,
    pub hold_ms: u16,
}

// ── Encode ────────────────────────────────────────────────────────────────────

fn centideg(value_deg: f64) -> i16 {
    let scaled = (value_deg * 100.0).round();
    scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn clamp_quality(q: u8) -> u8 {
    q.min(100)
}

fn scale_i32(value: f64, factor: f64) -> i32 {
    let scaled = (value * factor).round();
    scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

fn finish_frame(mut buf: Vec<u8>) -> Vec<u8> {
    let crc = crc16_ccitt_false(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

fn push_telemetry_body(buf: &mut Vec<u8>, pkt: &TelemetryPacket, version: u8) {
    buf.extend_from_slice(&MAGIC);
    buf.push(version);
    buf.push(MSG_TELEMETRY);
    buf.push(pkt.player_id);
    buf.extend_from_slice(&pkt.seq.to_le_bytes());
    buf.extend_from_slice(&pkt.timestamp_ms.to_le_bytes());
    buf.extend_from_slice(&centideg(pkt.yaw_deg).to_le_bytes());
    buf.extend_from_slice(&centideg(pkt.pitch_deg).to_le_bytes());
    buf.extend_from_slice(&centideg(pkt.roll_deg).to_le_bytes());
    buf.push(clamp_quality(pkt.quality));
    buf.extend_from_slice(&pkt.pos_x_cm.to_le_bytes());
    buf.extend_from_slice(&pkt.pos_y_cm.to_le_bytes());
    buf.push(clamp_quality(pkt.pos_quality));
    buf.extend_from_slice(&pkt.battery_mv.to_le_bytes());
    buf.push(pkt.flags);
}

/// Encode as v2 when the packet carries a GPS latitude+longitude, else v1.
pub fn encode_telemetry(pkt: &TelemetryPacket) -> Vec<u8> {
    if pkt.has_gps_fix() {
        encode_telemetry_v2(pkt)
    } else {
        encode_telemetry_v1(pkt)
    }
}

pub fn encode_telemetry_v1(pkt: &TelemetryPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TELEMETRY_V1_SIZE);
    push_telemetry_body(&mut buf, pkt, VERSION_V1);
    finish_frame(buf)
}

/// Force a v2 frame; an absent GPS fix encodes as zeros with quality 0.
pub fn encode_telemetry_v2(pkt: &TelemetryPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TELEMETRY_V2_SIZE);
    push_telemetry_body(&mut buf, pkt, VERSION_V2);
    buf.extend_from_slice(&scale_i32(pkt.gps_lat_deg.unwrap_or(0.0), 1e7).to_le_bytes());
    buf.extend_from_slice(&scale_i32(pkt.gps_lon_deg.unwrap_or(0.0), 1e7).to_le_bytes());
    buf.extend_from_slice(&scale_i32(pkt.gps_alt_m.unwrap_or(0.0), 100.0).to_le_bytes());
    buf.push(clamp_quality(pkt.gps_quality));
    finish_frame(buf)
}

pub fn encode_alert(pkt: &AlertPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ALERT_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION_V1);
    buf.push(MSG_ALERT);
    buf.push(pkt.player_id);
    buf.push(pkt.alert_on as u8);
    buf.push(pkt.intensity);
    buf.extend_from_slice(&pkt.hold_ms.to_le_bytes());
    finish_frame(buf)
}

// ── Decode ────────────────────────────────────────────────────────────────────

/// Fixed-offset reads over a frame whose exact size was checked up front.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(bytes)
    }

    fn i16(&mut self) -> i16 {
        self.u16() as i16
    }

    fn i32(&mut self) -> i32 {
        self.u32() as i32
    }
}

/// Validate header magic and msg_type, returning the declared version.
fn check_header(data: &[u8], want_type: u8) -> Result<u8, PacketError> {
    if data.len() < HEADER_SIZE {
        return Err(PacketError::TooShort { len: data.len() });
    }
    if data[0..2] != MAGIC {
        return Err(PacketError::BadMagic);
    }
    let msg_type = data[3];
    if msg_type != want_type {
        return Err(PacketError::BadType { got: msg_type });
    }
    Ok(data[2])
}

fn check_crc(data: &[u8]) -> Result<(), PacketError> {
    let body = &data[..data.len() - CRC_SIZE];
    let got = u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]]);
    let want = crc16_ccitt_false(body);
    if got != want {
        return Err(PacketError::BadCrc { got, want });
    }
    Ok(())
}

pub fn decode_telemetry(data: &[u8]) -> Result<TelemetryPacket, PacketError> {
    let version = check_header(data, MSG_TELEMETRY)?;
    let want = match version {
        VERSION_V1 => TELEMETRY_V1_SIZE,
        VERSION_V2 => TELEMETRY_V2_SIZE,
        other => return Err(PacketError::BadVersion { got: other }),
    };
    if data.len() != want {
        return Err(PacketError::SizeMismatch { got: data.len(), want });
    }
    check_crc(data)?;

    let mut r = Reader::new(data, HEADER_SIZE);
    let mut pkt = TelemetryPacket {
        player_id: r.u8(),
        seq: r.u16(),
        timestamp_ms: r.u32(),
        yaw_deg: r.i16() as f64 / 100.0,
        pitch_deg: r.i16() as f64 / 100.0,
        roll_deg: r.i16() as f64 / 100.0,
        quality: r.u8(),
        pos_x_cm: r.i32(),
        pos_y_cm: r.i32(),
        pos_quality: r.u8(),
        battery_mv: r.u16(),
        flags: r.u8(),
        gps_lat_deg: None,
        gps_lon_deg: None,
        gps_alt_m: None,
        gps_quality: 0,
    };

    if version == VERSION_V2 {
        let lat_e7 = r.i32();
        let lon_e7 = r.i32();
        let alt_cm = r.i32();
        let gps_quality = r.u8();
        pkt.gps_quality = gps_quality;
        if gps_quality > 0 {
            pkt.gps_lat_deg = Some(lat_e7 as f64 / 1e7);
            pkt.gps_lon_deg = Some(lon_e7 as f64 / 1e7);
            pkt.gps_alt_m = Some(alt_cm as f64 / 100.0);
        }
    }

    Ok(pkt)
}

pub fn decode_alert(data: &[u8]) -> Result<AlertPacket, PacketError> {
    let version = check_header(data, MSG_ALERT)?;
    if version != VERSION_V1 {
        return Err(PacketError::BadVersion { got: version });
    }
    if data.len() != ALERT_SIZE {
        return Err(PacketError::SizeMismatch { got: data.len(), want: ALERT_SIZE });
    }
    check_crc(data)?;

    let mut r = Reader::new(data, HEADER_SIZE);
    Ok(AlertPacket {
        player_id: r.u8(),
        alert_on: r.u8() != 0,
        intensity: r.u8(),
        hold_ms: r.u16(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
