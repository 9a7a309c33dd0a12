use crate::constants::ADC_RECORD_SIZE;
use crate::error::KMError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

const RATE_SHIFT: u32 = 16;
const RATE_MASK: u32 = 0x3;

/// Acquisition rate selected with SET_RATE and echoed in every ADC snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SampleRate {
    #[default]
    #[strum(to_string = "2 SPS")]
    Sps2 = 0,
    #[strum(to_string = "10 SPS")]
    Sps10 = 1,
    #[strum(to_string = "50 SPS")]
    Sps50 = 2,
    #[strum(to_string = "1 kSPS")]
    Sps1000 = 3,
}

impl SampleRate {
    /// Map a 2-bit rate code; higher bits are ignored.
    pub fn from_code(code: u8) -> Self {
        match code & 0x3 {
            0 => SampleRate::Sps2,
            1 => SampleRate::Sps10,
            2 => SampleRate::Sps50,
            _ => SampleRate::Sps1000,
        }
    }

    /// Get the sample rate in samples per second
    pub fn as_hz(&self) -> u32 {
        match self {
            SampleRate::Sps2 => 2,
            SampleRate::Sps10 => 10,
            SampleRate::Sps50 => 50,
            SampleRate::Sps1000 => 1000,
        }
    }
}

/// Wire layout of the 40-byte ADC record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct AdcDataRaw {
    pub vbus_uv: I32,          // Microvolts (µV)
    pub ibus_ua: I32,          // Microamps (µA)
    pub vbus_avg_uv: I32,      // Microvolts (µV), smoothed
    pub ibus_avg_ua: I32,      // Microamps (µA), smoothed
    pub vbus_ori_avg_raw: I32, // Uncalibrated
    pub ibus_ori_avg_raw: I32, // Uncalibrated
    pub temp_raw: U16,         // msb = 2 °C steps, lsb = 1/128 °C steps
    pub vcc1_tenth_mv: U16,    // 0.1 millivolts
    pub vcc2_tenth_mv: U16,    // 0.1 millivolts
    pub vdp_mv: U16,           // millivolts
    pub vdm_mv: U16,           // millivolts
    pub vdd_mv: U16,           // millivolts
    pub rate_word: U32,        // bits 16..=17 hold the rate code
}

/// Decoded ADC snapshot. Integer fields keep the device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcSnapshot {
    pub vbus_uv: i32,
    pub ibus_ua: i32,
    pub vbus_avg_uv: i32,
    pub ibus_avg_ua: i32,
    pub vbus_ori_avg_uv: i32,
    pub ibus_ori_avg_ua: i32,
    pub temp_raw: u16,
    pub vcc1_tenth_mv: u16,
    pub vcc2_tenth_mv: u16,
    pub vdp_mv: u16,
    pub vdm_mv: u16,
    pub vdd_mv: u16,
    pub sample_rate: SampleRate,
}

/// Convert the raw temperature register to degrees Celsius.
///
/// The high byte counts 2 °C steps and the low byte 1/128 °C steps
/// (7.8125 m°C, as on the INA228/9).
pub fn temperature_c(raw: u16) -> f64 {
    let msb = f64::from(raw >> 8);
    let lsb = f64::from(raw & 0xFF);
    (msb * 2000.0 + lsb * 1000.0 / 128.0) / 1000.0
}

impl From<AdcDataRaw> for AdcSnapshot {
    fn from(raw: AdcDataRaw) -> Self {
        let rate_code = (raw.rate_word.get() >> RATE_SHIFT) & RATE_MASK;
        AdcSnapshot {
            vbus_uv: raw.vbus_uv.get(),
            ibus_ua: raw.ibus_ua.get(),
            vbus_avg_uv: raw.vbus_avg_uv.get(),
            ibus_avg_ua: raw.ibus_avg_ua.get(),
            vbus_ori_avg_uv: raw.vbus_ori_avg_raw.get(),
            ibus_ori_avg_ua: raw.ibus_ori_avg_raw.get(),
            temp_raw: raw.temp_raw.get(),
            vcc1_tenth_mv: raw.vcc1_tenth_mv.get(),
            vcc2_tenth_mv: raw.vcc2_tenth_mv.get(),
            vdp_mv: raw.vdp_mv.get(),
            vdm_mv: raw.vdm_mv.get(),
            vdd_mv: raw.vdd_mv.get(),
            sample_rate: SampleRate::from_code(rate_code as u8),
        }
    }
}

impl From<&AdcSnapshot> for AdcDataRaw {
    fn from(data: &AdcSnapshot) -> Self {
        AdcDataRaw {
            vbus_uv: I32::new(data.vbus_uv),
            ibus_ua: I32::new(data.ibus_ua),
            vbus_avg_uv: I32::new(data.vbus_avg_uv),
            ibus_avg_ua: I32::new(data.ibus_avg_ua),
            vbus_ori_avg_raw: I32::new(data.vbus_ori_avg_uv),
            ibus_ori_avg_raw: I32::new(data.ibus_ori_avg_ua),
            temp_raw: U16::new(data.temp_raw),
            vcc1_tenth_mv: U16::new(data.vcc1_tenth_mv),
            vcc2_tenth_mv: U16::new(data.vcc2_tenth_mv),
            vdp_mv: U16::new(data.vdp_mv),
            vdm_mv: U16::new(data.vdm_mv),
            vdd_mv: U16::new(data.vdd_mv),
            rate_word: U32::new(u32::from(u8::from(data.sample_rate)) << RATE_SHIFT),
        }
    }
}

impl AdcSnapshot {
    /// Decode the first 40 bytes of `bytes`; anything after them is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, KMError> {
        let (raw, _) = AdcDataRaw::read_from_prefix(bytes).map_err(|_| KMError::TruncatedRecord {
            expected: ADC_RECORD_SIZE,
            actual: bytes.len(),
        })?;
        Ok(AdcSnapshot::from(raw))
    }

    pub fn to_bytes(&self) -> [u8; ADC_RECORD_SIZE] {
        let mut out = [0u8; ADC_RECORD_SIZE];
        out.copy_from_slice(AdcDataRaw::from(self).as_bytes());
        out
    }

    pub fn temperature_c(&self) -> f64 {
        temperature_c(self.temp_raw)
    }

    pub fn vbus_v(&self) -> f64 {
        self.vbus_uv as f64 / 1_000_000.0
    }

    /// Current in amperes. Positive when power flows from the female
    /// (input) to the male (output) connector.
    pub fn ibus_a(&self) -> f64 {
        self.ibus_ua as f64 / 1_000_000.0
    }

    pub fn power_w(&self) -> f64 {
        self.vbus_v() * self.ibus_a()
    }

    pub fn vcc1_mv(&self) -> f64 {
        f64::from(self.vcc1_tenth_mv) / 10.0
    }

    pub fn vcc2_mv(&self) -> f64 {
        f64::from(self.vcc2_tenth_mv) / 10.0
    }
}

impl fmt::Display for AdcSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VBUS: {:.4} V, IBUS: {:.4} A, Power: {:.4} W, Temp: {:.2} °C, \
             CC1: {:.1} mV, CC2: {:.1} mV, D+: {} mV, D-: {} mV, VDD: {} mV, Rate: {}",
            self.vbus_v(),
            self.ibus_a(),
            self.power_w(),
            self.temperature_c(),
            self.vcc1_mv(),
            self.vcc2_mv(),
            self.vdp_mv,
            self.vdm_mv,
            self.vdd_mv,
            self.sample_rate
        )
    }
}
