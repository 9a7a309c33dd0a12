use crate::constants::ADC_QUEUE_ENTRY_SIZE;
use crate::error::KMError;
use std::fmt;
use zerocopy::byteorder::little_endian::{I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// AdcQueue sample structure (20 bytes)
///
/// While the device is acquiring (after SET_RATE) it buffers samples and
/// returns every one collected since the previous GET_DATA poll, each
/// stamped with the device clock.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct AdcQueueEntryRaw {
    /// Device timestamp in milliseconds
    pub timestamp_ms: U32,
    /// VBUS voltage in microvolts (µV)
    pub vbus_uv: I32,
    /// IBUS current in microamperes (µA), signed
    pub ibus_ua: I32,
    /// CC1 line voltage in 0.1 mV
    pub vcc1_tenth_mv: U16,
    /// CC2 line voltage in 0.1 mV
    pub vcc2_tenth_mv: U16,
    /// D+ voltage in mV
    pub vdp_mv: U16,
    /// D- voltage in mV
    pub vdm_mv: U16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdcQueueEntry {
    pub timestamp_ms: u32,
    pub vbus_uv: i32,
    pub ibus_ua: i32,
    pub vcc1_tenth_mv: u16,
    pub vcc2_tenth_mv: u16,
    pub vdp_mv: u16,
    pub vdm_mv: u16,
}

impl From<AdcQueueEntryRaw> for AdcQueueEntry {
    fn from(raw: AdcQueueEntryRaw) -> Self {
        Self {
            timestamp_ms: raw.timestamp_ms.get(),
            vbus_uv: raw.vbus_uv.get(),
            ibus_ua: raw.ibus_ua.get(),
            vcc1_tenth_mv: raw.vcc1_tenth_mv.get(),
            vcc2_tenth_mv: raw.vcc2_tenth_mv.get(),
            vdp_mv: raw.vdp_mv.get(),
            vdm_mv: raw.vdm_mv.get(),
        }
    }
}

impl From<&AdcQueueEntry> for AdcQueueEntryRaw {
    fn from(entry: &AdcQueueEntry) -> Self {
        Self {
            timestamp_ms: U32::new(entry.timestamp_ms),
            vbus_uv: I32::new(entry.vbus_uv),
            ibus_ua: I32::new(entry.ibus_ua),
            vcc1_tenth_mv: U16::new(entry.vcc1_tenth_mv),
            vcc2_tenth_mv: U16::new(entry.vcc2_tenth_mv),
            vdp_mv: U16::new(entry.vdp_mv),
            vdm_mv: U16::new(entry.vdm_mv),
        }
    }
}

impl AdcQueueEntry {
    /// Decode the first 20 bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, KMError> {
        let (raw, _) = AdcQueueEntryRaw::read_from_prefix(bytes).map_err(|_| KMError::TruncatedRecord {
            expected: ADC_QUEUE_ENTRY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self::from(raw))
    }

    pub fn to_bytes(&self) -> [u8; ADC_QUEUE_ENTRY_SIZE] {
        let mut out = [0u8; ADC_QUEUE_ENTRY_SIZE];
        out.copy_from_slice(AdcQueueEntryRaw::from(self).as_bytes());
        out
    }

    pub fn vbus_v(&self) -> f64 {
        self.vbus_uv as f64 / 1_000_000.0
    }

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

impl fmt::Display for AdcQueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} ms] VBUS: {} µV, IBUS: {} µA, Power: {:.4} W, CC1: {:.1} mV, CC2: {:.1} mV, D+: {} mV, D-: {} mV",
            self.timestamp_ms,
            self.vbus_uv,
            self.ibus_ua,
            self.power_w(),
            self.vcc1_mv(),
            self.vcc2_mv(),
            self.vdp_mv,
            self.vdm_mv
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_layout_is_20_bytes() {
        assert_eq!(std::mem::size_of::<AdcQueueEntryRaw>(), ADC_QUEUE_ENTRY_SIZE);
    }

    #[test]
    fn field_order_matches_wire() {
        let hex = "e8030000a98b4d00d2ffffff3c02a30c05000600";
        let bytes = hex::decode(hex).unwrap();
        let entry = AdcQueueEntry::decode(&bytes).unwrap();
        assert_eq!(entry.timestamp_ms, 1000);
        assert_eq!(entry.vbus_uv, 5_082_025);
        assert_eq!(entry.ibus_ua, -46);
        assert_eq!(entry.vcc1_tenth_mv, 0x023c);
        assert_eq!(entry.vcc2_tenth_mv, 0x0ca3);
        assert_eq!(entry.vdp_mv, 5);
        assert_eq!(entry.vdm_mv, 6);
        assert_eq!(entry.vcc1_mv(), 57.2);
    }

    #[test]
    fn power_is_vbus_times_ibus() {
        let entry = AdcQueueEntry {
            vbus_uv: 20_000_000,
            ibus_ua: -250_000,
            ..Default::default()
        };
        assert_eq!(entry.power_w(), -5.0);
        assert!(entry.to_string().contains("Power: -5.0000 W"));
    }
}
