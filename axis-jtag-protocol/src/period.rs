//! Logarithmic encoding of the TCK period.
//!
//! A query reply announces the clock period in 8 bits as
//! `code = round(log10(period_ns * REF_FREQ_HZ / 1e9) * 64)`,
//! i.e. in units of 1/64 decade of reference clock cycles.
//! Code `0` is reserved for an unknown period.
use crate::error::HeaderError;

/// Reference clock of the target firmware.
pub const REF_FREQ_HZ: f64 = 200.0e6;

const STEPS_PER_DECADE: f64 = 64.0;

/// Raw 8-bit period code.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PeriodCode(u8);

impl PeriodCode {
    pub const UNKNOWN: PeriodCode = PeriodCode(0);

    pub fn new(raw: u8) -> PeriodCode {
        PeriodCode(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Encodes a period in nanoseconds; `None` maps to [`PeriodCode::UNKNOWN`].
///
/// Periods whose code would round below 1 or above 255 cannot be represented.
pub fn encode(period_ns: Option<u32>) -> Result<PeriodCode, HeaderError> {
    let Some(period_ns) = period_ns else {
        return Ok(PeriodCode::UNKNOWN);
    };
    let cycles = period_ns as f64 * REF_FREQ_HZ / 1.0e9;
    let code = (cycles.log10() * STEPS_PER_DECADE).round();
    // log10(0) is -inf, which also fails this check
    if !(1.0..=255.0).contains(&code) {
        return Err(HeaderError::OutOfRange {
            field: "TCK period",
            value: period_ns as u64,
            min: decode(PeriodCode(1)).unwrap_or(0) as u64,
            max: decode(PeriodCode(255)).unwrap_or(0) as u64,
        });
    }
    Ok(PeriodCode(code as u8))
}

/// Decodes a period code to nanoseconds. The result is within one quantization
/// step (about 3.7%) of the value that was encoded.
pub fn decode(code: PeriodCode) -> Option<u32> {
    if code == PeriodCode::UNKNOWN {
        return None;
    }
    let cycles = 10f64.powf(code.0 as f64 / STEPS_PER_DECADE);
    Some((cycles * 1.0e9 / REF_FREQ_HZ).round() as u32)
}

/// Ratio between two adjacent decoded periods.
pub fn quantization_step() -> f64 {
    10f64.powf(1.0 / STEPS_PER_DECADE)
}
