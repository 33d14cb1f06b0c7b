//! Metrological conversion models.
//!
//! Two independent pure functions turn raw channel readings into calibrated
//! temperatures:
//!
//! - [`prt_temperature`]: inverse Callendar–Van Dusen for platinum resistance
//!   thermometers (the above-0 °C quadratic approximation used with ITS-90
//!   calibrations). Undefined inputs yield NaN, never an error, so downstream
//!   code treats them as "no value".
//! - [`type_s_temperature`]: segmented polynomial linearization for Type-S
//!   thermocouples. EMF outside every segment is a hard
//!   [`DaqError::EmfOutOfRange`]; the asymmetry with the resistance path is
//!   deliberate and relied upon by callers.
//!
//! The segment table preserves the calibration sheet's ordering, including
//! boundaries shared by adjacent segments; selection is always the first
//! matching segment in table order.

use crate::error::{AppResult, DaqError};

/// Callendar–Van Dusen coefficient A (IEC 60751).
const CVD_A: f64 = 3.9083e-3;
/// Callendar–Van Dusen coefficient B (IEC 60751).
const CVD_B: f64 = -5.775e-7;

/// Nominal PRT resistance at the triple point of water, in ohms.
pub const DEFAULT_RTPW: f64 = 100.0;

/// Fixed correction added to every thermocouple linearization result, in °C.
const TYPE_S_CORRECTION: f64 = 0.02;

/// One fitted sub-range of the Type-S linearization, inclusive on both ends.
struct TypeSSegment {
    min_mv: f64,
    max_mv: f64,
    coeffs: [f64; 10],
}

/// Type-S linearization table. Order matters: adjacent segments share
/// boundary values and the first match wins.
const TYPE_S_TABLE: [TypeSSegment; 4] = [
    TypeSSegment {
        min_mv: -0.235,
        max_mv: 1.874,
        coeffs: [
            0.0000000e+00,
            1.84949460e+02,
            -8.00504062e+01,
            1.02237430e+02,
            -1.52248592e+02,
            1.88821343e+02,
            -1.59085941e+02,
            8.23027880e+01,
            -2.34181944e+01,
            2.79786260e+00,
        ],
    },
    TypeSSegment {
        min_mv: 1.874,
        max_mv: 11.950,
        coeffs: [
            1.291507177e+01,
            1.466298863e+02,
            -1.534713402e+01,
            3.145945973e+00,
            -4.163257839e-01,
            3.187963771e-02,
            -1.291637500e-03,
            2.183475087e-05,
            -1.447379511e-07,
            8.211272125e-09,
        ],
    },
    TypeSSegment {
        min_mv: 10.332,
        max_mv: 17.536,
        coeffs: [
            -8.087801117e+01,
            1.621573104e+02,
            -8.536869453e+00,
            4.719686976e-01,
            -1.441693666e-02,
            2.081618890e-04,
            0.0,
            0.0,
            0.0,
            0.0,
        ],
    },
    TypeSSegment {
        min_mv: 17.536,
        max_mv: 18.693,
        coeffs: [
            5.333875126e+04,
            -1.235892298e+04,
            1.092657613e+03,
            -4.265693686e+01,
            6.247205420e-01,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
        ],
    },
];

/// Converts a PRT resistance in ohms to a temperature in °C.
///
/// Solves the Callendar–Van Dusen equation `R = Rtpw (1 + A·t + B·t²)` for
/// `t` via the quadratic formula. Returns NaN when the conversion is
/// undefined: non-positive `rtpw`, non-positive or NaN `resistance`, or a
/// negative discriminant.
pub fn prt_temperature(resistance: f64, rtpw: f64) -> f64 {
    if rtpw <= 0.0 || !(resistance > 0.0) {
        return f64::NAN;
    }
    let w = resistance / rtpw;
    let discriminant = CVD_A * CVD_A - 4.0 * CVD_B * (1.0 - w);
    if discriminant < 0.0 {
        return f64::NAN;
    }
    (-CVD_A + discriminant.sqrt()) / (2.0 * CVD_B)
}

/// Converts a Type-S thermocouple EMF in millivolts to a temperature in °C.
///
/// Evaluates the polynomial of the first segment whose inclusive range
/// contains `emf_mv`, then applies the fixed correction.
///
/// # Errors
///
/// [`DaqError::EmfOutOfRange`] when no segment contains the input (including
/// NaN inputs).
pub fn type_s_temperature(emf_mv: f64) -> AppResult<f64> {
    for segment in &TYPE_S_TABLE {
        if segment.min_mv <= emf_mv && emf_mv <= segment.max_mv {
            return Ok(polynomial(&segment.coeffs, emf_mv) + TYPE_S_CORRECTION);
        }
    }
    Err(DaqError::EmfOutOfRange { emf: emf_mv })
}

/// Evaluates `Σ coeffs[i]·x^i` via Horner's scheme.
fn polynomial(coeffs: &[f64; 10], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Forward Callendar–Van Dusen: resistance from temperature.
    fn forward_resistance(t: f64, rtpw: f64) -> f64 {
        rtpw * (1.0 + CVD_A * t + CVD_B * t * t)
    }

    #[test]
    fn prt_conversion_round_trips_through_forward_formula() {
        let rtpw = 100.0;
        // 100 Ω ≈ 0 °C up to ~390 Ω ≈ 960 °C, well inside the valid branch.
        for resistance in (100..=390).map(f64::from) {
            let t = prt_temperature(resistance, rtpw);
            assert!(t.is_finite(), "undefined for R = {resistance}");
            let back = forward_resistance(t, rtpw);
            assert!(
                (back - resistance).abs() < 1e-9,
                "R = {resistance} came back as {back}"
            );
        }
    }

    #[test]
    fn prt_at_rtpw_is_zero_celsius() {
        let t = prt_temperature(100.0, 100.0);
        assert!(t.abs() < 1e-12, "expected 0 °C, got {t}");
    }

    #[test]
    fn prt_undefined_inputs_yield_nan() {
        assert!(prt_temperature(100.0, 0.0).is_nan());
        assert!(prt_temperature(100.0, -1.0).is_nan());
        assert!(prt_temperature(0.0, 100.0).is_nan());
        assert!(prt_temperature(-5.0, 100.0).is_nan());
        assert!(prt_temperature(f64::NAN, 100.0).is_nan());
    }

    #[test]
    fn prt_negative_discriminant_yields_nan() {
        // W > ~7.6 pushes the discriminant negative.
        assert!(prt_temperature(800.0, 100.0).is_nan());
    }

    #[test]
    fn type_s_zero_emf_is_exactly_the_correction() {
        // Segment 0 has a zero constant term, so 0 mV isolates the +0.02.
        let t = type_s_temperature(0.0).unwrap();
        assert_eq!(t, TYPE_S_CORRECTION);
    }

    #[test]
    fn type_s_shared_boundary_selects_earlier_segment() {
        // 17.536 mV terminates segment 2 and starts segment 3; table order
        // must decide in favor of segment 2.
        let t = type_s_temperature(17.536).unwrap();
        let expected = polynomial(&TYPE_S_TABLE[2].coeffs, 17.536) + TYPE_S_CORRECTION;
        assert_eq!(t, expected);
    }

    #[test]
    fn type_s_overlap_region_selects_earlier_segment() {
        // Segments 1 and 2 overlap across 10.332..11.950 mV; the earlier one
        // wins throughout the overlap.
        for emf in [10.332, 11.0, 11.950] {
            let t = type_s_temperature(emf).unwrap();
            let expected = polynomial(&TYPE_S_TABLE[1].coeffs, emf) + TYPE_S_CORRECTION;
            assert_eq!(t, expected, "emf = {emf}");
        }
    }

    #[test]
    fn type_s_first_boundary_selects_first_segment() {
        let t = type_s_temperature(1.874).unwrap();
        let expected = polynomial(&TYPE_S_TABLE[0].coeffs, 1.874) + TYPE_S_CORRECTION;
        assert_eq!(t, expected);
    }

    #[test]
    fn type_s_out_of_range_is_an_error() {
        for emf in [25.0, 18.694, -0.236, -3.0] {
            match type_s_temperature(emf) {
                Err(DaqError::EmfOutOfRange { emf: reported }) => assert_eq!(reported, emf),
                other => panic!("expected out-of-range for {emf} mV, got {other:?}"),
            }
        }
    }

    #[test]
    fn type_s_nan_is_an_error() {
        assert!(matches!(
            type_s_temperature(f64::NAN),
            Err(DaqError::EmfOutOfRange { .. })
        ));
    }

    #[test]
    fn type_s_covers_the_physical_range() {
        // Reference points from the Type-S tables: 1000 °C ≈ 9.587 mV,
        // 18.0 mV lands just above 1700 °C.
        let t = type_s_temperature(9.587).unwrap();
        assert!((t - 1000.0).abs() < 1.0, "got {t}");
        let t = type_s_temperature(18.0).unwrap();
        assert!(t > 1690.0 && t < 1760.0, "got {t}");
    }
}
