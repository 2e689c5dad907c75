use bson::Bson;
use vellum_query::{Granularity, StageError};

use crate::error::DbError;

// Preferred-number mantissa tables, one decade each, ascending in [1, 10).
// Power-of-2 and 1-2-5 have dedicated routines; everything else shares the
// bracketing search over its table.

const ONE_TWO_FIVE: &[f64] = &[1.0, 2.0, 5.0];
const R5: &[f64] = &[1.0, 1.6, 2.5, 4.0, 6.3];
const R10: &[f64] = &[1.0, 1.25, 1.6, 2.0, 2.5, 3.15, 4.0, 5.0, 6.3, 8.0];
const R20: &[f64] = &[
    1.0, 1.12, 1.25, 1.4, 1.6, 1.8, 2.0, 2.24, 2.5, 2.8, 3.15, 3.55, 4.0, 4.5, 5.0, 5.6, 6.3,
    7.1, 8.0, 9.0,
];
const R40: &[f64] = &[
    1.0, 1.06, 1.12, 1.18, 1.25, 1.32, 1.4, 1.5, 1.6, 1.7, 1.8, 1.9, 2.0, 2.12, 2.24, 2.36,
    2.5, 2.65, 2.8, 3.0, 3.15, 3.35, 3.55, 3.75, 4.0, 4.25, 4.5, 4.75, 5.0, 5.3, 5.6, 6.0,
    6.3, 6.7, 7.1, 7.5, 8.0, 8.5, 9.0, 9.5,
];
const R80: &[f64] = &[
    1.00, 1.03, 1.06, 1.09, 1.12, 1.15, 1.18, 1.22, 1.26, 1.29, 1.32, 1.36, 1.40, 1.44, 1.48,
    1.52, 1.56, 1.60, 1.65, 1.69, 1.74, 1.78, 1.83, 1.88, 1.93, 1.98, 2.03, 2.09, 2.14, 2.20,
    2.26, 2.32, 2.38, 2.44, 2.50, 2.56, 2.63, 2.70, 2.77, 2.84, 2.91, 2.99, 3.06, 3.14, 3.22,
    3.30, 3.38, 3.46, 3.55, 3.63, 3.72, 3.81, 3.90, 4.00, 4.09, 4.19, 4.29, 4.39, 4.49, 4.60,
    4.71, 4.82, 4.93, 5.04, 5.16, 5.28, 5.40, 5.52, 5.65, 5.78, 5.91, 6.03, 6.17, 6.30, 6.44,
    6.58, 6.72, 6.86, 7.01, 7.16, 7.32, 7.47, 7.62, 7.78, 7.94, 8.00, 8.17, 8.34, 8.51, 8.68,
    8.86, 9.04, 9.22, 9.41, 9.60, 9.79,
];
const E6: &[f64] = &[1.0, 1.5, 2.2, 3.3, 4.7, 6.8];
const E12: &[f64] = &[1.0, 1.2, 1.5, 1.8, 2.2, 2.7, 3.3, 3.9, 4.7, 5.6, 6.8, 8.2];
const E24: &[f64] = &[
    1.0, 1.1, 1.2, 1.3, 1.5, 1.6, 1.8, 2.0, 2.2, 2.4, 2.7, 3.0, 3.3, 3.6, 3.9, 4.3, 4.7, 5.1,
    5.6, 6.2, 6.8, 7.5, 8.2, 9.1,
];
const E48: &[f64] = &[
    1.00, 1.05, 1.10, 1.15, 1.21, 1.27, 1.33, 1.40, 1.47, 1.54, 1.62, 1.69, 1.78, 1.87, 1.96,
    2.05, 2.15, 2.26, 2.37, 2.49, 2.61, 2.74, 2.87, 3.01, 3.16, 3.32, 3.48, 3.65, 3.83, 4.02,
    4.22, 4.42, 4.64, 4.87, 5.11, 5.36, 5.62, 5.90, 6.19, 6.49, 6.81, 7.15, 7.50, 7.87, 8.25,
    8.66, 9.09, 9.53,
];
const E96: &[f64] = &[
    1.00, 1.02, 1.05, 1.07, 1.10, 1.13, 1.15, 1.18, 1.21, 1.24, 1.27, 1.30, 1.33, 1.37, 1.40,
    1.43, 1.47, 1.50, 1.54, 1.58, 1.62, 1.65, 1.69, 1.74, 1.78, 1.82, 1.87, 1.91, 1.96, 2.00,
    2.05, 2.10, 2.15, 2.21, 2.26, 2.32, 2.37, 2.43, 2.49, 2.55, 2.61, 2.67, 2.74, 2.80, 2.87,
    2.94, 3.01, 3.09, 3.16, 3.24, 3.32, 3.40, 3.48, 3.57, 3.65, 3.74, 3.83, 3.92, 4.02, 4.12,
    4.22, 4.32, 4.42, 4.53, 4.64, 4.75, 4.87, 4.99, 5.11, 5.23, 5.36, 5.49, 5.62, 5.76, 5.90,
    6.04, 6.19, 6.34, 6.49, 6.65, 6.81, 6.98, 7.15, 7.32, 7.50, 7.68, 7.87, 8.06, 8.25, 8.45,
    8.66, 8.87, 9.09, 9.31, 9.53, 9.76,
];
const E192: &[f64] = &[
    1.00, 1.01, 1.02, 1.04, 1.05, 1.06, 1.07, 1.09, 1.10, 1.11, 1.13, 1.14, 1.15, 1.17, 1.18,
    1.20, 1.21, 1.23, 1.24, 1.26, 1.27, 1.29, 1.30, 1.32, 1.33, 1.35, 1.37, 1.38, 1.40, 1.42,
    1.43, 1.45, 1.47, 1.49, 1.50, 1.52, 1.54, 1.56, 1.58, 1.60, 1.62, 1.64, 1.65, 1.67, 1.69,
    1.72, 1.74, 1.76, 1.78, 1.80, 1.82, 1.84, 1.87, 1.89, 1.91, 1.93, 1.96, 1.98, 2.00, 2.03,
    2.05, 2.08, 2.10, 2.13, 2.15, 2.18, 2.21, 2.23, 2.26, 2.29, 2.32, 2.34, 2.37, 2.40, 2.43,
    2.46, 2.49, 2.52, 2.55, 2.58, 2.61, 2.64, 2.67, 2.71, 2.74, 2.77, 2.80, 2.84, 2.87, 2.91,
    2.94, 2.98, 3.01, 3.05, 3.09, 3.12, 3.16, 3.20, 3.24, 3.28, 3.32, 3.36, 3.40, 3.44, 3.48,
    3.52, 3.57, 3.61, 3.65, 3.70, 3.74, 3.79, 3.83, 3.88, 3.92, 3.97, 4.02, 4.07, 4.12, 4.17,
    4.22, 4.27, 4.32, 4.37, 4.42, 4.48, 4.53, 4.59, 4.64, 4.70, 4.75, 4.81, 4.87, 4.93, 4.99,
    5.05, 5.11, 5.17, 5.23, 5.30, 5.36, 5.42, 5.49, 5.56, 5.62, 5.69, 5.76, 5.83, 5.90, 5.97,
    6.04, 6.12, 6.19, 6.26, 6.34, 6.42, 6.49, 6.57, 6.65, 6.73, 6.81, 6.90, 6.98, 7.06, 7.15,
    7.23, 7.32, 7.41, 7.50, 7.59, 7.68, 7.77, 7.87, 7.96, 8.06, 8.16, 8.25, 8.35, 8.45, 8.56,
    8.66, 8.76, 8.87, 8.98, 9.09, 9.20, 9.31, 9.42, 9.53, 9.65, 9.76, 9.88,
];

/// Decade ceiling used when scaling underflows the subnormal range while
/// searching downward. Values this small cannot anchor a decade of mantissa
/// multiples, so the next boundary up is returned for `find_larger` and 0
/// otherwise.
const SUBNORMAL_DECADE_CEILING: f64 = 1.0e-321;

/// Round `n` to the adjacent value of the series: the closest strictly
/// larger value when `find_larger`, the closest strictly smaller otherwise.
/// Zero maps to zero.
pub fn find_closest(series: Granularity, n: f64, find_larger: bool) -> Result<f64, DbError> {
    if n == 0.0 {
        return Ok(0.0);
    }
    match series {
        Granularity::PowersOf2 => Ok(closest_power_of_2(n, find_larger)),
        Granularity::OneTwoFive => closest_in_series(ONE_TWO_FIVE, n, find_larger),
        Granularity::R5 => closest_in_series(R5, n, find_larger),
        Granularity::R10 => closest_in_series(R10, n, find_larger),
        Granularity::R20 => closest_in_series(R20, n, find_larger),
        Granularity::R40 => closest_in_series(R40, n, find_larger),
        Granularity::R80 => closest_in_series(R80, n, find_larger),
        Granularity::E6 => closest_in_series(E6, n, find_larger),
        Granularity::E12 => closest_in_series(E12, n, find_larger),
        Granularity::E24 => closest_in_series(E24, n, find_larger),
        Granularity::E48 => closest_in_series(E48, n, find_larger),
        Granularity::E96 => closest_in_series(E96, n, find_larger),
        Granularity::E192 => closest_in_series(E192, n, find_larger),
    }
}

fn closest_power_of_2(n: f64, find_larger: bool) -> f64 {
    let mut base = 1.0_f64;
    if n < 1.0 {
        while base > n {
            base /= 2.0;
        }
        if find_larger {
            base * 2.0
        } else if base == n {
            base / 2.0
        } else {
            base
        }
    } else {
        while base < n {
            base *= 2.0;
        }
        if find_larger {
            if base == n { base * 2.0 } else { base }
        } else {
            base / 2.0
        }
    }
}

/// Shared bracketing search: scale a decade base to contain `n`, scan the
/// mantissa table for the adjacent entry, and fall over to the neighboring
/// decade boundary when no in-decade entry qualifies.
fn closest_in_series(series: &[f64], n: f64, find_larger: bool) -> Result<f64, DbError> {
    let mut base = 1.0_f64;
    if n <= 1.0 {
        while base > n {
            base /= 10.0;
            if base == 0.0 {
                return Ok(if find_larger { SUBNORMAL_DECADE_CEILING } else { 0.0 });
            }
        }
    } else {
        while base * 10.0 <= n {
            if base >= f64::MAX / 10.0 {
                break;
            }
            base *= 10.0;
        }
    }

    if find_larger {
        for mantissa in series {
            let candidate = base * mantissa;
            if candidate > n {
                return Ok(candidate);
            }
        }
        // No in-decade entry exceeds n; the next decade boundary does.
        // R5 at n=7: no mantissa of decade 1 exceeds 7, so 10.
        Ok(base * 10.0)
    } else {
        if base == n {
            base /= 10.0;
        }
        for mantissa in series.iter().rev() {
            let candidate = base * mantissa;
            if candidate < n {
                return Ok(candidate);
            }
        }
        Err(DbError::Internal(format!(
            "failed to find a smaller series value for {n}"
        )))
    }
}

/// Granularity applies to non-negative numeric boundaries only.
pub fn validate_numeric_boundary(value: &Bson) -> Result<f64, DbError> {
    if !vellum_engine::is_number(value) {
        return Err(DbError::Stage(StageError::new(
            40258,
            format!(
                "$bucketAuto only allows specifying a 'granularity' with numeric boundaries, but encountered a value of type: {}",
                vellum_query::bson_type_name(value)
            ),
        )));
    }
    let n = vellum_engine::as_f64(value);
    if n < 0.0 {
        return Err(DbError::Stage(StageError::new(
            40260,
            format!(
                "$bucketAuto only allows specifying a 'granularity' with numeric boundaries, but a negative value was provided: {n}"
            ),
        )));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r5_seven_rounds_up_to_ten() {
        assert_eq!(find_closest(Granularity::R5, 7.0, true).unwrap(), 10.0);
    }

    #[test]
    fn r5_brackets_within_decade() {
        assert_eq!(find_closest(Granularity::R5, 3.0, true).unwrap(), 4.0);
        assert_eq!(find_closest(Granularity::R5, 3.0, false).unwrap(), 2.5);
    }

    #[test]
    fn powers_of_two_bracket() {
        assert_eq!(find_closest(Granularity::PowersOf2, 5.0, true).unwrap(), 8.0);
        assert_eq!(find_closest(Granularity::PowersOf2, 5.0, false).unwrap(), 4.0);
        // Exact powers bracket strictly.
        assert_eq!(find_closest(Granularity::PowersOf2, 8.0, true).unwrap(), 16.0);
        assert_eq!(find_closest(Granularity::PowersOf2, 8.0, false).unwrap(), 4.0);
        // Sub-unit values.
        assert_eq!(find_closest(Granularity::PowersOf2, 0.3, true).unwrap(), 0.5);
        assert_eq!(find_closest(Granularity::PowersOf2, 0.25, false).unwrap(), 0.125);
    }

    #[test]
    fn one_two_five_bracket() {
        assert_eq!(find_closest(Granularity::OneTwoFive, 3.0, true).unwrap(), 5.0);
        assert_eq!(find_closest(Granularity::OneTwoFive, 30.0, true).unwrap(), 50.0);
        assert_eq!(find_closest(Granularity::OneTwoFive, 3.0, false).unwrap(), 2.0);
    }

    #[test]
    fn zero_maps_to_zero() {
        for series in vellum_query::Granularity::ALL {
            assert_eq!(find_closest(series, 0.0, true).unwrap(), 0.0);
            assert_eq!(find_closest(series, 0.0, false).unwrap(), 0.0);
        }
    }

    #[test]
    fn strict_bracketing_for_all_series() {
        let samples = [0.004, 0.7, 1.0, 2.5, 7.0, 9.9, 10.0, 123.0, 99_000.0];
        for series in vellum_query::Granularity::ALL {
            for &n in &samples {
                let larger = find_closest(series, n, true).unwrap();
                let smaller = find_closest(series, n, false).unwrap();
                assert!(larger > n, "{series}: {larger} !> {n}");
                assert!(smaller < n, "{series}: {smaller} !< {n}");
            }
        }
    }

    #[test]
    fn decade_scaling_reaches_large_and_small_values() {
        assert_eq!(find_closest(Granularity::R10, 1_234.0, false).unwrap(), 1_000.0);
        let larger = find_closest(Granularity::E6, 5.0e8, true).unwrap();
        assert!((larger - 6.8e8).abs() / 6.8e8 < 1e-9);
        let smaller = find_closest(Granularity::E6, 0.0012, false).unwrap();
        assert!(smaller < 0.0012 && smaller > 0.0009);
    }

    #[test]
    fn numeric_boundary_validation() {
        assert_eq!(validate_numeric_boundary(&Bson::Int32(4)).unwrap(), 4.0);

        let err = validate_numeric_boundary(&Bson::String("x".into())).unwrap_err();
        match err {
            DbError::Stage(stage) => assert_eq!(stage.code, 40258),
            other => panic!("unexpected error: {other}"),
        }

        let err = validate_numeric_boundary(&Bson::Double(-3.0)).unwrap_err();
        match err {
            DbError::Stage(stage) => assert_eq!(stage.code, 40260),
            other => panic!("unexpected error: {other}"),
        }
    }
}
