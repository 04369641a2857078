/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// utilities module
//
// various functions that can be of use across the app
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::ModelError;

// element-wise acc += values, both series must cover the same days
pub fn accumulate(acc: &mut [f64], values: &[f64], series: &str) -> Result<(), ModelError> {
    if acc.len() != values.len() {
        return Err(ModelError::LengthMismatch {
            series: String::from(series),
            expected: acc.len(),
            actual: values.len(),
        });
    }
    for (total, value) in acc.iter_mut().zip(values) {
        *total += value;
    }
    Ok(())
}

pub fn approx_eq(a: f64, b: f64, relative: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= relative * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_adds_day_by_day() {
        let mut acc = vec![1.0, 2.0, 3.0];
        accumulate(&mut acc, &[0.5, 0.5, 0.5], "x").unwrap();
        assert_eq!(acc, vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn accumulate_rejects_ragged_series() {
        let mut acc = vec![0.0; 3];
        match accumulate(&mut acc, &[1.0], "60-69") {
            Err(ModelError::LengthMismatch { series, expected, actual }) => {
                assert_eq!(series, "60-69");
                assert_eq!((expected, actual), (3, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn approx_eq_is_relative_for_large_values() {
        assert!(approx_eq(1_000_000.0, 1_000_000.5, 1e-6));
        assert!(!approx_eq(1.0, 1.1, 1e-6));
        assert!(approx_eq(0.0, 1e-9, 1e-6));
    }
}
