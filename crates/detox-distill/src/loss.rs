//! Temperature-scaled knowledge-distillation loss.
//!
//! ```text
//! loss = T² · (1/B) · Σ_b Σ_c p_bc · (log p_bc − log q_bc)
//! p = softmax(teacher / T)      q = softmax(student / T)
//! ```
//!
//! The `T²` factor keeps gradient magnitudes comparable across temperatures.

use candle_core::{Tensor, D};
use candle_nn::ops::{log_softmax, softmax_last_dim};
use detox_core::{CoreError, CoreResult};

/// Batch-mean `KL(p ‖ q)` given student log-probabilities `log_q` and teacher
/// probabilities `p`, both `[batch, classes]`.
///
/// Entries with `p = 0` contribute exactly zero.
pub fn kl_divergence_batchmean(log_q: &Tensor, p: &Tensor) -> CoreResult<Tensor> {
    check_shapes(log_q, p)?;
    let (batch, _) = p.dims2()?;

    // p·log p with 0·log 0 := 0.  Clamping before the log keeps the masked
    // entries finite so the product is a true zero rather than NaN.
    let zero = p.zeros_like()?;
    let positive = p.gt(&zero)?;
    let log_p = p.clamp(f32::MIN_POSITIVE, 1.0f32)?.log()?;
    let terms = p.mul(&(log_p - log_q)?)?;
    let terms = positive.where_cond(&terms, &zero)?;

    Ok((terms.sum_all()? / batch as f64)?)
}

/// Distillation loss between student and (already detached) teacher logits.
pub fn distillation_loss(student_logits: &Tensor, teacher_logits: &Tensor, temperature: f64) -> CoreResult<Tensor> {
    check_shapes(student_logits, teacher_logits)?;
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(CoreError::config("temperature", format!("must be positive and finite, got {temperature}")));
    }

    let log_q = log_softmax(&(student_logits / temperature)?, D::Minus1)?;
    let p = softmax_last_dim(&(teacher_logits / temperature)?)?;
    let kl = kl_divergence_batchmean(&log_q, &p)?;
    Ok((kl * (temperature * temperature))?)
}

fn check_shapes(a: &Tensor, b: &Tensor) -> CoreResult<()> {
    if a.rank() != 2 || a.dims() != b.dims() {
        return Err(CoreError::ShapeMismatch(format!(
            "distillation loss expects equal [batch, classes] logits, got {:?} and {:?}",
            a.dims(),
            b.dims()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn t(rows: &[[f32; 2]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    fn scalar(x: Tensor) -> f32 {
        x.to_scalar::<f32>().unwrap()
    }

    /// Reference KL computed in plain f64.
    fn reference(student: &[f64], teacher: &[f64], temp: f64) -> f64 {
        let soft = |v: &[f64]| {
            let m = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let e: Vec<f64> = v.iter().map(|x| ((x - m) / temp).exp()).collect();
            let s: f64 = e.iter().sum();
            e.into_iter().map(|x| x / s).collect::<Vec<_>>()
        };
        let p = soft(teacher);
        let q = soft(student);
        p.iter().zip(&q).map(|(p, q)| p * (p.ln() - q.ln())).sum::<f64>() * temp * temp
    }

    #[test]
    fn matches_reference_value() {
        let loss = scalar(distillation_loss(&t(&[[0.0, 0.0]]), &t(&[[2.0, -1.0]]), 2.0).unwrap());
        let expected = reference(&[0.0, 0.0], &[2.0, -1.0], 2.0);
        assert!((loss as f64 - expected).abs() < 1e-5, "{loss} vs {expected}");
        assert!(loss > 0.0);
    }

    #[test]
    fn temperature_one_equals_unscaled_kl() {
        let s = t(&[[0.3, -0.7], [1.2, 0.1]]);
        let te = t(&[[2.0, -1.0], [-0.5, 0.5]]);
        let distilled = scalar(distillation_loss(&s, &te, 1.0).unwrap());
        let log_q = log_softmax(&s, D::Minus1).unwrap();
        let p = softmax_last_dim(&te).unwrap();
        let plain = scalar(kl_divergence_batchmean(&log_q, &p).unwrap());
        assert!((distilled - plain).abs() < 1e-6);
    }

    #[test]
    fn identical_distributions_give_zero() {
        let x = t(&[[1.5, -0.25], [0.0, 3.0]]);
        for temp in [0.5, 1.0, 2.0, 7.0] {
            let loss = scalar(distillation_loss(&x, &x, temp).unwrap());
            assert!(loss.abs() < 1e-6, "T={temp}: {loss}");
        }
    }

    #[test]
    fn loss_is_non_negative() {
        let cases = [
            ([[5.0, -5.0]], [[-5.0, 5.0]]),
            ([[0.1, 0.2]], [[0.2, 0.1]]),
            ([[-3.0, 0.0]], [[10.0, 10.0]]),
        ];
        for (s, te) in cases {
            for temp in [0.5, 1.0, 4.0] {
                let loss = scalar(distillation_loss(&t(&s), &t(&te), temp).unwrap());
                assert!(loss >= -1e-7, "loss {loss} for {s:?} / {te:?} at T={temp}");
            }
        }
    }

    #[test]
    fn zero_teacher_probability_contributes_nothing() {
        let log_q = t(&[[-0.5, -1.0]]);
        let p = t(&[[1.0, 0.0]]);
        let kl = scalar(kl_divergence_batchmean(&log_q, &p).unwrap());
        assert!(kl.is_finite());
        assert!((kl - 0.5).abs() < 1e-6);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = t(&[[0.0, 0.0]]);
        let b = Tensor::new(&[[0.0f32, 0.0, 0.0]], &Device::Cpu).unwrap();
        assert!(matches!(distillation_loss(&a, &b, 2.0), Err(CoreError::ShapeMismatch(_))));
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        let a = t(&[[0.0, 0.0]]);
        assert!(distillation_loss(&a, &a, 0.0).is_err());
        assert!(distillation_loss(&a, &a, f64::NAN).is_err());
    }
}
