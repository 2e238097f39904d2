//! Fixed-width 2D gaussian peak fit.
//!
//! Fits `b + h * exp(-((r - r0)^2 + (c - c0)^2) / (2 sigma^2))` to a small
//! window with Levenberg-Marquardt. The width is held at the known spot
//! sigma, so only background, height and centre are free.

use nalgebra::{Matrix4, Vector4};
use ndarray::ArrayView2;

use crate::error::{AppResult, QpdError};

const MAX_ITERATIONS: usize = 100;
const STEP_TOLERANCE: f64 = 1e-8;
const MAX_DAMPING: f64 = 1e10;

/// Fitted peak parameters, in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFit {
    pub background: f64,
    pub height: f64,
    /// Sub-pixel row of the peak centre
    pub row: f64,
    /// Sub-pixel column of the peak centre
    pub col: f64,
    pub iterations: usize,
}

/// Fit a fixed-width gaussian to `window`.
///
/// Returns `Ok(None)` when the fit does not converge or the result is not a
/// peak inside the window. Non-finite parameters are an error.
pub fn fit_fixed_gaussian(window: ArrayView2<f64>, sigma: f64) -> AppResult<Option<PeakFit>> {
    let (rows, cols) = window.dim();
    if rows * cols < 4 || !(sigma > 0.0) {
        return Ok(None);
    }

    let (min, max) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !(max > min) {
        return Ok(None);
    }

    let inv_sigma_sq = 1.0 / (sigma * sigma);
    let mut params = Vector4::new(min, max - min, 0.5 * rows as f64, 0.5 * cols as f64);
    let (mut jtj, mut jtr, mut cost) = normal_equations(&window, &params, inv_sigma_sq);
    let mut damping = 1e-3;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS && !converged {
        iterations += 1;

        let mut augmented = jtj;
        for i in 0..4 {
            augmented[(i, i)] += damping * jtj[(i, i)].max(f64::EPSILON);
        }
        let Some(step) = augmented.cholesky().map(|ch| ch.solve(&jtr)) else {
            damping *= 10.0;
            if damping > MAX_DAMPING {
                return Ok(None);
            }
            continue;
        };

        let trial = params + step;
        let trial_cost = sum_squares(&window, &trial, inv_sigma_sq);
        if trial_cost < cost {
            converged = step.norm() < STEP_TOLERANCE * (1.0 + params.norm());
            params = trial;
            (jtj, jtr, cost) = normal_equations(&window, &params, inv_sigma_sq);
            damping = (damping * 0.1).max(1e-12);
        } else {
            damping *= 10.0;
            // No downhill step left at any damping: we are at the minimum.
            converged = damping > MAX_DAMPING;
        }
    }

    if params.iter().any(|p| !p.is_finite()) {
        return Err(QpdError::Fit(format!(
            "gaussian peak fit diverged to non-finite parameters {:?}",
            params.as_slice()
        )));
    }
    if !converged {
        return Ok(None);
    }

    let fit = PeakFit {
        background: params[0],
        height: params[1],
        row: params[2],
        col: params[3],
        iterations,
    };
    let inside = (0.0..=(rows - 1) as f64).contains(&fit.row)
        && (0.0..=(cols - 1) as f64).contains(&fit.col);
    if fit.height <= 0.0 || !inside {
        return Ok(None);
    }
    Ok(Some(fit))
}

fn gaussian(r: f64, c: f64, params: &Vector4<f64>, inv_sigma_sq: f64) -> f64 {
    let dr = r - params[2];
    let dc = c - params[3];
    (-0.5 * (dr * dr + dc * dc) * inv_sigma_sq).exp()
}

fn sum_squares(window: &ArrayView2<f64>, params: &Vector4<f64>, inv_sigma_sq: f64) -> f64 {
    window
        .indexed_iter()
        .map(|((r, c), &v)| {
            let model = params[0] + params[1] * gaussian(r as f64, c as f64, params, inv_sigma_sq);
            (v - model).powi(2)
        })
        .sum()
}

/// `J^T J`, `J^T r` and the residual sum of squares at `params`.
fn normal_equations(
    window: &ArrayView2<f64>,
    params: &Vector4<f64>,
    inv_sigma_sq: f64,
) -> (Matrix4<f64>, Vector4<f64>, f64) {
    let mut jtj = Matrix4::zeros();
    let mut jtr = Vector4::zeros();
    let mut cost = 0.0;

    for ((r, c), &v) in window.indexed_iter() {
        let (r, c) = (r as f64, c as f64);
        let e = gaussian(r, c, params, inv_sigma_sq);
        let he = params[1] * e * inv_sigma_sq;
        let jac = Vector4::new(1.0, e, he * (r - params[2]), he * (c - params[3]));
        let residual = v - (params[0] + params[1] * e);

        jtj += jac * jac.transpose();
        jtr += jac * residual;
        cost += residual * residual;
    }
    (jtj, jtr, cost)
}
