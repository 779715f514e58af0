//! Gaussian position models and region probability mass

use khameleon_core::{Bounds, Layout};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

/// One-dimensional normal distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mean: f64,
    pub variance: f64,
}

impl Gaussian {
    /// Create from mean and variance
    pub fn new(mean: f64, variance: f64) -> Self {
        Self { mean, variance }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Cumulative probability at `x`; degenerate variances collapse to a step
    pub fn cdf(&self, x: f64) -> f64 {
        match Normal::new(self.mean, self.std_dev()) {
            Ok(normal) => normal.cdf(x),
            Err(_) if x >= self.mean => 1.0,
            Err(_) => 0.0,
        }
    }
}

/// Wire parameters of one projected position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub xmu: f64,
    pub xsigma: f64,
    pub ymu: f64,
    pub ysigma: f64,
}

/// Independent Gaussians over x and y
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian2D {
    pub x: Gaussian,
    pub y: Gaussian,
}

impl Gaussian2D {
    /// Create from the two axes
    pub fn new(x: Gaussian, y: Gaussian) -> Self {
        Self { x, y }
    }

    /// Joint CDF at `(x, y)`
    pub fn cdf(&self, x: f64, y: f64) -> f64 {
        self.x.cdf(x) * self.y.cdf(y)
    }

    /// Probability mass inside a rectangle by inclusion-exclusion
    pub fn rect_mass(&self, bounds: &Bounds) -> f64 {
        let (x1, x2) = (bounds.x, bounds.x + bounds.w);
        let (y1, y2) = (bounds.y, bounds.y + bounds.h);
        let mass = self.cdf(x2, y2) - self.cdf(x1, y2) - self.cdf(x2, y1) + self.cdf(x1, y1);
        mass.max(0.0)
    }

    /// Parameters for transmission; `None` when the mean is not finite
    pub fn to_wire(&self) -> Option<GaussianParams> {
        if !self.x.mean.is_finite() || !self.y.mean.is_finite() {
            return None;
        }
        Some(GaussianParams {
            xmu: self.x.mean,
            xsigma: self.x.std_dev(),
            ymu: self.y.mean,
            ysigma: self.y.std_dev(),
        })
    }
}

/// The `k` layout regions holding the most mass, highest first.
///
/// Ties keep the layout's name order.
pub fn top_k_regions(dist: &Gaussian2D, k: usize, layout: &Layout) -> Vec<String> {
    let mut scored: Vec<(&String, f64)> = layout
        .iter()
        .map(|(name, bounds)| (name, dist.rect_mass(bounds)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
        .into_iter()
        .take(k)
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> Gaussian2D {
        Gaussian2D::new(Gaussian::new(0.0, 1.0), Gaussian::new(0.0, 1.0))
    }

    #[test]
    fn test_cdf_at_mean_is_half() {
        assert!((Gaussian::new(3.0, 4.0).cdf(3.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_cdf_is_step() {
        let g = Gaussian::new(1.0, 0.0);
        assert_eq!(g.cdf(0.5), 0.0);
        assert_eq!(g.cdf(1.0), 1.0);
    }

    #[test]
    fn test_quadrant_mass() {
        // [0, inf) x [0, inf) holds a quarter of the mass
        let mass = standard().rect_mass(&Bounds::new(0.0, 0.0, 1e6, 1e6));
        assert!((mass - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_box_mass() {
        let d = standard();
        let one_axis = d.x.cdf(1.0) - d.x.cdf(-1.0);
        let mass = d.rect_mass(&Bounds::new(-1.0, -1.0, 2.0, 2.0));
        assert!((mass - one_axis * one_axis).abs() < 1e-12);
    }

    #[test]
    fn test_wire_uses_std_dev() {
        let d = Gaussian2D::new(Gaussian::new(10.0, 4.0), Gaussian::new(-2.0, 9.0));
        let wire = d.to_wire().unwrap();
        assert_eq!(wire.xsigma, 2.0);
        assert_eq!(wire.ysigma, 3.0);
        assert_eq!(wire.ymu, -2.0);

        let bad = Gaussian2D::new(Gaussian::new(f64::NAN, 1.0), Gaussian::new(0.0, 1.0));
        assert!(bad.to_wire().is_none());
    }

    #[test]
    fn test_top_k_orders_by_mass() {
        let d = Gaussian2D::new(Gaussian::new(100.0, 25.0), Gaussian::new(100.0, 25.0));
        let mut layout = Layout::new();
        layout.insert("far".into(), Bounds::new(400.0, 400.0, 50.0, 50.0));
        layout.insert("near".into(), Bounds::new(90.0, 90.0, 20.0, 20.0));
        layout.insert("edge".into(), Bounds::new(105.0, 90.0, 20.0, 20.0));

        assert_eq!(top_k_regions(&d, 2, &layout), vec!["near", "edge"]);
        assert_eq!(top_k_regions(&d, 10, &layout).len(), 3);
        assert!(top_k_regions(&d, 0, &layout).is_empty());
    }
}
