//! Numerical integration rules.
//!
//! Gauss-Legendre for smooth 1D integrands (Hankel transforms of radial
//! profiles) and composite 2D Simpson for integrating surface brightness over
//! a pixel footprint.

use std::f64::consts::PI;

/// Fixed-order Gauss-Legendre rule on [-1, 1].
///
/// Nodes and weights are computed once at construction by Newton iteration on
/// the Legendre polynomial P_n.
#[derive(Debug, Clone)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    /// Build an `order`-point rule. An order of zero is promoted to one.
    pub fn new(order: usize) -> Self {
        let n = order.max(1);
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        let half = (n + 1) / 2;

        for i in 0..half {
            // Tricomi initial guess for the i-th root
            let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            let mut dp = 1.0;
            for _ in 0..100 {
                let (p, d) = legendre_with_derivative(n, z);
                dp = d;
                let dz = p / d;
                z -= dz;
                if dz.abs() < 1e-15 {
                    break;
                }
            }
            let w = 2.0 / ((1.0 - z * z) * dp * dp);
            nodes[i] = -z;
            nodes[n - 1 - i] = z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }

        Self { nodes, weights }
    }

    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Integrate `f` over [a, b].
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: F, a: f64, b: f64) -> f64 {
        let half_width = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(mid + half_width * x))
            .sum::<f64>()
            * half_width
    }

    /// Integrate `f` over [a, b] split into equal segments no wider than `max_width`.
    ///
    /// Oscillatory integrands (Bessel kernels) need a segment per half period
    /// for the fixed-order rule to stay accurate.
    pub fn integrate_segmented<F: Fn(f64) -> f64>(
        &self,
        f: F,
        a: f64,
        b: f64,
        max_width: f64,
    ) -> f64 {
        if b <= a {
            return 0.0;
        }
        let segments = if max_width > 0.0 && max_width.is_finite() {
            ((b - a) / max_width).ceil().max(1.0) as usize
        } else {
            1
        };
        let width = (b - a) / segments as f64;
        (0..segments)
            .map(|s| {
                let lo = a + s as f64 * width;
                self.integrate(&f, lo, lo + width)
            })
            .sum()
    }
}

/// Evaluate P_n(z) and P_n'(z) by the three-term recurrence.
fn legendre_with_derivative(n: usize, z: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = z;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * z * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let deriv = n as f64 * (z * p1 - p0) / (z * z - 1.0);
    (p1, deriv)
}

/// Composite Simpson integral of `f(x, y)` over a rectangle.
///
/// `subdivisions` is the number of intervals per axis and is rounded up to
/// the next even number. With 2 subdivisions this is the classic 3x3 rule
/// (weights 1-4-1) applied to a single pixel.
pub fn simpson_2d<F: Fn(f64, f64) -> f64>(
    f: F,
    (x0, x1): (f64, f64),
    (y0, y1): (f64, f64),
    subdivisions: usize,
) -> f64 {
    let n = {
        let n = subdivisions.max(2);
        n + n % 2
    };
    let hx = (x1 - x0) / n as f64;
    let hy = (y1 - y0) / n as f64;

    let weight = |i: usize| -> f64 {
        if i == 0 || i == n {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        }
    };

    let mut total = 0.0;
    for j in 0..=n {
        let y = y0 + j as f64 * hy;
        let wy = weight(j);
        for i in 0..=n {
            let x = x0 + i as f64 * hx;
            total += wy * weight(i) * f(x, y);
        }
    }
    total * hx * hy / 9.0
}
