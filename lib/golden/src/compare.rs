use core::fmt;

use quantize::Matrix;

/// Default number of mismatches kept in a report.
pub const DEFAULT_MAX_REPORTED: usize = 10;

/// Closeness rule `|g - h| <= atol + rtol * |h|`, with `h` the hardware value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-5,
            rtol: 1e-4,
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, golden: f32, hw: f32) -> bool {
        if golden == hw {
            return true;
        }
        let (g, h) = (golden as f64, hw as f64);
        if !g.is_finite() || !h.is_finite() {
            return false;
        }
        (g - h).abs() <= self.atol + self.rtol * h.abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub golden: f32,
    pub hw: f32,
    pub diff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    ShapeMismatch,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::ShapeMismatch => write!(f, "SHAPE MISMATCH"),
        }
    }
}

/// Outcome of comparing a hardware result against the golden product.
///
/// When the shapes differ no numeric statistics are computed; they stay zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub shapes_matched: bool,
    pub golden_shape: (usize, usize),
    pub hw_shape: (usize, usize),
    pub max_abs_diff: f64,
    pub mean_abs_diff: f64,
    pub mismatch_count: usize,
    pub element_count: usize,
    /// The first mismatches in row-major order.
    pub mismatches: Vec<Mismatch>,
    pub tolerance: Tolerance,
}

impl ComparisonReport {
    pub fn verdict(&self) -> Verdict {
        if !self.shapes_matched {
            Verdict::ShapeMismatch
        } else if self.mismatch_count == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict() == Verdict::Pass
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (gr, gc) = self.golden_shape;
        let (hr, hc) = self.hw_shape;
        if !self.shapes_matched {
            return writeln!(
                f,
                "{}: golden is {gr}x{gc}, hardware is {hr}x{hc}",
                self.verdict()
            );
        }

        writeln!(f, "Max absolute difference: {:.6}", self.max_abs_diff)?;
        writeln!(f, "Average absolute difference: {:.6}", self.mean_abs_diff)?;
        writeln!(
            f,
            "Mismatched elements: {}/{}",
            self.mismatch_count, self.element_count
        )?;
        match self.verdict() {
            Verdict::Pass => writeln!(
                f,
                "PASS: hardware result matches golden (atol={}, rtol={})",
                self.tolerance.atol, self.tolerance.rtol
            ),
            _ => {
                writeln!(
                    f,
                    "FAIL: hardware result differs from golden (atol={}, rtol={})",
                    self.tolerance.atol, self.tolerance.rtol
                )?;
                for m in &self.mismatches {
                    writeln!(
                        f,
                        "  C[{}][{}]: Golden={:.6}, HW={:.6}, Diff={:.6}",
                        m.row, m.col, m.golden, m.hw, m.diff
                    )?;
                }
                if self.mismatch_count > self.mismatches.len() {
                    writeln!(
                        f,
                        "  ... {} more",
                        self.mismatch_count - self.mismatches.len()
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Compare `hw` against `golden` elementwise.
pub fn compare(
    golden: &Matrix<f32>,
    hw: &Matrix<f32>,
    tolerance: &Tolerance,
    max_reported: usize,
) -> ComparisonReport {
    let mut report = ComparisonReport {
        shapes_matched: golden.shape() == hw.shape(),
        golden_shape: golden.shape(),
        hw_shape: hw.shape(),
        max_abs_diff: 0.0,
        mean_abs_diff: 0.0,
        mismatch_count: 0,
        element_count: 0,
        mismatches: Vec::new(),
        tolerance: *tolerance,
    };
    if !report.shapes_matched {
        tracing::warn!(
            golden = ?report.golden_shape,
            hw = ?report.hw_shape,
            "result shape differs from golden"
        );
        return report;
    }

    let cols = golden.cols();
    let mut sum = 0.0f64;
    for (i, (&g, &h)) in golden.as_slice().iter().zip(hw.as_slice()).enumerate() {
        let diff = (g as f64 - h as f64).abs();
        sum += diff;
        report.max_abs_diff = report.max_abs_diff.max(diff);

        if !tolerance.is_close(g, h) {
            report.mismatch_count += 1;
            if report.mismatches.len() < max_reported {
                report.mismatches.push(Mismatch {
                    row: i / cols,
                    col: i % cols,
                    golden: g,
                    hw: h,
                    diff,
                });
            }
        }
    }

    report.element_count = golden.len();
    if report.element_count > 0 {
        report.mean_abs_diff = sum / report.element_count as f64;
    }
    tracing::debug!(
        mismatches = report.mismatch_count,
        max_abs_diff = report.max_abs_diff,
        "compared result against golden"
    );
    report
}
