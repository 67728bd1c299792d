//! CPU accumulation surface standing in for the offscreen shadow target.
//!
//! Stores per-pixel alpha coverage; the host uploads the finished surface as
//! a texture. Out-of-bounds reads are zero.
/// A single-channel alpha surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSurface {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ShadowSurface {
    /// Create a new surface initialized to zero coverage.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn get(&self, ix: isize, iy: isize) -> f32 {
        if ix < 0 || iy < 0 || ix >= self.width as isize || iy >= self.height as isize {
            return 0.0;
        }
        self.data[iy as usize * self.width + ix as usize]
    }

    pub fn set(&mut self, ix: usize, iy: usize, value: f32) {
        if ix < self.width && iy < self.height {
            self.data[iy * self.width + ix] = value;
        }
    }

    /// Max-combines a value into a pixel (opaque silhouette accumulation).
    pub fn accumulate_max(&mut self, ix: isize, iy: isize, value: f32) {
        if ix < 0 || iy < 0 || ix >= self.width as isize || iy >= self.height as isize {
            return;
        }
        let i = iy as usize * self.width + ix as usize;
        if value > self.data[i] {
            self.data[i] = value;
        }
    }

    /// Max-combines an entire source surface at an integer pixel offset.
    pub fn splat_max(&mut self, source: &ShadowSurface, dx: isize, dy: isize) {
        for sy in 0..source.height {
            for sx in 0..source.width {
                let v = source.data[sy * source.width + sx];
                if v > 0.0 {
                    self.accumulate_max(sx as isize + dx, sy as isize + dy, v);
                }
            }
        }
    }

    /// Multiplies every pixel by `factor` (final alpha blend).
    pub fn scale_alpha(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Gaussian-style blur approximated by three separable box passes.
    ///
    /// `radius` is in pixels; radii below half a pixel are a no-op.
    pub fn blur(&mut self, radius: f32) {
        if !(radius.is_finite()) || radius < 0.5 || self.width == 0 || self.height == 0 {
            return;
        }
        // Box width approximating a Gaussian of sigma = radius / 2 over
        // three passes.
        let sigma = radius * 0.5;
        let ideal = (12.0 * sigma * sigma / 3.0 + 1.0).sqrt();
        let r = (((ideal - 1.0) / 2.0).round() as isize).max(1) as usize;
        for _ in 0..3 {
            self.box_blur_pass(r);
        }
    }

    fn box_blur_pass(&mut self, r: usize) {
        let w = self.width;
        let h = self.height;
        let norm = 1.0 / (2 * r + 1) as f32;

        // Horizontal.
        let mut row = vec![0.0f32; w];
        for y in 0..h {
            let base = y * w;
            let mut sum: f32 = 0.0;
            for x in 0..=r.min(w.saturating_sub(1)) {
                sum += self.data[base + x];
            }
            for x in 0..w {
                row[x] = sum * norm;
                let add = x + r + 1;
                if add < w {
                    sum += self.data[base + add];
                }
                if x >= r {
                    sum -= self.data[base + x - r];
                }
            }
            self.data[base..base + w].copy_from_slice(&row);
        }

        // Vertical.
        let mut col = vec![0.0f32; h];
        for x in 0..w {
            let mut sum: f32 = 0.0;
            for y in 0..=r.min(h.saturating_sub(1)) {
                sum += self.data[y * w + x];
            }
            for y in 0..h {
                col[y] = sum * norm;
                let add = y + r + 1;
                if add < h {
                    sum += self.data[add * w + x];
                }
                if y >= r {
                    sum -= self.data[(y - r) * w + x];
                }
            }
            for y in 0..h {
                self.data[y * w + x] = col[y];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_outside_bounds_return_zero() {
        let surface = ShadowSurface::new(4, 4);
        assert_eq!(surface.get(-1, 0), 0.0);
        assert_eq!(surface.get(0, 99), 0.0);
    }

    #[test]
    fn splat_max_keeps_the_larger_value() {
        let mut target = ShadowSurface::new(4, 4);
        target.set(1, 1, 0.9);
        let mut source = ShadowSurface::new(2, 2);
        source.set(0, 0, 0.5);
        source.set(1, 0, 1.0);
        target.splat_max(&source, 1, 1);
        assert_eq!(target.get(1, 1), 0.9);
        assert_eq!(target.get(2, 1), 1.0);
    }

    #[test]
    fn blur_spreads_coverage_and_stays_bounded() {
        let mut surface = ShadowSurface::new(11, 11);
        surface.set(5, 5, 1.0);
        surface.blur(4.0);
        assert!(surface.get(5, 5) > 0.0);
        assert!(surface.get(4, 5) > 0.0);
        assert!(surface.data.iter().all(|v| (0.0..=1.0).contains(v)));
        // Edge windows truncate, so the impulse keeps most of its mass but
        // never gains any.
        let total: f32 = surface.data.iter().sum();
        assert!(total <= 1.0 + 1e-3);
        assert!(total > 0.9);
    }

    #[test]
    fn tiny_radius_is_a_no_op() {
        let mut surface = ShadowSurface::new(4, 4);
        surface.set(2, 2, 1.0);
        let before = surface.clone();
        surface.blur(0.25);
        assert_eq!(surface, before);
    }
}
