/// Summed-area table over a `width`×`height` grid of values.
pub(crate) struct SummedAreaTable {
    width: usize,
    sums: Vec<f64>,
}

impl SummedAreaTable {
    pub(crate) fn from_fn(width: u32, height: u32, value: impl Fn(u32, u32) -> f64) -> Self {
        let stride = width as usize + 1;
        let mut sums = vec![0.0f64; stride * (height as usize + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(x, y);
                let idx = (y as usize + 1) * stride + x as usize + 1;
                sums[idx] = sums[idx - stride] + row;
            }
        }
        Self {
            width: width as usize,
            sums,
        }
    }

    /// Sum of the values in the `w`×`h` window at (`x`, `y`).
    pub(crate) fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let stride = self.width + 1;
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        self.sums[y1 * stride + x1] - self.sums[y0 * stride + x1] - self.sums[y1 * stride + x0]
            + self.sums[y0 * stride + x0]
    }
}
