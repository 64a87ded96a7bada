/// Borrowed 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl<'a> GrayImageView<'a> {
    /// Wrap a raw row-major buffer. Returns `None` when the length does not
    /// match `width * height`.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> f32 {
    // Clamp to the border so that samples near the edge do not pull towards black.
    let xc = x.clamp(0, src.width as i32 - 1) as usize;
    let yc = y.clamp(0, src.height as i32 - 1) as usize;
    src.data[yc * src.width + xc] as f32
}

/// Bilinear intensity sample at a fractional pixel position.
///
/// Pixel centers sit on integer coordinates. Positions outside the image are
/// clamped to the nearest border pixel.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    if src.width == 0 || src.height == 0 {
        return 0.0;
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0);
    let p10 = get_gray(src, x0 + 1, y0);
    let p01 = get_gray(src, x0, y0 + 1);
    let p11 = get_gray(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}
