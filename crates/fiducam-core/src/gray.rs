/// Borrowed single-channel image with bounds-checked pixel access.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl<'a> From<&'a ::image::GrayImage> for GrayImageView<'a> {
    fn from(img: &'a ::image::GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw(),
        }
    }
}

impl GrayImageView<'_> {
    /// Pixel value, or `None` outside the image.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }
}
