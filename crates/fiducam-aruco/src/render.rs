use crate::Dictionary;
use image::{GrayImage, Luma};

/// Render marker `id` as black-on-white cells of `cell_px` pixels, with a
/// one-cell black border and `quiet_cells` cells of white margin.
///
/// Returns `None` for an unknown id or a zero cell size.
pub fn render_marker(dict: &Dictionary, id: u32, cell_px: u32, quiet_cells: u32) -> Option<GrayImage> {
    if cell_px == 0 || id as usize >= dict.len() {
        return None;
    }
    let cells = dict.marker_size as u32 + 2;
    let side = (cells + 2 * quiet_cells) * cell_px;

    Some(GrayImage::from_fn(side, side, |x, y| {
        let (cx, cy) = (x / cell_px, y / cell_px);
        if cx < quiet_cells || cy < quiet_cells || cx >= quiet_cells + cells || cy >= quiet_cells + cells {
            return Luma([255]);
        }
        let (mx, my) = (cx - quiet_cells, cy - quiet_cells);
        let black = if mx == 0 || my == 0 || mx + 1 == cells || my + 1 == cells {
            true
        } else {
            dict.bit(id, (mx - 1) as usize, (my - 1) as usize).unwrap_or(false)
        };
        Luma([if black { 0 } else { 255 }])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarkerDictionary;

    #[test]
    fn layout_has_quiet_zone_border_and_payload() {
        let dict = MarkerDictionary::ArucoOriginal.dictionary();
        let img = render_marker(&dict, 0, 4, 2).expect("render");
        assert_eq!(img.dimensions(), (44, 44));
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        // Border ring starts after two quiet cells.
        assert_eq!(img.get_pixel(8, 8).0[0], 0);
        assert_eq!(img.get_pixel(35, 20).0[0], 0);
        // id 0: first payload column is white, the rest black.
        assert_eq!(img.get_pixel(13, 13).0[0], 255);
        assert_eq!(img.get_pixel(17, 13).0[0], 0);
    }

    #[test]
    fn rejects_unknown_ids() {
        let dict = MarkerDictionary::ArucoOriginal.dictionary();
        assert!(render_marker(&dict, 1024, 10, 1).is_none());
        assert!(render_marker(&dict, 3, 0, 1).is_none());
    }
}
