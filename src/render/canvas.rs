use image::{Rgba, RgbaImage};

pub(crate) const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub(crate) const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub(crate) const LIGHT_GREY: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Closed interval of data values mapped onto one side of a panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Span {
    pub lo: f64,
    pub hi: f64,
}

impl Span {
    /// Orders the bounds and widens degenerate spans so they can always be
    /// mapped.
    pub fn new(lo: f64, hi: f64) -> Self {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        if lo < hi {
            Self { lo, hi }
        } else {
            Self {
                lo: lo - 0.5,
                hi: hi + 0.5,
            }
        }
    }

    /// Smallest span covering every value, `None` for no finite values.
    pub fn covering(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .map(|(lo, hi)| Self::new(lo, hi))
    }

    fn fraction(&self, value: f64) -> f64 {
        (value - self.lo) / (self.hi - self.lo)
    }

    fn at(&self, fraction: f64) -> f64 {
        self.lo + fraction * (self.hi - self.lo)
    }
}

/// Pixel rectangle, `x..x + w` by `y..y + h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Rect {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }

    pub fn right(&self) -> i64 {
        self.x + self.w - 1
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.h - 1
    }
}

/// A rectangle of the canvas with data spans on both axes. Data `y` grows
/// upwards, pixel `y` downwards.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Panel {
    pub rect: Rect,
    pub x: Span,
    pub y: Span,
}

impl Panel {
    pub fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let px = self.rect.x as f64 + self.x.fraction(x) * (self.rect.w - 1) as f64;
        let py = self.rect.bottom() as f64 - self.y.fraction(y) * (self.rect.h - 1) as f64;
        (px.round() as i64, py.round() as i64)
    }

    /// Data coordinates at the center of pixel `(px, py)`.
    pub fn to_data(&self, px: i64, py: i64) -> (f64, f64) {
        let fx = (px - self.rect.x) as f64 / (self.rect.w - 1).max(1) as f64;
        let fy = (self.rect.bottom() - py) as f64 / (self.rect.h - 1).max(1) as f64;
        (self.x.at(fx), self.y.at(fy))
    }
}

pub(crate) struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, WHITE),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            w: self.image.width() as i64,
            h: self.image.height() as i64,
        }
    }

    pub fn put(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        self.image.put_pixel(x as u32, y as u32, color);
    }

    pub fn fill(&mut self, rect: Rect, color: Rgba<u8>) {
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                self.put(x, y, color);
            }
        }
    }

    /// Bresenham line, limited to `clip`. Every `dash` pixels the pen is
    /// lifted for as many pixels, `None` draws a solid line.
    pub fn line(
        &mut self,
        from: (i64, i64),
        to: (i64, i64),
        color: Rgba<u8>,
        clip: Rect,
        dash: Option<usize>,
    ) {
        let Some((from, to)) = clip_segment(from, to, clip) else {
            return;
        };

        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0usize;

        loop {
            let pen_down = dash.is_none_or(|dash| (step / dash) % 2 == 0);
            if pen_down && clip.contains(x, y) {
                self.put(x, y, color);
            }

            if (x, y) == to {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }

    pub fn polyline(
        &mut self,
        points: &[(i64, i64)],
        color: Rgba<u8>,
        clip: Rect,
        dash: Option<usize>,
    ) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color, clip, dash);
        }
    }

    /// Draws the sides of `rect` that are switched on, in the order
    /// top, right, bottom, left.
    pub fn frame(&mut self, rect: Rect, sides: [bool; 4], color: Rgba<u8>) {
        let (l, t, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());
        let [top, right, bottom, left] = sides;

        if top {
            self.line((l, t), (r, t), color, rect, None);
        }
        if right {
            self.line((r, t), (r, b), color, rect, None);
        }
        if bottom {
            self.line((l, b), (r, b), color, rect, None);
        }
        if left {
            self.line((l, t), (l, b), color, rect, None);
        }
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Liang-Barsky clipping of a segment against `rect`.
fn clip_segment(from: (i64, i64), to: (i64, i64), rect: Rect) -> Option<((i64, i64), (i64, i64))> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);

    let edges = [
        (-dx, x0 - rect.x as f64),
        (dx, rect.right() as f64 - x0),
        (-dy, y0 - rect.y as f64),
        (dy, rect.bottom() as f64 - y0),
    ];

    let (mut t0, mut t1) = (0.0f64, 1.0f64);

    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }

    if t0 > t1 {
        return None;
    }

    let at = |t: f64| ((x0 + t * dx).round() as i64, (y0 + t * dy).round() as i64);
    Some((at(t0), at(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn test_span_widens_degenerate() {
        assert_eq!(Span::new(1.0, 1.0), Span { lo: 0.5, hi: 1.5 });
        assert_eq!(
            Span::covering([3.0, f64::NAN, -1.0]),
            Some(Span { lo: -1.0, hi: 3.0 })
        );
        assert_eq!(Span::covering([f64::NAN]), None);
    }

    #[test]
    fn test_panel_mapping_is_flipped_vertically() {
        let panel = Panel {
            rect: Rect { x: 10, y: 10, w: 101, h: 51 },
            x: Span::new(0.0, 1.0),
            y: Span::new(0.0, 1.0),
        };

        assert_eq!(panel.to_pixel(0.0, 0.0), (10, 60));
        assert_eq!(panel.to_pixel(1.0, 1.0), (110, 10));

        let (x, y) = panel.to_data(60, 35);
        assert!((x - 0.5).abs() < 1e-9);
        assert!((y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_line_reaches_both_ends() {
        let mut canvas = Canvas::new(20, 20);
        let clip = canvas.bounds();
        canvas.line((2, 3), (17, 11), RED, clip, None);

        let image = canvas.into_image();
        assert_eq!(*image.get_pixel(2, 3), RED);
        assert_eq!(*image.get_pixel(17, 11), RED);
    }

    #[test]
    fn test_line_respects_clip() {
        let mut canvas = Canvas::new(20, 20);
        let clip = Rect { x: 0, y: 0, w: 10, h: 20 };
        canvas.line((0, 5), (19, 5), RED, clip, None);

        let image = canvas.into_image();
        assert_eq!(*image.get_pixel(9, 5), RED);
        assert_eq!(*image.get_pixel(10, 5), WHITE);
    }

    #[test]
    fn test_far_away_segments_are_clipped() {
        let mut canvas = Canvas::new(10, 10);
        let clip = canvas.bounds();
        canvas.line((-1_000_000_000, 5), (1_000_000_000, 5), RED, clip, None);
        canvas.line((-50, -50), (-10, 40), RED, clip, None);

        let image = canvas.into_image();
        assert_eq!(*image.get_pixel(0, 5), RED);
        assert_eq!(*image.get_pixel(9, 5), RED);
        assert_eq!(*image.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn test_dashed_line_has_gaps() {
        let mut canvas = Canvas::new(20, 1);
        let clip = canvas.bounds();
        canvas.line((0, 0), (19, 0), RED, clip, Some(4));

        let image = canvas.into_image();
        assert_eq!(*image.get_pixel(0, 0), RED);
        assert_eq!(*image.get_pixel(4, 0), WHITE);
        assert_eq!(*image.get_pixel(8, 0), RED);
    }
}
