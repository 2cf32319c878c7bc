use image::Rgba;

/// Sequential colormaps assigned to datasets in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Blues,
    Reds,
    Greens,
    Oranges,
}

impl Colormap {
    pub const CYCLE: [Colormap; 4] = [
        Colormap::Blues,
        Colormap::Reds,
        Colormap::Greens,
        Colormap::Oranges,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Colormap::Blues => "Blues",
            Colormap::Reds => "Reds",
            Colormap::Greens => "Greens",
            Colormap::Oranges => "Oranges",
        }
    }

    fn anchors(self) -> [[u8; 3]; 3] {
        match self {
            Colormap::Blues => [[247, 251, 255], [107, 174, 214], [8, 48, 107]],
            Colormap::Reds => [[255, 245, 240], [251, 106, 74], [103, 0, 13]],
            Colormap::Greens => [[247, 252, 245], [116, 196, 118], [0, 68, 27]],
            Colormap::Oranges => [[255, 245, 235], [253, 141, 60], [127, 39, 4]],
        }
    }

    /// Color at `t`, clamped to `[0, 1]`, from light to dark.
    pub fn at(self, t: f64) -> Rgba<u8> {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let [light, mid, dark] = self.anchors();

        let (from, to, s) = if t < 0.5 {
            (light, mid, t * 2.0)
        } else {
            (mid, dark, (t - 0.5) * 2.0)
        };

        let mix = |i: usize| (from[i] as f64 + (to[i] as f64 - from[i] as f64) * s).round() as u8;
        Rgba([mix(0), mix(1), mix(2), 255])
    }

    /// Color of contour level `level` out of `levels`. The lightest end of
    /// the map is skipped so every level stays visible on white.
    pub fn level(self, level: usize, levels: usize) -> Rgba<u8> {
        let t = if levels > 1 {
            level as f64 / (levels - 1) as f64
        } else {
            1.0
        };
        self.at(0.3 + 0.7 * t)
    }
}
