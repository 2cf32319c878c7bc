//! Joint distributions over two scales, drawn as overlaid contours.

use super::canvas::{BLACK, Canvas, LIGHT_GREY, Panel, Rect, Span, WHITE};
use super::colormap::Colormap;
use super::reference::reference_curve;
use super::{
    Annotations, Color, Dataset, Figure, LegendEntry, LegendLoc, PlotParameters, RenderError,
    RenderRequest,
};

const DPI: f64 = 100.0;
const MIN_INCHES: f64 = 1.0;
const MAX_INCHES: f64 = 50.0;
const DEFAULT_SIZE: (f64, f64) = (6.4, 4.8);
const DEFAULT_GRID_HEIGHT: f64 = 6.0;

const MARGIN_LEFT: i64 = 56;
const MARGIN_RIGHT: i64 = 16;
const MARGIN_TOP: i64 = 24;
const MARGIN_BOTTOM: i64 = 48;

/// Joint axes to marginal axes size ratio.
const RATIO: i64 = 5;
const SPACE: i64 = 4;

const LEVELS: usize = 6;
/// The contour level whose color stands for the dataset.
const LEGEND_LEVEL: usize = 2;

const TICKS: i64 = 5;
const TICK_LENGTH: i64 = 4;
const REFERENCE_SAMPLES: usize = 200;
const UNIT_LINE_DASH: usize = 6;

/// Contour plot of every dataset on one pair of axes, one colormap each,
/// optionally with the marginal distributions along both axes.
pub fn scales_dist_2d(request: &RenderRequest<'_>) -> anyhow::Result<Figure> {
    let datasets = request.datasets;
    let plot = request.plot;

    if datasets.is_empty() {
        return Err(RenderError::NoData.into());
    }

    if datasets.len() > Colormap::CYCLE.len() {
        return Err(RenderError::TooManyDatasets {
            max: Colormap::CYCLE.len(),
            found: datasets.len(),
        }
        .into());
    }

    let (width, height) = figure_size(plot)?;
    let mut canvas = Canvas::new(width, height);
    let layout = Layout::new(width as i64, height as i64, plot.add_marginal_distributions);

    let joint = Panel {
        rect: layout.joint,
        x: axis_span(plot.x_max, datasets.iter().flat_map(|d| d.field.coords(1))),
        y: axis_span(plot.y_max, datasets.iter().flat_map(|d| d.field.coords(0))),
    };

    draw_annotations(&mut canvas, &joint, &plot.annotations);

    let mut legend = Vec::with_capacity(datasets.len());

    for (dataset, cmap) in datasets.iter().zip(Colormap::CYCLE) {
        draw_contours(&mut canvas, &joint, dataset, cmap);
        legend.push(LegendEntry {
            label: dataset.label.clone(),
            color: cmap.level(LEGEND_LEVEL, LEVELS),
        });
    }

    if let Some((top, right)) = layout.marginals {
        draw_marginals(&mut canvas, &joint, top, right, datasets);
    }

    let sides = if plot.despine {
        [false, false, true, true]
    } else {
        [true; 4]
    };
    canvas.frame(joint.rect, sides, BLACK);
    draw_ticks(&mut canvas, joint.rect);
    draw_legend(&mut canvas, joint.rect, plot.legend_loc, &legend);

    Ok(Figure::new(canvas.into_image(), request.title(), legend))
}

/// Pixel size of the figure. With marginals the figure is a square grid of
/// the requested height.
fn figure_size(plot: &PlotParameters) -> Result<(u32, u32), RenderError> {
    let (w, h) = match (plot.fig_size, plot.add_marginal_distributions) {
        (Some((_, h)), true) => (h, h),
        (Some(size), false) => size,
        (None, true) => (DEFAULT_GRID_HEIGHT, DEFAULT_GRID_HEIGHT),
        (None, false) => DEFAULT_SIZE,
    };

    let valid = |inches: f64| (MIN_INCHES..=MAX_INCHES).contains(&inches);
    if !valid(w) || !valid(h) {
        return Err(RenderError::FigSize((w, h)));
    }

    Ok(((w * DPI).round() as u32, (h * DPI).round() as u32))
}

struct Layout {
    joint: Rect,
    /// Top and right marginal axes.
    marginals: Option<(Rect, Rect)>,
}

impl Layout {
    fn new(width: i64, height: i64, marginals: bool) -> Self {
        let area = Rect {
            x: MARGIN_LEFT,
            y: MARGIN_TOP,
            w: width - MARGIN_LEFT - MARGIN_RIGHT,
            h: height - MARGIN_TOP - MARGIN_BOTTOM,
        };

        if !marginals {
            return Self {
                joint: area,
                marginals: None,
            };
        }

        let joint_w = (area.w - SPACE) * RATIO / (RATIO + 1);
        let joint_h = (area.h - SPACE) * RATIO / (RATIO + 1);
        let side_w = area.w - SPACE - joint_w;
        let side_h = area.h - SPACE - joint_h;

        let joint = Rect {
            x: area.x,
            y: area.y + side_h + SPACE,
            w: joint_w,
            h: joint_h,
        };
        let top = Rect {
            x: area.x,
            y: area.y,
            w: joint_w,
            h: side_h,
        };
        let right = Rect {
            x: area.x + joint_w + SPACE,
            y: joint.y,
            w: side_w,
            h: joint_h,
        };

        Self {
            joint,
            marginals: Some((top, right)),
        }
    }
}

fn axis_span<'a>(limit: Option<f64>, coords: impl Iterator<Item = &'a f64>) -> Span {
    match limit {
        Some(max) => Span::new(0.0, max),
        None => Span::covering(coords.copied()).unwrap_or(Span::new(0.0, 1.0)),
    }
}

/// Draws iso-lines at evenly spaced levels between the field's extremes.
///
/// Every pixel of the panel is assigned the band its interpolated value falls
/// in; a pixel lies on a contour where its band differs from the one to its
/// right or below it.
fn draw_contours(canvas: &mut Canvas, panel: &Panel, dataset: &Dataset, cmap: Colormap) {
    let field = &dataset.field;

    let Some((lo, hi)) = field.min_max() else {
        return;
    };

    if lo >= hi {
        tracing::debug!("{} is flat, no contours drawn", dataset.label);
        return;
    }

    let levels: Vec<f64> = (1..=LEVELS)
        .map(|k| lo + (hi - lo) * k as f64 / (LEVELS + 1) as f64)
        .collect();

    let rect = panel.rect;
    let mut bands = Vec::with_capacity((rect.w * rect.h).max(0) as usize);

    for py in rect.y..rect.y + rect.h {
        for px in rect.x..rect.x + rect.w {
            let (x, y) = panel.to_data(px, py);
            let band = field
                .sample(y, x)
                .map(|value| levels.partition_point(|&level| level <= value));
            bands.push(band);
        }
    }

    let band_at = |px: i64, py: i64| -> Option<usize> {
        if !rect.contains(px, py) {
            return None;
        }
        bands[((py - rect.y) * rect.w + (px - rect.x)) as usize]
    };

    for py in rect.y..rect.y + rect.h {
        for px in rect.x..rect.x + rect.w {
            let Some(here) = band_at(px, py) else {
                continue;
            };

            let crossed = [(px + 1, py), (px, py + 1)]
                .into_iter()
                .filter_map(|(x, y)| band_at(x, y))
                .filter(|&band| band != here)
                .map(|band| band.max(here))
                .max();

            if let Some(band) = crossed {
                canvas.put(px, py, cmap.level(band - 1, LEVELS));
            }
        }
    }
}

/// Each marginal is drawn as a mid-step line: the value at a coordinate
/// covers half the distance to each neighbour.
fn draw_marginals(canvas: &mut Canvas, joint: &Panel, top: Rect, right: Rect, datasets: &[Dataset]) {
    let along_x: Vec<Vec<f64>> = datasets.iter().map(|d| d.field.sum_over(0)).collect();
    let along_y: Vec<Vec<f64>> = datasets.iter().map(|d| d.field.sum_over(1)).collect();

    let extent = |dists: &[Vec<f64>]| {
        Span::covering(dists.iter().flatten().copied().chain([0.0])).unwrap_or(Span::new(0.0, 1.0))
    };

    let top_panel = Panel {
        rect: top,
        x: joint.x,
        y: extent(&along_x),
    };
    let right_panel = Panel {
        rect: right,
        x: extent(&along_y),
        y: joint.y,
    };

    for (i, (dataset, cmap)) in datasets.iter().zip(Colormap::CYCLE).enumerate() {
        let color = cmap.level(LEGEND_LEVEL, LEVELS);

        let points: Vec<_> = steps_mid(dataset.field.coords(1), &along_x[i])
            .into_iter()
            .map(|(coord, value)| top_panel.to_pixel(coord, value))
            .collect();
        canvas.polyline(&points, color, top, None);

        let points: Vec<_> = steps_mid(dataset.field.coords(0), &along_y[i])
            .into_iter()
            .map(|(coord, value)| right_panel.to_pixel(value, coord))
            .collect();
        canvas.polyline(&points, color, right, None);
    }

    canvas.frame(top, [false, false, true, false], BLACK);
    canvas.frame(right, [false, false, false, true], BLACK);
}

fn steps_mid(coords: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    let n = coords.len().min(values.len());
    let mut points = Vec::with_capacity(2 * n);

    for i in 0..n {
        let left = if i == 0 {
            coords[0]
        } else {
            (coords[i - 1] + coords[i]) / 2.0
        };
        let right = if i + 1 == n {
            coords[i]
        } else {
            (coords[i] + coords[i + 1]) / 2.0
        };

        points.push((left, values[i]));
        points.push((right, values[i]));
    }

    points
}

fn draw_annotations(canvas: &mut Canvas, panel: &Panel, annotations: &Annotations) {
    if annotations.unit_line {
        // the part of y = x inside both spans
        let start = panel.x.lo.max(panel.y.lo);
        let end = panel.x.hi.min(panel.y.hi);

        if start < end {
            canvas.line(
                panel.to_pixel(start, start),
                panel.to_pixel(end, end),
                Color::GREY.rgba(),
                panel.rect,
                Some(UNIT_LINE_DASH),
            );
        }
    }

    if let Some(style) = &annotations.fp_reference {
        let points: Vec<_> = reference_curve(REFERENCE_SAMPLES)
            .into_iter()
            .map(|p| panel.to_pixel(p.planarity, p.filamentarity))
            .collect();

        canvas.polyline(&points, style.color.rgba(), panel.rect, None);
    }
}

fn draw_ticks(canvas: &mut Canvas, rect: Rect) {
    let bounds = canvas.bounds();

    for k in 0..TICKS {
        let x = rect.x + k * (rect.w - 1) / (TICKS - 1);
        let y = rect.bottom() - k * (rect.h - 1) / (TICKS - 1);
        canvas.line(
            (x, rect.bottom() + 1),
            (x, rect.bottom() + TICK_LENGTH),
            BLACK,
            bounds,
            None,
        );
        canvas.line((rect.x - TICK_LENGTH, y), (rect.x - 1, y), BLACK, bounds, None);
    }
}

const LEGEND_PAD: i64 = 6;
const LEGEND_ROW: i64 = 14;
const LEGEND_SWATCH: (i64, i64) = (20, 3);

fn legend_rect(panel: Rect, loc: LegendLoc, rows: usize) -> Rect {
    let w = 2 * LEGEND_PAD + LEGEND_SWATCH.0;
    let h = 2 * LEGEND_PAD + LEGEND_ROW * (rows as i64 - 1) + LEGEND_SWATCH.1;

    let left = panel.x + LEGEND_PAD;
    let right = panel.right() - LEGEND_PAD - w + 1;
    let center = panel.x + (panel.w - w) / 2;
    let upper = panel.y + LEGEND_PAD;
    let lower = panel.bottom() - LEGEND_PAD - h + 1;
    let middle = panel.y + (panel.h - h) / 2;

    let (x, y) = match loc {
        LegendLoc::Best | LegendLoc::UpperRight => (right, upper),
        LegendLoc::UpperLeft => (left, upper),
        LegendLoc::LowerLeft => (left, lower),
        LegendLoc::LowerRight => (right, lower),
        LegendLoc::Right | LegendLoc::CenterRight => (right, middle),
        LegendLoc::CenterLeft => (left, middle),
        LegendLoc::LowerCenter => (center, lower),
        LegendLoc::UpperCenter => (center, upper),
        LegendLoc::Center => (center, middle),
    };

    Rect { x, y, w, h }
}

fn draw_legend(canvas: &mut Canvas, panel: Rect, loc: LegendLoc, entries: &[LegendEntry]) {
    if entries.is_empty() {
        return;
    }

    let rect = legend_rect(panel, loc, entries.len());
    canvas.fill(rect, WHITE);
    canvas.frame(rect, [true; 4], LIGHT_GREY);

    for (row, entry) in entries.iter().enumerate() {
        let swatch = Rect {
            x: rect.x + LEGEND_PAD,
            y: rect.y + LEGEND_PAD + row as i64 * LEGEND_ROW,
            w: LEGEND_SWATCH.0,
            h: LEGEND_SWATCH.1,
        };
        canvas.fill(swatch, entry.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field2d;
    use crate::params;
    use crate::render::ReferenceStyle;
    use image::Rgba;

    fn bump(cx: f64, cy: f64) -> Field2d {
        let coords: Vec<f64> = (0..21).map(|i| i as f64 * 0.1).collect();
        Field2d::from_fn(("y", "x"), (coords.clone(), coords.clone()), |i, j| {
            let (x, y) = (coords[j], coords[i]);
            (-((x - cx).powi(2) + (y - cy).powi(2)) * 8.0).exp()
        })
        .unwrap()
    }

    fn flat() -> Field2d {
        Field2d::new(("y", "x"), (vec![0.0, 1.0], vec![0.0, 1.0]), vec![1.0; 4]).unwrap()
    }

    fn dataset(label: &str, field: Field2d) -> Dataset {
        Dataset {
            label: label.to_string(),
            field,
        }
    }

    fn render(datasets: &[Dataset], plot: &PlotParameters) -> anyhow::Result<Figure> {
        let global = params! { "bins" => 10 };
        scales_dist_2d(&RenderRequest {
            datasets,
            plot,
            global: &global,
        })
    }

    fn pixels(figure: &Figure) -> impl Iterator<Item = Rgba<u8>> + '_ {
        figure.canvas().pixels().copied()
    }

    #[test]
    fn test_default_size() {
        let figure = render(&[dataset("v1", bump(1.0, 1.0))], &PlotParameters::default()).unwrap();
        assert_eq!((figure.width(), figure.height()), (640, 480));
    }

    #[test]
    fn test_marginal_grid_is_square() {
        let plot = PlotParameters {
            add_marginal_distributions: true,
            fig_size: Some((8.0, 3.0)),
            ..Default::default()
        };

        let figure = render(&[dataset("v1", bump(1.0, 1.0))], &plot).unwrap();
        assert_eq!((figure.width(), figure.height()), (300, 300));
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let plot = PlotParameters::default();

        let err = render(&[], &plot).unwrap_err();
        assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::NoData)));

        let many: Vec<_> = (0..5).map(|i| dataset(&format!("v{i}"), flat())).collect();
        let err = render(&many, &plot).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::TooManyDatasets { max: 4, found: 5 })
        ));
    }

    #[test]
    fn test_rejects_silly_sizes() {
        for size in [(0.0, 4.0), (4.0, f64::NAN), (500.0, 4.0)] {
            let plot = PlotParameters {
                fig_size: Some(size),
                ..Default::default()
            };
            let err = render(&[dataset("v1", flat())], &plot).unwrap_err();
            assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::FigSize(_))));
        }
    }

    #[test]
    fn test_each_dataset_gets_its_colormap() {
        let datasets = [dataset("v1", bump(0.6, 0.6)), dataset("v2", bump(1.4, 1.4))];
        let figure = render(&datasets, &PlotParameters::default()).unwrap();

        for cmap in [Colormap::Blues, Colormap::Reds] {
            let colors: Vec<_> = (0..LEVELS).map(|l| cmap.level(l, LEVELS)).collect();
            assert!(pixels(&figure).any(|p| colors.contains(&p)), "{} missing", cmap.name());
        }

        let greens: Vec<_> = (0..LEVELS).map(|l| Colormap::Greens.level(l, LEVELS)).collect();
        assert!(!pixels(&figure).any(|p| greens.contains(&p)));
    }

    #[test]
    fn test_legend_follows_dataset_order() {
        let datasets = [dataset("b", flat()), dataset("a", flat())];
        let figure = render(&datasets, &PlotParameters::default()).unwrap();

        let legend = figure.legend();
        assert_eq!(legend[0].label, "b");
        assert_eq!(legend[0].color, Colormap::Blues.level(LEGEND_LEVEL, LEVELS));
        assert_eq!(legend[1].label, "a");
        assert_eq!(legend[1].color, Colormap::Reds.level(LEGEND_LEVEL, LEVELS));

        // swatches are drawn in the upper right corner
        let rect = legend_rect(Layout::new(640, 480, false).joint, LegendLoc::Best, 2);
        let swatch = (rect.x + LEGEND_PAD, rect.y + LEGEND_PAD + LEGEND_ROW);
        assert_eq!(
            *figure.canvas().get_pixel(swatch.0 as u32, swatch.1 as u32),
            legend[1].color
        );
    }

    #[test]
    fn test_legend_centered_placements() {
        let panel = Rect {
            x: 0,
            y: 0,
            w: 200,
            h: 100,
        };
        let rect = |loc| legend_rect(panel, loc, 1);

        let center = rect(LegendLoc::Center);
        assert!((center.x * 2 + center.w - panel.w).abs() <= 1);
        assert!((center.y * 2 + center.h - panel.h).abs() <= 1);

        assert_eq!(rect(LegendLoc::Right), rect(LegendLoc::CenterRight));
        assert_eq!(rect(LegendLoc::CenterRight).y, center.y);
        assert_eq!(rect(LegendLoc::CenterRight).x, rect(LegendLoc::UpperRight).x);
        assert_eq!(rect(LegendLoc::CenterLeft).x, rect(LegendLoc::UpperLeft).x);
        assert_eq!(rect(LegendLoc::UpperCenter).x, center.x);
        assert_eq!(rect(LegendLoc::UpperCenter).y, rect(LegendLoc::UpperLeft).y);
        assert_eq!(rect(LegendLoc::LowerCenter).y, rect(LegendLoc::LowerLeft).y);

        let datasets = [dataset("v1", flat())];
        let plot = PlotParameters {
            legend_loc: LegendLoc::CenterLeft,
            ..Default::default()
        };
        let figure = render(&datasets, &plot).unwrap();

        let rect = legend_rect(Layout::new(640, 480, false).joint, LegendLoc::CenterLeft, 1);
        let swatch = (rect.x + LEGEND_PAD, rect.y + LEGEND_PAD);
        assert_eq!(
            *figure.canvas().get_pixel(swatch.0 as u32, swatch.1 as u32),
            figure.legend()[0].color
        );
    }

    #[test]
    fn test_title() {
        let datasets = [dataset("v1", flat())];

        let figure = render(&datasets, &PlotParameters::default()).unwrap();
        assert_eq!(figure.title(), "bins: 10");

        let plot = PlotParameters {
            title: Some("Cloud sizes".into()),
            ..Default::default()
        };
        let figure = render(&datasets, &plot).unwrap();
        assert_eq!(figure.title(), "Cloud sizes");
    }

    #[test]
    fn test_despine_removes_top_and_right() {
        let joint = Layout::new(640, 480, false).joint;
        let datasets = [dataset("v1", flat())];

        let framed = render(&datasets, &PlotParameters::default()).unwrap();
        let despined = render(
            &datasets,
            &PlotParameters {
                despine: true,
                legend_loc: LegendLoc::LowerLeft,
                ..Default::default()
            },
        )
        .unwrap();

        let top = (joint.x as u32 + 100, joint.y as u32);
        let right = (joint.right() as u32, joint.y as u32 + 100);
        let bottom = (joint.x as u32 + 100, joint.bottom() as u32);

        assert_eq!(*framed.canvas().get_pixel(top.0, top.1), BLACK);
        assert_eq!(*framed.canvas().get_pixel(right.0, right.1), BLACK);
        assert_eq!(*despined.canvas().get_pixel(top.0, top.1), WHITE);
        assert_eq!(*despined.canvas().get_pixel(right.0, right.1), WHITE);
        assert_eq!(*despined.canvas().get_pixel(bottom.0, bottom.1), BLACK);
    }

    #[test]
    fn test_annotations_are_drawn() {
        let datasets = [dataset("v1", flat())];
        let plot = PlotParameters {
            x_max: Some(1.0),
            y_max: Some(1.0),
            annotations: Annotations {
                unit_line: true,
                fp_reference: Some(ReferenceStyle {
                    color: Color([1, 2, 3]),
                }),
            },
            ..Default::default()
        };

        let figure = render(&datasets, &plot).unwrap();
        assert!(pixels(&figure).any(|p| p == Color::GREY.rgba()));
        assert!(pixels(&figure).any(|p| p == Rgba([1, 2, 3, 255])));

        let bare = render(&datasets, &PlotParameters::default()).unwrap();
        assert!(!pixels(&bare).any(|p| p == Color::GREY.rgba()));
    }

    #[test]
    fn test_marginals_drawn_above_and_right() {
        let plot = PlotParameters {
            add_marginal_distributions: true,
            ..Default::default()
        };
        let figure = render(&[dataset("v1", bump(1.0, 1.0))], &plot).unwrap();
        let (top, right) = Layout::new(600, 600, true).marginals.unwrap();
        let color = Colormap::Blues.level(LEGEND_LEVEL, LEVELS);

        let inside = |rect: Rect| {
            (rect.y..rect.y + rect.h).any(|y| {
                (rect.x..rect.x + rect.w)
                    .any(|x| *figure.canvas().get_pixel(x as u32, y as u32) == color)
            })
        };

        assert!(inside(top));
        assert!(inside(right));
    }

    #[test]
    fn test_steps_mid() {
        let points = steps_mid(&[0.0, 1.0, 3.0], &[5.0, 6.0, 7.0]);
        assert_eq!(
            points,
            vec![
                (0.0, 5.0),
                (0.5, 5.0),
                (0.5, 6.0),
                (2.0, 6.0),
                (2.0, 7.0),
                (3.0, 7.0)
            ]
        );
    }

    #[test]
    fn test_png_encoding() {
        let figure = render(&[dataset("v1", flat())], &PlotParameters::default()).unwrap();
        let mut buffer = Vec::new();
        figure.write_png(&mut buffer).unwrap();
        assert_eq!(&buffer[..8], b"\x89PNG\r\n\x1a\n");
    }
}
