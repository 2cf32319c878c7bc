//! Rendering of comparison figures.
//!
//! A renderer is a pure function from a [`RenderRequest`] to an owned
//! [`Figure`]. Nothing is shared between invocations: every call allocates its
//! own canvas, so renderers can run on any thread.
//!
//! Text is not rasterized. The title and legend labels travel with the
//! [`Figure`] as metadata while the legend swatches and everything else are
//! drawn.

mod canvas;
mod colormap;
pub mod reference;
mod scales;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::Field2d;
use crate::params::{Params, Value};

pub use colormap::Colormap;
pub use scales::scales_dist_2d;

/// Rendering function signature accepted by the dispatcher.
pub type RenderFn = fn(&RenderRequest<'_>) -> anyhow::Result<Figure>;

/// Errors raised by the built-in renderers.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Nothing to render, no datasets were given")]
    NoData,

    #[error("At most {max} datasets can be compared in one figure, got {found}")]
    TooManyDatasets { max: usize, found: usize },

    #[error("Figure size {0:?} is out of range")]
    FigSize((f64, f64)),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// One labeled input of a comparison.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub label: String,
    pub field: Field2d,
}

/// Everything a renderer gets to see.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub datasets: &'a [Dataset],
    pub plot: &'a PlotParameters,
    /// Only used to generate a default title.
    pub global: &'a Params,
}

impl RenderRequest<'_> {
    pub fn title(&self) -> String {
        self.plot
            .title
            .clone()
            .unwrap_or_else(|| default_title(self.global))
    }
}

/// Plot options read by the built-in renderers.
///
/// Unrecognized keys are kept in `extra` and handed through untouched, so
/// custom renderers can pick up options of their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPlotParameters")]
pub struct PlotParameters {
    pub add_marginal_distributions: bool,
    /// Width and height in inches, at 100 dots per inch. With marginal
    /// distributions the figure is square and only the height is used.
    ///
    /// Read from `fig_size`, `figsize` or `fig_params.figsize`, in that
    /// order of precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fig_size: Option<(f64, f64)>,
    /// Upper limit of the x axis; the axis then starts at zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_max: Option<f64>,
    /// Upper limit of the y axis; the axis then starts at zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
    /// Replaces [`default_title`]. The title is carried by the [`Figure`]
    /// returned from a renderer but is neither drawn nor written to the PNG,
    /// so changing it alone leaves the output file unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub legend_loc: LegendLoc,
    /// Drop the top and right spines of the joint axes.
    pub despine: bool,
    pub annotations: Annotations,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The accepted input layout of [`PlotParameters`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlotParameters {
    add_marginal_distributions: bool,
    #[serde(alias = "figsize")]
    fig_size: Option<(f64, f64)>,
    fig_params: Option<FigParams>,
    x_max: Option<f64>,
    y_max: Option<f64>,
    title: Option<String>,
    legend_loc: LegendLoc,
    despine: bool,
    annotations: Annotations,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Figure options nested under `fig_params`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FigParams {
    figsize: Option<(f64, f64)>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl From<RawPlotParameters> for PlotParameters {
    fn from(raw: RawPlotParameters) -> Self {
        let fig_params = raw.fig_params.unwrap_or_default();
        let mut extra = raw.extra;

        // whatever else was nested there stays available to custom renderers
        if !fig_params.rest.is_empty() {
            extra.insert("fig_params".to_string(), Value::Map(fig_params.rest));
        }

        Self {
            add_marginal_distributions: raw.add_marginal_distributions,
            fig_size: raw.fig_size.or(fig_params.figsize),
            x_max: raw.x_max,
            y_max: raw.y_max,
            title: raw.title,
            legend_loc: raw.legend_loc,
            despine: raw.despine,
            annotations: raw.annotations,
            extra,
        }
    }
}

/// Legend placement inside the joint axes, named as in matplotlib.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegendLoc {
    /// Resolved to the upper right corner.
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "upper right")]
    UpperRight,
    #[serde(rename = "upper left")]
    UpperLeft,
    #[serde(rename = "lower left")]
    LowerLeft,
    #[serde(rename = "lower right")]
    LowerRight,
    /// Same placement as `center right`.
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "center left")]
    CenterLeft,
    #[serde(rename = "center right")]
    CenterRight,
    #[serde(rename = "lower center")]
    LowerCenter,
    #[serde(rename = "upper center")]
    UpperCenter,
    #[serde(rename = "center")]
    Center,
}

/// Optional overlays drawn beneath the data.
///
/// Accepts either a list of names or a mapping from name to options, so both
/// `["unit_line"]` and `{"filamentarity_planarity_reference": {"color": "grey"}}`
/// are valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnnotations", into = "RawAnnotations")]
pub struct Annotations {
    /// Dashed `y = x` line.
    pub unit_line: bool,
    /// Spheroid reference curve in (planarity, filamentarity) space.
    pub fp_reference: Option<ReferenceStyle>,
}

const UNIT_LINE: &str = "unit_line";
const FP_REFERENCE: &str = "filamentarity_planarity_reference";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAnnotations {
    List(Vec<String>),
    Map(BTreeMap<String, serde_json::Value>),
}

impl TryFrom<RawAnnotations> for Annotations {
    type Error = String;

    fn try_from(raw: RawAnnotations) -> Result<Self, Self::Error> {
        let entries: Vec<(String, serde_json::Value)> = match raw {
            RawAnnotations::List(names) => names
                .into_iter()
                .map(|name| (name, serde_json::Value::Null))
                .collect(),
            RawAnnotations::Map(map) => map.into_iter().collect(),
        };

        let mut annotations = Annotations::default();

        for (name, options) in entries {
            match name.as_str() {
                UNIT_LINE => annotations.unit_line = true,
                FP_REFERENCE => {
                    // anything that is not an options mapping means defaults
                    let style = match options {
                        serde_json::Value::Object(_) => serde_json::from_value(options)
                            .map_err(|e| format!("invalid options for {FP_REFERENCE}: {e}"))?,
                        _ => ReferenceStyle::default(),
                    };
                    annotations.fp_reference = Some(style);
                }
                other => return Err(format!("unknown annotation '{other}'")),
            }
        }

        Ok(annotations)
    }
}

impl From<Annotations> for RawAnnotations {
    fn from(annotations: Annotations) -> Self {
        let mut map = BTreeMap::new();

        if annotations.unit_line {
            map.insert(UNIT_LINE.to_string(), serde_json::Value::Null);
        }

        if let Some(style) = annotations.fp_reference {
            let options = serde_json::to_value(style).unwrap_or(serde_json::Value::Null);
            map.insert(FP_REFERENCE.to_string(), options);
        }

        RawAnnotations::Map(map)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceStyle {
    pub color: Color,
}

/// An opaque RGB color, written as a name or `#rrggbb`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);
    pub const GREY: Color = Color([128, 128, 128]);

    pub(crate) fn rgba(self) -> Rgba<u8> {
        let [r, g, b] = self.0;
        Rgba([r, g, b, 255])
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let named = match s {
            "black" | "k" => Some([0, 0, 0]),
            "white" | "w" => Some([255, 255, 255]),
            "grey" | "gray" => Some([128, 128, 128]),
            "red" | "r" => Some([214, 39, 40]),
            "green" | "g" => Some([44, 160, 44]),
            "blue" | "b" => Some([31, 119, 180]),
            "orange" => Some([255, 127, 14]),
            _ => None,
        };

        if let Some(rgb) = named {
            return Ok(Color(rgb));
        }

        let hex = s
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.is_ascii())
            .ok_or_else(|| format!("unknown color '{s}'"))?;

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("unknown color '{s}'"))
        };

        Ok(Color([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        let [r, g, b] = color.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// A legend entry: the label of a dataset and the color it was drawn in.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgba<u8>,
}

/// A rendered figure, owned by the caller.
#[derive(Clone)]
pub struct Figure {
    canvas: RgbaImage,
    title: String,
    legend: Vec<LegendEntry>,
}

impl Figure {
    pub fn new(canvas: RgbaImage, title: String, legend: Vec<LegendEntry>) -> Self {
        Self {
            canvas,
            title,
            legend,
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn legend(&self) -> &[LegendEntry] {
        &self.legend
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Encodes the figure as PNG.
    pub fn write_png(&self, writer: impl Write) -> Result<(), RenderError> {
        image::codecs::png::PngEncoder::new(writer).write_image(
            &self.canvas,
            self.canvas.width(),
            self.canvas.height(),
            ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}

impl fmt::Debug for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Figure")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("title", &self.title)
            .field("legend", &self.legend)
            .finish()
    }
}

/// `"key: value, key: value"` over the global parameters, wrapped at 100
/// columns. Keys appear in sorted order, the order [`Params`] keeps them in.
pub fn default_title(global: &Params) -> String {
    let line: Vec<_> = global.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    wrap(&line.join(", "), 100)
}

/// Greedy word wrap. Words longer than `width` are broken into pieces.
fn wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut len = 0;

    let pieces = text.split_whitespace().flat_map(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(width.max(1))
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
    });

    for piece in pieces {
        let piece_len = piece.chars().count();

        if len > 0 && len + 1 + piece_len > width {
            lines.push(std::mem::take(&mut current));
            len = 0;
        }

        if len > 0 {
            current.push(' ');
            len += 1;
        }
        current.push_str(&piece);
        len += piece_len;
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}
