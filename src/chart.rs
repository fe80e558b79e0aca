//! 四半期トレンドの折れ線グラフを SVG として書き出す。
//!
//! 描画は「図のサイズ (inch) × 100」の論理座標で行い、`width`/`height` 属性だけを
//! inch × DPI のピクセル数にする。
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::model::{Sentiment, TrendRow, YearRange};

pub const DEFAULT_TITLE_TEMPLATE: &str = "{topic} Sentiment Trends ({start}-{end})";

const UNITS_PER_INCH: f64 = 100.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_BOTTOM: f64 = 110.0;
const MARKER_SIZE: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Marker {
    Circle,
    Square,
    Triangle,
}

impl FromStr for Marker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "o" => Ok(Self::Circle),
            "s" => Ok(Self::Square),
            "^" => Ok(Self::Triangle),
            other => bail!("unsupported marker {other:?}, expected one of o, s, ^"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartConfig {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
    pub title_template: String,
    pub colors: BTreeMap<Sentiment, String>,
    pub markers: BTreeMap<Sentiment, Marker>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width_in: 14.0,
            height_in: 8.0,
            dpi: 300,
            title_template: DEFAULT_TITLE_TEMPLATE.to_string(),
            colors: BTreeMap::from([
                (Sentiment::Positive, "#2E8B57".to_string()),
                (Sentiment::Negative, "#DC143C".to_string()),
                (Sentiment::Neutral, "#4682B4".to_string()),
            ]),
            markers: BTreeMap::from([
                (Sentiment::Positive, Marker::Circle),
                (Sentiment::Negative, Marker::Square),
                (Sentiment::Neutral, Marker::Triangle),
            ]),
        }
    }
}

impl ChartConfig {
    #[must_use]
    pub fn color(&self, sentiment: Sentiment) -> &str {
        self.colors.get(&sentiment).map_or("#000000", String::as_str)
    }

    #[must_use]
    pub fn marker(&self, sentiment: Sentiment) -> Marker {
        self.markers.get(&sentiment).copied().unwrap_or(Marker::Circle)
    }

    /// Expands `{topic}`, `{start}` and `{end}` in the title template.
    #[must_use]
    pub fn title(&self, topic: &str, range: YearRange) -> String {
        self.title_template
            .replace("{topic}", &title_case(topic))
            .replace("{start}", &range.start.to_string())
            .replace("{end}", &range.end.to_string())
    }

    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = f64::from(self.dpi);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let px = |inches: f64| (inches * dpi).round() as u32;
        (px(self.width_in), px(self.height_in))
    }
}

/// Capitalises the first letter of every word and lowercases the rest.
#[must_use]
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if prev_alpha {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        prev_alpha = ch.is_alphabetic();
    }
    out
}

/// e.g. `nuclear_power_sentiment_trend_2024_2025_by_quarter.svg`
#[must_use]
pub fn chart_file_name(topic: &str, range: YearRange) -> String {
    let snake = topic
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "{snake}_sentiment_trend_{}_{}_by_quarter.svg",
        range.start, range.end
    )
}

pub trait ChartRenderer: Send + Sync {
    /// Renders `rows` to `path`.
    ///
    /// # Errors
    /// Fails when there is nothing to draw or the file cannot be written.
    fn render(&self, rows: &[TrendRow], config: &ChartConfig, title: &str, path: &Path)
    -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvgChartRenderer;

impl ChartRenderer for SvgChartRenderer {
    fn render(
        &self,
        rows: &[TrendRow],
        config: &ChartConfig,
        title: &str,
        path: &Path,
    ) -> Result<()> {
        if rows.is_empty() {
            bail!("no trend rows to render");
        }
        let svg = build_svg(rows, config, title).context("failed to format chart")?;
        fs::write(path, svg)
            .with_context(|| format!("failed to write chart to {}", path.display()))?;
        Ok(())
    }
}

struct Frame {
    width: f64,
    height: f64,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
}

impl Frame {
    fn new(config: &ChartConfig) -> Self {
        let width = config.width_in * UNITS_PER_INCH;
        let height = config.height_in * UNITS_PER_INCH;
        Self {
            width,
            height,
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            plot_w: (width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            plot_h: (height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn x(&self, idx: usize, count: usize) -> f64 {
        let step = self.plot_w / count as f64;
        self.left + step * (idx as f64 + 0.5)
    }

    fn y(&self, pct: f64) -> f64 {
        self.top + self.plot_h * (1.0 - pct.clamp(0.0, 100.0) / 100.0)
    }

    fn bottom(&self) -> f64 {
        self.top + self.plot_h
    }
}

fn build_svg(rows: &[TrendRow], config: &ChartConfig, title: &str) -> Result<String, std::fmt::Error> {
    let frame = Frame::new(config);
    let (px_w, px_h) = config.pixel_size();
    let mut svg = String::new();

    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{px_w}" height="{px_h}" viewBox="0 0 {:.1} {:.1}" font-family="sans-serif">"#,
        frame.width, frame.height
    )?;
    writeln!(
        svg,
        r#"<rect x="0" y="0" width="{:.1}" height="{:.1}" fill="white"/>"#,
        frame.width, frame.height
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="40" text-anchor="middle" font-size="14" font-weight="bold">{}</text>"#,
        frame.width / 2.0,
        escape_xml(title)
    )?;

    // y grid every 20%
    for step in 0..=5_u8 {
        let pct = f64::from(step) * 20.0;
        let y = frame.y(pct);
        writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="black" stroke-opacity="0.3" stroke-width="0.5"/>"#,
            frame.left,
            frame.left + frame.plot_w
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-size="10">{pct:.0}</text>"#,
            frame.left - 8.0,
            y + 3.5
        )?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let x = frame.x(idx, rows.len());
        writeln!(
            svg,
            r#"<line x1="{x:.1}" y1="{:.1}" x2="{x:.1}" y2="{:.1}" stroke="black" stroke-opacity="0.3" stroke-width="0.5"/>"#,
            frame.top,
            frame.bottom()
        )?;
        let label_y = frame.bottom() + 16.0;
        writeln!(
            svg,
            r#"<text x="{x:.1}" y="{label_y:.1}" text-anchor="end" font-size="10" transform="rotate(-45 {x:.1} {label_y:.1})">{}</text>"#,
            escape_xml(&row.quarter_id)
        )?;
    }

    writeln!(
        svg,
        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black" stroke-width="1"/>"#,
        frame.left, frame.top, frame.plot_w, frame.plot_h
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12">Time Quarter</text>"#,
        frame.left + frame.plot_w / 2.0,
        frame.height - 15.0
    )?;
    let axis_y = frame.top + frame.plot_h / 2.0;
    writeln!(
        svg,
        r#"<text x="25" y="{axis_y:.1}" text-anchor="middle" font-size="12" transform="rotate(-90 25 {axis_y:.1})">Percentage (%)</text>"#
    )?;

    for sentiment in Sentiment::ALL {
        let color = escape_xml(config.color(sentiment));
        let points = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| format!("{:.1},{:.1}", frame.x(idx, rows.len()), frame.y(row.pct(sentiment))))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            svg,
            r#"<polyline class="{}" points="{points}" fill="none" stroke="{color}" stroke-width="2"/>"#,
            sentiment.key()
        )?;
        for (idx, row) in rows.iter().enumerate() {
            let x = frame.x(idx, rows.len());
            let y = frame.y(row.pct(sentiment));
            write_marker(&mut svg, config.marker(sentiment), x, y, &color)?;
        }
    }

    write_legend(&mut svg, &frame, config)?;
    svg.push_str("</svg>\n");
    Ok(svg)
}

fn write_legend(svg: &mut String, frame: &Frame, config: &ChartConfig) -> std::fmt::Result {
    let box_w = 120.0;
    let x0 = frame.left + frame.plot_w - box_w - 10.0;
    let y0 = frame.top + 10.0;
    writeln!(
        svg,
        r##"<rect x="{x0:.1}" y="{y0:.1}" width="{box_w:.1}" height="76" fill="white" fill-opacity="0.8" stroke="#cccccc"/>"##
    )?;
    for (idx, sentiment) in Sentiment::ALL.into_iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let y = y0 + 18.0 + 22.0 * idx as f64;
        let color = escape_xml(config.color(sentiment));
        writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{color}" stroke-width="2"/>"#,
            x0 + 8.0,
            x0 + 36.0
        )?;
        write_marker(svg, config.marker(sentiment), x0 + 22.0, y, &color)?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="11">{}</text>"#,
            x0 + 44.0,
            y + 4.0,
            sentiment.as_str()
        )?;
    }
    Ok(())
}

fn write_marker(svg: &mut String, marker: Marker, x: f64, y: f64, color: &str) -> std::fmt::Result {
    let r = MARKER_SIZE / 2.0;
    match marker {
        Marker::Circle => writeln!(
            svg,
            r#"<circle cx="{x:.1}" cy="{y:.1}" r="{r:.1}" fill="{color}"/>"#
        ),
        Marker::Square => writeln!(
            svg,
            r#"<rect x="{:.1}" y="{:.1}" width="{MARKER_SIZE:.1}" height="{MARKER_SIZE:.1}" fill="{color}"/>"#,
            x - r,
            y - r
        ),
        Marker::Triangle => writeln!(
            svg,
            r#"<polygon points="{x:.1},{:.1} {:.1},{:.1} {:.1},{:.1}" fill="{color}"/>"#,
            y - r,
            x - r,
            y + r,
            x + r,
            y + r
        ),
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
