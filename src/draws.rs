//! Module for visualizing backtest results: daily candles with the equity curve.

use std::path::PathBuf;

use crate::engine::{Backtest, Candle};
use crate::errors::{Error, Result};

use chrono::{DateTime, Duration, Utc};
use plotters::backend::{BitMapBackend, DrawingBackend, SVGBackend};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::WHITE;

/// Aspect ratio for the generated charts.
const ASPECT_RATIO: f64 = 0.5625;
/// Size of the X-axis labels.
const X_LABEL_SIZE: i32 = 20;
/// Size of the Y-axis labels.
const Y_LABEL_SIZE: i32 = 20;

fn plotters_error(e: impl std::fmt::Display) -> Error {
    Error::Plotters(e.to_string())
}

/// Output formats for the generated charts with output filename.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutput {
    /// Save to the output SVG file.
    Svg(PathBuf),
    /// Save to the output PNG file.
    Png(PathBuf),
}

impl Default for DrawOutput {
    fn default() -> Self {
        Self::Svg(PathBuf::from("vbo.svg"))
    }
}

/// Configuration options for chart generation.
#[derive(Debug, Clone)]
pub struct DrawOptions {
    /// Chart title.
    title: Option<String>,
    /// Output format and path.
    output: DrawOutput,
    /// Whether to show the volume chart.
    show_volume: bool,
    /// Whether to show the equity curve and the trades.
    show_balance: bool,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            title: None,
            output: DrawOutput::default(),
            show_volume: false,
            show_balance: true,
        }
    }
}

impl DrawOptions {
    /// Sets the chart title.
    pub fn title(mut self, title: impl ToString) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the output format and path.
    pub fn draw_output(mut self, output: DrawOutput) -> Self {
        self.output = output;
        self
    }

    /// Enables or disables the volume chart.
    pub fn show_volume(mut self, show: bool) -> Self {
        self.show_volume = show;
        self
    }

    /// Enables or disables the equity curve and the trade markers.
    pub fn show_balance(mut self, show: bool) -> Self {
        self.show_balance = show;
        self
    }
}

/// Chart drawing utility for backtest visualization.
pub struct Draw<'d> {
    /// Reference to the backtest data.
    backtest: &'d Backtest,
    /// Drawing options.
    options: DrawOptions,
}

impl<'d> From<&'d Backtest> for Draw<'d> {
    fn from(backtest: &'d Backtest) -> Self {
        Self {
            backtest,
            options: DrawOptions::default(),
        }
    }
}

impl<'d> Draw<'d> {
    /// Sets the drawing options.
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }

    /// Generates and saves the chart based on the configured options.
    pub fn plot(&self) -> Result<()> {
        let candles = self.backtest.candles().collect::<Vec<_>>();
        if candles.is_empty() {
            return Err(Error::CandleDataEmpty);
        }

        let title = self.options.title.as_deref().unwrap_or("VBO Chart");
        let height_factor = if self.options.show_volume { 1.4 } else { 1.0 };
        let width = 1280.max(10 * candles.len() as u32);
        let height = ((width as f64 * ASPECT_RATIO * height_factor) as u32).min(900);

        let drawn = match &self.options.output {
            DrawOutput::Svg(path) => {
                let root = SVGBackend::new(path, (width, height)).into_drawing_area();
                root.fill(&WHITE).map_err(plotters_error)?;
                self.draw_chart(&root, &candles, title)
            }
            DrawOutput::Png(path) => {
                let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
                root.fill(&WHITE).map_err(plotters_error)?;
                self.draw_chart(&root, &candles, title)
            }
        };
        drawn?;

        tracing::debug!(output = ?self.options.output, "chart saved");
        Ok(())
    }

    /// Draws the price chart and, if enabled, the volume chart below it.
    fn draw_chart<DB: DrawingBackend>(
        &self,
        drawing_area: &DrawingArea<DB, Shift>,
        candles: &[&Candle],
        title: &str,
    ) -> Result<()> {
        if self.options.show_volume {
            let total_height = drawing_area.dim_in_pixel().1 as f64;
            let (price_area, volume_area) = drawing_area.split_vertically((total_height * 0.8) as u32);
            self.draw_price_chart(&price_area, candles, title)?;
            self.draw_volume_chart(&volume_area, candles)?;
        } else {
            self.draw_price_chart(drawing_area, candles, title)?;
        }

        drawing_area.present().map_err(plotters_error)
    }

    /// Draws the candlesticks, the trades and the equity curve on a secondary axis.
    fn draw_price_chart<DB: DrawingBackend>(
        &self,
        drawing_area: &DrawingArea<DB, Shift>,
        candles: &[&Candle],
        title: &str,
    ) -> Result<()> {
        let (first_time, last_time) = time_range(candles)?;
        let min_price = candles.iter().map(|c| c.low()).fold(f64::INFINITY, f64::min);
        let max_price = candles.iter().map(|c| c.high()).fold(f64::NEG_INFINITY, f64::max);
        let price_padding = (max_price - min_price) * 0.1;

        let balances = balance_points(self.backtest, first_time);
        let (min_balance, max_balance) = padded_range(balances.iter().map(|(_, b)| *b));

        let (top, bottom) = if self.options.show_volume { (0, 0) } else { (10, 10) };
        let drawing_area = drawing_area.margin(top, bottom, 70, 70);
        let mut builder = ChartBuilder::on(&drawing_area);
        if !self.options.show_volume {
            builder.x_label_area_size(X_LABEL_SIZE);
        }

        let mut chart = builder
            .caption(title, ("sans-serif", 30).into_font())
            .y_label_area_size(Y_LABEL_SIZE)
            .right_y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(
                first_time..last_time,
                min_price - price_padding..max_price + price_padding,
            )
            .map_err(plotters_error)?
            .set_secondary_coord(first_time..last_time, min_balance..max_balance);

        {
            let mut mesh = chart.configure_mesh();
            mesh.y_desc("Price")
                .y_label_style(("sans-serif", Y_LABEL_SIZE))
                .y_labels(5);

            if self.options.show_volume {
                mesh.disable_x_axis();
            } else {
                mesh.x_desc("Time")
                    .x_label_style(("sans-serif", X_LABEL_SIZE))
                    .x_labels(candles.len() / 15);
            }

            mesh.draw().map_err(plotters_error)?;
        }

        let candle_width = {
            let available_width = drawing_area.dim_in_pixel().0 as f64 - (X_LABEL_SIZE * 2) as f64;
            (available_width / candles.len() as f64).max(5.0) as u32
        };

        chart
            .draw_series(candles.iter().map(|c| {
                let color = if c.close() >= c.open() { GREEN.filled() } else { RED.filled() };
                CandleStick::new(c.open_time(), c.open(), c.high(), c.low(), c.close(), color, color, candle_width)
            }))
            .map_err(plotters_error)?;

        if !self.options.show_balance {
            return Ok(());
        }

        chart
            .configure_secondary_axes()
            .y_desc("Balance")
            .label_style(("sans-serif", Y_LABEL_SIZE))
            .y_labels(5)
            .draw()
            .map_err(plotters_error)?;

        let entries = self
            .backtest
            .trades()
            .map(|t| Circle::new((t.opened_at, t.entry_price), 3, BLUE.filled()));
        let exits = self
            .backtest
            .trades()
            .map(|t| Circle::new((t.closed_at, t.exit_price), 3, RED.filled()));
        chart.draw_series(entries).map_err(plotters_error)?;
        chart.draw_series(exits).map_err(plotters_error)?;

        chart
            .draw_secondary_series(LineSeries::new(balances, BLUE.stroke_width(2)))
            .map_err(plotters_error)?;

        Ok(())
    }

    /// Draws the volume chart.
    fn draw_volume_chart<DB: DrawingBackend>(
        &self,
        drawing_area: &DrawingArea<DB, Shift>,
        candles: &[&Candle],
    ) -> Result<()> {
        let (first_time, last_time) = time_range(candles)?;
        let max_volume = candles.iter().map(|c| c.volume()).fold(0.0, f64::max);
        let volume_padding = (max_volume * 0.1).max(1.0);
        let drawing_area = drawing_area.margin(0, 10, 70, 70);

        let mut chart = ChartBuilder::on(&drawing_area)
            .x_label_area_size(X_LABEL_SIZE)
            .y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(first_time..last_time, 0.0..max_volume + volume_padding)
            .map_err(plotters_error)?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .x_labels(candles.len() / 15)
            .y_labels(3)
            .draw()
            .map_err(plotters_error)?;

        chart
            .draw_series(candles.iter().map(|c| {
                let x = c.open_time();
                let color = if c.close() >= c.open() { GREEN.mix(0.3) } else { RED.mix(0.3) };
                Rectangle::new([(x, 0.0), (x + Duration::days(1), c.volume())], color.filled())
            }))
            .map(|_| ())
            .map_err(plotters_error)
    }
}

/// Returns the first open time and the end of the last daily candle.
fn time_range(candles: &[&Candle]) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = candles.first().ok_or(Error::CandleDataEmpty)?;
    let last = candles.last().ok_or(Error::CandleDataEmpty)?;
    Ok((first.open_time(), last.open_time() + Duration::days(1)))
}

/// Places the balance history on the time axis: the initial balance at `start`,
/// then one point per rollover.
fn balance_points(backtest: &Backtest, start: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)> {
    let history = backtest.balance_history();
    let times = std::iter::once(start).chain(backtest.rollovers().copied());
    times.zip(history.iter().copied()).collect()
}

/// Returns the bounds of `values`, widened when they are all equal.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| (min.min(v), max.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let padding = ((max - min) * 0.1).max(max.abs() * 0.01).max(f64::EPSILON);
    (min - padding, max + padding)
}
