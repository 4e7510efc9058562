//! Monthly CO₂ line chart.

use std::path::Path;

use cabcarbon_core::report::{fleet_title, MONTH_NAMES};
use cabcarbon_core::Fleet;
use plotters::prelude::*;

use crate::error::CliError;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;

/// Monthly totals in metric tons of one fleet, January first.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    pub fleet: Fleet,
    pub tons: [f64; 12],
}

fn fleet_color(fleet: Fleet) -> RGBColor {
    match fleet {
        Fleet::Yellow => RGBColor(230, 172, 0),
        Fleet::Green => RGBColor(34, 139, 34),
    }
}

fn chart_error(error: impl std::fmt::Display) -> CliError {
    CliError::Chart(error.to_string())
}

/// Upper bound of the y axis: 10% headroom over the largest value.
fn y_ceiling(series: &[MonthlySeries]) -> f64 {
    let max = series
        .iter()
        .flat_map(|entry| entry.tons.iter().copied())
        .filter(|tons| tons.is_finite())
        .fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Render one line per fleet to an SVG file at `path`.
pub fn render_monthly_chart(path: &Path, series: &[MonthlySeries]) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Monthly CO2 Emissions: Yellow vs Green Taxi", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(1u32..12u32, 0f64..y_ceiling(series))
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .x_labels(12)
        .x_label_formatter(&|month| {
            (*month as usize)
                .checked_sub(1)
                .and_then(|index| MONTH_NAMES.get(index))
                .map_or_else(|| month.to_string(), |name| (*name).to_string())
        })
        .x_desc("Month")
        .y_desc("CO2 emissions (metric tons)")
        .draw()
        .map_err(chart_error)?;

    for entry in series {
        let color = fleet_color(entry.fleet);
        let points: Vec<(u32, f64)> = (1u32..=12).zip(entry.tons.iter().copied()).collect();

        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(chart_error)?
            .label(format!("{} Taxi", fleet_title(entry.fleet)))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });

        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(month, tons)| Circle::new((month, tons), 3, color.filled())),
            )
            .map_err(chart_error)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_an_svg_with_both_fleets() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("charts").join("monthly.svg");
        let mut yellow = [0.0; 12];
        yellow[0] = 12.5;
        yellow[5] = 20.0;
        let green = [1.0; 12];

        render_monthly_chart(
            &path,
            &[
                MonthlySeries {
                    fleet: Fleet::Yellow,
                    tons: yellow,
                },
                MonthlySeries {
                    fleet: Fleet::Green,
                    tons: green,
                },
            ],
        )
        .expect("render");

        let svg = std::fs::read_to_string(&path).expect("svg");
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Yellow Taxi"));
        assert!(svg.contains("Green Taxi"));
    }

    #[test]
    fn all_zero_series_still_has_a_usable_axis() {
        let series = [MonthlySeries {
            fleet: Fleet::Green,
            tons: [0.0; 12],
        }];
        assert_eq!(y_ceiling(&series), 1.0);
    }
}
