//! SVG charts for the exploratory analysis and the model diagnostics.
//!
//! Every chart is written to its own file in the plots directory. A chart
//! that fails to render returns `AnalysisError::Plot`; callers log it and
//! move on.

use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use plotters::coord::Shift;
use plotters::prelude::*;
use rand::Rng;

use crate::error::{AnalysisError, Result};
use crate::features::{
    interaction_means, kernel_density, max_wind_by_ao_bin, AoBin, PreparedOceanHeat, PreparedStorms,
    YearGroup,
};
use crate::models::{FittedModel, ModelId};
use crate::report::ModelDiagnostics;

const SIZE: (u32, u32) = (960, 600);
const CAPTION_FONT: (&str, i32) = ("sans-serif", 22);

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Create `dir/file`, draw into it and flush.
fn render<F>(dir: &Path, file: &str, draw: F) -> Result<PathBuf>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> DrawResult,
{
    let path = dir.join(file);
    let outcome: DrawResult = (|| {
        let root = SVGBackend::new(&path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
        Ok(())
    })();
    outcome.map_err(|e| AnalysisError::Plot {
        name: file.to_string(),
        message: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Wrote chart");
    Ok(path)
}

/// Data range widened by 5% each side; never empty.
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5 * lo.abs().max(1.0) };
    (lo - pad)..(hi + pad)
}

/// Label only the integer ticks 0..labels.len().
fn category_label(labels: &[&str], v: f64) -> String {
    let r = v.round();
    if (v - r).abs() < 1e-6 && r >= 0.0 && (r as usize) < labels.len() {
        labels[r as usize].to_string()
    } else {
        String::new()
    }
}

fn decimal_year(date: chrono::NaiveDate) -> f64 {
    f64::from(date.year()) + f64::from(date.ordinal0()) / 365.25
}

// =============================================================================
// Exploratory charts
// =============================================================================

/// Ocean heat content against date.
pub fn ocean_heat_timeseries(dir: &Path, ocean: &PreparedOceanHeat) -> Result<PathBuf> {
    let points: Vec<(f64, f64)> = ocean
        .table
        .records
        .iter()
        .map(|r| (decimal_year(r.date), r.ao))
        .collect();
    render(dir, "ocean_heat_timeseries.svg", |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Atlantic ocean heat content (0-700 m)", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                padded_range(points.iter().map(|p| p.0)),
                padded_range(points.iter().map(|p| p.1)),
            )?;
        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("AO")
            .x_label_formatter(&|v| format!("{:.0}", v))
            .draw()?;
        chart.draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))?;
        Ok(())
    })
}

/// Max_Wind per AO_bin. Boxes span the quartiles; whiskers the full range.
pub fn max_wind_boxplot(dir: &Path, storms: &PreparedStorms) -> Result<PathBuf> {
    let boxes = max_wind_by_ao_bin(storms);
    let labels: Vec<&str> = AoBin::ALL.iter().map(|b| b.label()).collect();
    render(dir, "max_wind_by_ao_bin.svg", |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Max wind by ocean heat bin", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                -0.5f64..2.5f64,
                padded_range(boxes.iter().flat_map(|(_, b)| [b.min, b.max])),
            )?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(7)
            .x_label_formatter(&|v| category_label(&labels, *v))
            .x_desc("AO_bin")
            .y_desc("Max_Wind")
            .draw()?;

        for (bin, b) in &boxes {
            let x = *bin as usize as f64;
            let color = Palette99::pick(*bin as usize).to_rgba();
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, b.q1), (x + 0.3, b.q3)],
                color.mix(0.4).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, b.q1), (x + 0.3, b.q3)],
                BLACK.stroke_width(1),
            )))?;
            for segment in [
                vec![(x - 0.3, b.median), (x + 0.3, b.median)],
                vec![(x, b.q3), (x, b.max)],
                vec![(x, b.q1), (x, b.min)],
                vec![(x - 0.1, b.max), (x + 0.1, b.max)],
                vec![(x - 0.1, b.min), (x + 0.1, b.min)],
            ] {
                chart.draw_series(std::iter::once(PathElement::new(segment, BLACK.stroke_width(2))))?;
            }
        }
        Ok(())
    })
}

/// Mean Max_Wind per Year_Group, one line per AO_bin.
pub fn interaction_plot(dir: &Path, storms: &PreparedStorms) -> Result<PathBuf> {
    let cells = interaction_means(storms);
    let labels: Vec<&str> = YearGroup::ALL.iter().map(|g| g.label()).collect();
    render(dir, "interaction_year_group_ao_bin.svg", |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Mean max wind: Year_Group x AO_bin", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..2.5f64, padded_range(cells.iter().map(|c| c.mean_max_wind)))?;
        chart
            .configure_mesh()
            .x_labels(7)
            .x_label_formatter(&|v| category_label(&labels, *v))
            .x_desc("Year_Group")
            .y_desc("Mean Max_Wind")
            .draw()?;

        for bin in AoBin::ALL {
            let points: Vec<(f64, f64)> = cells
                .iter()
                .filter(|c| c.ao_bin == bin)
                .map(|c| (c.year_group as usize as f64, c.mean_max_wind))
                .collect();
            if points.is_empty() {
                continue;
            }
            let color = Palette99::pick(bin as usize).to_rgba();
            chart
                .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
                .label(bin.label())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            chart.draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    })
}

/// AO against Max_Wind, coloured by storm type.
pub fn scatter_ao_max_wind(dir: &Path, storms: &PreparedStorms) -> Result<PathBuf> {
    let mut types: Vec<&str> = storms.rows.iter().map(|r| r.ts_h.as_str()).collect();
    types.sort_unstable();
    types.dedup();
    render(dir, "scatter_ao_max_wind.svg", |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Ocean heat content vs max wind", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                padded_range(storms.rows.iter().map(|r| r.ao)),
                padded_range(storms.rows.iter().map(|r| r.max_wind)),
            )?;
        chart.configure_mesh().x_desc("AO").y_desc("Max_Wind").draw()?;
        for (i, ts) in types.iter().enumerate() {
            let color = Palette99::pick(i).to_rgba();
            chart
                .draw_series(
                    storms
                        .rows
                        .iter()
                        .filter(|r| r.ts_h == *ts)
                        .map(|r| Circle::new((r.ao, r.max_wind), 3, color.filled())),
                )?
                .label(*ts)
                .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    })
}

/// Year (jittered) against Max_Wind.
pub fn scatter_year_max_wind<R: Rng>(dir: &Path, storms: &PreparedStorms, rng: &mut R) -> Result<PathBuf> {
    let points: Vec<(f64, f64)> = storms
        .rows
        .iter()
        .map(|r| (f64::from(r.year) + rng.random_range(-0.3..0.3), r.max_wind))
        .collect();
    render(dir, "scatter_year_max_wind.svg", |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Max wind by year", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                padded_range(points.iter().map(|p| p.0)),
                padded_range(points.iter().map(|p| p.1)),
            )?;
        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("Max_Wind")
            .x_label_formatter(&|v| format!("{:.0}", v))
            .draw()?;
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.mix(0.6).filled())))?;
        Ok(())
    })
}

/// Kernel density of storm AO.
pub fn ao_density(dir: &Path, storms: &PreparedStorms) -> Result<PathBuf> {
    let ao: Vec<f64> = storms.rows.iter().map(|r| r.ao).collect();
    let density = kernel_density(&ao, 512);
    render(dir, "ao_density.svg", |root| {
        let y_max = density.iter().map(|p| p.1).fold(0.0, f64::max);
        let mut chart = ChartBuilder::on(root)
            .caption("Density of ocean heat content (storm records)", CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(padded_range(density.iter().map(|p| p.0)), 0.0..(y_max * 1.05).max(1e-12))?;
        chart.configure_mesh().x_desc("AO").y_desc("Density").draw()?;
        chart.draw_series(AreaSeries::new(density.iter().copied(), 0.0, BLUE.mix(0.2)).border_style(BLUE))?;
        Ok(())
    })
}

// =============================================================================
// Model charts
// =============================================================================

/// Observed and fitted values. Time-series models are drawn against the
/// time index; the storm model as observed against fitted.
pub fn model_fit(dir: &Path, model: &FittedModel) -> Result<PathBuf> {
    let file = format!("{}_fit.svg", model.id.slug());
    if model.id == ModelId::StormIntensity {
        let points: Vec<(f64, f64)> = model.fitted.iter().copied().zip(model.observed.iter().copied()).collect();
        return render(dir, &file, |root| {
            let range = padded_range(points.iter().flat_map(|p| [p.0, p.1]));
            let mut chart = ChartBuilder::on(root)
                .caption(model.id.title(), CAPTION_FONT)
                .margin(15)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(range.clone(), range.clone())?;
            chart.configure_mesh().x_desc("Fitted AO").y_desc("Observed AO").draw()?;
            chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.mix(0.6).filled())))?;
            chart.draw_series(LineSeries::new(
                [(range.start, range.start), (range.end, range.end)],
                RED.stroke_width(1),
            ))?;
            Ok(())
        });
    }

    let observed: Vec<(f64, f64)> = model
        .observed
        .iter()
        .enumerate()
        .map(|(i, &y)| ((i + 1) as f64, y))
        .collect();
    let fitted: Vec<(f64, f64)> = model
        .fitted
        .iter()
        .enumerate()
        .map(|(i, &y)| ((i + 1) as f64, y))
        .collect();
    render(dir, &file, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(model.id.title(), CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                padded_range(observed.iter().map(|p| p.0)),
                padded_range(observed.iter().chain(&fitted).map(|p| p.1)),
            )?;
        chart.configure_mesh().x_desc("time").y_desc("AO").draw()?;
        chart
            .draw_series(observed.iter().map(|&p| Circle::new(p, 2, BLACK.mix(0.5).filled())))?
            .label("observed")
            .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
        chart
            .draw_series(LineSeries::new(fitted.iter().copied(), RED.stroke_width(2)))?
            .label("fitted")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        Ok(())
    })
}

/// One smooth term's partial effect with a ±2 SE band.
pub fn term_effect(dir: &Path, model: &FittedModel, term: usize, suffix: &str) -> Result<PathBuf> {
    let file = format!("{}_{}.svg", model.id.slug(), suffix);
    let contribution = model.term_contributions.get(term).ok_or_else(|| AnalysisError::Plot {
        name: file.clone(),
        message: format!("model has no smooth term {}", term),
    })?;

    // one point per distinct covariate value, in x order
    let mut rows: Vec<(f64, f64, f64)> = contribution
        .x
        .iter()
        .zip(&contribution.fit)
        .zip(&contribution.se)
        .map(|((&x, &f), &s)| (x, f, s))
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    rows.dedup_by(|a, b| a.0 == b.0);

    render(dir, &file, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(format!("{}: {}", model.id.title(), contribution.term), CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(
                padded_range(rows.iter().map(|r| r.0)),
                padded_range(rows.iter().flat_map(|r| [r.1 - 2.0 * r.2, r.1 + 2.0 * r.2])),
            )?;
        chart
            .configure_mesh()
            .x_desc(contribution.term.as_str())
            .y_desc("partial effect")
            .draw()?;

        let band: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| (r.0, r.1 + 2.0 * r.2))
            .chain(rows.iter().rev().map(|r| (r.0, r.1 - 2.0 * r.2)))
            .collect();
        chart.draw_series(std::iter::once(Polygon::new(band, BLUE.mix(0.2).filled())))?;
        chart.draw_series(LineSeries::new(rows.iter().map(|r| (r.0, r.1)), BLUE.stroke_width(2)))?;
        Ok(())
    })
}

/// Residuals against fitted values.
pub fn residuals_vs_fitted(dir: &Path, model: &FittedModel, diagnostics: &ModelDiagnostics) -> Result<PathBuf> {
    let file = format!("{}_residuals.svg", model.id.slug());
    let points = &diagnostics.residual_vs_fitted;
    render(dir, &file, |root| {
        let x_range = padded_range(points.iter().map(|p| p.0));
        let mut chart = ChartBuilder::on(root)
            .caption(format!("{}: residuals vs fitted", model.id.title()), CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.clone(), padded_range(points.iter().map(|p| p.1)))?;
        chart
            .configure_mesh()
            .x_desc("fitted")
            .y_desc(format!("{} residual", model.residual_kind.label()))
            .draw()?;
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.mix(0.6).filled())))?;
        chart.draw_series(LineSeries::new([(x_range.start, 0.0), (x_range.end, 0.0)], RED))?;
        Ok(())
    })
}

/// Normal QQ plot of standardized residuals.
pub fn qq_plot(dir: &Path, model: &FittedModel, diagnostics: &ModelDiagnostics) -> Result<PathBuf> {
    let file = format!("{}_qq.svg", model.id.slug());
    let points: Vec<(f64, f64)> = diagnostics.qq.iter().map(|q| (q.theoretical, q.sample)).collect();
    render(dir, &file, |root| {
        let range = padded_range(points.iter().flat_map(|p| [p.0, p.1]));
        let mut chart = ChartBuilder::on(root)
            .caption(format!("{}: normal QQ", model.id.title()), CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(range.clone(), range.clone())?;
        chart
            .configure_mesh()
            .x_desc("theoretical quantile")
            .y_desc("standardized residual")
            .draw()?;
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.mix(0.6).filled())))?;
        chart.draw_series(LineSeries::new(
            [(range.start, range.start), (range.end, range.end)],
            RED.stroke_width(1),
        ))?;
        Ok(())
    })
}

/// Residual autocorrelation with the white-noise band.
pub fn acf_plot(dir: &Path, model: &FittedModel, diagnostics: &ModelDiagnostics) -> Result<PathBuf> {
    let file = format!("{}_acf.svg", model.id.slug());
    let band = diagnostics.acf_band;
    render(dir, &file, |root| {
        let lags = diagnostics.max_lag as f64;
        let lo = diagnostics
            .acf
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .fold(-band, f64::min)
            .min(0.0);
        let mut chart = ChartBuilder::on(root)
            .caption(format!("{}: residual ACF", model.id.title()), CAPTION_FONT)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5..(lags + 0.5), (lo - 0.05)..1.05)?;
        chart.configure_mesh().x_desc("lag").y_desc("ACF").draw()?;
        chart.draw_series(diagnostics.acf.iter().enumerate().filter(|(_, r)| r.is_finite()).map(
            |(h, &r)| PathElement::new(vec![(h as f64, 0.0), (h as f64, r)], BLACK.stroke_width(2)),
        ))?;
        for level in [band, -band] {
            chart.draw_series(LineSeries::new([(-0.5, level), (lags + 0.5, level)], BLUE))?;
        }
        chart.draw_series(LineSeries::new([(-0.5, 0.0), (lags + 0.5, 0.0)], BLACK))?;
        Ok(())
    })
}

/// All exploratory charts. One entry per chart, successful or not.
pub fn render_exploratory<R: Rng>(
    dir: &Path,
    storms: &PreparedStorms,
    ocean: &PreparedOceanHeat,
    rng: &mut R,
) -> Vec<Result<PathBuf>> {
    vec![
        ocean_heat_timeseries(dir, ocean),
        max_wind_boxplot(dir, storms),
        interaction_plot(dir, storms),
        scatter_ao_max_wind(dir, storms),
        scatter_year_max_wind(dir, storms, rng),
        ao_density(dir, storms),
    ]
}

/// All charts of one fitted model.
pub fn render_model(dir: &Path, model: &FittedModel, diagnostics: &ModelDiagnostics) -> Vec<Result<PathBuf>> {
    let mut out = vec![model_fit(dir, model)];
    if model.id == ModelId::TrendSeasonalAr1 {
        out.push(term_effect(dir, model, 0, "trend"));
        out.push(term_effect(dir, model, 1, "seasonal"));
    }
    out.push(residuals_vs_fitted(dir, model, diagnostics));
    out.push(qq_plot(dir, model, diagnostics));
    out.push(acf_plot(dir, model, diagnostics));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        let r = padded_range([0.0, 10.0]);
        assert_eq!(r, -0.5..10.5);
        let r = padded_range([3.0, 3.0]);
        assert!(r.start < 3.0 && r.end > 3.0);
        assert_eq!(padded_range(Vec::<f64>::new()), 0.0..1.0);
    }

    #[test]
    fn test_category_label() {
        let labels = ["Low", "Medium", "High"];
        assert_eq!(category_label(&labels, 1.0), "Medium");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 3.0), "");
        assert_eq!(category_label(&labels, -0.5), "");
    }
}
