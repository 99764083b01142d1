// =============================================================================
// Feature Deriver
// =============================================================================
//
// Pure functions from a loaded table to a prepared one:
//
//   AO_bin      tercile bin of AO over the WHOLE storm table
//   Year_Group  decade of the storm year
//   months      calendar month of each ocean heat observation
//
// plus the small summaries the exploratory plots need (interaction means,
// five-number summaries, a kernel density of AO).
//
// Quantiles use linear interpolation between order statistics: with the
// sorted sample x₍₁₎..x₍ₙ₎ and h = (n - 1)p,
//
//     Q(p) = x₍⌊h⌋+1₎ + (h - ⌊h⌋)(x₍⌊h⌋+2₎ - x₍⌊h⌋+1₎)
//
// =============================================================================

use std::fmt;

use chrono::Datelike;
use statrs::distribution::{Continuous, Normal};

use crate::data::{OceanHeatTable, StormTable};
use crate::error::{AnalysisError, Result};

/// Probabilities of the AO_bin cut points.
pub const AO_BIN_PROBS: [f64; 4] = [0.0, 0.33, 0.66, 1.0];

// =============================================================================
// Categories
// =============================================================================

/// Tercile bin of ocean heat content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AoBin {
    Low,
    Medium,
    High,
}

impl AoBin {
    pub const ALL: [AoBin; 3] = [AoBin::Low, AoBin::Medium, AoBin::High];

    pub fn label(self) -> &'static str {
        match self {
            AoBin::Low => "Low",
            AoBin::Medium => "Medium",
            AoBin::High => "High",
        }
    }

    /// Bin of `value` given the four cut points.
    ///
    /// Intervals are (b₀, b₁], (b₁, b₂], (b₂, b₃] with b₀ itself also in Low.
    /// Returns `None` outside [b₀, b₃].
    pub fn assign(value: f64, breaks: &[f64; 4]) -> Option<AoBin> {
        if value < breaks[0] || value > breaks[3] {
            None
        } else if value <= breaks[1] {
            Some(AoBin::Low)
        } else if value <= breaks[2] {
            Some(AoBin::Medium)
        } else {
            Some(AoBin::High)
        }
    }
}

impl fmt::Display for AoBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decade group of a storm year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum YearGroup {
    Y2000s,
    Y2010s,
    Y2020s,
}

impl YearGroup {
    pub const ALL: [YearGroup; 3] = [YearGroup::Y2000s, YearGroup::Y2010s, YearGroup::Y2020s];

    pub fn from_year(year: i32) -> Self {
        if year <= 2009 {
            YearGroup::Y2000s
        } else if year <= 2019 {
            YearGroup::Y2010s
        } else {
            YearGroup::Y2020s
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            YearGroup::Y2000s => "2000s",
            YearGroup::Y2010s => "2010s",
            YearGroup::Y2020s => "2020s",
        }
    }
}

impl fmt::Display for YearGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coerce a year written as `2005`, `2005.0` or with surrounding spaces.
pub fn coerce_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if let Ok(y) = text.parse::<i32>() {
        return Some(y);
    }
    let v = text.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= i32::MAX as f64 {
        Some(v as i32)
    } else {
        None
    }
}

// =============================================================================
// Quantiles
// =============================================================================

/// Sample quantile of an ascending slice with linear interpolation.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// The four AO_bin cut points of `values`. Fails when two coincide.
pub fn tercile_breaks(values: &[f64]) -> Result<[f64; 4]> {
    let sorted = sorted_copy(values);
    let breaks = AO_BIN_PROBS.map(|p| quantile_sorted(&sorted, p));
    if sorted.is_empty() || breaks.windows(2).any(|w| w[0] >= w[1]) {
        return Err(AnalysisError::DegenerateBins {
            column: "AO".to_string(),
            breaks: breaks.to_vec(),
        });
    }
    Ok(breaks)
}

// =============================================================================
// Prepared Tables
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStorm {
    pub year: i32,
    pub ao: f64,
    pub max_wind: f64,
    pub ts_h: String,
    pub ao_bin: AoBin,
    pub year_group: YearGroup,
}

/// Storm rows with derived categories and the AO_bin cut points used.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStorms {
    pub rows: Vec<PreparedStorm>,
    pub breaks: [f64; 4],
}

impl PreparedStorms {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Derive Year (integer), AO_bin and Year_Group.
///
/// Bins are cut on the full table. Subsets taken afterwards keep the bins
/// computed here.
pub fn prepare_storms(table: &StormTable) -> Result<PreparedStorms> {
    let ao: Vec<f64> = table.records.iter().map(|r| r.ao).collect();
    let breaks = tercile_breaks(&ao)?;

    let mut rows = Vec::with_capacity(table.len());
    for (i, record) in table.records.iter().enumerate() {
        let year = coerce_year(&record.year).ok_or_else(|| AnalysisError::Parse {
            path: table.source.clone(),
            line: table.lines.get(i).copied().unwrap_or(0),
            column: "Year".to_string(),
            message: format!("'{}' is not an integer year", record.year),
        })?;
        // breaks span the column, so every value has a bin
        let ao_bin = AoBin::assign(record.ao, &breaks).unwrap_or(AoBin::High);
        rows.push(PreparedStorm {
            year,
            ao: record.ao,
            max_wind: record.max_wind,
            ts_h: record.ts_h.clone(),
            ao_bin,
            year_group: YearGroup::from_year(year),
        });
    }

    tracing::info!(
        rows = rows.len(),
        low = breaks[1],
        high = breaks[2],
        "Derived AO_bin and Year_Group"
    );
    Ok(PreparedStorms { rows, breaks })
}

/// Ocean heat series with its calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedOceanHeat {
    pub table: OceanHeatTable,
    /// 1..=12
    pub months: Vec<u32>,
}

impl PreparedOceanHeat {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn ao(&self) -> Vec<f64> {
        self.table.records.iter().map(|r| r.ao).collect()
    }
}

pub fn prepare_ocean_heat(table: &OceanHeatTable) -> PreparedOceanHeat {
    let months = table.records.iter().map(|r| r.date.month()).collect();
    PreparedOceanHeat {
        table: table.clone(),
        months,
    }
}

// =============================================================================
// Exploratory Summaries
// =============================================================================

/// Mean Max_Wind in one Year_Group × AO_bin cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionCell {
    pub year_group: YearGroup,
    pub ao_bin: AoBin,
    pub mean_max_wind: f64,
    pub count: usize,
}

/// Mean Max_Wind for every non-empty Year_Group × AO_bin cell, ordered by
/// group then bin.
pub fn interaction_means(storms: &PreparedStorms) -> Vec<InteractionCell> {
    let mut cells = Vec::new();
    for group in YearGroup::ALL {
        for bin in AoBin::ALL {
            let (sum, count) = storms
                .rows
                .iter()
                .filter(|r| r.year_group == group && r.ao_bin == bin)
                .fold((0.0, 0usize), |(s, c), r| (s + r.max_wind, c + 1));
            if count > 0 {
                cells.push(InteractionCell {
                    year_group: group,
                    ao_bin: bin,
                    mean_max_wind: sum / count as f64,
                    count,
                });
            }
        }
    }
    cells
}

/// Five-number summary used for a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub n: usize,
}

impl BoxSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let s = sorted_copy(values);
        Some(Self {
            min: s[0],
            q1: quantile_sorted(&s, 0.25),
            median: quantile_sorted(&s, 0.5),
            q3: quantile_sorted(&s, 0.75),
            max: s[s.len() - 1],
            n: s.len(),
        })
    }
}

/// Max_Wind box summaries per AO_bin (empty bins omitted).
pub fn max_wind_by_ao_bin(storms: &PreparedStorms) -> Vec<(AoBin, BoxSummary)> {
    AoBin::ALL
        .iter()
        .filter_map(|&bin| {
            let values: Vec<f64> = storms
                .rows
                .iter()
                .filter(|r| r.ao_bin == bin)
                .map(|r| r.max_wind)
                .collect();
            BoxSummary::from_values(&values).map(|b| (bin, b))
        })
        .collect()
}

/// Silverman's rule of thumb: 0.9 min(sd, IQR/1.34) n^(-1/5).
pub fn silverman_bandwidth(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 1.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt();
    let s = sorted_copy(values);
    let iqr = quantile_sorted(&s, 0.75) - quantile_sorted(&s, 0.25);

    let mut spread = sd.min(iqr / 1.34);
    if spread <= 0.0 {
        spread = if sd > 0.0 { sd } else if s[0] != 0.0 { s[0].abs() } else { 1.0 };
    }
    0.9 * spread * (n as f64).powf(-0.2)
}

/// Gaussian kernel density on `n_points` evenly spaced points spanning the
/// data range extended by three bandwidths each side.
pub fn kernel_density(values: &[f64], n_points: usize) -> Vec<(f64, f64)> {
    if values.is_empty() || n_points < 2 {
        return Vec::new();
    }
    let bw = silverman_bandwidth(values);
    let kernel = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };
    let s = sorted_copy(values);
    let lo = s[0] - 3.0 * bw;
    let hi = s[s.len() - 1] + 3.0 * bw;
    let step = (hi - lo) / (n_points - 1) as f64;
    let scale = 1.0 / (values.len() as f64 * bw);

    (0..n_points)
        .map(|i| {
            let x = lo + step * i as f64;
            let density: f64 = values.iter().map(|&v| kernel.pdf((x - v) / bw)).sum();
            (x, density * scale)
        })
        .collect()
}
