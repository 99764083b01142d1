// =============================================================================
// Design Matrix Construction
// =============================================================================
//
// Categorical predictors enter a GLM through dummy (treatment) coding:
// one 0/1 column per level except the first, which becomes the reference
// absorbed by the intercept. Coefficients are then contrasts against the
// reference level; under a log link exp(β) is the ratio to the reference.
//
// =============================================================================

use ndarray::{Array1, Array2};

use crate::error::{Result, StatsError};

/// A categorical column: sorted distinct levels plus one code per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub levels: Vec<String>,
    pub codes: Vec<usize>,
}

impl Factor {
    /// Factorize string values. Levels are sorted lexicographically.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        let mut levels: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        levels.sort();
        levels.dedup();
        let codes = values
            .iter()
            .map(|v| levels.partition_point(|l| l.as_str() < v.as_ref()))
            .collect();
        Self { levels, codes }
    }

    /// Factorize integers. Levels are sorted numerically.
    pub fn from_integers(values: &[i32]) -> Self {
        let mut distinct: Vec<i32> = values.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        let codes = values
            .iter()
            .map(|v| distinct.partition_point(|l| l < v))
            .collect();
        Self {
            levels: distinct.iter().map(|l| l.to_string()).collect(),
            codes,
        }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Reference level used by treatment coding.
    pub fn reference(&self) -> Option<&str> {
        self.levels.first().map(String::as_str)
    }
}

/// A dense design matrix with a name for every column.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub matrix: Array2<f64>,
    pub names: Vec<String>,
}

/// Builds a design matrix column block by column block.
#[derive(Debug, Clone)]
pub struct DesignMatrixBuilder {
    n: usize,
    columns: Vec<Array1<f64>>,
    names: Vec<String>,
}

impl DesignMatrixBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            columns: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Add a column of ones named "(Intercept)".
    pub fn intercept(mut self) -> Self {
        self.columns.push(Array1::ones(self.n));
        self.names.push("(Intercept)".to_string());
        self
    }

    /// Add a numeric predictor.
    pub fn numeric(mut self, name: &str, values: &Array1<f64>) -> Result<Self> {
        if values.len() != self.n {
            return Err(StatsError::DimensionMismatch(format!(
                "column '{}' has {} values but the design has {} rows",
                name,
                values.len(),
                self.n
            )));
        }
        self.columns.push(values.clone());
        self.names.push(name.to_string());
        Ok(self)
    }

    /// Add treatment-coded dummies for every non-reference level.
    /// Column names follow the "NameLevel" convention (e.g. "Year2010").
    pub fn factor(mut self, name: &str, factor: &Factor) -> Result<Self> {
        if factor.len() != self.n {
            return Err(StatsError::DimensionMismatch(format!(
                "factor '{}' has {} values but the design has {} rows",
                name,
                factor.len(),
                self.n
            )));
        }
        for (level_idx, level) in factor.levels.iter().enumerate().skip(1) {
            let col: Array1<f64> = factor
                .codes
                .iter()
                .map(|&c| if c == level_idx { 1.0 } else { 0.0 })
                .collect();
            self.columns.push(col);
            self.names.push(format!("{}{}", name, level));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<DesignMatrix> {
        if self.columns.is_empty() {
            return Err(StatsError::EmptyInput("design matrix has no columns".to_string()));
        }
        let p = self.columns.len();
        let mut matrix = Array2::zeros((self.n, p));
        for (j, col) in self.columns.iter().enumerate() {
            matrix.column_mut(j).assign(col);
        }
        Ok(DesignMatrix {
            matrix,
            names: self.names,
        })
    }
}
