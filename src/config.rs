use crate::costs::CommissionModel;
use crate::models::ParameterSet;
use crate::optimizer::ParameterGrid;
use crate::performance::ScoreWeights;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn default_multiplier() -> f64 {
    1.0
}

fn default_train_years() -> u32 {
    2
}

fn default_test_months() -> u32 {
    6
}

fn default_commission() -> f64 {
    2.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    #[serde(default = "default_multiplier")]
    pub contract_multiplier: f64,
}

/// One grid axis. Axes keep their declaration order from the file, which
/// fixes the enumeration order of the sweep.
#[derive(Debug, Clone, Deserialize)]
pub struct GridAxis {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub initial_cash: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_train_years")]
    pub train_years: u32,
    #[serde(default = "default_test_months")]
    pub test_months: u32,
    pub symbols: Vec<SymbolSpec>,
    /// Fixed strategy parameters; grid axes override these per evaluation.
    #[serde(default)]
    pub strategy: ParameterSet,
    #[serde(default = "default_commission")]
    pub commission_per_contract: f64,
    #[serde(default)]
    pub grid: Vec<GridAxis>,
    #[serde(default)]
    pub weights: ScoreWeights,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            bail!("initial_cash must be positive, got {}", self.initial_cash);
        }
        if self.end_date <= self.start_date {
            bail!(
                "end_date {} must be after start_date {}",
                self.end_date,
                self.start_date
            );
        }
        if self.train_years == 0 {
            bail!("train_years must be at least 1");
        }
        if self.test_months == 0 {
            bail!("test_months must be at least 1");
        }
        if self.symbols.is_empty() {
            bail!("at least one symbol is required");
        }
        for spec in &self.symbols {
            if spec.symbol.trim().is_empty() {
                bail!("symbol names cannot be empty");
            }
            if !spec.contract_multiplier.is_finite() || spec.contract_multiplier <= 0.0 {
                bail!(
                    "contract_multiplier for {} must be positive, got {}",
                    spec.symbol,
                    spec.contract_multiplier
                );
            }
        }
        if !self.commission_per_contract.is_finite() || self.commission_per_contract < 0.0 {
            bail!(
                "commission_per_contract must be non-negative, got {}",
                self.commission_per_contract
            );
        }
        Ok(())
    }

    pub fn multipliers(&self) -> HashMap<String, f64> {
        self.symbols
            .iter()
            .map(|spec| (spec.symbol.clone(), spec.contract_multiplier))
            .collect()
    }

    pub fn costs(&self) -> CommissionModel {
        CommissionModel {
            per_contract: self.commission_per_contract,
        }
    }

    /// The grid section as an ordered parameter grid. Errors when the file
    /// declares no axes, since every sweep needs at least one.
    pub fn parameter_grid(&self) -> Result<ParameterGrid> {
        if self.grid.is_empty() {
            bail!("the config file declares no grid axes");
        }
        ParameterGrid::new(
            self.grid
                .iter()
                .map(|axis| (axis.name.clone(), axis.values.clone()))
                .collect(),
        )
    }
}
