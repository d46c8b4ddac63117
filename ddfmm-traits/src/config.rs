//! Configuration (§6): a string->string option map consumed once by
//! hierarchy setup. The driver reads this at startup; the core never
//! re-reads or mutates it afterward.

use crate::{DdfmmError, Result};
use ddfmm_geometry::Vector3;
use std::collections::HashMap;

/// Option map keyed by the names listed in §6: `K`, `ptsmax`, `maxlevel`,
/// `NPQ`, `ACCU`, `center`.
#[derive(Clone, Debug, Default)]
pub struct Config {
    options: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.insert(key.into(), value.into());
        self
    }

    fn get(&self, key: &str) -> Result<&str> {
        self.options
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| DdfmmError::Config(format!("missing option '{key}'")))
    }

    /// `K`: problem size in wavelengths across the domain.
    pub fn wavenumber_k(&self) -> Result<f64> {
        self.get("K")?
            .parse()
            .map_err(|_| DdfmmError::Config("K must be a float".into()))
    }

    /// `ptsmax`: maximum points per leaf before subdivision.
    pub fn ptsmax(&self) -> Result<usize> {
        self.get("ptsmax")?
            .parse()
            .map_err(|_| DdfmmError::Config("ptsmax must be an integer".into()))
    }

    /// `maxlevel`: the deepest level the hierarchy builder may create.
    pub fn maxlevel(&self) -> Result<u32> {
        self.get("maxlevel")?
            .parse()
            .map_err(|_| DdfmmError::Config("maxlevel must be an integer".into()))
    }

    /// `NPQ`: number of points per equivalent-surface dimension.
    pub fn npq(&self) -> Result<usize> {
        self.get("NPQ")?
            .parse()
            .map_err(|_| DdfmmError::Config("NPQ must be an integer".into()))
    }

    /// `ACCU`: the target accuracy digits, driving wedge/surface density.
    pub fn accuracy(&self) -> Result<f64> {
        self.get("ACCU")?
            .parse()
            .map_err(|_| DdfmmError::Config("ACCU must be a float".into()))
    }

    /// `center`: the domain center, `"x,y,z"`.
    pub fn center(&self) -> Result<Vector3> {
        let raw = self.get("center")?;
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() != 3 {
            return Err(DdfmmError::Config("center must be 'x,y,z'".into()));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| DdfmmError::Config("center components must be floats".into()))
        };
        Ok(Vector3::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}
