use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::NormalizerError;

/// Set of accepted geometry type names. Empty accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryTypeFilter {
    types: BTreeSet<String>,
}

impl GeometryTypeFilter {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = types
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { types }
    }

    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Names are compared case-insensitively against the OGR vocabulary
    /// (`POINT`, `LINESTRING`, `POLYGON`, ...).
    pub fn accepts(&self, type_name: &str) -> bool {
        self.types.is_empty() || self.types.contains(&type_name.to_uppercase())
    }
}

/// What happens to a feature whose geometry type is rejected by the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Write an empty feature (no geometry, no properties) in its place
    #[default]
    Placeholder,
    /// Leave the feature out of the output
    Skip,
}

impl FromStr for FilterMode {
    type Err = NormalizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "placeholder" => Ok(FilterMode::Placeholder),
            "skip" => Ok(FilterMode::Skip),
            other => Err(NormalizerError::Config(format!(
                "unknown filtered geometry mode: {}",
                other
            ))),
        }
    }
}
