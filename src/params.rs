use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A single `key=value` build parameter from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl FromStr for Parameter {
    type Err = anyhow::Error;

    /// Split on the first `=`, so values may themselves contain `=`
    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("build parameter {:?} is not of the form key=value", s))?;
        if name.is_empty() {
            return Err(anyhow!("build parameter {:?} has an empty key", s));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Build parameters keyed by name
///
/// Later duplicates replace earlier ones. Iteration is sorted by key, which keeps the encoded
/// trigger URL stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParameters(BTreeMap<String, String>);

impl BuildParameters {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<Parameter> for BuildParameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| (p.name, p.value)).collect())
    }
}
