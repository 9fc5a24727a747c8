use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailsError {
    #[error("name must not be empty")]
    MissingName,
}

/// Name and optional description collected by the create dialogs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Details {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Details {
    /// Trims both fields; a blank description becomes `None`.
    pub fn parse(name: &str, description: &str) -> Result<Self, DetailsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DetailsError::MissingName);
        }
        let description = description.trim();
        Ok(Self {
            name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
        })
    }
}
