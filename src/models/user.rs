//! Participant identity models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two fixed roles a participant can have on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employer,
    #[serde(alias = "jobseeker")]
    Candidate,
}

impl Role {
    /// The counterpart role in a conversation.
    pub fn other(self) -> Self {
        match self {
            Role::Employer => Role::Candidate,
            Role::Candidate => Role::Employer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employer => "employer",
            Role::Candidate => "candidate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "employer" => Ok(Role::Employer),
            "candidate" | "jobseeker" => Ok(Role::Candidate),
            other => Err(format!(
                "unknown role '{}' (expected employer or candidate)",
                other
            )),
        }
    }
}

/// The authenticated local participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            display_name: None,
        }
    }

    /// Name to show in the UI, falling back to the raw id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_other() {
        assert_eq!(Role::Employer.other(), Role::Candidate);
        assert_eq!(Role::Candidate.other(), Role::Employer);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Employer".parse::<Role>().unwrap(), Role::Employer);
        assert_eq!(" candidate ".parse::<Role>().unwrap(), Role::Candidate);
        assert_eq!("jobseeker".parse::<Role>().unwrap(), Role::Candidate);
        assert!("recruiter".parse::<Role>().is_err());
    }
}
