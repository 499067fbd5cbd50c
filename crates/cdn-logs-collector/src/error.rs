// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while validating the collector configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid export header '{0}', expected KEY=VALUE")]
    InvalidHeader(String),
}

/// Errors raised by the object source. All of them end the run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Credentials have expired: {0}")]
    CredentialsExpired(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Failed to decompress {key}: {message}")]
    Decompress { key: String, message: String },
}

impl SourceError {
    /// Operator hint printed when the run stops on this error.
    #[must_use]
    pub fn guidance(&self, profile: Option<&str>) -> Vec<String> {
        match self {
            Self::CredentialsExpired(_) => {
                let mut hints = vec![
                    "AWS SSO token has expired. Log in again with:".to_string(),
                    "  aws sso login".to_string(),
                ];
                if let Some(profile) = profile {
                    hints.push(format!("  (or: aws sso login --profile {profile})"));
                }
                hints
            }
            Self::AccessDenied(_) => vec![
                "Check that the credentials in use can list and read the bucket".to_string(),
                "(s3:ListBucket and s3:GetObject), and that --region matches the bucket."
                    .to_string(),
            ],
            Self::NotFound(_) => {
                vec!["Check the bucket name, the --prefix values and --key.".to_string()]
            }
            Self::Storage(_) | Self::Decompress { .. } => Vec::new(),
        }
    }
}

/// Errors ending a collector run
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Failed to start log export: {0}")]
    ExportStart(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl CollectorError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Source(_) | Self::ExportStart(_) | Self::Output(_) => 1,
        }
    }
}
