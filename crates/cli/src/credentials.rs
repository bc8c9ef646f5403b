//! Password resolution.

use anyhow::{Context, Result, bail};
use packrat_core::config::CredentialsConfig;
use packrat_repo::Credentials;

/// Resolve the configured password once, before any action runs.
///
/// A password file takes the first line of the file with surrounding
/// whitespace removed.
pub async fn resolve_credentials(config: &CredentialsConfig) -> Result<Credentials> {
    if let Some(password) = &config.password {
        return Ok(Credentials::with_password(password.clone()));
    }
    let Some(path) = &config.password_file else {
        return Ok(Credentials::default());
    };

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read password file {}", path.display()))?;
    let password = contents.lines().next().unwrap_or_default().trim();
    if password.is_empty() {
        bail!("password file {} is empty", path.display());
    }
    Ok(Credentials::with_password(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_password_wins() {
        let config = CredentialsConfig {
            password: Some("inline".to_string()),
            password_file: None,
        };
        let creds = resolve_credentials(&config).await.unwrap();
        assert_eq!(creds.password.as_deref(), Some("inline"));
    }

    #[tokio::test]
    async fn test_password_file_is_trimmed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("password");
        tokio::fs::write(&path, "  from-file \nignored\n").await.unwrap();

        let config = CredentialsConfig {
            password: None,
            password_file: Some(path),
        };
        let creds = resolve_credentials(&config).await.unwrap();
        assert_eq!(creds.password.as_deref(), Some("from-file"));
    }

    #[tokio::test]
    async fn test_empty_or_missing_password_file_fails() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        tokio::fs::write(&empty, "\n").await.unwrap();

        for path in [empty, temp.path().join("missing")] {
            let config = CredentialsConfig {
                password: None,
                password_file: Some(path),
            };
            assert!(resolve_credentials(&config).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_no_password_configured() {
        let creds = resolve_credentials(&CredentialsConfig::default()).await.unwrap();
        assert!(creds.password.is_none());
    }
}
