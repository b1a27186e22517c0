use std::path::PathBuf;
use std::{env, fs};

use crate::error::BackendError;

const TOKEN_SECRET: &str = "token.secret";
const TOKEN_SECRET_LEN: usize = 64;

/// Material used to sign and verify access tokens.
#[derive(Clone)]
pub struct Security {
    pub token_secret: Vec<u8>,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security").finish_non_exhaustive()
    }
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

impl Security {
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Security {
        Security {
            token_secret: secret.as_ref().to_vec(),
        }
    }

    /// Loads the signing secret from `ACCESS_TOKEN_SECRET`, then from the
    /// security directory. With `generate-security` a missing secret is
    /// generated and persisted.
    pub fn load() -> Result<Security, BackendError> {
        if let Ok(secret) = env::var("ACCESS_TOKEN_SECRET") {
            if !secret.is_empty() {
                tracing::info!("Using token secret from environment.");
                return Ok(Security::from_secret(secret));
            }
        }

        let dir = security_dir();
        let path = dir.join(TOKEN_SECRET);

        tracing::info!("Loading token secret...");
        match fs::read(&path) {
            Ok(secret) if !secret.is_empty() => {
                tracing::info!("Token secret found and loaded.");
                return Ok(Security::from_secret(secret));
            }
            _ => tracing::info!("Token secret not found in '{}'.", path.display()),
        }

        if !cfg!(feature = "generate-security") {
            return Err(BackendError::Security(format!(
                "no ACCESS_TOKEN_SECRET set and '{}' is missing",
                path.display()
            )));
        }

        tracing::info!("Generating a new token secret.");
        let secret: Vec<u8> = (0..TOKEN_SECRET_LEN).map(|_| rand::random::<u8>()).collect();

        fs::create_dir_all(&dir)
            .and_then(|_| fs::write(&path, &secret))
            .map_err(|e| BackendError::Security(format!("unable to write token secret: {}", e)))?;

        Ok(Security::from_secret(secret))
    }
}
