//! On-disk session token.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use prl_core::{errors::Error, Result};

#[derive(Clone, Debug)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or blank file means "no session yet".
    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => {
                let token = s.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::Store {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Writes the token readable by the owner only.
    pub fn store(&self, token: &str) -> Result<()> {
        let store_err = |source: io::Error| Error::Store {
            path: self.path.clone(),
            source,
        };

        fs::write(&self.path, token.as_bytes()).map_err(store_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(store_err)?;
        }

        Ok(())
    }
}
