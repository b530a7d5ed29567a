//! Local private key files

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::ClusterId;

/// One private key file per cluster under a single directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fixed key path for a cluster
    pub fn path_for(&self, cluster_id: &ClusterId) -> io::Result<PathBuf> {
        let name = cluster_id.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Cluster ID {:?} is not usable as a file name", name),
            ));
        }
        Ok(self.dir.join(name))
    }

    /// Delete any existing key for the cluster and write `private_key` readable
    /// by the owner only
    pub fn replace(&self, cluster_id: &ClusterId, private_key: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(cluster_id)?;
        fs::create_dir_all(&self.dir)?;

        remove_if_exists(&path)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        file.write_all(private_key)?;
        file.sync_all()?;

        tracing::debug!("Wrote private key for {} to {:?}", cluster_id, path);
        Ok(path)
    }

    /// Remove the cluster's key; a missing file is not an error
    pub fn forget(&self, cluster_id: &ClusterId) -> io::Result<()> {
        remove_if_exists(&self.path_for(cluster_id)?)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
