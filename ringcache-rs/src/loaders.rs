//! Provides loaders which can be set up via the config.
//!
//! Currently this is the [FileLoader](FileLoader) which serves the files of a directory, using
//! the file name as key. This permits to run a cluster which caches slow storage (e.g. a network
//! mount) without writing a single line of code.
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::group::Loader;

/// Serves the files within a directory.
///
/// Keys are resolved relative to the directory. Keys which contain a path separator or a
/// parent directory reference are rejected, so that no file outside of the directory can be
/// read.
pub struct FileLoader {
    directory: PathBuf,
}

impl FileLoader {
    /// Creates a loader for the given directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        FileLoader {
            directory: directory.into(),
        }
    }

    /// Returns the directory being served.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(anyhow::anyhow!("'{}' is not a valid file name", key));
        }

        Ok(self.directory.join(key))
    }
}

#[async_trait]
impl Loader for FileLoader {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use crate::group::Loader;
    use crate::loaders::FileLoader;

    #[test]
    fn files_are_served_by_name() {
        crate::testing::test_async(async {
            let directory = std::env::temp_dir().join("ringcache-file-loader-test");
            tokio::fs::create_dir_all(&directory).await.unwrap();
            tokio::fs::write(directory.join("Tom"), "630").await.unwrap();

            let loader = FileLoader::new(&directory);
            assert_eq!(loader.load("Tom").await.unwrap(), b"630".to_vec());
            assert_eq!(loader.load("Unknown").await.is_err(), true);

            tokio::fs::remove_dir_all(&directory).await.unwrap();
        });
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        crate::testing::test_async(async {
            let loader = FileLoader::new("data");
            for key in ["../secret", "a/b", "a\\b", ".."] {
                let error = loader.load(key).await.unwrap_err();
                assert_eq!(error.to_string(), format!("'{}' is not a valid file name", key));
            }
        });
    }
}
