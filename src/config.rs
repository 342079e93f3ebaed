use crate::util::open;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const PROJECT_FILE: &str = "blogsync.yaml";

#[derive(Deserialize)]
struct Project {
    #[serde(default = "default_database")]
    database: PathBuf,

    #[serde(default = "default_titles")]
    titles: PathBuf,

    #[serde(default = "default_posts")]
    posts: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("blog.sql")
}

fn default_titles() -> PathBuf {
    PathBuf::from("posts/titles")
}

fn default_posts() -> PathBuf {
    PathBuf::from("posts/visible")
}

/// Resolved project configuration. All paths are absolute or relative to
/// wherever the project file was found, never to the working directory.
pub struct Config {
    pub database: PathBuf,
    pub titles: PathBuf,
    pub posts: PathBuf,
}

impl Config {
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            match Config::from_project_file(&path) {
                Ok(config) => Ok(config),
                Err(e) => Err(anyhow!("Loading configuration: {:?}", e)),
            }
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(path: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        match path.parent() {
            None => Err(anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )),
            Some(project_root) => Ok(Config {
                database: project_root.join(project.database),
                titles: project_root.join(project.titles),
                posts: project_root.join(project.posts),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_project_file_applies_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        std::fs::write(&path, "database: my.sql\n")?;

        let config = Config::from_project_file(&path)?;
        assert_eq!(config.database, dir.path().join("my.sql"));
        assert_eq!(config.titles, dir.path().join("posts/titles"));
        assert_eq!(config.posts, dir.path().join("posts/visible"));
        Ok(())
    }

    #[test]
    fn test_from_directory_walks_up() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            "titles: titles.txt\nposts: visible\n",
        )?;
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested)?;
        assert_eq!(config.titles, dir.path().join("titles.txt"));
        assert_eq!(config.posts, dir.path().join("visible"));
        Ok(())
    }

    #[test]
    fn test_from_directory_without_project_file() {
        assert!(Config::from_directory(Path::new("/nonexistent-blogsync")).is_err());
    }
}
