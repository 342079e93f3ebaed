//! Defines the [`TitleIndex`] type, which resolves a post source file's path
//! to its human-readable title.
//!
//! Titles live in a separate line-oriented resource rather than in the post
//! sources themselves: one entry per line, `<filename>|<title>`, with the
//! filename relative to the visible-posts directory. The index loads the
//! whole resource lazily on first use and keeps it in memory. A lookup miss
//! triggers one full reload before failing, so entries appended to the
//! resource while the process is running become visible on the next miss.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// The in-memory mapping from a post source's full path to its title.
pub struct TitleIndex {
    /// Path to the titles resource.
    titles_file: PathBuf,

    /// The visible-posts directory. Entries in the titles resource name
    /// files relative to this directory; map keys are the joined paths.
    posts_dir: PathBuf,

    map: HashMap<PathBuf, String>,
    loaded: bool,
}

impl TitleIndex {
    /// Constructs an index over the given titles resource. Nothing is read
    /// until the first [`TitleIndex::resolve`] call.
    pub fn new(titles_file: &Path, posts_dir: &Path) -> TitleIndex {
        TitleIndex {
            titles_file: titles_file.to_owned(),
            posts_dir: posts_dir.to_owned(),
            map: HashMap::new(),
            loaded: false,
        }
    }

    /// Resolves the title for the post source at `path`. On a miss the
    /// entire resource is reloaded once and the lookup retried; a second
    /// miss is an error, which the ingestion caller decides how to handle.
    pub fn resolve(&mut self, path: &Path) -> Result<String> {
        if !self.loaded {
            self.reload()?;
        }
        if let Some(title) = self.map.get(path) {
            return Ok(title.clone());
        }
        self.reload()?;
        match self.map.get(path) {
            Some(title) => Ok(title.clone()),
            None => Err(Error::Unknown(path.to_owned())),
        }
    }

    /// Rebuilds the map from the titles resource. The previous map is
    /// replaced wholesale, so entries removed from the resource disappear
    /// from the index too.
    pub fn reload(&mut self) -> Result<()> {
        let file = File::open(&self.titles_file).map_err(|err| Error::Open {
            path: self.titles_file.clone(),
            err,
        })?;

        let mut map = HashMap::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            match line.trim().split_once('|') {
                Some((name, title)) => {
                    map.insert(self.posts_dir.join(name), title.to_owned());
                }
                None => {
                    return Err(Error::Malformed {
                        path: self.titles_file.clone(),
                        line: number + 1,
                    })
                }
            }
        }

        self.map = map;
        self.loaded = true;
        Ok(())
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem resolving a post's title.
#[derive(Debug)]
pub enum Error {
    /// Returned when the titles resource can't be opened.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned for I/O errors while reading the titles resource.
    Io(std::io::Error),

    /// Returned for a line in the titles resource without a `|` delimiter.
    Malformed { path: PathBuf, line: usize },

    /// Returned when a path has no title, even after a reload.
    Unknown(PathBuf),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open { path, err } => {
                write!(f, "Opening titles file `{}`: {}", path.display(), err)
            }
            Error::Io(err) => err.fmt(f),
            Error::Malformed { path, line } => write!(
                f,
                "Titles file `{}` line {}: missing `|` delimiter",
                path.display(),
                line
            ),
            Error::Unknown(path) => write!(f, "No title found for `{}`", path.display()),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { path: _, err } => Some(err),
            Error::Io(err) => Some(err),
            Error::Malformed { .. } => None,
            Error::Unknown(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator when reading the titles resource.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &str) -> (tempfile::TempDir, TitleIndex) {
        let dir = tempfile::tempdir().unwrap();
        let titles_file = dir.path().join("titles");
        std::fs::write(&titles_file, contents).unwrap();
        let index = TitleIndex::new(&titles_file, &dir.path().join("visible"));
        (dir, index)
    }

    #[test]
    fn test_resolve_known_entry() {
        let (dir, mut index) = fixture("2.markdown|Hello\n3.markdown|World\n");
        let title = index.resolve(&dir.path().join("visible/3.markdown")).unwrap();
        assert_eq!(title, "World");
    }

    #[test]
    fn test_resolve_reloads_on_miss() {
        let (dir, mut index) = fixture("2.markdown|Hello\n");
        index.reload().unwrap();

        // Appended after the initial load; only visible via the reload that
        // a miss triggers.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("titles"))
            .unwrap();
        writeln!(file, "4.markdown|Latecomer").unwrap();

        let title = index.resolve(&dir.path().join("visible/4.markdown")).unwrap();
        assert_eq!(title, "Latecomer");
    }

    #[test]
    fn test_resolve_unknown_after_reload() {
        let (dir, mut index) = fixture("2.markdown|Hello\n");
        let path = dir.path().join("visible/9.markdown");
        match index.resolve(&path) {
            Err(Error::Unknown(p)) => assert_eq!(p, path),
            other => panic!("expected Unknown, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_reload_rejects_malformed_line() {
        let (dir, mut index) = fixture("2.markdown|Hello\nno delimiter here\n");
        match index.resolve(&dir.path().join("visible/2.markdown")) {
            Err(Error::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_title_may_contain_delimiter() {
        let (dir, mut index) = fixture("2.markdown|Either|Or\n");
        let title = index.resolve(&dir.path().join("visible/2.markdown")).unwrap();
        assert_eq!(title, "Either|Or");
    }

    #[test]
    fn test_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = TitleIndex::new(&dir.path().join("absent"), &dir.path().join("visible"));
        assert!(matches!(
            index.resolve(Path::new("whatever")),
            Err(Error::Open { .. })
        ));
    }
}
