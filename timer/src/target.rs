use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::TimerError;

/// The script or executable selected by the user, plus any arguments that
/// should be passed through on every launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: PathBuf,
    args: Vec<String>,
}

impl Target {
    /// Validates `path` and builds a target with no arguments.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TimerError> {
        let path = path.into();
        validate(&path)?;
        Ok(Self {
            path,
            args: Vec::new(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// File name shown in status lines, e.g. `backup.sh`.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Re-checks the path. The file may have been removed or had its
    /// permissions changed since it was selected.
    pub fn revalidate(&self) -> Result<(), TimerError> {
        validate(&self.path)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn validate(path: &Path) -> Result<(), TimerError> {
    if path.as_os_str().is_empty() {
        return Err(TimerError::invalid_target(path, "path is empty"));
    }
    let metadata = std::fs::metadata(path)
        .map_err(|e| TimerError::invalid_target(path, format!("file not found ({e})")))?;
    if !metadata.is_file() {
        return Err(TimerError::invalid_target(path, "not a regular file"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(TimerError::invalid_target(path, "file is not executable"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Target::new(dir.path().join("nope.sh")).unwrap_err();
        assert!(matches!(err, TimerError::InvalidTargetPath { .. }));
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = Target::new("").unwrap_err();
        assert!(err.to_string().contains("path is empty"));
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Target::new(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let err = Target::new(&path).unwrap_err();
        assert!(err.to_string().contains("not executable"));
    }

    #[cfg(unix)]
    #[test]
    fn executable_file_is_accepted() {
        let target = Target::new("/bin/sh").unwrap().with_args(["-c", "exit 0"]);
        assert_eq!(target.display_name(), "sh");
        assert_eq!(target.args(), ["-c", "exit 0"]);
        assert_eq!(target.to_string(), "/bin/sh -c exit 0");
    }

    #[cfg(unix)]
    #[test]
    fn revalidate_notices_removed_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let target = Target::new(&path).unwrap();
        assert!(target.revalidate().is_ok());
        std::fs::remove_file(&path).unwrap();
        assert!(target.revalidate().is_err());
    }
}
