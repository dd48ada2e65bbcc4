//! Deployment options

use std::path::{Path, PathBuf};

/// What to deploy and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Directory holding `cytomine.yml` and the compose files
    pub source: PathBuf,
    /// Directory the generated files are written to
    pub target: PathBuf,
    /// Extra descriptors merged over the main one, in order
    pub overlays: Vec<PathBuf>,
    /// Generate new values instead of reusing the previous deployment's
    pub regenerate: bool,
    /// Compute everything, write nothing
    pub dry_run: bool,
}

impl DeployOptions {
    /// Deploy `source` in place
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: source.to_path_buf(),
            overlays: Vec::new(),
            regenerate: false,
            dry_run: false,
        }
    }

    /// Set target directory
    pub fn target(mut self, target: &Path) -> Self {
        self.target = target.to_path_buf();
        self
    }

    /// Add an overlay descriptor
    pub fn overlay(mut self, path: &Path) -> Self {
        self.overlays.push(path.to_path_buf());
        self
    }

    pub fn regenerate(mut self, regenerate: bool) -> Self {
        self.regenerate = regenerate;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether generated files land next to the sources
    pub fn in_place(&self) -> bool {
        match (self.source.canonicalize(), self.target.canonicalize()) {
            (Ok(source), Ok(target)) => source == target,
            _ => self.source == self.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = DeployOptions::new(Path::new("/srv/cytomine"))
            .target(Path::new("/srv/out"))
            .overlay(Path::new("/srv/cytomine/cytomine.local.yml"))
            .regenerate(true);

        assert_eq!(options.target, PathBuf::from("/srv/out"));
        assert_eq!(options.overlays.len(), 1);
        assert!(options.regenerate);
        assert!(!options.dry_run);
        assert!(!options.in_place());
    }

    #[test]
    fn test_in_place_by_default() {
        assert!(DeployOptions::new(Path::new(".")).in_place());
    }
}
