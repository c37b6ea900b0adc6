//! Interface to the on-disk dataset produced by the preparation
//! collaborator: the class-metadata JSON document and path conventions.
//!
//! Image decoding itself stays outside this crate; decoded samples
//! arrive as [`crate::features::LabeledImage`] records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Class metadata persisted by the dataset-balancing step.
///
/// `label_names` is indexed by the *original* dataset label;
/// `label_mapping` maps an original label (as a decimal string, the way
/// JSON object keys arrive) to its remapped consecutive index. The
/// mapping is used only to label visualizations, never for numeric
/// computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub label_names: Vec<String>,
    pub label_mapping: BTreeMap<String, usize>,
}

impl ClassInfo {
    /// Reads and parses `class_info.json` from the given path.
    ///
    /// I/O and parse failures surface to the caller unmodified; a
    /// missing or corrupt metadata file indicates broken external state
    /// this crate does not try to repair.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let file = File::open(path.as_ref())
            .map_err(|e| format!("Failed to open class metadata {:?}: {}", path.as_ref(), e))?;
        let info: ClassInfo = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| format!("Failed to parse class metadata {:?}: {}", path.as_ref(), e))?;
        Ok(info)
    }

    /// Display names ordered by remapped index, i.e. `result[i]` is the
    /// human-readable name of model class `i`.
    ///
    /// # Errors
    /// Returns an error if a mapping key is not a decimal original
    /// label or points outside `label_names`.
    pub fn class_names(&self) -> Result<Vec<String>, Box<dyn Error>> {
        let mut entries: Vec<(usize, usize)> = Vec::with_capacity(self.label_mapping.len());
        for (original, &remapped) in &self.label_mapping {
            let original_idx: usize = original.parse().map_err(|_| {
                format!(
                    "Class metadata key {:?} is not a decimal original label.",
                    original
                )
            })?;
            if original_idx >= self.label_names.len() {
                return Err(format!(
                    "Class metadata maps original label {} but only {} names are listed.",
                    original_idx,
                    self.label_names.len()
                )
                .into());
            }
            entries.push((remapped, original_idx));
        }
        entries.sort_unstable();
        Ok(entries
            .into_iter()
            .map(|(_, original_idx)| self.label_names[original_idx].clone())
            .collect())
    }
}

/// Path conventions of the balanced dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the persisted sample files.
    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Persisted sample file for the i-th record.
    pub fn image_path(&self, index: usize) -> PathBuf {
        self.images_dir().join(format!("img_{}.png", index))
    }

    /// The class-metadata document.
    pub fn class_info_path(&self) -> PathBuf {
        self.root.join("class_info.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_orders_class_names() -> Result<(), Box<dyn Error>> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "label_names": ["dog", "elephant", "giraffe", "guitar", "horse"],
                "label_mapping": {{"3": 0, "1": 1, "4": 2, "0": 3}}
            }}"#
        )?;

        let info = ClassInfo::load(file.path())?;
        let names = info.class_names()?;
        assert_eq!(names, vec!["guitar", "elephant", "horse", "dog"]);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_mapping() -> Result<(), Box<dyn Error>> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{"label_names": ["dog"], "label_mapping": {{"7": 0}}}}"#
        )?;
        let info = ClassInfo::load(file.path())?;
        assert!(info.class_names().is_err());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ClassInfo::load("/nonexistent/class_info.json").is_err());
    }

    #[test]
    fn layout_paths() {
        let layout = DatasetLayout::new("/data/balanced");
        assert_eq!(
            layout.image_path(3),
            PathBuf::from("/data/balanced/images/img_3.png")
        );
        assert_eq!(
            layout.class_info_path(),
            PathBuf::from("/data/balanced/class_info.json")
        );
    }
}
