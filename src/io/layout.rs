//! On-disk layout of a change-detection dataset
//!
//! ```text
//! <root>/train_labels/<city>/cm/cm.png
//! <root>/images/<city>/imgs_1/<prefix><BAND>.tif
//! <root>/images/<city>/imgs_2/<prefix><BAND>.tif
//! <root>/multidate_metadata.json   (optional, city -> date index -> directory)
//! ```

use crate::types::{PrepError, PrepResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const MULTIDATE_METADATA_FILE: &str = "multidate_metadata.json";

/// Common path prefix of a date's band files, e.g. `.../imgs_1/S2A_20170301_`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPrefix(PathBuf);

impl BandPrefix {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self(prefix.into())
    }

    /// Path of one band file under this prefix
    pub fn band_path(&self, band_id: &str) -> PathBuf {
        let mut path: OsString = self.0.clone().into_os_string();
        path.push(band_id);
        path.push(".tif");
        PathBuf::from(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Locate the band-file prefix inside a date directory.
///
/// The first `.tif` (by name) ending in a known band identifier decides the prefix.
pub fn find_band_prefix<S: AsRef<str>>(dir: &Path, band_ids: &[S]) -> PrepResult<BandPrefix> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".tif"))
        .collect();
    names.sort();

    for name in &names {
        let stem = &name[..name.len() - ".tif".len()];
        for band in band_ids {
            if let Some(prefix) = stem.strip_suffix(band.as_ref()) {
                return Ok(BandPrefix(dir.join(prefix)));
            }
        }
    }

    Err(PrepError::InvalidFormat(format!(
        "No band raster found in {} ({} .tif files)",
        dir.display(),
        names.len()
    )))
}

/// City -> date index -> directory mapping for datasets with more than two dates
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct MultidateMetadata {
    cities: HashMap<String, BTreeMap<String, PathBuf>>,
}

impl MultidateMetadata {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        log::info!("Reading multi-date metadata from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn contains(&self, city: &str) -> bool {
        self.cities.contains_key(city)
    }

    /// Date directories of a city, ordered by numeric date index
    pub fn date_dirs(&self, city: &str) -> PrepResult<Vec<PathBuf>> {
        let dates = self.cities.get(city).ok_or_else(|| {
            PrepError::InvalidFormat(format!("City {} missing from multi-date metadata", city))
        })?;

        let mut indexed = dates
            .iter()
            .map(|(key, dir)| {
                key.trim()
                    .parse::<usize>()
                    .map(|index| (index, dir.clone()))
                    .map_err(|e| {
                        PrepError::InvalidFormat(format!(
                            "City {}: invalid date index '{}': {}",
                            city, key, e
                        ))
                    })
            })
            .collect::<PrepResult<Vec<_>>>()?;
        indexed.sort_by_key(|(index, _)| *index);

        Ok(indexed.into_iter().map(|(_, dir)| dir).collect())
    }
}

/// Path resolution for one dataset root
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
    multidate: Option<MultidateMetadata>,
}

impl DatasetLayout {
    /// Two-date layout (`imgs_1`, `imgs_2`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            multidate: None,
        }
    }

    /// Layout whose date directories come from `multidate_metadata.json`
    pub fn with_multidate_metadata(root: impl Into<PathBuf>) -> PrepResult<Self> {
        let root = root.into();
        let metadata = MultidateMetadata::from_json_file(root.join(MULTIDATE_METADATA_FILE))?;
        Ok(Self {
            root,
            multidate: Some(metadata),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_multidate(&self) -> bool {
        self.multidate.is_some()
    }

    /// Sorted city identifiers; the position in this list is the city index
    pub fn cities(&self) -> PrepResult<Vec<String>> {
        let labels_dir = self.root.join("train_labels");
        let mut cities: Vec<String> = std::fs::read_dir(&labels_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.contains(".txt"))
            .filter(|name| match &self.multidate {
                Some(metadata) => metadata.contains(name),
                None => true,
            })
            .collect();
        cities.sort();

        if cities.is_empty() {
            return Err(PrepError::InvalidFormat(format!(
                "No cities found under {}",
                labels_dir.display()
            )));
        }

        log::debug!("Found {} cities under {}", cities.len(), labels_dir.display());
        Ok(cities)
    }

    pub fn label_path(&self, city: &str) -> PathBuf {
        self.root
            .join("train_labels")
            .join(city)
            .join("cm")
            .join("cm.png")
    }

    /// Date directories of a city, reference date first
    pub fn date_dirs(&self, city: &str) -> PrepResult<Vec<PathBuf>> {
        match &self.multidate {
            Some(metadata) => metadata.date_dirs(city),
            None => {
                let city_dir = self.root.join("images").join(city);
                Ok(vec![city_dir.join("imgs_1"), city_dir.join("imgs_2")])
            }
        }
    }

    /// Band-file prefixes of every date of a city
    pub fn date_prefixes<S: AsRef<str>>(&self, city: &str, band_ids: &[S]) -> PrepResult<Vec<BandPrefix>> {
        self.date_dirs(city)?
            .iter()
            .map(|dir| find_band_prefix(dir, band_ids))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_path_appends_identifier() {
        let prefix = BandPrefix::new("/data/images/paris/imgs_1/S2A_T31UDQ_");
        assert_eq!(prefix.as_path(), Path::new("/data/images/paris/imgs_1/S2A_T31UDQ_"));
        assert_eq!(
            prefix.band_path("B8A"),
            PathBuf::from("/data/images/paris/imgs_1/S2A_T31UDQ_B8A.tif")
        );
    }

    #[test]
    fn test_label_and_date_paths() {
        let layout = DatasetLayout::new("/data/onera");
        assert_eq!(layout.root(), Path::new("/data/onera"));
        assert!(!layout.is_multidate());
        assert_eq!(
            layout.label_path("paris"),
            PathBuf::from("/data/onera/train_labels/paris/cm/cm.png")
        );
        assert_eq!(
            layout.date_dirs("paris").unwrap(),
            vec![
                PathBuf::from("/data/onera/images/paris/imgs_1"),
                PathBuf::from("/data/onera/images/paris/imgs_2"),
            ]
        );
    }

    #[test]
    fn test_multidate_dirs_sorted_numerically() {
        let json = r#"{ "lasvegas": { "10": "/d/10", "2": "/d/2", "0": "/d/0" } }"#;
        let metadata: MultidateMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            metadata.date_dirs("lasvegas").unwrap(),
            vec![PathBuf::from("/d/0"), PathBuf::from("/d/2"), PathBuf::from("/d/10")]
        );
        assert!(metadata.date_dirs("paris").is_err());
    }

    #[test]
    fn test_multidate_rejects_bad_index() {
        let json = r#"{ "paris": { "first": "/d/0" } }"#;
        let metadata: MultidateMetadata = serde_json::from_str(json).unwrap();
        assert!(matches!(metadata.date_dirs("paris"), Err(PrepError::InvalidFormat(_))));
    }
}
