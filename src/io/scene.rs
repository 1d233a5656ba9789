//! Single-scene layout: one multi-band GeoTIFF per date plus a change raster,
//! with patch origins listed in a CSV file

use crate::types::{Mask, PrepError, PrepResult};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Change raster read when no other file name is configured
pub const DEFAULT_CHANGE_FILE: &str = "Changes_06_11.tif";

/// Blue, green, red and near-infrared planes of an 8-band product
const EIGHT_BAND_SELECTION: [usize; 4] = [1, 2, 4, 7];

/// Directory tree of a single scene:
///
/// ```text
/// <root>/Images/<date>.tif
/// <root>/Ground_truth/Changes/<change file>
/// ```
#[derive(Debug, Clone)]
pub struct SceneLayout {
    root: PathBuf,
    change_file: String,
}

impl SceneLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            change_file: DEFAULT_CHANGE_FILE.to_string(),
        }
    }

    pub fn with_change_file(mut self, change_file: impl Into<String>) -> Self {
        self.change_file = change_file.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifier used for the scene's tiles; the root directory name
    pub fn scene_id(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_string())
    }

    pub fn label_path(&self) -> PathBuf {
        self.root
            .join("Ground_truth")
            .join("Changes")
            .join(&self.change_file)
    }

    /// GeoTIFFs under `Images/`, sorted by file name; the first is the earliest date
    pub fn date_files(&self) -> PrepResult<Vec<PathBuf>> {
        let images_dir = self.root.join("Images");
        let mut files: Vec<PathBuf> = std::fs::read_dir(&images_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_geotiff(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(PrepError::InvalidFormat(format!(
                "No GeoTIFF dates found under {}",
                images_dir.display()
            )));
        }

        log::debug!("Found {} dates under {}", files.len(), images_dir.display());
        Ok(files)
    }
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Zero-based planes kept from a file with `num_bands` bands
pub fn select_bands(num_bands: usize) -> PrepResult<Vec<usize>> {
    match num_bands {
        4 => Ok((0..4).collect()),
        8 => Ok(EIGHT_BAND_SELECTION.to_vec()),
        n => Err(PrepError::InvalidFormat(format!(
            "Unsupported band count {} (expected 4 or 8)",
            n
        ))),
    }
}

/// Any non-zero change value marks a changed pixel
pub fn change_mask(raw: &Array2<u8>) -> Mask {
    raw.mapv(|v| u8::from(v > 0))
}

/// Parse `row,col` patch origins, one per line; extra columns are ignored
pub fn parse_origins(content: &str) -> PrepResult<Vec<(usize, usize)>> {
    let mut origins = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() < 2 {
            return Err(PrepError::InvalidFormat(format!(
                "Origin line {} has {} columns, expected at least 2",
                line_no + 1,
                cols.len()
            )));
        }

        let parse = |col: usize| {
            cols[col].parse::<usize>().map_err(|e| {
                PrepError::InvalidFormat(format!(
                    "Origin line {}, col {}: parse error: {}",
                    line_no + 1,
                    col,
                    e
                ))
            })
        };
        origins.push((parse(0)?, parse(1)?));
    }

    if origins.is_empty() {
        return Err(PrepError::InvalidFormat("Origin list is empty".to_string()));
    }
    Ok(origins)
}

pub fn read_origins_csv<P: AsRef<Path>>(path: P) -> PrepResult<Vec<(usize, usize)>> {
    log::info!("Loading patch origins from: {}", path.as_ref().display());
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_origins(&content)
}
