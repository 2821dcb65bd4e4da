use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use walkdir::WalkDir;

/// Timestamp formats accepted in frame filenames, tried in priority order.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d_%H-%M-%S", "%Y%m%d%H%M%S"];

/// Extensions treated as frames. Extension check only, no content sniffing.
const IMAGE_EXTENSIONS: [&str; 2] = ["png", "jpg"];

/// Separator between the camera prefix and the timestamp portion.
const CAMERA_DELIMITER: char = '-';

/// Ordering key for one frame.
///
/// All parsed keys sort before all fallback keys; fallback keys sort
/// lexically among themselves, so a folder of unparseable names degrades
/// to plain filename order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderKey {
    Parsed(NaiveDateTime),
    Fallback(String),
}

impl OrderKey {
    /// Derive the ordering key from a file name.
    ///
    /// Each accepted format is tried against the file stem and against
    /// the stem with the camera prefix stripped; the first successful
    /// parse wins. Names that match nothing keep the whole file name as
    /// a lexical key.
    pub fn from_file_name(name: &str) -> Self {
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        let stripped = stem.split_once(CAMERA_DELIMITER).map(|(_, rest)| rest);

        for format in TIMESTAMP_FORMATS {
            for candidate in [Some(stem), stripped].into_iter().flatten() {
                if let Ok(timestamp) = NaiveDateTime::parse_from_str(candidate, format) {
                    return OrderKey::Parsed(timestamp);
                }
            }
        }
        OrderKey::Fallback(name.to_string())
    }
}

/// Camera identity of a frame: the file-name prefix before the first `-`.
///
/// Names without the delimiter, or with nothing before it, have no usable
/// camera id; such frames can never be paired for comparison.
pub fn camera_id(name: &str) -> Option<&str> {
    match name.split_once(CAMERA_DELIMITER) {
        Some(("", _)) | None => None,
        Some((prefix, _)) => Some(prefix),
    }
}

/// One image file in a sweep sequence.
#[derive(Debug, Clone)]
pub struct FrameFile {
    pub path: PathBuf,
    pub file_name: String,
    pub order_key: OrderKey,
}

impl FrameFile {
    pub fn camera(&self) -> Option<&str> {
        camera_id(&self.file_name)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

/// List the image files directly inside `dir`, sorted by ordering key.
///
/// Ties are broken by file name so the resulting order is total; the
/// windowed sweep and the consecutive-pair calibration both rely on it.
pub fn list_frames(dir: &Path) -> Vec<FrameFile> {
    let mut frames: Vec<FrameFile> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let order_key = OrderKey::from_file_name(&file_name);
            FrameFile {
                path: entry.into_path(),
                file_name,
                order_key,
            }
        })
        .collect();

    frames.sort_by(|a, b| {
        a.order_key
            .cmp(&b.order_key)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn timestamp(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_dashed_timestamp() {
        let key = OrderKey::from_file_name("c10-2024-05-01_10-30-00.png");
        assert_eq!(key, OrderKey::Parsed(timestamp(2024, 5, 1, 10, 30, 0)));
    }

    #[test]
    fn parses_compact_timestamp() {
        let key = OrderKey::from_file_name("c3-20240501103000.jpg");
        assert_eq!(key, OrderKey::Parsed(timestamp(2024, 5, 1, 10, 30, 0)));
    }

    #[test]
    fn parses_timestamp_without_camera_prefix() {
        let key = OrderKey::from_file_name("2024-05-01_10-30-00.png");
        assert_eq!(key, OrderKey::Parsed(timestamp(2024, 5, 1, 10, 30, 0)));
    }

    #[test]
    fn unparseable_name_falls_back_to_file_name() {
        let key = OrderKey::from_file_name("snapshot.png");
        assert_eq!(key, OrderKey::Fallback("snapshot.png".to_string()));
    }

    #[test]
    fn parsed_keys_sort_before_fallback_keys() {
        let mut keys = vec![
            OrderKey::from_file_name("banana.png"),
            OrderKey::from_file_name("c1-2024-05-01_10-30-01.png"),
            OrderKey::from_file_name("apple.png"),
            OrderKey::from_file_name("c1-2024-05-01_10-30-00.png"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                OrderKey::Parsed(timestamp(2024, 5, 1, 10, 30, 0)),
                OrderKey::Parsed(timestamp(2024, 5, 1, 10, 30, 1)),
                OrderKey::Fallback("apple.png".to_string()),
                OrderKey::Fallback("banana.png".to_string()),
            ]
        );
    }

    #[test]
    fn camera_id_is_prefix_before_delimiter() {
        assert_eq!(camera_id("c10-2024-05-01_10-30-00.png"), Some("c10"));
        assert_eq!(camera_id("snapshot.png"), None);
        assert_eq!(camera_id("-2024-05-01_10-30-00.png"), None);
    }

    #[test]
    fn list_frames_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in [
            "cam1-2024-05-01_10-00-02.png",
            "cam1-2024-05-01_10-00-00.jpg",
            "cam1-2024-05-01_10-00-01.JPG",
            "zzz.png",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"placeholder").unwrap();
        }

        let frames = list_frames(dir.path());
        let names: Vec<&str> = frames.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cam1-2024-05-01_10-00-00.jpg",
                "cam1-2024-05-01_10-00-01.JPG",
                "cam1-2024-05-01_10-00-02.png",
                "zzz.png",
            ]
        );
    }
}
