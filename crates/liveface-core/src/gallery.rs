//! Reference-face gallery, loaded once at process start.
//!
//! The gallery is a directory of labeled images (`alice.jpg` enrolls the
//! identity "alice"). Each image is pushed through the external face
//! encoder at load time; the resulting label → embedding list is held
//! immutable for the life of the process. Reload requires a restart.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::FaceEncoder;
use crate::matcher::Embedding;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read gallery directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no valid face encoding found in {0}")]
    NoValidEncodings(PathBuf),
    #[error("face encoder failed on {path}: {source}")]
    Encoder {
        path: PathBuf,
        #[source]
        source: crate::backend::BackendError,
    },
}

/// One enrolled identity.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// Immutable set of known identities.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn from_entries(entries: Vec<(String, Embedding)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(label, embedding)| GalleryEntry { label, embedding })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Load every labeled reference image under `dir`.
    ///
    /// Undecodable files and images the encoder finds no face in are
    /// skipped with a warning; an unreachable encoder is fatal. Ending up
    /// with zero encodings is a startup error.
    pub fn load(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<Self, GalleryError> {
        if !dir.exists() {
            return Err(GalleryError::NotFound(dir.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| GalleryError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut entries = Vec::new();
        for path in paths {
            let Some(label) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            let img = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping undecodable gallery image");
                    continue;
                }
            };

            match encoder.encode(&img) {
                Ok(Some(embedding)) => {
                    tracing::debug!(label, path = %path.display(), "gallery identity enrolled");
                    entries.push(GalleryEntry { label, embedding });
                }
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "no face found in gallery image");
                }
                Err(source) => {
                    return Err(GalleryError::Encoder { path, source });
                }
            }
        }

        if entries.is_empty() {
            return Err(GalleryError::NoValidEncodings(dir.to_path_buf()));
        }

        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use image::RgbImage;

    /// Encoder stub: embeds an image as its mean channel values; a fully
    /// black image counts as "no face".
    struct StubEncoder;

    impl FaceEncoder for StubEncoder {
        fn encode(&mut self, image: &RgbImage) -> Result<Option<Embedding>, BackendError> {
            let n = (image.width() * image.height()) as f32;
            let mut sums = [0.0f32; 3];
            for p in image.pixels() {
                for c in 0..3 {
                    sums[c] += p[c] as f32;
                }
            }
            if sums.iter().all(|&s| s == 0.0) {
                return Ok(None);
            }
            Ok(Some(Embedding::new(sums.map(|s| s / n).to_vec())))
        }
    }

    struct FailingEncoder;

    impl FaceEncoder for FailingEncoder {
        fn encode(&mut self, _image: &RgbImage) -> Result<Option<Embedding>, BackendError> {
            Err(BackendError::new("inference service unreachable"))
        }
    }

    fn temp_gallery_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "liveface-gallery-test-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_image(dir: &Path, name: &str, value: u8) {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([value, value, value]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn loads_labeled_entries() {
        let dir = temp_gallery_dir("loads");
        write_image(&dir, "alice.png", 100);
        write_image(&dir, "bob.jpg", 200);
        std::fs::write(dir.join("notes.txt"), b"not an image").unwrap();

        let gallery = Gallery::load(&dir, &mut StubEncoder).unwrap();
        let labels: Vec<&str> = gallery.labels().collect();
        assert_eq!(labels, vec!["alice", "bob"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = std::env::temp_dir().join("liveface-gallery-test-definitely-missing");
        let err = Gallery::load(&dir, &mut StubEncoder).unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }

    #[test]
    fn zero_valid_encodings_is_fatal() {
        let dir = temp_gallery_dir("empty");
        // Black image: the stub encoder reports no face.
        write_image(&dir, "nobody.png", 0);

        let err = Gallery::load(&dir, &mut StubEncoder).unwrap_err();
        assert!(matches!(err, GalleryError::NoValidEncodings(_)));
        assert!(err.to_string().contains("no valid face encoding found"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn undecodable_image_is_skipped() {
        let dir = temp_gallery_dir("undecodable");
        std::fs::write(dir.join("corrupt.jpg"), b"definitely not jpeg").unwrap();
        write_image(&dir, "alice.png", 100);

        let gallery = Gallery::load(&dir, &mut StubEncoder).unwrap();
        assert_eq!(gallery.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn encoder_failure_is_fatal() {
        let dir = temp_gallery_dir("backend");
        write_image(&dir, "alice.png", 100);

        let err = Gallery::load(&dir, &mut FailingEncoder).unwrap_err();
        assert!(matches!(err, GalleryError::Encoder { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
