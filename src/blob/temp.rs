use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::BlobRegistry;
use crate::error::ThumbnailError;
use crate::media::EncodedImage;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Creates a fresh file in `dir`, skipping names that already exist.
fn create_unique_file(dir: &Path, ext: &str) -> io::Result<(PathBuf, fs::File)> {
    loop {
        let id = NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("thumb-{}-{}.{}", std::process::id(), id, ext));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Writes each image to a directory and hands out `file://` handles.
///
/// Files are removed on revoke; any left over are removed when the registry
/// is dropped.
#[derive(Debug)]
pub struct TempDirBlobRegistry {
    dir: PathBuf,
    files: Mutex<HashMap<String, PathBuf>>,
}

impl TempDirBlobRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Registry rooted at `<system temp>/video-thumbnails`.
    pub fn in_system_temp() -> io::Result<Self> {
        Self::new(std::env::temp_dir().join("video-thumbnails"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> Option<PathBuf> {
        self.files.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

impl BlobRegistry for TempDirBlobRegistry {
    fn create_object_url(&self, image: EncodedImage) -> Result<String, ThumbnailError> {
        let (path, mut file) = create_unique_file(&self.dir, extension_for(&image.mime_type))?;
        file.write_all(&image.bytes)?;
        let url = format!("file://{}", path.display());
        log::trace!(target: "video_thumbnails::blob", "wrote {}", path.display());
        self.files.lock().insert(url.clone(), path);
        Ok(url)
    }

    fn revoke_object_url(&self, url: &str) {
        let Some(path) = self.files.lock().remove(url) else {
            return;
        };
        if let Err(e) = fs::remove_file(&path) {
            log::warn!(
                target: "video_thumbnails::blob",
                "failed to remove {}: {}",
                path.display(),
                e
            );
        }
    }
}

impl Drop for TempDirBlobRegistry {
    fn drop(&mut self) {
        for (_, path) in self.files.get_mut().drain() {
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use super::TempDirBlobRegistry;
    use crate::blob::BlobRegistry;
    use crate::media::EncodedImage;

    #[test]
    fn writes_and_revokes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = TempDirBlobRegistry::new(dir.path()).expect("registry");

        let url = registry
            .create_object_url(EncodedImage::new(b"jpeg bytes".to_vec(), "image/jpeg"))
            .expect("url");
        let path = registry.path_for(&url).expect("path");

        assert!(url.starts_with("file://"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read(&path).expect("read"), b"jpeg bytes");

        registry.revoke_object_url(&url);
        registry.revoke_object_url(&url);
        assert!(!path.exists(), "revoked file should be removed");
        assert!(registry.is_empty());
    }

    #[test]
    fn drop_removes_unreleased_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = TempDirBlobRegistry::new(dir.path().join("nested")).expect("registry");
        let url = registry
            .create_object_url(EncodedImage::new(vec![1, 2, 3], "application/octet-stream"))
            .expect("url");
        let path = registry.path_for(&url).expect("path");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("bin"));

        drop(registry);
        assert!(!path.exists(), "drop should remove leftover files");
    }

    #[test]
    fn back_to_back_images_get_distinct_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = TempDirBlobRegistry::new(dir.path()).expect("registry");

        let urls: Vec<String> = (0..8u8)
            .map(|i| {
                registry
                    .create_object_url(EncodedImage::new(vec![i], "image/png"))
                    .expect("url")
            })
            .collect();

        let distinct: HashSet<&String> = urls.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(registry.len(), 8);
        for (i, url) in urls.iter().enumerate() {
            let path = registry.path_for(url).expect("path");
            assert_eq!(fs::read(&path).expect("read"), vec![i as u8]);
        }
    }

    #[test]
    fn skips_names_left_by_an_earlier_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = TempDirBlobRegistry::new(dir.path()).expect("registry");
        let first = registry
            .create_object_url(EncodedImage::new(b"first".to_vec(), "image/png"))
            .expect("first");
        let first_path = registry.path_for(&first).expect("path");

        // Squat on the next few candidate names.
        let next_id = super::NEXT_FILE_ID.load(std::sync::atomic::Ordering::Relaxed);
        for id in next_id..next_id + 4 {
            let name = format!("thumb-{}-{}.png", std::process::id(), id);
            fs::write(dir.path().join(name), b"stale").expect("stale");
        }

        let second = registry
            .create_object_url(EncodedImage::new(b"second".to_vec(), "image/png"))
            .expect("second");
        let second_path = registry.path_for(&second).expect("path");
        assert_ne!(first_path, second_path);
        assert_eq!(fs::read(&second_path).expect("read"), b"second");
        assert_eq!(fs::read(&first_path).expect("read"), b"first");
    }
}
