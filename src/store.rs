use crate::core::image::ImageId;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

pub const DEFAULT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Directory listing and deletion for a folder of images.
pub trait ImageStore {
    /// Image file names directly inside `folder`, in a stable order.
    fn list_images(&self, folder: &Path) -> io::Result<Vec<ImageId>>;

    /// Remove `image` from `folder`. A file that is already gone is an error.
    fn remove(&self, folder: &Path, image: &ImageId) -> io::Result<()>;
}

/// [`ImageStore`] over the local filesystem.
pub struct LocalImageStore {
    extensions: Vec<String>,
}

impl LocalImageStore {
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS)
    }

    /// Accept files with any of `extensions`, compared case-insensitively.
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| *allowed == ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for LocalImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageStore for LocalImageStore {
    fn list_images(&self, folder: &Path) -> io::Result<Vec<ImageId>> {
        if !folder.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", folder.display()),
            ));
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", folder.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !self.is_image(path) {
                continue;
            }

            match entry.file_name().to_str() {
                Some(name) => images.push(ImageId::new(name)),
                None => log::warn!("Skipping non UTF-8 file name {:?}", entry.file_name()),
            }
        }

        Ok(images)
    }

    fn remove(&self, folder: &Path, image: &ImageId) -> io::Result<()> {
        fs::remove_file(image.path_in(folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn names(images: &[ImageId]) -> Vec<&str> {
        images.iter().map(ImageId::as_str).collect()
    }

    #[test]
    fn test_list_filters_extensions_case_insensitively() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.JPG", "a.png", "c.jpeg", "notes.txt", "d.gif", "noext"] {
            touch(temp_dir.path(), name);
        }

        let images = LocalImageStore::new().list_images(temp_dir.path()).unwrap();

        assert_eq!(names(&images), vec!["a.png", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn test_list_is_not_recursive() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "top.jpg");
        let nested = temp_dir.path().join("nested.jpg");
        fs::create_dir(&nested).unwrap();
        touch(&nested, "inner.jpg");

        let images = LocalImageStore::new().list_images(temp_dir.path()).unwrap();

        assert_eq!(names(&images), vec!["top.jpg"]);
    }

    #[test]
    fn test_custom_extensions() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.webp");
        touch(temp_dir.path(), "b.jpg");

        let store = LocalImageStore::with_extensions([".WEBP"]);
        let images = store.list_images(temp_dir.path()).unwrap();

        assert_eq!(names(&images), vec!["a.webp"]);
    }

    #[test]
    fn test_list_missing_folder_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalImageStore::new().list_images(&temp_dir.path().join("gone"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        let store = LocalImageStore::new();
        let id = ImageId::from("a.jpg");

        store.remove(temp_dir.path(), &id).unwrap();
        assert!(!temp_dir.path().join("a.jpg").exists());

        let err = store.remove(temp_dir.path(), &id).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
