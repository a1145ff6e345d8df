//! Directory-driven wrappers around [`PageCompositor`].

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::compositor::{ComposeReport, PageCompositor};
use crate::error::{ComposeError, Result};
use crate::source::{find_images, ImageSource};

/// result of composing one folder
#[derive(Debug)]
pub struct FolderOutcome {
    pub folder: PathBuf,
    pub output: PathBuf,
    pub result: Result<ComposeReport>,
}

/// `<dir>/<dir name>.pdf`
///
/// `.` and `..` are resolved against the filesystem to find the name; only
/// the root, which has none, falls back to `images.pdf`.
pub fn folder_output_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .or_else(|| {
            std::fs::canonicalize(dir)
                .ok()
                .and_then(|abs| abs.file_name().map(|n| n.to_os_string()))
        })
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "images".to_string());
    dir.join(format!("{name}.pdf"))
}

/// Compose every image found under `dir` into `<dir>/<dir name>.pdf`.
pub fn compose_folder(dir: &Path, compositor: &PageCompositor) -> FolderOutcome {
    let output = folder_output_path(dir);
    let result = find_images(dir).and_then(|images| {
        let sources: Vec<ImageSource> = images.into_iter().map(ImageSource::new).collect();
        compositor.compose(&sources, &output)
    });
    FolderOutcome {
        folder: dir.to_path_buf(),
        output,
        result,
    }
}

/// Compose each immediate subdirectory of `root` into its own PDF.
///
/// Folders are handled in parallel, each with its own document. Outcomes
/// come back sorted by folder path.
pub fn compose_subfolders(root: &Path, compositor: &PageCompositor) -> Result<Vec<FolderOutcome>> {
    let entries = std::fs::read_dir(root).map_err(|source| ComposeError::OpenFailure {
        path: root.to_path_buf(),
        source,
    })?;
    let mut folders: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();
    tracing::info!(root = %root.display(), folders = folders.len(), "composing subfolders");

    Ok(folders
        .par_iter()
        .map(|dir| compose_folder(dir, compositor))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{ComposeOptions, ErrorPolicy};

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgpdf_folder_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn compositor() -> PageCompositor {
        PageCompositor::new(ComposeOptions {
            quiet: true,
            on_error: ErrorPolicy::Skip,
            ..ComposeOptions::default()
        })
    }

    fn write_png(path: &Path) {
        image::GrayImage::from_pixel(6, 9, image::Luma([128])).save(path).unwrap();
    }

    #[test]
    fn output_named_after_folder() {
        assert_eq!(
            folder_output_path(Path::new("/scans/chapter 1")),
            PathBuf::from("/scans/chapter 1/chapter 1.pdf")
        );
    }

    #[test]
    fn relative_parent_takes_resolved_name() {
        let album = tmp_dir("parent_ref").join("album");
        std::fs::create_dir_all(album.join("sub")).unwrap();
        let dir = album.join("sub").join("..");
        assert_eq!(folder_output_path(&dir), dir.join("album.pdf"));
    }

    #[test]
    fn folder_collects_nested_images() {
        let dir = tmp_dir("single").join("album");
        std::fs::create_dir_all(dir.join("disc2")).unwrap();
        write_png(&dir.join("01.png"));
        write_png(&dir.join("disc2").join("02.png"));

        let outcome = compose_folder(&dir, &compositor());
        let report = outcome.result.unwrap();
        assert_eq!(report.page_count(), 2);
        assert_eq!(outcome.output, dir.join("album.pdf"));
        assert!(outcome.output.exists());
    }

    #[test]
    fn empty_folder_reports_empty_input() {
        let dir = tmp_dir("no_images");
        let outcome = compose_folder(&dir, &compositor());
        assert!(matches!(outcome.result, Err(ComposeError::EmptyInput)));
        assert!(!outcome.output.exists());
    }

    #[test]
    fn every_subfolder_gets_its_own_pdf() {
        let root = tmp_dir("batch");
        for (name, count) in [("b", 2), ("a", 1), ("c", 0)] {
            let sub = root.join(name);
            std::fs::create_dir_all(&sub).unwrap();
            for i in 0..count {
                write_png(&sub.join(format!("{i}.png")));
            }
        }
        std::fs::write(root.join("stray.png"), b"ignored, not a folder").unwrap();

        let outcomes = compose_subfolders(&root, &compositor()).unwrap();
        let folders: Vec<_> = outcomes.iter().map(|o| o.folder.clone()).collect();
        assert_eq!(folders, vec![root.join("a"), root.join("b"), root.join("c")]);
        assert_eq!(outcomes[0].result.as_ref().unwrap().page_count(), 1);
        assert_eq!(outcomes[1].result.as_ref().unwrap().page_count(), 2);
        assert!(matches!(outcomes[2].result, Err(ComposeError::EmptyInput)));
        assert!(root.join("b").join("b.pdf").exists());
    }

    #[test]
    fn missing_root_is_an_open_failure() {
        let root = tmp_dir("missing_root").join("nope");
        assert!(matches!(
            compose_subfolders(&root, &compositor()),
            Err(ComposeError::OpenFailure { .. })
        ));
    }
}
