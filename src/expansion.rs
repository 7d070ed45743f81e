//! Turns a mixed file/folder selection into the flat list of files a batch submits.

use async_trait::async_trait;

use crate::Result;
use crate::types::{DriveFile, FileDescriptor, SelectionItem};

/// Backend capable of listing every PDF below a folder.
#[async_trait]
pub trait RecursiveLister: Send + Sync {
    async fn list_pdf_files(&self, library_id: &str, folder_id: &str) -> Result<Vec<DriveFile>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub files: Vec<FileDescriptor>,
    /// One message per folder that could not be expanded.
    pub errors: Vec<String>,
}

impl Expansion {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn is_ocr_eligible(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

/// Expands `items` in selection order. Files are kept when their name ends in `.pdf`; folders are listed
/// recursively. A folder that fails is reported in [`Expansion::errors`] and the rest still expand.
/// Duplicates are kept.
pub async fn expand_selection<L>(lister: &L, items: &[SelectionItem]) -> Expansion
where
    L: RecursiveLister + ?Sized,
{
    let mut out = Expansion::default();

    for item in items {
        match item {
            SelectionItem::File { id, name, drive_id } => {
                if is_ocr_eligible(name) {
                    out.files.push(FileDescriptor {
                        id: id.clone(),
                        name: name.clone(),
                        drive_id: drive_id.clone(),
                        parent_folder_id: None,
                    });
                } else {
                    tracing::debug!(file = %name, "skipping non-pdf selection");
                }
            }
            SelectionItem::Folder { id, name, drive_id } => {
                match lister.list_pdf_files(drive_id, id).await {
                    Ok(files) => {
                        tracing::debug!(folder = %name, count = files.len(), "expanded folder");
                        out.files.extend(files.into_iter().map(|file| FileDescriptor {
                            id: file.id,
                            name: file.name,
                            drive_id: drive_id.clone(),
                            parent_folder_id: Some(id.clone()),
                        }));
                    }
                    Err(err) => {
                        tracing::warn!(folder = %name, error = %err, "folder expansion failed");
                        out.errors.push(format!(
                            "failed to expand folder {name}: {}",
                            err.display_message()
                        ));
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::Error;

    struct FakeLister {
        folders: HashMap<String, Vec<DriveFile>>,
    }

    #[async_trait]
    impl RecursiveLister for FakeLister {
        async fn list_pdf_files(&self, _library_id: &str, folder_id: &str) -> Result<Vec<DriveFile>> {
            self.folders
                .get(folder_id)
                .cloned()
                .ok_or_else(|| Error::InvalidResponse(format!("no such folder {folder_id}")))
        }
    }

    fn drive_file(id: &str, name: &str) -> DriveFile {
        DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            drive_id: None,
            size: None,
            last_modified: None,
            web_url: None,
        }
    }

    #[test]
    fn eligibility_is_case_insensitive_pdf_only() {
        assert!(is_ocr_eligible("scan.pdf"));
        assert!(is_ocr_eligible("SCAN.PDF"));
        assert!(is_ocr_eligible("report.final.Pdf"));
        assert!(!is_ocr_eligible("notes.docx"));
        assert!(is_ocr_eligible(".pdf"));
        assert!(!is_ocr_eligible("pdf"));
        assert!(!is_ocr_eligible("a.pdf "));
        assert!(!is_ocr_eligible("a.pdf.zip"));
    }

    #[tokio::test]
    async fn failing_folder_does_not_abort_others() {
        let lister = FakeLister {
            folders: HashMap::from([(
                "good".to_string(),
                vec![drive_file("1", "a.pdf"), drive_file("2", "b.pdf")],
            )]),
        };
        let items = vec![
            SelectionItem::folder("drive-a", "broken", "Broken"),
            SelectionItem::folder("drive-b", "good", "Good"),
        ];

        let expansion = expand_selection(&lister, &items).await;
        assert_eq!(expansion.errors.len(), 1);
        assert!(expansion.errors[0].contains("Broken"), "{:?}", expansion.errors);
        assert_eq!(expansion.files.len(), 2);
        assert!(expansion.files.iter().all(|f| f.drive_id == "drive-b"));
        assert!(
            expansion
                .files
                .iter()
                .all(|f| f.parent_folder_id.as_deref() == Some("good"))
        );
        assert!(!expansion.is_complete());
    }

    #[tokio::test]
    async fn files_are_filtered_and_duplicates_kept() {
        let lister = FakeLister {
            folders: HashMap::from([("f".to_string(), vec![drive_file("1", "a.pdf")])]),
        };
        let items = vec![
            SelectionItem::file("drive-a", "x", "photo.png"),
            SelectionItem::file("drive-a", "1", "a.PDF"),
            SelectionItem::folder("drive-a", "f", "Folder"),
            SelectionItem::folder("drive-a", "f", "Folder again"),
        ];

        let expansion = expand_selection(&lister, &items).await;
        assert!(expansion.is_complete());
        let ids: Vec<&str> = expansion.files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["1", "1", "1"]);
    }
}
