//! ZIP packaging for multi-file outputs

use crate::batch::BatchQueue;
use crate::error::Result;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// In-memory ZIP archive builder
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: HashSet<String>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            names: HashSet::new(),
            entries: 0,
        }
    }

    /// Add a file; a name that is already taken gets a numeric suffix.
    /// Returns the entry name actually written.
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<String> {
        let name = self.unique_name(name);
        self.writer.start_file(name.as_str(), self.options)?;
        self.writer.write_all(bytes)?;
        self.names.insert(name.clone());
        self.entries += 1;
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Finalize the central directory and return the archive bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.writer.finish()?;
        Ok(cursor.into_inner())
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.names.contains(name) {
            return name.to_string();
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        (2..)
            .map(|n| match ext {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            })
            .find(|candidate| !self.names.contains(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Package numbered pages as `page_<N>.<ext>`, in the order given.
///
/// Returns the archive and the entry names written.
pub fn package_pages(pages: Vec<(u32, Vec<u8>)>, ext: &str) -> Result<(Vec<u8>, Vec<String>)> {
    let mut archive = ArchiveBuilder::new();
    let mut entries = Vec::with_capacity(pages.len());
    for (number, bytes) in pages {
        entries.push(archive.add_entry(&format!("page_{}.{}", number, ext), &bytes)?);
    }
    Ok((archive.finish()?, entries))
}

/// Package the outputs of completed items, in submission order, as `<prefix><name>`.
///
/// Returns `None` when no item has completed.
pub fn package_completed(queue: &BatchQueue, prefix: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = ArchiveBuilder::new();
    for item in queue.completed() {
        if let Some(output) = &item.output {
            archive.add_entry(&format!("{}{}", prefix, item.name), output)?;
        }
    }
    if archive.is_empty() {
        return Ok(None);
    }
    tracing::debug!(entries = archive.len(), "Packaged completed items");
    archive.finish().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchItem, ItemProcessor};
    use crate::error::Error;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use zip::ZipArchive;

    fn entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_entries_round_trip_in_order() {
        let mut archive = ArchiveBuilder::new();
        archive.add_entry("page_1.pdf", b"one").unwrap();
        archive.add_entry("page_2.pdf", b"two").unwrap();
        assert_eq!(archive.len(), 2);

        assert_eq!(
            entries(archive.finish().unwrap()),
            vec![
                ("page_1.pdf".to_string(), b"one".to_vec()),
                ("page_2.pdf".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let mut archive = ArchiveBuilder::new();
        assert_eq!(archive.add_entry("scan.jpg", b"a").unwrap(), "scan.jpg");
        assert_eq!(archive.add_entry("scan.jpg", b"b").unwrap(), "scan_2.jpg");
        assert_eq!(archive.add_entry("scan.jpg", b"c").unwrap(), "scan_3.jpg");
        assert_eq!(archive.add_entry("README", b"d").unwrap(), "README");
        assert_eq!(archive.add_entry("README", b"e").unwrap(), "README_2");
    }

    #[test]
    fn test_package_pages_names_by_page_number() {
        let pages = vec![(3, b"three".to_vec()), (1, b"one".to_vec())];
        let (zip, names) = package_pages(pages, "jpg").unwrap();
        assert_eq!(names, vec!["page_3.jpg", "page_1.jpg"]);
        assert_eq!(
            entries(zip),
            vec![
                ("page_3.jpg".to_string(), b"three".to_vec()),
                ("page_1.jpg".to_string(), b"one".to_vec()),
            ]
        );
    }

    struct FailSecond;

    #[async_trait]
    impl ItemProcessor for FailSecond {
        async fn process(&self, item: &BatchItem) -> Result<Vec<u8>> {
            if item.name == "b.png" {
                return Err(Error::AiService {
                    reason: "no image returned".to_string(),
                });
            }
            Ok(item.input.clone())
        }
    }

    #[tokio::test]
    async fn test_package_completed_skips_failed_items() {
        let mut queue = BatchQueue::new();
        queue.submit("a.png", "image/png", b"A".to_vec());
        queue.submit("b.png", "image/png", b"B".to_vec());
        queue.submit("c.png", "image/png", b"C".to_vec());
        queue.run(&FailSecond).await;

        let zip = package_completed(&queue, "scanned_").unwrap().unwrap();
        assert_eq!(
            entries(zip),
            vec![
                ("scanned_a.png".to_string(), b"A".to_vec()),
                ("scanned_c.png".to_string(), b"C".to_vec()),
            ]
        );
    }

    #[test]
    fn test_package_nothing_completed() {
        let mut queue = BatchQueue::new();
        queue.submit("a.png", "image/png", vec![]);
        assert!(package_completed(&queue, "scanned_").unwrap().is_none());
    }

    #[test]
    fn test_package_all_failed() {
        let mut queue = BatchQueue::new();
        queue.submit("b.png", "image/png", b"B".to_vec());
        let summary = tokio_test::block_on(queue.run(&FailSecond));

        assert_eq!(summary.failed, 1);
        assert!(package_completed(&queue, "scanned_").unwrap().is_none());
    }
}
