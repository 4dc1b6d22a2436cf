use anyhow::anyhow;
use formatx::formatx;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;

pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Writes each location key to its own file in a directory. The file name is the template with
/// `{}` replaced by the key, e.g. `community__{}.csv`.
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    fn file_name(&self, location_key: &str) -> anyhow::Result<String> {
        formatx!(&self.file_template, location_key).map_err(|error| {
            anyhow!(
                "Output file template '{}' is not usable: {error:?}",
                self.file_template
            )
        })
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        let path = self.directory_path.join(self.file_name(location_key)?);
        Ok(BufWriter::new(File::create(path)?))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Keeps everything written in memory, keyed by location key.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutput {
    files: Rc<RefCell<IndexMap<String, Vec<u8>>>>,
}

impl MemoryOutput {
    pub fn keys(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }

    pub fn contents(&self, location_key: &str) -> Option<String> {
        self.files
            .borrow()
            .get(location_key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

struct MemoryWriter {
    location_key: String,
    files: Rc<RefCell<IndexMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .borrow_mut()
            .entry(self.location_key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for MemoryOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        self.files
            .borrow_mut()
            .entry(location_key.to_string())
            .or_default()
            .clear();
        Ok(MemoryWriter {
            location_key: location_key.to_string(),
            files: Rc::clone(&self.files),
        })
    }
}
