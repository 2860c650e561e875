use std::fs::{File, FileTimes};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use atomic_write_file::AtomicWriteFile;

use crate::detect::{self, Container};
use crate::{Error, TrimRequest, config};

/// Trims `path` in place.
///
/// The new content is written to a temporary file next to `path`, which replaces it only once the
/// transcode succeeded; access and modification times of the original are carried over. On error
/// `path` is left untouched.
pub fn trim_file(path: &Path, request: &TrimRequest, encoder: &config::Encoder) -> Result<Container, Error> {
    let source = File::open(path)?;
    let metadata = source.metadata()?;
    let mut reader = BufReader::new(source);

    let atomic = AtomicWriteFile::open(path)?;
    let container = {
        let mut writer = BufWriter::new(atomic.as_file());
        let container = detect::transcode(&mut reader, &mut writer, request, encoder)?;
        writer.flush()?;
        container
    };

    let mut times = FileTimes::new();
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    atomic.as_file().set_times(times)?;
    atomic.commit()?;

    tracing::debug!(path = %path.display(), container = container.name(), "replaced file");
    Ok(container)
}
