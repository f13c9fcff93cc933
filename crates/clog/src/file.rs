use std::fs;
use std::path::PathBuf;

use common::DbResult;

const FILE_PREFIX: &str = "clog_";
const FILE_SUFFIX: &str = ".log";

/// Tracks the set of rolled log files in a directory, each named
/// `clog_{first_lsn}.log` after the first LSN it holds.
pub struct LogFileManager {
    dir: PathBuf,
}

impl LogFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> DbResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, first_lsn: u64) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{first_lsn}{FILE_SUFFIX}"))
    }

    /// All rolled files, sorted by ascending first LSN.
    pub fn files(&self) -> DbResult<Vec<(u64, PathBuf)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(first_lsn) = parse_first_lsn(&name) {
                files.push((first_lsn, entry.path()));
            }
        }
        files.sort_by_key(|(lsn, _)| *lsn);
        Ok(files)
    }

    /// The most recently rolled file, if any.
    pub fn last_file(&self) -> DbResult<Option<(u64, PathBuf)>> {
        Ok(self.files()?.into_iter().next_back())
    }
}

fn parse_first_lsn(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}
