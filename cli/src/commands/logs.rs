use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use color_eyre::eyre::Result;

use crate::config;
use crate::logging::LOG_FILE_PREFIX;

pub fn run(lines: usize, follow: bool) -> Result<()> {
    let log_dir = config::runtime_dir();

    let Some(path) = latest_log_file(&log_dir) else {
        println!("No log files found in {:?}", log_dir);
        println!("Log files are created when the node runs.");
        return Ok(());
    };

    let mut tail = Command::new("tail");
    if follow {
        tail.arg("-f");
    }
    tail.args(["-n", &lines.to_string()]).arg(&path);

    if follow {
        // replaces this process, only returns on failure
        return Err(tail.exec().into());
    }

    tail.status()?;
    Ok(())
}

/// Daily files sort by their date suffix, so the last match is the newest.
fn latest_log_file(dir: &Path) -> Option<PathBuf> {
    let prefix = format!("{}.", LOG_FILE_PREFIX);

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".log"))
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_log_file_picks_newest_node_log() {
        let dir = std::env::temp_dir().join(format!("tangle-logs-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in [
            "tangle.2026-01-01.log",
            "tangle.2026-01-03.log",
            "tangle.2026-01-02.log",
            "zzz.2026-12-31.log",
            "tangle.sock",
        ] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let latest = latest_log_file(&dir);
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(latest, Some(dir.join("tangle.2026-01-03.log")));
    }

    #[test]
    fn test_latest_log_file_missing_dir() {
        assert_eq!(latest_log_file(Path::new("/nonexistent/tangle/logs")), None);
    }
}
