//! Module for searching for tcmtouch config files

use std::{
    fs::{self, DirEntry},
    path::PathBuf,
};

/// Base system fallback path to use if one cannot be found with XDG
const FALLBACK_BASE_PATH: &str = "/usr/share/tcmtouch";

/// Returns the base path for configuration data
pub fn get_base_path() -> PathBuf {
    let Ok(base_dirs) = xdg::BaseDirectories::with_prefix("tcmtouch") else {
        log::warn!("Unable to determine config base path. Using fallback path.");
        return PathBuf::from(FALLBACK_BASE_PATH);
    };

    for dir in base_dirs.get_data_dirs() {
        if dir.exists() {
            return dir;
        }
    }

    log::warn!("Config base path not found. Using fallback path.");
    PathBuf::from(FALLBACK_BASE_PATH)
}

/// Returns a list of directories in load order to find device configurations.
/// E.g. ["./rootfs/usr/share/tcmtouch/devices", "/etc/tcmtouch/devices.d", "/usr/share/tcmtouch/devices"]
pub fn get_devices_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./rootfs/usr/share/tcmtouch/devices"),
        PathBuf::from("/etc/tcmtouch/devices.d"),
        get_base_path().join("devices"),
    ]
}

/// Returns a list of file paths for the given directories sorted by filename across
/// all given directories. The filter argument is a closure that should return
/// `true` for any files that should be included in the final results. Files
/// with the same name are ordered by the position of their directory in `paths`.
pub fn get_multidir_sorted_files<F>(paths: &[PathBuf], filter: F) -> Vec<PathBuf>
where
    F: Fn(&DirEntry) -> bool,
{
    let mut file_entries: Vec<DirEntry> = paths
        .iter()
        .flat_map(|path| {
            log::trace!("Checking {path:?} for files");
            let files = match fs::read_dir(path) {
                Ok(files) => files,
                Err(e) => {
                    log::debug!("Unable to read directory: {path:?}: {e}");
                    return vec![];
                }
            };
            files
                .filter_map(|r| {
                    let Ok(entry) = r else { return None };
                    filter(&entry).then_some(entry)
                })
                .collect()
        })
        .collect();

    let priority = |entry: &DirEntry| {
        let path = entry.path();
        path.parent()
            .and_then(|dir| {
                paths
                    .iter()
                    .position(|base_path| base_path.as_os_str() == dir.as_os_str())
            })
            .unwrap_or(paths.len())
    };
    file_entries.sort_by(|a, b| {
        a.file_name()
            .cmp(&b.file_name())
            .then_with(|| priority(a).cmp(&priority(b)))
    });
    log::trace!("Got sorted entries: {file_entries:?}");

    file_entries.into_iter().map(|entry| entry.path()).collect()
}
