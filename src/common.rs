//! Plumbing shared by the command line tools.

use std::fmt::Display;
use std::path::Path;

use env_logger::Env;

/// Logs to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();
}

/// Exits with status -2 after printing the error chain.
pub fn exit_on_error<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error! {e:#}");
        std::process::exit(-2);
    })
}

/// File name without directories or the volume extension:
/// `a/b/Pat001.nii.gz` -> `Pat001`.
pub fn volume_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in [".nii.gz", ".nii", ".nrrd", ".nhdr", ".stl"] {
        if name.len() > ext.len() && name.to_ascii_lowercase().ends_with(ext) {
            return name[..name.len() - ext.len()].to_string();
        }
    }
    name
}

/// Fails when `path` exists and overwriting was not requested.
pub fn check_output(path: &Path, overwrite: bool) -> anyhow::Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "output file {} already exists, pass --force to replace it",
            path.display()
        );
    }
    Ok(())
}
