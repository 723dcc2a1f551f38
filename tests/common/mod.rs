//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{fs, io, path::Path};
use tempfile::{tempdir, TempDir};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// Copy the fixture project `tests/<name>` into a fresh temporary directory.
///
/// Tests may edit or delete the copied templates freely; generated output lands in the
/// temporary directory too.
#[allow(dead_code)]
pub fn generate_test_root(name: &str) -> TempDir {
    let temp_dir = tempdir().unwrap();
    let content_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join(name);
    tracing::debug!("Copying content from {:?}", content_root);
    copy_dir_all(&content_root, temp_dir.path()).unwrap();
    temp_dir
}

/// Replace a template of a copied project.
#[allow(dead_code)]
pub fn write_template(root: &TempDir, file_name: &str, content: &str) {
    fs::write(root.path().join("templates").join(file_name), content).unwrap();
}
