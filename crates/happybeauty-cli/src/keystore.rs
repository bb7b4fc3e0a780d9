// Keystore module - writes and loads provider/merchant keys
//
// Keys are stored as single-line base64 files: `<prefix>.key` holds the
// private key (owner-only permissions on unix), `<prefix>.pub` the public key.
// Either scheme's encoding fits, so the files do not record the sign type.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Paths written by [`write_keypair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Writes a base64 keypair next to `prefix`.
///
/// Refuses to overwrite existing files unless `force` is set.
pub fn write_keypair(
    prefix: &Path,
    private_key: &str,
    public_key: &str,
    force: bool,
) -> Result<KeyFiles> {
    let files = KeyFiles {
        private_key: prefix.with_extension("key"),
        public_key: prefix.with_extension("pub"),
    };

    if !force {
        for path in [&files.private_key, &files.public_key] {
            if path.exists() {
                anyhow::bail!(
                    "'{}' already exists. Use --force to overwrite.",
                    path.display()
                );
            }
        }
    }

    write_private(&files.private_key, &format!("{}\n", private_key), force)?;
    std::fs::write(&files.public_key, format!("{}\n", public_key))
        .with_context(|| format!("Failed to write '{}'", files.public_key.display()))?;

    Ok(files)
}

/// Creates `path` owner-only before any key material is written. A forced
/// overwrite replaces the file so its old permissions do not carry over.
fn write_private(path: &Path, contents: &str, force: bool) -> Result<()> {
    if force {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to replace '{}'", path.display()))
            }
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write '{}'", path.display()))
}

/// Loads a key given inline, or from a file as `@path`, returning its
/// trimmed text.
pub fn load_key_text(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file '{}'", path))?
            .trim()
            .to_string()),
        None => Ok(arg.trim().to_string()),
    }
}
